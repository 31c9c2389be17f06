//! CLI command definitions
//!
//! Defines the clap commands for the scenario runner.

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::common::config::BrowserKind;

#[derive(Subcommand)]
pub enum Commands {
    /// Run scenarios against a browser
    Run(RunArgs),

    /// List available scenarios
    #[command(alias = "ls")]
    List {
        /// Scenario files or directories (default: scenarios/)
        paths: Vec<PathBuf>,

        /// Only list scenarios with this tag (repeatable)
        #[arg(long = "tag", short = 't')]
        tags: Vec<String>,
    },

    /// Load and validate scenario files without running them
    Validate {
        /// Scenario files or directories (default: scenarios/)
        paths: Vec<PathBuf>,
    },
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Scenario files or directories (default: scenarios/)
    pub paths: Vec<PathBuf>,

    /// Run only the named scenario (repeatable)
    #[arg(long = "scenario", short = 's')]
    pub scenarios: Vec<String>,

    /// Run only scenarios with this tag (repeatable)
    #[arg(long = "tag", short = 't')]
    pub tags: Vec<String>,

    /// Base URL for relative navigation, overriding scenario files
    #[arg(long)]
    pub base_url: Option<String>,

    /// Per-step timeout in milliseconds
    #[arg(long, value_name = "MS")]
    pub timeout: Option<u64>,

    /// Navigation timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub navigation_timeout: Option<u64>,

    /// Number of scenarios to run at once
    #[arg(long, short = 'j')]
    pub jobs: Option<usize>,

    /// Mark a precondition as satisfied (repeatable)
    #[arg(long = "precondition", short = 'p')]
    pub preconditions: Vec<String>,

    /// Browser to drive
    #[arg(long, value_enum)]
    pub browser: Option<BrowserKind>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// WebDriver server URL
    #[arg(long)]
    pub driver_url: Option<String>,

    /// Print the report as JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Also write the JSON report to a file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Directory for failure screenshots
    #[arg(long, value_name = "DIR")]
    pub artifacts: Option<PathBuf>,

    /// Show every step, not just failing ones
    #[arg(long, short)]
    pub verbose: bool,
}
