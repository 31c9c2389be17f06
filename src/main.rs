//! scenario-runner - declarative browser scenarios over WebDriver
//!
//! Runs YAML scenarios of navigate/locate/act/assert steps against Chrome or
//! Firefox and reports each scenario as passed, failed or skipped.

use std::path::PathBuf;

use clap::Parser;
use scenario_runner::commands::Commands;
use scenario_runner::common::logging;
use scenario_runner::{cli, Error};

/// Exit status when a scenario failed
const EXIT_FAILED: i32 = 1;
/// Exit status when the run could not start
const EXIT_CONFIG: i32 = 2;

#[derive(Parser)]
#[command(name = "scenario-runner", about = "Run declarative browser scenarios over WebDriver")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file (default: platform config directory)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match cli::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(EXIT_CONFIG);
        }
    };

    let verbose = matches!(&cli.command, Commands::Run(args) if args.verbose);
    let log = logging::init_cli(verbose, config.logging.file);
    if let Some(path) = &log.file_path {
        tracing::debug!("Logging to {}", path.display());
    }

    let code = match cli::dispatch(cli.command, config).await {
        Ok(true) => 0,
        Ok(false) => EXIT_FAILED,
        Err(e) => {
            eprintln!("Error: {e}");
            exit_code(&e)
        }
    };

    // Flush the file log before exiting
    drop(log);
    std::process::exit(code);
}

fn exit_code(error: &Error) -> i32 {
    if error.is_configuration() {
        EXIT_CONFIG
    } else {
        EXIT_FAILED
    }
}
