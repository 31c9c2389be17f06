//! CLI command handling
//!
//! Loads configuration and scenarios, prepares the browser and formats
//! output for each command.

mod driver;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use colored::Colorize;

use crate::commands::{Commands, RunArgs};
use crate::common::config::Config;
use crate::common::{paths, Error, Result};
use crate::scenario::{self, RunSettings, Scenario, Selection};
use crate::webdriver::WebDriverBrowser;

pub use driver::{ensure_driver_running, DriverProcess};

/// Timeout for the base URL reachability check
const REACHABILITY_TIMEOUT_SECS: u64 = 10;

/// Load the configuration file, explicit or default
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

/// Dispatch a CLI command
///
/// Returns `false` when the command ran but some scenario failed.
pub async fn dispatch(command: Commands, config: Config) -> Result<bool> {
    match command {
        Commands::Run(args) => run(args, config).await,

        Commands::List { paths, tags } => {
            let scenarios = scenario::load_paths(&scenario_paths(paths))?;
            let scenarios = scenario::select(
                scenarios,
                &Selection {
                    names: Vec::new(),
                    tags,
                },
            )?;
            print_list(&scenarios);
            Ok(true)
        }

        Commands::Validate { paths } => {
            let scenarios = scenario::load_paths(&scenario_paths(paths))?;
            let files: BTreeSet<&Path> = scenarios.iter().map(|s| s.source.as_path()).collect();
            println!(
                "{} {} scenario(s) in {} file(s) are valid",
                "✓".green().bold(),
                scenarios.len(),
                files.len()
            );
            Ok(true)
        }
    }
}

fn scenario_paths(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    if paths.is_empty() {
        vec![PathBuf::from(paths::DEFAULT_SCENARIO_DIR)]
    } else {
        paths
    }
}

/// Layer command-line flags over the configuration file
fn apply_overrides(config: &mut Config, args: &RunArgs) {
    if let Some(url) = &args.driver_url {
        config.driver.url = url.clone();
    }
    if let Some(browser) = args.browser {
        config.driver.browser = browser;
    }
    if args.headed {
        config.driver.headless = false;
    }
    if let Some(ms) = args.timeout {
        config.timeouts.step_ms = ms;
    }
    if let Some(secs) = args.navigation_timeout {
        config.timeouts.navigation_secs = secs;
    }
    if let Some(jobs) = args.jobs {
        config.run.jobs = jobs;
    }
    if let Some(url) = &args.base_url {
        config.run.base_url = Some(url.clone());
    }
    if let Some(dir) = &args.artifacts {
        config.run.artifacts_dir = Some(dir.clone());
    }
    config.run.preconditions.extend(args.preconditions.iter().cloned());
}

async fn run(args: RunArgs, mut config: Config) -> Result<bool> {
    apply_overrides(&mut config, &args);

    let scenarios = scenario::load_paths(&scenario_paths(args.paths.clone()))?;
    let scenarios = scenario::select(
        scenarios,
        &Selection {
            names: args.scenarios.clone(),
            tags: args.tags.clone(),
        },
    )?;

    let settings = RunSettings::from_config(&config)?;
    settings.check_urls(&scenarios)?;
    check_base_urls(&settings, &scenarios).await?;

    let (client, driver) = ensure_driver_running(&config).await?;
    let browser = WebDriverBrowser::new(
        client,
        config.driver.browser,
        config.driver.headless,
        &config.timeouts,
    );

    let report = scenario::run_all(&browser, &scenarios, &settings).await;

    if let Some(driver) = driver {
        driver.stop().await;
    }

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        report.print(args.verbose);
    }

    if let Some(path) = &args.report {
        tokio::fs::write(path, report.to_json()?).await?;
        tracing::info!("Report written to {}", path.display());
    }

    Ok(report.success())
}

/// Fail fast when a base URL does not answer at all
///
/// Any HTTP response counts as reachable; only connection-level failures
/// (DNS, refused, timeout) are configuration errors.
async fn check_base_urls(settings: &RunSettings, scenarios: &[Scenario]) -> Result<()> {
    let bases: BTreeSet<String> = scenarios
        .iter()
        .filter_map(|s| settings.base_url_for(s))
        .map(|url| url.to_string())
        .collect();
    if bases.is_empty() {
        return Ok(());
    }

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(REACHABILITY_TIMEOUT_SECS))
        .build()
        .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

    for url in bases {
        tracing::debug!("Checking base URL {}", url);
        if let Err(e) = http.get(&url).send().await {
            return Err(Error::BaseUrlUnreachable {
                url,
                reason: e.to_string(),
            });
        }
    }
    Ok(())
}

fn print_list(scenarios: &[Scenario]) {
    for scenario in scenarios {
        let mut line = scenario.name.white().bold().to_string();
        if !scenario.tags.is_empty() {
            line.push_str(&format!(" {}", format!("[{}]", scenario.tags.join(", ")).cyan()));
        }
        if let Some(reason) = &scenario.skip {
            line.push_str(&format!(" {}", format!("(skip: {})", reason).yellow()));
        } else if !scenario.requires.is_empty() {
            line.push_str(&format!(
                " {}",
                format!("(requires: {})", scenario.requires.join(", ")).yellow()
            ));
        }
        println!("{}", line);
        if let Some(description) = &scenario.description {
            println!("    {}", description.dimmed());
        }
    }
    println!("\n{} scenario(s)", scenarios.len());
}
