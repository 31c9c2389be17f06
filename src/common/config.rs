//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// WebDriver server settings
    #[serde(default)]
    pub driver: DriverConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Run defaults
    #[serde(default)]
    pub run: RunConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Browser driven through the WebDriver server
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BrowserKind {
    /// Chrome / Chromium via chromedriver
    #[default]
    Chrome,
    /// Firefox via geckodriver
    Firefox,
}

impl BrowserKind {
    /// Name of the driver executable searched on PATH
    pub fn driver_binary(&self) -> &'static str {
        match self {
            BrowserKind::Chrome => "chromedriver",
            BrowserKind::Firefox => "geckodriver",
        }
    }
}

/// WebDriver server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DriverConfig {
    /// URL of the WebDriver server
    #[serde(default = "default_driver_url")]
    pub url: String,

    /// Driver executable to spawn when nothing answers at `url`
    pub path: Option<PathBuf>,

    /// Additional arguments passed to a spawned driver
    #[serde(default)]
    pub args: Vec<String>,

    /// Browser to request in new sessions
    #[serde(default)]
    pub browser: BrowserKind,

    /// Run the browser without a visible window
    #[serde(default = "default_headless")]
    pub headless: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            url: default_driver_url(),
            path: None,
            args: Vec::new(),
            browser: BrowserKind::default(),
            headless: default_headless(),
        }
    }
}

fn default_driver_url() -> String {
    "http://localhost:9515".to_string()
}
fn default_headless() -> bool {
    true
}

/// Timeout settings
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Page load timeout for navigate steps, in seconds
    #[serde(default = "default_navigation")]
    pub navigation_secs: u64,

    /// Default timeout for act and assert steps, in milliseconds
    #[serde(default = "default_step")]
    pub step_ms: u64,

    /// Interval between polls while waiting on a locator, in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            navigation_secs: default_navigation(),
            step_ms: default_step(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl Timeouts {
    pub fn navigation(&self) -> Duration {
        Duration::from_secs(self.navigation_secs)
    }

    pub fn step(&self) -> Duration {
        Duration::from_millis(self.step_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

fn default_navigation() -> u64 {
    30
}
fn default_step() -> u64 {
    5_000
}
fn default_poll_interval() -> u64 {
    100
}

/// Run defaults, overridable from the command line
#[derive(Debug, Deserialize, Clone)]
pub struct RunConfig {
    /// Base URL applied to every scenario (overrides suite base URLs)
    pub base_url: Option<String>,

    /// Maximum number of scenarios running at once
    #[serde(default = "default_jobs")]
    pub jobs: usize,

    /// Preconditions considered satisfied for every run
    #[serde(default)]
    pub preconditions: Vec<String>,

    /// Directory for failure screenshots
    pub artifacts_dir: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            jobs: default_jobs(),
            preconditions: Vec::new(),
            artifacts_dir: None,
        }
    }
}

fn default_jobs() -> usize {
    1
}

/// Logging configuration
#[derive(Debug, Deserialize, Default, Clone)]
pub struct LoggingConfig {
    /// Also write logs to the platform log directory
    #[serde(default)]
    pub file: bool,
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }

    /// Driver executable to spawn: explicit path first, then PATH lookup
    pub fn driver_executable(&self) -> Option<PathBuf> {
        if let Some(path) = &self.driver.path {
            return Some(path.clone());
        }
        which::which(self.driver.browser.driver_binary()).ok()
    }
}
