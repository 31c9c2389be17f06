//! Platform configuration and data paths
//!
//! Uses the directories crate for platform-appropriate locations:
//! - Linux: `~/.config/scenario-runner/`, `~/.local/share/scenario-runner/`
//! - macOS: `~/Library/Application Support/scenario-runner/`
//! - Windows: `%APPDATA%\scenario-runner\`

use std::io;
use std::path::PathBuf;

/// Application name used for platform directories
const APP_NAME: &str = "scenario-runner";

/// Default directory scanned for scenario files when no path is given
pub const DEFAULT_SCENARIO_DIR: &str = "scenarios";

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", APP_NAME)
}

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the path to the log directory
pub fn log_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().join("logs"))
}

/// Ensure a directory exists, creating parents as needed
pub fn ensure_dir(dir: &std::path::Path) -> io::Result<PathBuf> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
    }
    Ok(dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_is_toml() {
        if let Some(path) = config_path() {
            assert_eq!(path.file_name().unwrap(), "config.toml");
        }
    }

    #[test]
    fn test_ensure_dir_creates_nested() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        let created = ensure_dir(&nested).unwrap();
        assert!(created.is_dir());
    }
}
