//! Error types for the scenario runner
//!
//! Scenario-level errors (navigation, element lookup, interaction, assertion)
//! end a single scenario and land in the report. Configuration errors abort
//! the whole run before any scenario starts.

use std::io;

use serde::Serialize;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the scenario runner
#[derive(Error, Debug)]
pub enum Error {
    // === Scenario Errors ===
    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("No element matched {selector} within {timeout_ms}ms")]
    ElementNotFound { selector: String, timeout_ms: u64 },

    #[error("Cannot {action} {target}: {reason}")]
    Interaction {
        action: String,
        target: String,
        reason: String,
    },

    #[error("Expected {expectation}, but {actual}")]
    AssertionFailure { expectation: String, actual: String },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Invalid scenario file '{path}': {error}")]
    ScenarioParse { path: String, error: String },

    #[error("No scenario named '{0}'. Use 'scenario-runner list' to see available scenarios")]
    UnknownScenario(String),

    #[error("Base URL {url} is unreachable: {reason}")]
    BaseUrlUnreachable { url: String, reason: String },

    // === WebDriver Errors ===
    #[error("WebDriver server at {0} refused the connection")]
    DriverNotRunning(String),

    #[error("No WebDriver server answering at {0}. Start chromedriver/geckodriver or set [driver] path in the config")]
    DriverUnavailable(String),

    #[error("WebDriver server did not become ready within {0} seconds")]
    DriverSpawnTimeout(u64),

    #[error("Failed to start WebDriver server: {0}")]
    DriverStartFailed(String),

    #[error("WebDriver error '{error}': {message}")]
    WebDriver { error: String, message: String },

    #[error("WebDriver communication error: {0}")]
    DriverCommunication(String),

    #[error("Failed to create browser session: {0}")]
    SessionFailed(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure category recorded in the run report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Navigation,
    ElementNotFound,
    Interaction,
    Assertion,
    Configuration,
    Browser,
    Internal,
}

impl Error {
    /// Create a navigation error
    pub fn navigation(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Navigation {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create an interaction error
    pub fn interaction(
        action: impl Into<String>,
        target: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Interaction {
            action: action.into(),
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Create an assertion failure
    pub fn assertion(expectation: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::AssertionFailure {
            expectation: expectation.into(),
            actual: actual.into(),
        }
    }

    /// Create a scenario file parse error
    pub fn scenario_parse(path: &std::path::Path, error: impl ToString) -> Self {
        Self::ScenarioParse {
            path: path.display().to_string(),
            error: error.to_string(),
        }
    }

    /// Classify this error for the report
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::Navigation { .. } => FailureKind::Navigation,
            Error::ElementNotFound { .. } => FailureKind::ElementNotFound,
            Error::Interaction { .. } => FailureKind::Interaction,
            Error::AssertionFailure { .. } => FailureKind::Assertion,
            Error::Config(_)
            | Error::ConfigParse(_)
            | Error::ScenarioParse { .. }
            | Error::UnknownScenario(_)
            | Error::FileRead { .. }
            | Error::BaseUrlUnreachable { .. }
            | Error::DriverUnavailable(_)
            | Error::DriverSpawnTimeout(_)
            | Error::DriverStartFailed(_) => FailureKind::Configuration,
            Error::DriverNotRunning(_)
            | Error::WebDriver { .. }
            | Error::DriverCommunication(_)
            | Error::SessionFailed(_) => FailureKind::Browser,
            Error::Io(_) | Error::Json(_) | Error::Internal(_) => FailureKind::Internal,
        }
    }

    /// Whether this error must abort the run before any scenario starts
    pub fn is_configuration(&self) -> bool {
        self.kind() == FailureKind::Configuration
    }

    /// Whether an act should keep polling after this error
    ///
    /// The element exists but the browser refused the interaction for now
    /// (covered by an overlay, detached by a re-render, still animating).
    pub fn is_transient_interaction(&self) -> bool {
        match self {
            Error::Interaction { .. } => true,
            Error::WebDriver { error, .. } => matches!(
                error.as_str(),
                "element not interactable"
                    | "element click intercepted"
                    | "stale element reference"
                    | "invalid element state"
                    | "no such element"
            ),
            _ => false,
        }
    }
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Navigation => "NavigationError",
            FailureKind::ElementNotFound => "ElementNotFoundError",
            FailureKind::Interaction => "InteractionError",
            FailureKind::Assertion => "AssertionFailure",
            FailureKind::Configuration => "ConfigurationError",
            FailureKind::Browser => "BrowserError",
            FailureKind::Internal => "InternalError",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_errors_are_not_configuration() {
        assert!(!Error::navigation("https://example.com", "timed out").is_configuration());
        assert!(!Error::assertion("visible", "hidden").is_configuration());
        assert!(Error::UnknownScenario("TC999".into()).is_configuration());
        assert!(Error::BaseUrlUnreachable {
            url: "http://127.0.0.1:9".into(),
            reason: "connection refused".into(),
        }
        .is_configuration());
    }

    #[test]
    fn test_transient_webdriver_errors() {
        let intercepted = Error::WebDriver {
            error: "element click intercepted".into(),
            message: "Other element would receive the click".into(),
        };
        assert!(intercepted.is_transient_interaction());

        let session = Error::WebDriver {
            error: "invalid session id".into(),
            message: "session deleted".into(),
        };
        assert!(!session.is_transient_interaction());
        assert_eq!(session.kind(), FailureKind::Browser);
    }

    #[test]
    fn test_driver_startup_errors_are_configuration() {
        assert!(Error::DriverUnavailable("http://127.0.0.1:9/".into()).is_configuration());
        assert!(Error::DriverStartFailed("/nonexistent/chromedriver: not found".into())
            .is_configuration());
        assert!(Error::DriverSpawnTimeout(10).is_configuration());

        // A server that goes away mid-run fails the scenario, not the run
        let lost = Error::DriverNotRunning("http://127.0.0.1:9515/".into());
        assert_eq!(lost.kind(), FailureKind::Browser);
    }

    #[test]
    fn test_failure_kind_names() {
        assert_eq!(FailureKind::ElementNotFound.to_string(), "ElementNotFoundError");
        assert_eq!(
            serde_json::to_value(FailureKind::ElementNotFound).unwrap(),
            serde_json::json!("element_not_found")
        );
    }
}
