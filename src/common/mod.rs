//! Common utilities shared by the CLI, the runner and the browser binding

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, FailureKind, Result};

/// Collapse runs of whitespace and trim, the way rendered text reads
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Shorten long observed values for error messages
pub fn truncate_for_display(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let head: String = s.chars().take(max_chars).collect();
        format!("{}...", head)
    } else {
        s.to_string()
    }
}
