//! scenario-runner - declarative browser scenarios over WebDriver
//!
//! Scenarios are YAML files of navigate/locate/act/assert steps. The
//! [`scenario`] module loads and runs them against anything implementing
//! [`browser::Browser`]; [`webdriver`] provides the implementation for real
//! browsers.

pub mod browser;
pub mod cli;
pub mod commands;
pub mod common;
pub mod scenario;
pub mod webdriver;

// Re-export commonly used types for tests
pub use common::{Error, FailureKind, Result};
