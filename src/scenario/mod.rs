//! Declarative browser scenarios
//!
//! Scenarios are YAML files of navigate/locate/act/assert steps, loaded by
//! [`load_paths`] and executed against a [`crate::browser::Browser`] by
//! [`run_all`].

pub mod config;
pub mod loader;
pub mod report;
pub mod runner;

pub use config::{Condition, InteractionKind, Scenario, Step, Target};
pub use loader::{load_paths, parse_scenarios, select, Selection};
pub use report::{Outcome, Phase, RunReport, ScenarioResult, StepRecord, Summary};
pub use runner::{run_all, run_scenario, RunSettings};
