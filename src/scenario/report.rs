//! Run results and their human and JSON renderings

use std::path::{Path, PathBuf};
use std::time::Duration;

use colored::Colorize;
use serde::{Serialize, Serializer};

use crate::common::{Error, FailureKind, Result};

use super::config::Scenario;

/// Which part of a scenario a step belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Setup,
    Steps,
}

/// One executed step
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    /// 1-based position across setup and steps
    pub number: usize,
    pub phase: Phase,
    pub description: String,
    pub passed: bool,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// How a scenario ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed { kind: FailureKind, reason: String },
    Skipped { reason: String },
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Passed => "passed",
            Outcome::Failed { .. } => "failed",
            Outcome::Skipped { .. } => "skipped",
        }
    }
}

/// Result of one scenario
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    pub name: String,
    pub source: PathBuf,
    pub outcome: Outcome,
    pub duration: Duration,
    /// Steps that ran, the failing one last
    pub steps: Vec<StepRecord>,
    pub steps_total: usize,
    /// Screenshot captured at the failure, if any
    pub screenshot: Option<PathBuf>,
}

impl ScenarioResult {
    pub fn skipped(scenario: &Scenario, reason: impl Into<String>) -> Self {
        Self {
            name: scenario.name.clone(),
            source: scenario.source.clone(),
            outcome: Outcome::Skipped {
                reason: reason.into(),
            },
            duration: Duration::ZERO,
            steps: Vec::new(),
            steps_total: scenario.steps_total(),
            screenshot: None,
        }
    }

    /// Build a result from the scenario's final status
    pub fn finished(
        scenario: &Scenario,
        status: std::result::Result<(), &Error>,
        steps: Vec<StepRecord>,
        duration: Duration,
        screenshot: Option<PathBuf>,
    ) -> Self {
        let outcome = match status {
            Ok(()) => Outcome::Passed,
            Err(e) => Outcome::Failed {
                kind: e.kind(),
                reason: e.to_string(),
            },
        };
        Self {
            name: scenario.name.clone(),
            source: scenario.source.clone(),
            outcome,
            duration,
            steps,
            steps_total: scenario.steps_total(),
            screenshot,
        }
    }

    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Passed
    }

    pub fn failed(&self) -> bool {
        matches!(self.outcome, Outcome::Failed { .. })
    }

    pub fn steps_run(&self) -> usize {
        self.steps.len()
    }

    /// The step that failed, if any
    pub fn failed_step(&self) -> Option<&StepRecord> {
        self.steps.iter().find(|s| !s.passed)
    }
}

/// Totals by outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Results of a whole run, in input order
#[derive(Debug, Clone)]
pub struct RunReport {
    pub results: Vec<ScenarioResult>,
    pub duration: Duration,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    summary: Summary,
    #[serde(serialize_with = "as_millis")]
    duration_ms: Duration,
    results: Vec<JsonEntry<'a>>,
}

#[derive(Serialize)]
struct JsonEntry<'a> {
    name: &'a str,
    source: &'a Path,
    outcome: &'static str,
    #[serde(serialize_with = "as_millis")]
    duration_ms: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<FailureKind>,
    reason: Option<&'a str>,
    steps_run: usize,
    steps_total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    screenshot: Option<&'a Path>,
    steps: &'a [StepRecord],
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

impl RunReport {
    pub fn new(results: Vec<ScenarioResult>, duration: Duration) -> Self {
        Self { results, duration }
    }

    /// True when no scenario failed
    pub fn success(&self) -> bool {
        !self.results.iter().any(ScenarioResult::failed)
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for result in &self.results {
            match result.outcome {
                Outcome::Passed => summary.passed += 1,
                Outcome::Failed { .. } => summary.failed += 1,
                Outcome::Skipped { .. } => summary.skipped += 1,
            }
        }
        summary
    }

    /// Machine-readable report
    pub fn to_json(&self) -> Result<String> {
        let results = self
            .results
            .iter()
            .map(|r| {
                let (kind, reason) = match &r.outcome {
                    Outcome::Passed => (None, None),
                    Outcome::Failed { kind, reason } => (Some(*kind), Some(reason.as_str())),
                    Outcome::Skipped { reason } => (None, Some(reason.as_str())),
                };
                JsonEntry {
                    name: &r.name,
                    source: &r.source,
                    outcome: r.outcome.as_str(),
                    duration_ms: r.duration,
                    kind,
                    reason,
                    steps_run: r.steps_run(),
                    steps_total: r.steps_total,
                    screenshot: r.screenshot.as_deref(),
                    steps: &r.steps,
                }
            })
            .collect();

        let report = JsonReport {
            summary: self.summary(),
            duration_ms: self.duration,
            results,
        };
        Ok(serde_json::to_string_pretty(&report)?)
    }

    /// Print results to stdout
    ///
    /// Step lines are shown for failed scenarios, and for every scenario
    /// when `verbose` is set.
    pub fn print(&self, verbose: bool) {
        for result in &self.results {
            print_result(result, verbose);
        }

        let summary = self.summary();
        let passed = format!("{} passed", summary.passed);
        let failed = format!("{} failed", summary.failed);
        let skipped = format!("{} skipped", summary.skipped);
        println!(
            "\n{}, {}, {} {}",
            if summary.passed > 0 { passed.green().bold() } else { passed.normal() },
            if summary.failed > 0 { failed.red().bold() } else { failed.normal() },
            if summary.skipped > 0 { skipped.yellow() } else { skipped.normal() },
            format!("in {:.2}s", self.duration.as_secs_f64()).dimmed()
        );
    }
}

fn print_result(result: &ScenarioResult, verbose: bool) {
    let elapsed = format!("({:.2}s)", result.duration.as_secs_f64());
    match &result.outcome {
        Outcome::Passed => {
            println!("{} {} {}", "✓".green().bold(), result.name.white().bold(), elapsed.dimmed());
        }
        Outcome::Failed { kind, reason } => {
            println!("{} {} {}", "✗".red().bold(), result.name.white().bold(), elapsed.dimmed());
            println!("    {}: {}", kind.to_string().red(), reason);
        }
        Outcome::Skipped { reason } => {
            println!("{} {} {}", "○".yellow(), result.name.white().bold(), "skipped".yellow());
            println!("    {}", reason.dimmed());
            return;
        }
    }

    if verbose || result.failed() {
        for step in &result.steps {
            if step.passed {
                println!("    {} Step {}: {}", "✓".green(), step.number, step.description);
            } else {
                println!("    {} Step {}: {}", "✗".red(), step.number, step.description.red());
            }
        }
        let remaining = result.steps_total.saturating_sub(result.steps_run());
        if result.failed() && remaining > 0 {
            println!("    {}", format!("{} step(s) not run", remaining).dimmed());
        }
    }

    if let Some(path) = &result.screenshot {
        println!("    {} {}", "Screenshot:".dimmed(), path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, outcome: Outcome) -> ScenarioResult {
        ScenarioResult {
            name: name.to_string(),
            source: PathBuf::from("scenarios/test.yaml"),
            outcome,
            duration: Duration::from_millis(1500),
            steps: vec![StepRecord {
                number: 1,
                phase: Phase::Steps,
                description: "navigate /".to_string(),
                passed: true,
                duration: Duration::from_millis(250),
                error: None,
            }],
            steps_total: 3,
            screenshot: None,
        }
    }

    #[test]
    fn test_success_ignores_skipped() {
        let report = RunReport::new(
            vec![
                result("a", Outcome::Passed),
                result("b", Outcome::Skipped { reason: "later".into() }),
            ],
            Duration::from_secs(2),
        );
        assert!(report.success());
        assert_eq!(
            report.summary(),
            Summary {
                passed: 1,
                failed: 0,
                skipped: 1
            }
        );
    }

    #[test]
    fn test_any_failure_fails_run() {
        let report = RunReport::new(
            vec![
                result("a", Outcome::Passed),
                result(
                    "b",
                    Outcome::Failed {
                        kind: FailureKind::Assertion,
                        reason: "Expected title \"x\", but title was \"y\"".into(),
                    },
                ),
            ],
            Duration::from_secs(2),
        );
        assert!(!report.success());
        assert_eq!(report.summary().failed, 1);
    }

    #[test]
    fn test_json_shape() {
        let report = RunReport::new(
            vec![result(
                "b",
                Outcome::Failed {
                    kind: FailureKind::ElementNotFound,
                    reason: "No element matched #x within 5000ms".into(),
                },
            )],
            Duration::from_millis(1600),
        );
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert_eq!(json["failed"], 1);
        assert_eq!(json["duration_ms"], 1600);
        let entry = &json["results"][0];
        assert_eq!(entry["name"], "b");
        assert_eq!(entry["outcome"], "failed");
        assert_eq!(entry["kind"], "element_not_found");
        assert_eq!(entry["steps_run"], 1);
        assert_eq!(entry["steps_total"], 3);
        assert_eq!(entry["duration_ms"], 1500);
        assert_eq!(entry["steps"][0]["duration_ms"], 250);
        assert!(entry.get("screenshot").is_none());
    }

    #[test]
    fn test_passed_entry_has_null_reason() {
        let report = RunReport::new(vec![result("a", Outcome::Passed)], Duration::from_millis(10));
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        let entry = &json["results"][0];
        assert_eq!(entry["outcome"], "passed");
        let reason = entry.get("reason").expect("reason key is always written");
        assert!(reason.is_null());
        assert!(entry.get("kind").is_none());
    }
}
