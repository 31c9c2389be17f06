//! Scenario file types
//!
//! Defines the data structures for deserializing YAML scenario files. A file
//! holds either one scenario or a suite of scenarios sharing a base URL,
//! tags and setup steps.

use std::fmt;
use std::path::PathBuf;

use reqwest::Url;
use serde::Deserialize;

use crate::browser::{Selector, TextMatch};

/// A single scenario as written in a YAML file
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct ScenarioDef {
    /// Name of the scenario, unique within a run
    pub name: String,
    /// Optional description of what the scenario verifies
    pub description: Option<String>,
    /// Tags used for selection
    #[serde(default)]
    pub tags: Vec<String>,
    /// Base URL for relative navigation (overrides the suite's)
    pub base_url: Option<String>,
    /// Skip unconditionally, with the given reason
    pub skip: Option<String>,
    /// Named preconditions; the scenario is skipped unless all are satisfied
    #[serde(default)]
    pub requires: Vec<String>,
    /// Steps run before `steps`, after the suite's setup
    #[serde(default)]
    pub setup: Vec<Step>,
    /// The sequence of steps to execute
    pub steps: Vec<Step>,
}

/// A group of scenarios sharing configuration
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct SuiteFile {
    /// Name of the suite
    pub suite: String,
    pub description: Option<String>,
    /// Base URL for every scenario in the suite
    pub base_url: Option<String>,
    /// Tags added to every scenario in the suite
    #[serde(default)]
    pub tags: Vec<String>,
    /// Steps prepended to every scenario's setup
    #[serde(default)]
    pub setup: Vec<Step>,
    pub scenarios: Vec<ScenarioDef>,
}

/// A single step in a scenario
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "action", rename_all = "snake_case", deny_unknown_fields)]
pub enum Step {
    /// Load a URL, absolute or relative to the base URL
    Navigate {
        url: String,
        /// Overrides the navigation timeout
        timeout_ms: Option<u64>,
    },
    /// Name a selector for later steps
    Locate {
        #[serde(rename = "as")]
        alias: String,
        target: Selector,
    },
    /// Interact with an element
    Act {
        interaction: InteractionKind,
        target: Target,
        /// Text for fill, option for select, key for press
        value: Option<String>,
        /// Overrides the step timeout
        timeout_ms: Option<u64>,
    },
    /// Poll a condition until it holds or the timeout elapses
    Assert {
        condition: Condition,
        target: Option<Target>,
        /// Expected text for value/text/attribute/title/url
        expected: Option<TextMatch>,
        /// Attribute name for the attribute condition
        attribute: Option<String>,
        /// Expected number of matches for the count condition
        count: Option<usize>,
        /// Overrides the step timeout
        timeout_ms: Option<u64>,
    },
}

/// Element a step works on: an alias from a `locate` step or an inline selector
#[derive(Deserialize, Debug, Clone)]
#[serde(try_from = "RawTarget")]
pub enum Target {
    Alias(String),
    Inline(Selector),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTarget {
    Alias(String),
    Inline(serde_yaml::Mapping),
}

impl TryFrom<RawTarget> for Target {
    type Error = String;

    fn try_from(raw: RawTarget) -> Result<Self, Self::Error> {
        match raw {
            RawTarget::Alias(alias) => Ok(Target::Alias(alias)),
            // Re-parse the map on its own so selector errors keep their message
            RawTarget::Inline(map) => serde_yaml::from_value(serde_yaml::Value::Mapping(map))
                .map(Target::Inline)
                .map_err(|e| format!("invalid selector: {}", e)),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Alias(alias) => f.write_str(alias),
            Target::Inline(selector) => write!(f, "{}", selector),
        }
    }
}

/// Interactions available to `act` steps
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Click,
    Fill,
    Clear,
    Check,
    Uncheck,
    Select,
    Press,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::Click => "click",
            InteractionKind::Fill => "fill",
            InteractionKind::Clear => "clear",
            InteractionKind::Check => "check",
            InteractionKind::Uncheck => "uncheck",
            InteractionKind::Select => "select",
            InteractionKind::Press => "press",
        }
    }

    /// Whether the step must carry a `value`
    pub fn needs_value(&self) -> bool {
        matches!(
            self,
            InteractionKind::Fill | InteractionKind::Select | InteractionKind::Press
        )
    }
}

/// Conditions available to `assert` steps
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Visible,
    Hidden,
    Enabled,
    Disabled,
    Checked,
    Unchecked,
    Editable,
    Value,
    Text,
    Attribute,
    Count,
    Title,
    Url,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Visible => "visible",
            Condition::Hidden => "hidden",
            Condition::Enabled => "enabled",
            Condition::Disabled => "disabled",
            Condition::Checked => "checked",
            Condition::Unchecked => "unchecked",
            Condition::Editable => "editable",
            Condition::Value => "value",
            Condition::Text => "text",
            Condition::Attribute => "attribute",
            Condition::Count => "count",
            Condition::Title => "title",
            Condition::Url => "url",
        }
    }

    /// Page-level conditions take no target; all others need one
    pub fn needs_target(&self) -> bool {
        !matches!(self, Condition::Title | Condition::Url)
    }

    pub fn needs_expected(&self) -> bool {
        matches!(
            self,
            Condition::Value
                | Condition::Text
                | Condition::Attribute
                | Condition::Title
                | Condition::Url
        )
    }
}

impl Step {
    /// One-line description used in step records
    pub fn describe(&self) -> String {
        match self {
            Step::Navigate { url, .. } => format!("navigate {}", url),
            Step::Locate { alias, target } => format!("locate {} = {}", alias, target),
            Step::Act {
                interaction,
                target,
                value,
                ..
            } => match (interaction, value) {
                (InteractionKind::Fill, Some(v)) => format!("fill {} with {:?}", target, v),
                (InteractionKind::Select, Some(v)) => format!("select {:?} in {}", v, target),
                (InteractionKind::Press, Some(v)) => format!("press {} on {}", v, target),
                (kind, _) => format!("{} {}", kind.as_str(), target),
            },
            Step::Assert {
                condition,
                target,
                expected,
                attribute,
                count,
                ..
            } => {
                let mut s = String::from("assert ");
                if let Some(target) = target {
                    s.push_str(&format!("{} ", target));
                }
                s.push_str(condition.as_str());
                if let Some(attribute) = attribute {
                    s.push_str(&format!(" {}", attribute));
                }
                if let Some(expected) = expected {
                    s.push_str(&format!(" {}", expected));
                }
                if let Some(count) = count {
                    s.push_str(&format!(" {}", count));
                }
                s
            }
        }
    }
}

/// A scenario ready to run: suite settings merged in, validated
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub base_url: Option<Url>,
    pub skip: Option<String>,
    pub requires: Vec<String>,
    pub setup: Vec<Step>,
    pub steps: Vec<Step>,
    /// File the scenario was loaded from
    pub source: PathBuf,
}

impl Scenario {
    pub fn steps_total(&self) -> usize {
        self.setup.len() + self.steps.len()
    }

    /// Every navigate URL in setup and steps
    pub fn navigation_urls(&self) -> impl Iterator<Item = &str> {
        self.setup
            .iter()
            .chain(self.steps.iter())
            .filter_map(|step| match step {
                Step::Navigate { url, .. } => Some(url.as_str()),
                _ => None,
            })
    }
}
