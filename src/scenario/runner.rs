//! Scenario execution
//!
//! Each scenario runs in its own browser context. Steps run in order and the
//! first failing step ends the scenario; whatever happens, the context is
//! closed before the result is reported. Element lookups, interactions and
//! assertions poll until they succeed or their timeout elapses.

use std::collections::{BTreeSet, HashMap};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::PathBuf;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use reqwest::Url;
use tokio::time::Instant;

use crate::browser::{self, Browser, ElementSnapshot, Interaction, Page, Resolution, Selector, TextMatch};
use crate::common::config::{Config, Timeouts};
use crate::common::{normalize_whitespace, paths, truncate_for_display, Error, Result};

use super::config::{Condition, InteractionKind, Scenario, Step, Target};
use super::report::{Phase, RunReport, ScenarioResult, StepRecord};

/// Longest observed value quoted in a failure message
const MAX_OBSERVED_CHARS: usize = 120;

/// Settings shared by every scenario of a run
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Overrides every scenario's base URL
    pub base_url: Option<Url>,
    pub navigation_timeout: Duration,
    pub step_timeout: Duration,
    pub poll_interval: Duration,
    /// Scenarios running at once
    pub jobs: usize,
    /// Preconditions satisfied for this run
    pub preconditions: BTreeSet<String>,
    /// Where failure screenshots go; none are taken when unset
    pub artifacts_dir: Option<PathBuf>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::from_timeouts(&Timeouts::default())
    }
}

impl RunSettings {
    fn from_timeouts(timeouts: &Timeouts) -> Self {
        Self {
            base_url: None,
            navigation_timeout: timeouts.navigation(),
            step_timeout: timeouts.step(),
            poll_interval: timeouts.poll_interval(),
            jobs: 1,
            preconditions: BTreeSet::new(),
            artifacts_dir: None,
        }
    }

    /// Settings from the configuration file; the CLI layers flags on top
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut settings = Self::from_timeouts(&config.timeouts);
        settings.base_url = config
            .run
            .base_url
            .as_deref()
            .map(|url| {
                Url::parse(url)
                    .map_err(|e| Error::Config(format!("Invalid base URL '{}': {}", url, e)))
            })
            .transpose()?;
        settings.jobs = config.run.jobs.max(1);
        settings.preconditions = config.run.preconditions.iter().cloned().collect();
        settings.artifacts_dir = config.run.artifacts_dir.clone();
        Ok(settings)
    }

    /// Base URL in effect for a scenario
    pub fn base_url_for<'a>(&'a self, scenario: &'a Scenario) -> Option<&'a Url> {
        self.base_url.as_ref().or(scenario.base_url.as_ref())
    }

    /// Resolve a navigate URL against the scenario's base URL
    pub fn resolve_url(&self, scenario: &Scenario, url: &str) -> Result<Url> {
        if let Ok(absolute) = Url::parse(url) {
            return Ok(absolute);
        }
        match self.base_url_for(scenario) {
            Some(base) => base.join(url).map_err(|e| {
                Error::Config(format!("Cannot resolve '{}' against {}: {}", url, base, e))
            }),
            None => Err(Error::Config(format!(
                "Scenario '{}' navigates to relative URL '{}' but has no base URL",
                scenario.name, url
            ))),
        }
    }

    /// Check every navigate URL of every scenario resolves
    ///
    /// Runs before any scenario starts so a missing base URL is reported
    /// once as a configuration error rather than as one failure per scenario.
    pub fn check_urls(&self, scenarios: &[Scenario]) -> Result<()> {
        for scenario in scenarios {
            for url in scenario.navigation_urls() {
                self.resolve_url(scenario, url)?;
            }
        }
        Ok(())
    }

    fn skip_reason(&self, scenario: &Scenario) -> Option<String> {
        if let Some(reason) = &scenario.skip {
            return Some(reason.clone());
        }
        let unmet: Vec<&str> = scenario
            .requires
            .iter()
            .filter(|r| !self.preconditions.contains(*r))
            .map(String::as_str)
            .collect();
        if unmet.is_empty() {
            None
        } else {
            Some(format!("unmet precondition: {}", unmet.join(", ")))
        }
    }
}

/// Run scenarios, at most `settings.jobs` at a time
///
/// Results come back in input order regardless of completion order.
pub async fn run_all(
    browser: &dyn Browser,
    scenarios: &[Scenario],
    settings: &RunSettings,
) -> RunReport {
    let start = Instant::now();
    tracing::info!(
        "Running {} scenario(s) with {} job(s)",
        scenarios.len(),
        settings.jobs.max(1)
    );

    let results: Vec<ScenarioResult> = stream::iter(scenarios)
        .map(|scenario| run_scenario(browser, scenario, settings))
        .buffered(settings.jobs.max(1))
        .collect()
        .await;

    RunReport::new(results, start.elapsed())
}

/// Run one scenario in a fresh context
pub async fn run_scenario(
    browser: &dyn Browser,
    scenario: &Scenario,
    settings: &RunSettings,
) -> ScenarioResult {
    if let Some(reason) = settings.skip_reason(scenario) {
        tracing::info!("Skipping '{}': {}", scenario.name, reason);
        return ScenarioResult::skipped(scenario, reason);
    }

    let start = Instant::now();
    tracing::info!("Starting '{}'", scenario.name);

    let mut page = match browser.new_context().await {
        Ok(page) => page,
        Err(e) => {
            tracing::warn!("'{}' could not open a browser context: {}", scenario.name, e);
            return ScenarioResult::finished(scenario, Err(&e), Vec::new(), start.elapsed(), None);
        }
    };

    let mut execution = Execution::new(scenario, settings);
    let status = execution.run(page.as_mut()).await;

    let screenshot = match &status {
        Err(_) => capture_failure(page.as_mut(), scenario, settings).await,
        Ok(()) => None,
    };

    if let Err(e) = page.close().await {
        tracing::warn!("Failed to close context for '{}': {}", scenario.name, e);
    }

    match &status {
        Ok(()) => tracing::info!("'{}' passed", scenario.name),
        Err(e) => tracing::info!("'{}' failed: {}", scenario.name, e),
    }

    ScenarioResult::finished(
        scenario,
        status.as_ref().map(|_| ()),
        execution.records,
        start.elapsed(),
        screenshot,
    )
}

/// Save a screenshot of the page a scenario failed on
async fn capture_failure(
    page: &mut dyn Page,
    scenario: &Scenario,
    settings: &RunSettings,
) -> Option<PathBuf> {
    let dir = settings.artifacts_dir.as_ref()?;

    let png = match page.screenshot().await {
        Ok(png) if !png.is_empty() => png,
        Ok(_) => return None,
        Err(e) => {
            tracing::warn!("Screenshot for '{}' failed: {}", scenario.name, e);
            return None;
        }
    };

    let dir = match paths::ensure_dir(dir) {
        Ok(dir) => dir,
        Err(e) => {
            tracing::warn!("Cannot create artifacts directory {}: {}", dir.display(), e);
            return None;
        }
    };
    let path = dir.join(format!("{}.png", file_stem(&scenario.name)));
    match tokio::fs::write(&path, png).await {
        Ok(()) => Some(path),
        Err(e) => {
            tracing::warn!("Cannot write {}: {}", path.display(), e);
            None
        }
    }
}

/// File name for a scenario's artifacts
///
/// Names that lose characters get a hash of the full name appended, so
/// "a/b" and "a b" never share a screenshot.
fn file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let stem = stem.trim_matches('-');
    if stem == name {
        return stem.to_string();
    }

    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    let digest = hasher.finish() as u32;
    if stem.is_empty() {
        format!("scenario-{:08x}", digest)
    } else {
        format!("{}-{:08x}", stem, digest)
    }
}

/// Mutable state of one scenario while it runs
struct Execution<'a> {
    scenario: &'a Scenario,
    settings: &'a RunSettings,
    aliases: HashMap<String, Selector>,
    records: Vec<StepRecord>,
}

/// What an assertion saw on its last poll
enum Observation {
    NotFound,
    Ambiguous(usize),
    Mismatch(String),
}

impl<'a> Execution<'a> {
    fn new(scenario: &'a Scenario, settings: &'a RunSettings) -> Self {
        Self {
            scenario,
            settings,
            aliases: HashMap::new(),
            records: Vec::new(),
        }
    }

    async fn run(&mut self, page: &mut dyn Page) -> Result<()> {
        let scenario = self.scenario;
        let phases = [(Phase::Setup, &scenario.setup), (Phase::Steps, &scenario.steps)];
        for (phase, steps) in phases {
            for step in steps {
                let number = self.records.len() + 1;
                let started = Instant::now();
                tracing::debug!("'{}' step {}: {}", scenario.name, number, step.describe());

                let result = self.step(page, step).await;
                self.records.push(StepRecord {
                    number,
                    phase,
                    description: step.describe(),
                    passed: result.is_ok(),
                    duration: started.elapsed(),
                    error: result.as_ref().err().map(|e| e.to_string()),
                });
                result?;
            }
        }
        Ok(())
    }

    async fn step(&mut self, page: &mut dyn Page, step: &Step) -> Result<()> {
        match step {
            Step::Navigate { url, timeout_ms } => {
                let timeout = timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(self.settings.navigation_timeout);
                self.navigate(page, url, timeout).await
            }
            Step::Locate { alias, target } => {
                self.aliases.insert(alias.clone(), target.clone());
                Ok(())
            }
            Step::Act {
                interaction,
                target,
                value,
                timeout_ms,
            } => {
                let selector = self.selector(target)?;
                let timeout = self.step_timeout(*timeout_ms);
                self.act(page, &selector, *interaction, value.as_deref(), timeout)
                    .await
            }
            Step::Assert {
                condition,
                target,
                expected,
                attribute,
                count,
                timeout_ms,
            } => {
                let selector = target.as_ref().map(|t| self.selector(t)).transpose()?;
                let check = Check {
                    condition: *condition,
                    selector: selector.as_ref(),
                    expected: expected.as_ref(),
                    attribute: attribute.as_deref(),
                    count: *count,
                };
                let timeout = self.step_timeout(*timeout_ms);
                self.assert(page, &check, timeout).await
            }
        }
    }

    fn step_timeout(&self, timeout_ms: Option<u64>) -> Duration {
        timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.settings.step_timeout)
    }

    fn selector(&self, target: &Target) -> Result<Selector> {
        match target {
            Target::Inline(selector) => Ok(selector.clone()),
            Target::Alias(alias) => self.aliases.get(alias).cloned().ok_or_else(|| {
                Error::Config(format!("'{}' is not defined by an earlier locate step", alias))
            }),
        }
    }

    async fn navigate(&self, page: &mut dyn Page, url: &str, timeout: Duration) -> Result<()> {
        let url = self.settings.resolve_url(self.scenario, url)?;
        match tokio::time::timeout(timeout, page.goto(url.as_str())).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e @ Error::Navigation { .. })) => Err(e),
            Ok(Err(e)) if e.kind() == crate::common::FailureKind::Browser => {
                Err(Error::navigation(url.as_str(), e.to_string()))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::navigation(
                url.as_str(),
                format!("page did not load within {}ms", timeout.as_millis()),
            )),
        }
    }

    async fn act(
        &self,
        page: &mut dyn Page,
        selector: &Selector,
        kind: InteractionKind,
        value: Option<&str>,
        timeout: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;
        // Last reason the element could not be used; None while never found
        let mut problem: Option<String> = None;

        loop {
            let matches = match browser::query(page, selector).await {
                Ok(matches) => matches,
                Err(e) if e.is_transient_interaction() => Vec::new(),
                Err(e) => return Err(e),
            };

            match selector.resolve(matches) {
                Resolution::Found(element) => match plan(kind, value, &element) {
                    Err(reason) => problem = Some(reason),
                    Ok(None) => return Ok(()),
                    Ok(Some(interaction)) => {
                        match page.perform(selector, &element, &interaction).await {
                            Ok(()) if element.checked.is_some() => {
                                return self.confirm_checked(page, selector, kind, deadline).await;
                            }
                            Ok(()) => return Ok(()),
                            Err(e) if e.is_transient_interaction() => {
                                tracing::trace!("{} on {} not possible yet: {}", kind.as_str(), selector, e);
                                problem = Some(e.to_string());
                            }
                            Err(e) => return Err(e),
                        }
                    }
                },
                Resolution::Ambiguous(n) => {
                    problem = Some(format!("selector matched {} elements; use nth to pick one", n));
                }
                Resolution::Missing => {}
            }

            if !wait_for_next_poll(deadline, self.settings.poll_interval).await {
                break;
            }
        }

        Err(match problem {
            None => Error::ElementNotFound {
                selector: selector.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            },
            Some(reason) => Error::interaction(kind.as_str(), selector.to_string(), reason),
        })
    }

    /// Wait for a clicked checkbox or radio to reach the state asked for
    ///
    /// Reads the element at least once, then polls until `deadline`.
    async fn confirm_checked(
        &self,
        page: &mut dyn Page,
        selector: &Selector,
        kind: InteractionKind,
        deadline: Instant,
    ) -> Result<()> {
        let want = match kind {
            InteractionKind::Check => true,
            InteractionKind::Uncheck => false,
            _ => return Ok(()),
        };

        loop {
            let matches = match browser::query(page, selector).await {
                Ok(matches) => matches,
                Err(e) if e.is_transient_interaction() => return Ok(()),
                Err(e) => return Err(e),
            };
            match selector.resolve(matches) {
                Resolution::Found(element) if element.checked != Some(want) => {}
                // Gone or re-rendered after the click; nothing left to compare
                _ => return Ok(()),
            }

            if !wait_for_next_poll(deadline, self.settings.poll_interval).await {
                break;
            }
        }

        Err(Error::interaction(
            kind.as_str(),
            selector.to_string(),
            format!(
                "element is still {} after clicking it",
                if want { "unchecked" } else { "checked" }
            ),
        ))
    }

    async fn assert(&self, page: &mut dyn Page, check: &Check<'_>, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut last = Observation::NotFound;

        loop {
            match check.evaluate(page).await {
                Ok(None) => return Ok(()),
                Ok(Some(observation)) => last = observation,
                Err(e) if e.is_transient_interaction() => {}
                Err(e) => return Err(e),
            }

            if !wait_for_next_poll(deadline, self.settings.poll_interval).await {
                break;
            }
        }

        Err(match (last, check.selector) {
            (Observation::NotFound, Some(selector)) => Error::ElementNotFound {
                selector: selector.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            },
            (Observation::NotFound, None) => {
                Error::Internal(format!("{} assertion observed nothing", check.condition.as_str()))
            }
            (Observation::Ambiguous(n), _) => Error::assertion(
                check.expectation(),
                format!("the selector matched {} elements", n),
            ),
            (Observation::Mismatch(actual), _) => Error::assertion(check.expectation(), actual),
        })
    }
}

/// Sleep until the next poll; false once the deadline has passed
async fn wait_for_next_poll(deadline: Instant, interval: Duration) -> bool {
    let now = Instant::now();
    if now >= deadline {
        return false;
    }
    tokio::time::sleep(interval.min(deadline - now)).await;
    true
}

/// Decide what to do with a resolved element
///
/// `Ok(None)` means nothing needs doing (check on a checked box).
fn plan(
    kind: InteractionKind,
    value: Option<&str>,
    element: &ElementSnapshot,
) -> std::result::Result<Option<Interaction>, String> {
    if !element.visible {
        return Err("element is not visible".to_string());
    }
    if kind != InteractionKind::Press && !element.enabled {
        return Err("element is disabled".to_string());
    }

    let value = value.unwrap_or_default().to_string();
    match kind {
        InteractionKind::Click => Ok(Some(Interaction::Click)),
        InteractionKind::Fill | InteractionKind::Clear if !element.editable => {
            Err("element is not editable".to_string())
        }
        InteractionKind::Fill => Ok(Some(Interaction::Fill(value))),
        InteractionKind::Clear => Ok(Some(Interaction::Clear)),
        InteractionKind::Check | InteractionKind::Uncheck => {
            let want = kind == InteractionKind::Check;
            match element.checked {
                None => Err("element is not a checkbox or radio button".to_string()),
                Some(state) if state == want => Ok(None),
                Some(_) if !want && element.is_radio() => Err(
                    "a radio button cannot be unchecked; check another option in its group"
                        .to_string(),
                ),
                Some(_) => Ok(Some(Interaction::Click)),
            }
        }
        InteractionKind::Select if element.tag != "select" => {
            Err(format!("element is a <{}>, not a <select>", element.tag))
        }
        InteractionKind::Select => Ok(Some(Interaction::Select(value))),
        InteractionKind::Press => Ok(Some(Interaction::Press(value))),
    }
}

/// One assertion, ready to evaluate against a page
struct Check<'a> {
    condition: Condition,
    selector: Option<&'a Selector>,
    expected: Option<&'a TextMatch>,
    attribute: Option<&'a str>,
    count: Option<usize>,
}

impl Check<'_> {
    fn target(&self) -> String {
        self.selector
            .map(|s| s.to_string())
            .unwrap_or_else(|| "page".to_string())
    }

    fn expected(&self) -> String {
        self.expected
            .map(|e| e.to_string())
            .unwrap_or_else(|| "\"\"".to_string())
    }

    /// What the assertion expects, for failure messages
    fn expectation(&self) -> String {
        let target = self.target();
        match self.condition {
            Condition::Title => format!("title {}", self.expected()),
            Condition::Url => format!("URL {}", self.expected()),
            Condition::Value => format!("{} to have value {}", target, self.expected()),
            Condition::Text => format!("{} to have text {}", target, self.expected()),
            Condition::Attribute => format!(
                "{} to have attribute {} {}",
                target,
                self.attribute.unwrap_or_default(),
                self.expected()
            ),
            Condition::Count => format!("{} to match {} element(s)", target, self.count.unwrap_or(0)),
            other => format!("{} to be {}", target, other.as_str()),
        }
    }

    fn text_matches(&self, observed: &str, normalize: bool) -> bool {
        self.expected
            .is_some_and(|expected| expected.matches_whole(observed, normalize))
    }

    /// `Ok(None)` when the condition holds, otherwise what was seen instead
    async fn evaluate(&self, page: &mut dyn Page) -> Result<Option<Observation>> {
        let selector = match (self.condition, self.selector) {
            (Condition::Title, _) => {
                let title = page.title().await?;
                return Ok(self.mismatch_unless(
                    self.text_matches(&title, true),
                    || format!("title was {:?}", shorten(&title)),
                ));
            }
            (Condition::Url, _) => {
                let url = page.current_url().await?;
                return Ok(self.mismatch_unless(
                    self.text_matches(&url, false),
                    || format!("URL was {:?}", url),
                ));
            }
            (_, Some(selector)) => selector,
            (_, None) => {
                return Err(Error::Config(format!(
                    "{} assertion needs a target",
                    self.condition.as_str()
                )))
            }
        };

        let matches = browser::query(page, selector).await?;

        if self.condition == Condition::Count {
            let expected = self.count.unwrap_or(0);
            return Ok(self.mismatch_unless(matches.len() == expected, || {
                format!("{} element(s) matched", matches.len())
            }));
        }

        let element = match selector.resolve(matches) {
            Resolution::Found(element) => element,
            Resolution::Missing if self.condition == Condition::Hidden => return Ok(None),
            Resolution::Missing => return Ok(Some(Observation::NotFound)),
            Resolution::Ambiguous(n) => return Ok(Some(Observation::Ambiguous(n))),
        };

        let observation = match self.condition {
            Condition::Visible => self.mismatch_unless(element.visible, || "element is hidden".into()),
            Condition::Hidden => self.mismatch_unless(!element.visible, || "element is visible".into()),
            Condition::Enabled => self.mismatch_unless(element.enabled, || "element is disabled".into()),
            Condition::Disabled => self.mismatch_unless(!element.enabled, || "element is enabled".into()),
            Condition::Editable => {
                self.mismatch_unless(element.editable, || "element is not editable".into())
            }
            Condition::Checked | Condition::Unchecked => {
                let want = self.condition == Condition::Checked;
                match element.checked {
                    Some(state) => self.mismatch_unless(state == want, || {
                        let actual = if state { "element is checked" } else { "element is not checked" };
                        actual.to_string()
                    }),
                    None => Some(Observation::Mismatch(
                        "element is not a checkbox or radio button".into(),
                    )),
                }
            }
            Condition::Value => {
                let value = element.value.clone().unwrap_or_default();
                self.mismatch_unless(self.text_matches(&value, false), || {
                    format!("value was {:?}", shorten(&value))
                })
            }
            Condition::Text => {
                let text = normalize_whitespace(&element.text);
                self.mismatch_unless(self.text_matches(&text, true), || {
                    format!("text was {:?}", shorten(&text))
                })
            }
            Condition::Attribute => {
                let name = self.attribute.unwrap_or_default();
                match element.attributes.get(name) {
                    Some(value) => self.mismatch_unless(self.text_matches(value, false), || {
                        format!("{} was {:?}", name, shorten(value))
                    }),
                    None => Some(Observation::Mismatch(format!(
                        "element has no {} attribute",
                        name
                    ))),
                }
            }
            Condition::Count | Condition::Title | Condition::Url => None,
        };
        Ok(observation)
    }

    fn mismatch_unless(&self, holds: bool, actual: impl FnOnce() -> String) -> Option<Observation> {
        if holds {
            None
        } else {
            Some(Observation::Mismatch(actual()))
        }
    }
}

fn shorten(s: &str) -> String {
    truncate_for_display(s, MAX_OBSERVED_CHARS)
}
