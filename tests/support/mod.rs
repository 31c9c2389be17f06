//! In-memory browser for runner tests
//!
//! A [`FakeSite`] maps URLs to pages of [`FakeNode`]s. Every context gets its
//! own copy of the page it navigates to, so state never leaks between
//! scenarios. Time-dependent behavior (elements appearing or enabling late)
//! uses tokio's clock, so tests run under `start_paused`.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use scenario_runner::browser::{Browser, By, ElementSnapshot, Interaction, Page, Selector};
use scenario_runner::scenario::{parse_scenarios, Scenario};
use scenario_runner::{Error, Result};

/// Something that happens when an element is clicked
#[derive(Debug, Clone)]
pub enum Effect {
    Reveal(&'static str),
    Hide(&'static str),
    /// Clear another option of the same radio group
    Uncheck(&'static str),
    Navigate(&'static str),
    /// Show `message` exactly when `field` is empty
    Require {
        field: &'static str,
        message: &'static str,
    },
}

#[derive(Debug, Clone)]
pub struct FakeNode {
    pub handle: &'static str,
    pub tag: &'static str,
    pub role: Option<&'static str>,
    pub dom_id: Option<&'static str>,
    pub name: String,
    pub text: String,
    pub parent: Option<&'static str>,
    /// CSS of the iframe holding the node
    pub frame: Option<&'static str>,
    pub visible: bool,
    pub enabled: bool,
    pub checked: Option<bool>,
    pub value: Option<String>,
    pub options: Vec<&'static str>,
    pub attributes: BTreeMap<String, String>,
    /// Becomes visible this long after the page loads
    pub appears_after: Option<Duration>,
    /// Becomes enabled this long after the page loads
    pub enabled_after: Option<Duration>,
    /// Disabled while any of these nodes has an empty value
    pub requires_filled: Vec<&'static str>,
    /// Clicks never change `checked` (a script swallows them)
    pub frozen: bool,
    pub on_click: Vec<Effect>,
}

impl FakeNode {
    pub fn new(handle: &'static str, tag: &'static str) -> Self {
        Self {
            handle,
            tag,
            role: None,
            dom_id: None,
            name: String::new(),
            text: String::new(),
            parent: None,
            frame: None,
            visible: true,
            enabled: true,
            checked: None,
            value: None,
            options: Vec::new(),
            attributes: BTreeMap::new(),
            appears_after: None,
            enabled_after: None,
            requires_filled: Vec::new(),
            frozen: false,
            on_click: Vec::new(),
        }
    }

    pub fn button(handle: &'static str, label: &str) -> Self {
        let mut node = Self::new(handle, "button").role("button").text(label);
        node.name = label.to_string();
        node
    }

    pub fn textbox(handle: &'static str, dom_id: &'static str, label: &str) -> Self {
        let mut node = Self::new(handle, "input").role("textbox").id(dom_id);
        node.name = label.to_string();
        node.value = Some(String::new());
        node
    }

    pub fn checkbox(handle: &'static str, label: &str) -> Self {
        let mut node = Self::new(handle, "input").role("checkbox");
        node.name = label.to_string();
        node.checked = Some(false);
        node.attributes.insert("type".into(), "checkbox".into());
        node
    }

    pub fn radio(handle: &'static str, label: &str) -> Self {
        let mut node = Self::new(handle, "input").role("radio");
        node.name = label.to_string();
        node.checked = Some(false);
        node.attributes.insert("type".into(), "radio".into());
        node
    }

    pub fn text_node(handle: &'static str, tag: &'static str, text: &str) -> Self {
        Self::new(handle, tag).text(text)
    }

    pub fn role(mut self, role: &'static str) -> Self {
        self.role = Some(role);
        self
    }

    pub fn id(mut self, id: &'static str) -> Self {
        self.dom_id = Some(id);
        self.attributes.insert("id".into(), id.into());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn child_of(mut self, parent: &'static str) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn in_frame(mut self, frame: &'static str) -> Self {
        self.frame = Some(frame);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn checked(mut self) -> Self {
        self.checked = Some(true);
        self
    }

    pub fn frozen(mut self) -> Self {
        self.frozen = true;
        self
    }

    pub fn enabled_when_filled(mut self, fields: &[&'static str]) -> Self {
        self.requires_filled = fields.to_vec();
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn options(mut self, options: &[&'static str]) -> Self {
        self.options = options.to_vec();
        self.value = options.first().map(|o| o.to_string());
        self
    }

    pub fn appears_after(mut self, delay: Duration) -> Self {
        self.appears_after = Some(delay);
        self
    }

    pub fn enabled_after(mut self, delay: Duration) -> Self {
        self.enabled_after = Some(delay);
        self
    }

    pub fn on_click(mut self, effect: Effect) -> Self {
        self.on_click.push(effect);
        self
    }

    fn snapshot(&self, loaded_at: Instant, parent: Option<usize>) -> ElementSnapshot {
        let since_load = Instant::now() - loaded_at;
        let visible = self.visible && self.appears_after.map_or(true, |d| since_load >= d);
        let enabled = self.enabled && self.enabled_after.map_or(true, |d| since_load >= d);
        let text_entry = matches!(self.tag, "input" | "textarea") && self.checked.is_none();
        ElementSnapshot {
            handle: Some(self.handle.to_string()),
            parent,
            tag: self.tag.to_string(),
            name: self.name.clone(),
            text: self.text.clone(),
            visible,
            enabled,
            editable: enabled && text_entry,
            checked: self.checked,
            value: self.value.clone(),
            attributes: self.attributes.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub title: String,
    pub nodes: Vec<FakeNode>,
}

impl FakePage {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            nodes: Vec::new(),
        }
    }

    pub fn with(mut self, node: FakeNode) -> Self {
        self.nodes.push(node);
        self
    }
}

/// Pages by URL plus URLs that fail or hang on navigation
#[derive(Debug, Clone, Default)]
pub struct FakeSite {
    pub pages: HashMap<String, FakePage>,
    pub broken: HashSet<String>,
    pub hanging: HashSet<String>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, page: FakePage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    pub fn broken(mut self, url: &str) -> Self {
        self.broken.insert(url.to_string());
        self
    }

    pub fn hanging(mut self, url: &str) -> Self {
        self.hanging.insert(url.to_string());
        self
    }
}

/// Counters shared by every context of one browser
#[derive(Debug, Default)]
pub struct Stats {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub navigations: Mutex<Vec<String>>,
    pub performed: Mutex<Vec<(String, String)>>,
}

impl Stats {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn performed(&self) -> Vec<(String, String)> {
        self.performed.lock().unwrap().clone()
    }
}

pub struct FakeBrowser {
    site: Arc<FakeSite>,
    pub stats: Arc<Stats>,
    /// Bytes returned by screenshots
    pub screenshot: Vec<u8>,
}

impl FakeBrowser {
    pub fn new(site: FakeSite) -> Self {
        Self {
            site: Arc::new(site),
            stats: Arc::new(Stats::default()),
            screenshot: Vec::new(),
        }
    }

    pub fn with_screenshot(mut self, png: &[u8]) -> Self {
        self.screenshot = png.to_vec();
        self
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn new_context(&self) -> Result<Box<dyn Page>> {
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeContext {
            site: Arc::clone(&self.site),
            stats: Arc::clone(&self.stats),
            screenshot: self.screenshot.clone(),
            url: "about:blank".to_string(),
            page: FakePage::default(),
            loaded_at: Instant::now(),
            closed: false,
        }))
    }
}

pub struct FakeContext {
    site: Arc<FakeSite>,
    stats: Arc<Stats>,
    screenshot: Vec<u8>,
    url: String,
    page: FakePage,
    loaded_at: Instant,
    closed: bool,
}

impl FakeContext {
    fn load(&mut self, url: &str) {
        self.url = url.to_string();
        self.page = self
            .site
            .pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| FakePage::new("404 Not Found"));
        self.loaded_at = Instant::now();
    }

    fn node_mut(&mut self, handle: &str) -> Option<&mut FakeNode> {
        self.page.nodes.iter_mut().find(|n| n.handle == handle)
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Reveal(handle) => {
                    if let Some(node) = self.node_mut(handle) {
                        node.visible = true;
                    }
                }
                Effect::Hide(handle) => {
                    if let Some(node) = self.node_mut(handle) {
                        node.visible = false;
                    }
                }
                Effect::Uncheck(handle) => {
                    if let Some(node) = self.node_mut(handle) {
                        node.checked = Some(false);
                    }
                }
                Effect::Navigate(url) => self.load(url),
                Effect::Require { field, message } => {
                    let empty = self
                        .node_mut(field)
                        .map_or(true, |n| n.value.as_deref().unwrap_or_default().is_empty());
                    if let Some(node) = self.node_mut(message) {
                        node.visible = empty;
                    }
                }
            }
        }
    }

    fn filled(&self, handles: &[&'static str]) -> bool {
        handles.iter().all(|handle| {
            self.page
                .nodes
                .iter()
                .find(|n| n.handle == *handle)
                .is_some_and(|n| !n.value.as_deref().unwrap_or_default().is_empty())
        })
    }

    fn snapshot(&self, node: &FakeNode, parent: Option<usize>) -> ElementSnapshot {
        let mut snapshot = node.snapshot(self.loaded_at, parent);
        if !self.filled(&node.requires_filled) {
            snapshot.enabled = false;
            snapshot.editable = false;
        }
        snapshot
    }
}

#[async_trait]
impl Page for FakeContext {
    async fn goto(&mut self, url: &str) -> Result<()> {
        self.stats.navigations.lock().unwrap().push(url.to_string());
        if self.site.hanging.contains(url) {
            std::future::pending::<()>().await;
        }
        if self.site.broken.contains(url) {
            return Err(Error::navigation(url, "net::ERR_CONNECTION_REFUSED"));
        }
        self.load(url);
        Ok(())
    }

    async fn title(&mut self) -> Result<String> {
        Ok(self.page.title.clone())
    }

    async fn current_url(&mut self) -> Result<String> {
        Ok(self.url.clone())
    }

    async fn candidates(&mut self, selector: &Selector) -> Result<Vec<ElementSnapshot>> {
        assert!(!self.closed, "query on a closed context");
        let frame = selector.frame_chain().first().copied();
        let leaf = selector.leaf();

        let selected: Vec<&FakeNode> = self
            .page
            .nodes
            .iter()
            .filter(|n| n.frame == frame)
            .filter(|n| match &leaf.by {
                By::Role { role, .. } => {
                    n.role == Some(role.as_str()) && n.snapshot(self.loaded_at, None).visible
                }
                By::Id(id) => n.dom_id == Some(id.as_str()),
                By::Css(css) => n.tag == css.as_str(),
                By::TestId(id) => n.attributes.get("data-testid") == Some(id),
                By::Text(_) => !n.text.trim().is_empty(),
                By::Label(_) => matches!(n.tag, "input" | "textarea" | "select"),
                By::Placeholder(_) => n.attributes.contains_key("placeholder"),
                By::Frame { .. } => false,
            })
            .collect();

        let index: HashMap<&str, usize> = selected
            .iter()
            .enumerate()
            .map(|(i, n)| (n.handle, i))
            .collect();

        Ok(selected
            .iter()
            .map(|n| {
                let mut parent = None;
                let mut current = n.parent;
                while let Some(p) = current {
                    if let Some(i) = index.get(p) {
                        parent = Some(*i);
                        break;
                    }
                    current = self.page.nodes.iter().find(|x| x.handle == p).and_then(|x| x.parent);
                }
                self.snapshot(n, parent)
            })
            .collect())
    }

    async fn perform(
        &mut self,
        _selector: &Selector,
        element: &ElementSnapshot,
        interaction: &Interaction,
    ) -> Result<()> {
        let handle = element.handle.clone().unwrap_or_default();
        self.stats
            .performed
            .lock()
            .unwrap()
            .push((handle.clone(), interaction.to_string()));

        let Some(node) = self.node_mut(&handle) else {
            return Err(Error::WebDriver {
                error: "stale element reference".into(),
                message: handle,
            });
        };

        match interaction {
            Interaction::Click => {
                if let Some(checked) = node.checked.filter(|_| !node.frozen) {
                    let radio = node.attributes.get("type").is_some_and(|t| t == "radio");
                    node.checked = Some(radio || !checked);
                }
                let effects = node.on_click.clone();
                self.apply(effects);
            }
            Interaction::Fill(text) => node.value = Some(text.clone()),
            Interaction::Clear => node.value = Some(String::new()),
            Interaction::Press(_) => {}
            Interaction::Select(option) => {
                if !node.options.contains(&option.as_str()) {
                    return Err(Error::interaction(
                        "select",
                        handle,
                        format!("no option {:?}", option),
                    ));
                }
                node.value = Some(option.clone());
            }
        }
        Ok(())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>> {
        Ok(self.screenshot.clone())
    }

    async fn close(&mut self) -> Result<()> {
        assert!(!self.closed, "context closed twice");
        self.closed = true;
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A sign-in page in the style of an appointment scheduler
pub const HOME: &str = "https://scheduler.test/";
pub const HELP: &str = "https://scheduler.test/help";

pub fn scheduler_site() -> FakeSite {
    let home = FakePage::new("Scheduler")
        .with(
            FakeNode::button("english", "English")
                .on_click(Effect::Reveal("first"))
                .on_click(Effect::Reveal("last"))
                .on_click(Effect::Reveal("dob")),
        )
        .with(FakeNode::textbox("first", "firstName", "First Name").hidden())
        .with(FakeNode::textbox("last", "lastName", "Last Name").hidden())
        .with(FakeNode::textbox("dob", "dob", "Date of Birth").hidden())
        .with(FakeNode::textbox("ssn", "last4Ssn", "Last 4 of SSN").attr("maxlength", "4"))
        .with(FakeNode::checkbox("remember", "Remember me"))
        .with(
            FakeNode::button("logon", "Log On")
                .on_click(Effect::Require {
                    field: "first",
                    message: "first-required",
                })
                .on_click(Effect::Require {
                    field: "last",
                    message: "last-required",
                }),
        )
        .with(FakeNode::text_node("first-required", "span", "First Name is required").hidden())
        .with(FakeNode::text_node("last-required", "span", "Last Name is required").hidden())
        .with(FakeNode::button("next", "Next").disabled())
        .with(
            FakeNode::button("book", "Book Appointment")
                .enabled_when_filled(&["first", "last", "dob", "ssn"]),
        )
        .with(
            FakeNode::radio("phone-radio", "Cell Phone")
                .id("input-70")
                .checked()
                .on_click(Effect::Uncheck("email-radio"))
                .on_click(Effect::Reveal("cell"))
                .on_click(Effect::Hide("email"))
                .on_click(Effect::Hide("verify-email")),
        )
        .with(
            FakeNode::radio("email-radio", "Email")
                .id("input-72")
                .on_click(Effect::Uncheck("phone-radio"))
                .on_click(Effect::Hide("cell"))
                .on_click(Effect::Reveal("email"))
                .on_click(Effect::Reveal("verify-email")),
        )
        .with(FakeNode::textbox("cell", "input-120", "Cell Phone Number"))
        .with(FakeNode::textbox("email", "email", "Email").hidden())
        .with(FakeNode::textbox("verify-email", "verifyEmail", "Verify Email").hidden())
        .with(FakeNode::checkbox("terms", "I accept the terms").frozen())
        .with(
            FakeNode::new("help", "a")
                .role("link")
                .named("Help")
                .text("Help")
                .attr("href", "/help")
                .on_click(Effect::Navigate(HELP)),
        )
        .with(FakeNode::new("card", "div").text("Need help? Submit").id("card"))
        .with(FakeNode::button("submit", "Submit").child_of("card"))
        .with(FakeNode::button("cancel-1", "Cancel"))
        .with(FakeNode::button("cancel-2", "Cancel"))
        .with(
            FakeNode::new("county", "select")
                .role("combobox")
                .named("County")
                .options(&["Travis", "Harris"]),
        )
        .with(
            FakeNode::text_node("captcha", "span", "I'm not a robot")
                .role("checkbox")
                .named("I'm not a robot")
                .in_frame("iframe[title=\"reCAPTCHA\"]"),
        )
        .with(
            FakeNode::text_node("banner", "div", "Loading complete")
                .id("banner")
                .appears_after(Duration::from_millis(1500)),
        )
        .with(
            FakeNode::button("continue", "Continue").enabled_after(Duration::from_millis(800)),
        );

    let help = FakePage::new("Help | Scheduler")
        .with(FakeNode::text_node("heading", "h1", "Contact us").role("heading"))
        .with(
            FakeNode::new("mail", "a")
                .role("link")
                .named("TXScheduler@dps.texas.gov")
                .text("TXScheduler@dps.texas.gov")
                .attr("href", "mailto:TXScheduler@dps.texas.gov"),
        );

    FakeSite::new().page(HOME, home).page(HELP, help)
}

/// Parse scenarios from an inline YAML document
pub fn scenarios(yaml: &str) -> Vec<Scenario> {
    parse_scenarios(yaml, Path::new("inline.yaml")).expect("valid scenario document")
}

pub fn scenario(yaml: &str) -> Scenario {
    scenarios(yaml).remove(0)
}
