//! Browser abstraction
//!
//! The runner talks to browsers only through [`Browser`] and [`Page`]. The
//! WebDriver binding implements them for real browsers; tests implement them
//! over an in-memory document.

mod selector;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;

use crate::common::Result;

pub use selector::{By, Resolution, Selector, TextMatch};

/// State observed for one matched element at one point in time
#[derive(Debug, Clone, Default)]
pub struct ElementSnapshot {
    /// Opaque reference the page uses to act on this element
    pub handle: Option<String>,
    /// Index of the nearest ancestor in the same candidate list
    pub parent: Option<usize>,
    pub tag: String,
    /// Accessible name (label text for form controls)
    pub name: String,
    /// Rendered text content
    pub text: String,
    pub visible: bool,
    pub enabled: bool,
    pub editable: bool,
    /// `None` for elements that cannot be checked
    pub checked: Option<bool>,
    /// Current value of form controls
    pub value: Option<String>,
    pub attributes: BTreeMap<String, String>,
}

impl ElementSnapshot {
    /// Native `<input type=radio>` or an ARIA radio
    pub fn is_radio(&self) -> bool {
        let attribute = |name: &str| self.attributes.get(name).map(|v| v.to_ascii_lowercase());
        (self.tag == "input" && attribute("type").as_deref() == Some("radio"))
            || matches!(attribute("role").as_deref(), Some("radio" | "menuitemradio"))
    }
}

/// A browser-level interaction performed on one element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    Click,
    /// Replace the current value with the given text
    Fill(String),
    Clear,
    /// Press a named key (`Enter`, `Tab`, ...) or type literal text
    Press(String),
    /// Choose an option of a `<select>` by value or label
    Select(String),
}

impl fmt::Display for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interaction::Click => f.write_str("click"),
            Interaction::Fill(_) => f.write_str("fill"),
            Interaction::Clear => f.write_str("clear"),
            Interaction::Press(key) => write!(f, "press {}", key),
            Interaction::Select(option) => write!(f, "select {:?} in", option),
        }
    }
}

/// One isolated browsing context (own cookies, storage and history)
#[async_trait]
pub trait Page: Send {
    /// Load a URL and wait for the page load to complete
    async fn goto(&mut self, url: &str) -> Result<()>;

    async fn title(&mut self) -> Result<String>;

    async fn current_url(&mut self) -> Result<String>;

    /// Raw candidates for the selector's kind, in document order
    ///
    /// Implementations only narrow by kind (role, id, css, ...) and fill in
    /// names and text; [`query`] applies the matching rules.
    async fn candidates(&mut self, selector: &Selector) -> Result<Vec<ElementSnapshot>>;

    /// Perform an interaction on an element previously returned by [`query`]
    async fn perform(
        &mut self,
        selector: &Selector,
        element: &ElementSnapshot,
        interaction: &Interaction,
    ) -> Result<()>;

    /// PNG screenshot of the viewport; empty when unsupported
    async fn screenshot(&mut self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    /// Release the context. Called exactly once by the runner.
    async fn close(&mut self) -> Result<()>;
}

/// Factory for isolated contexts
#[async_trait]
pub trait Browser: Send + Sync {
    async fn new_context(&self) -> Result<Box<dyn Page>>;
}

/// Evaluate a selector against a page right now
pub async fn query(page: &mut dyn Page, selector: &Selector) -> Result<Vec<ElementSnapshot>> {
    let candidates = page.candidates(selector).await?;
    Ok(selector.refine(candidates))
}
