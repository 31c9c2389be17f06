//! [`Browser`] and [`Page`] on top of a WebDriver server
//!
//! Every context is its own WebDriver session, so scenarios never share
//! cookies, storage or history.

use async_trait::async_trait;
use serde_json::Value;

use crate::browser::{Browser, ElementSnapshot, Interaction, Page, Selector};
use crate::common::config::{BrowserKind, Timeouts};
use crate::common::{Error, Result};

use super::client::{Session, WebDriverClient};
use super::script::{collect_args, frames_args, select_args, PAGE_SCRIPT};
use super::types::{capabilities, key_code, ElementRef, RawCandidate};

/// Opens one WebDriver session per context
pub struct WebDriverBrowser {
    client: WebDriverClient,
    capabilities: Value,
}

impl WebDriverBrowser {
    pub fn new(
        client: WebDriverClient,
        browser: BrowserKind,
        headless: bool,
        timeouts: &Timeouts,
    ) -> Self {
        let page_load_ms = timeouts.navigation().as_millis() as u64;
        Self {
            client,
            capabilities: capabilities(browser, headless, page_load_ms),
        }
    }
}

#[async_trait]
impl Browser for WebDriverBrowser {
    async fn new_context(&self) -> Result<Box<dyn Page>> {
        let session = self.client.new_session(self.capabilities.clone()).await?;
        Ok(Box::new(WebDriverPage {
            session: Some(session),
        }))
    }
}

/// A single WebDriver session
pub struct WebDriverPage {
    session: Option<Session>,
}

impl WebDriverPage {
    fn session(&self) -> Result<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| Error::Internal("browser context already closed".to_string()))
    }

    /// Switch into the selector's frame chain
    ///
    /// Returns `false` when a frame is not (yet) present; the caller treats
    /// that as "no matches" and keeps polling.
    async fn enter_frames(&self, selector: &Selector) -> Result<bool> {
        let session = self.session()?;
        for css in selector.frame_chain() {
            let frames = session.execute(PAGE_SCRIPT, vec![frames_args(css)]).await?;
            let frames: Vec<ElementRef> = serde_json::from_value(frames)?;
            match frames.first() {
                Some(frame) => session.switch_to_frame(Some(frame)).await?,
                None => return Ok(false),
            }
        }
        Ok(true)
    }

    async fn leave_frames(&self, selector: &Selector) -> Result<()> {
        if selector.frame_chain().is_empty() {
            return Ok(());
        }
        self.session()?.switch_to_frame(None).await
    }

    async fn collect(&self, selector: &Selector) -> Result<Vec<ElementSnapshot>> {
        if !self.enter_frames(selector).await? {
            return Ok(Vec::new());
        }
        let raw = self
            .session()?
            .execute(PAGE_SCRIPT, vec![collect_args(selector)?])
            .await?;
        let candidates: Vec<RawCandidate> = serde_json::from_value(raw)?;
        Ok(candidates.into_iter().map(ElementSnapshot::from).collect())
    }

    async fn interact(&self, handle: &str, interaction: &Interaction) -> Result<()> {
        let session = self.session()?;
        match interaction {
            Interaction::Click => session.element_click(handle).await,
            Interaction::Fill(text) => {
                session.element_clear(handle).await?;
                session.element_send_keys(handle, text).await
            }
            Interaction::Clear => session.element_clear(handle).await,
            Interaction::Press(key) => session.element_send_keys(handle, &key_code(key)).await,
            Interaction::Select(option) => {
                let element = serde_json::to_value(ElementRef {
                    id: handle.to_string(),
                })?;
                let result = session
                    .execute(PAGE_SCRIPT, vec![select_args(option), element])
                    .await?;
                match result.as_str() {
                    Some(problem) => Err(Error::interaction("select", option.as_str(), problem)),
                    None => Ok(()),
                }
            }
        }
    }
}

#[async_trait]
impl Page for WebDriverPage {
    async fn goto(&mut self, url: &str) -> Result<()> {
        self.session()?
            .navigate(url)
            .await
            .map_err(|e| match e {
                Error::WebDriver { error, message } => {
                    Error::navigation(url, format!("{}: {}", error, message))
                }
                other => other,
            })
    }

    async fn title(&mut self) -> Result<String> {
        self.session()?.title().await
    }

    async fn current_url(&mut self) -> Result<String> {
        self.session()?.current_url().await
    }

    async fn candidates(&mut self, selector: &Selector) -> Result<Vec<ElementSnapshot>> {
        let result = self.collect(selector).await;
        // Always return to the top-level document, even after a failed query
        let left = self.leave_frames(selector).await;
        let candidates = result?;
        left?;
        Ok(candidates)
    }

    async fn perform(
        &mut self,
        selector: &Selector,
        element: &ElementSnapshot,
        interaction: &Interaction,
    ) -> Result<()> {
        let handle = element
            .handle
            .as_deref()
            .ok_or_else(|| Error::Internal(format!("no element handle for {}", selector)))?;

        let result = if self.enter_frames(selector).await? {
            self.interact(handle, interaction).await
        } else {
            Err(Error::interaction(
                interaction.to_string(),
                selector.to_string(),
                "frame is no longer present",
            ))
        };
        let left = self.leave_frames(selector).await;
        result?;
        left
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>> {
        self.session()?.screenshot().await
    }

    async fn close(&mut self) -> Result<()> {
        match self.session.take() {
            Some(session) => {
                tracing::debug!("Deleting WebDriver session {}", session.id());
                session.delete().await
            }
            None => Ok(()),
        }
    }
}

impl Drop for WebDriverPage {
    fn drop(&mut self) {
        // Contexts dropped without close() (a panicking scenario task) still
        // release their browser
        if let Some(session) = self.session.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    if let Err(e) = session.delete().await {
                        tracing::warn!("Failed to delete session {}: {}", session.id(), e);
                    }
                });
            }
        }
    }
}
