//! W3C WebDriver binding
//!
//! Talks HTTP+JSON to chromedriver, geckodriver or any compatible server and
//! exposes the result as a [`crate::browser::Browser`].

mod browser;
mod client;
mod script;
pub mod types;

pub use browser::{WebDriverBrowser, WebDriverPage};
pub use client::{Session, WebDriverClient};
