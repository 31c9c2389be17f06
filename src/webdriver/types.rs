//! W3C WebDriver wire types
//!
//! Only the subset of the protocol the runner needs: sessions, navigation,
//! script execution, element interaction, frames and screenshots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::browser::ElementSnapshot;
use crate::common::config::BrowserKind;
use crate::common::Error;

/// Key identifying a web element reference in JSON
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Successful response envelope: every result is wrapped in `value`
#[derive(Debug, Deserialize)]
pub struct WireResponse<T> {
    pub value: T,
}

/// Error payload returned with a non-2xx status
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireError {
    pub error: String,
    #[serde(default)]
    pub message: String,
}

impl From<WireError> for Error {
    fn from(e: WireError) -> Self {
        match e.error.as_str() {
            "session not created" | "invalid session id" => Error::SessionFailed(e.message),
            _ => Error::WebDriver {
                error: e.error,
                message: e.message,
            },
        }
    }
}

/// Response to `GET /status`
#[derive(Debug, Deserialize)]
pub struct DriverStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub message: String,
}

/// Response to `POST /session`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    pub session_id: String,
    #[serde(default)]
    pub capabilities: Value,
}

/// Reference to an element inside the remote browser
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ElementRef {
    #[serde(rename = "element-6066-11e4-a52e-4f735466cecf")]
    pub id: String,
}

/// One element as reported by the query script
#[derive(Debug, Deserialize)]
pub struct RawCandidate {
    pub element: ElementRef,
    pub parent: Option<usize>,
    pub tag: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub editable: bool,
    pub checked: Option<bool>,
    pub value: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl From<RawCandidate> for ElementSnapshot {
    fn from(c: RawCandidate) -> Self {
        Self {
            handle: Some(c.element.id),
            parent: c.parent,
            tag: c.tag,
            name: c.name,
            text: c.text,
            visible: c.visible,
            enabled: c.enabled,
            editable: c.editable,
            checked: c.checked,
            value: c.value,
            attributes: c.attributes,
        }
    }
}

/// Build the `POST /session` payload
pub fn capabilities(browser: BrowserKind, headless: bool, page_load_ms: u64) -> Value {
    let mut always_match = json!({
        "pageLoadStrategy": "normal",
        "timeouts": { "pageLoad": page_load_ms, "script": 30_000 },
    });

    match browser {
        BrowserKind::Chrome => {
            let mut args = vec!["--no-first-run", "--disable-dev-shm-usage"];
            if headless {
                args.push("--headless=new");
            }
            always_match["browserName"] = json!("chrome");
            always_match["goog:chromeOptions"] = json!({ "args": args });
        }
        BrowserKind::Firefox => {
            let args: Vec<&str> = if headless { vec!["-headless"] } else { Vec::new() };
            always_match["browserName"] = json!("firefox");
            always_match["moz:firefoxOptions"] = json!({ "args": args });
        }
    }

    json!({ "capabilities": { "alwaysMatch": always_match } })
}

/// Translate a key name into the WebDriver key code point
///
/// Unknown names are typed literally.
pub fn key_code(name: &str) -> String {
    let code = match name {
        "Enter" => '\u{E007}',
        "Tab" => '\u{E004}',
        "Escape" => '\u{E00C}',
        "Backspace" => '\u{E003}',
        "Delete" => '\u{E017}',
        "Space" => ' ',
        "ArrowLeft" => '\u{E012}',
        "ArrowUp" => '\u{E013}',
        "ArrowRight" => '\u{E014}',
        "ArrowDown" => '\u{E015}',
        "Home" => '\u{E011}',
        "End" => '\u{E010}',
        "PageUp" => '\u{E00E}',
        "PageDown" => '\u{E00F}',
        _ => return name.to_string(),
    };
    code.to_string()
}
