//! Mock WebDriver server binary for integration testing
//!
//! Serves a small scripted site described by a JSON fixture and speaks
//! enough of the W3C WebDriver protocol for the runner: sessions,
//! navigation, title and URL, the query script, element click/clear/value,
//! `<select>` handling and screenshots. Any other GET answers 200, so the
//! server doubles as the site's base URL.
//!
//! Usage: `mock_webdriver --fixture site.json [--port N]`
//! Prints `listening on 127.0.0.1:<port>` once it accepts connections.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, delete, get, post};
use axum::{Json, Router};
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Map, Value};

const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// PNG signature, enough for a file that looks like a screenshot
const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

#[tokio::main]
async fn main() {
    let mut fixture = None;
    let mut port = 0u16;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if let Some(value) = arg.strip_prefix("--port=") {
            port = value.parse().unwrap_or(0);
        } else if arg == "--port" {
            port = args.next().and_then(|v| v.parse().ok()).unwrap_or(0);
        } else if let Some(value) = arg.strip_prefix("--fixture=") {
            fixture = Some(value.to_string());
        } else if arg == "--fixture" {
            fixture = args.next();
        }
    }

    let Some(fixture) = fixture else {
        eprintln!("usage: mock_webdriver --fixture FILE [--port N]");
        std::process::exit(2);
    };

    let site: Site = match std::fs::read_to_string(&fixture)
        .map_err(|e| e.to_string())
        .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()))
    {
        Ok(site) => site,
        Err(e) => {
            eprintln!("mock_webdriver: cannot load fixture {}: {}", fixture, e);
            std::process::exit(2);
        }
    };

    let listener = match tokio::net::TcpListener::bind(("127.0.0.1", port)).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("mock_webdriver: cannot bind port {}: {}", port, e);
            std::process::exit(2);
        }
    };
    let addr = listener.local_addr().map(|a| a.to_string()).unwrap_or_default();

    println!("listening on {}", addr);
    std::io::stdout().flush().ok();

    let state = MockState::new(site, format!("http://{}", addr));
    if let Err(e) = axum::serve(listener, router(state)).await {
        eprintln!("mock_webdriver: server error: {}", e);
        std::process::exit(1);
    }
}

type SharedState = Arc<Mutex<MockState>>;

/// WebDriver endpoints; anything else is a page of the site under test
fn router(state: MockState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/session", post(new_session))
        .route("/session/{id}", delete(delete_session))
        .route("/session/{id}/{*command}", any(session_command))
        .fallback(site_page)
        .with_state(Arc::new(Mutex::new(state)))
}

#[derive(Debug, Clone, Deserialize)]
struct Site {
    pages: HashMap<String, PageDef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PageDef {
    #[serde(default)]
    title: String,
    #[serde(default)]
    elements: Vec<ElementDef>,
}

#[derive(Debug, Clone, Deserialize)]
struct ElementDef {
    id: String,
    tag: String,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    text: String,
    #[serde(default = "default_true")]
    visible: bool,
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default)]
    checked: Option<bool>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    options: Vec<String>,
    /// Fixture id of the enclosing element
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
    /// Path loaded when the element is clicked
    #[serde(default)]
    navigate: Option<String>,
    /// Elements shown when the element is clicked
    #[serde(default)]
    reveals: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl ElementDef {
    fn editable(&self) -> bool {
        let input_type = self.attributes.get("type").map(String::as_str).unwrap_or("text");
        let text_entry = self.tag == "textarea"
            || (self.tag == "input"
                && !matches!(
                    input_type,
                    "checkbox" | "radio" | "button" | "submit" | "reset" | "hidden"
                ));
        self.enabled && text_entry && !self.attributes.contains_key("readonly")
    }

    fn has_class(&self, class: &str) -> bool {
        self.attributes
            .get("class")
            .is_some_and(|c| c.split_whitespace().any(|c| c == class))
    }
}

struct Session {
    url: String,
    page: PageDef,
}

struct MockState {
    site: Site,
    origin: String,
    sessions: HashMap<String, Session>,
    next_session: u64,
}

type Reply = (StatusCode, Value);

fn error_reply(status: StatusCode, error: &str, message: impl Into<String>) -> Reply {
    (
        status,
        json!({ "error": error, "message": message.into(), "stacktrace": "" }),
    )
}

impl MockState {
    fn new(site: Site, origin: String) -> Self {
        Self {
            site,
            origin,
            sessions: HashMap::new(),
            next_session: 1,
        }
    }

    fn new_session(&mut self) -> Reply {
        let id = format!("mock-{}", self.next_session);
        self.next_session += 1;
        self.sessions.insert(
            id.clone(),
            Session {
                url: "about:blank".to_string(),
                page: PageDef::default(),
            },
        );
        (
            StatusCode::OK,
            json!({ "sessionId": id, "capabilities": { "browserName": "mock" } }),
        )
    }

    fn delete_session(&mut self, id: &str) -> Reply {
        match self.sessions.remove(id) {
            Some(_) => (StatusCode::OK, Value::Null),
            None => error_reply(StatusCode::NOT_FOUND, "invalid session id", format!("no session {}", id)),
        }
    }

    fn session_command(&mut self, id: &str, method: &str, rest: &[&str], body: &Value) -> Reply {
        if !self.sessions.contains_key(id) {
            return error_reply(StatusCode::NOT_FOUND, "invalid session id", format!("no session {}", id));
        }

        match (method, rest) {
            ("POST", ["url"]) => {
                let url = body["url"].as_str().unwrap_or_default().to_string();
                self.navigate(id, &url)
            }
            ("GET", ["url"]) => (StatusCode::OK, json!(self.session(id).url)),
            ("GET", ["title"]) => (StatusCode::OK, json!(self.session(id).page.title)),
            ("POST", ["timeouts"]) | ("POST", ["frame"]) => (StatusCode::OK, Value::Null),
            ("POST", ["execute", "sync"]) => self.execute(id, body),
            ("POST", ["element", element, action]) => self.element_action(id, element, action, body),
            ("GET", ["screenshot"]) => (
                StatusCode::OK,
                json!(base64::engine::general_purpose::STANDARD.encode(PNG_MAGIC)),
            ),
            _ => error_reply(StatusCode::NOT_FOUND, "unknown command", format!("{} {:?}", method, rest)),
        }
    }

    fn session(&mut self, id: &str) -> &mut Session {
        self.sessions.get_mut(id).expect("session checked by caller")
    }

    fn navigate(&mut self, id: &str, url: &str) -> Reply {
        let Some(path) = url.strip_prefix(&self.origin) else {
            return error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                "unknown error",
                format!("net::ERR_NAME_NOT_RESOLVED at {}", url),
            );
        };
        let path = path.split(['?', '#']).next().unwrap_or("/");
        let path = if path.is_empty() { "/" } else { path };

        let page = self.site.pages.get(path).cloned().unwrap_or_else(|| PageDef {
            title: "404 Not Found".to_string(),
            elements: Vec::new(),
        });
        let session = self.session(id);
        session.url = url.to_string();
        session.page = page;
        (StatusCode::OK, Value::Null)
    }

    fn execute(&mut self, id: &str, body: &Value) -> Reply {
        let request = &body["args"][0];
        match request["op"].as_str() {
            Some("collect") => {
                let page = &self.session(id).page;
                (StatusCode::OK, collect(page, &request["query"]))
            }
            // No frames in fixtures
            Some("frames") => (StatusCode::OK, json!([])),
            Some("select") => {
                let element = body["args"][1][ELEMENT_KEY].as_str().unwrap_or_default().to_string();
                let option = request["option"].as_str().unwrap_or_default().to_string();
                let page = &mut self.session(id).page;
                match page.elements.iter_mut().find(|e| e.id == element) {
                    Some(el) if el.tag != "select" => (StatusCode::OK, json!("element is not a <select>")),
                    Some(el) if el.options.contains(&option) => {
                        el.value = Some(option);
                        (StatusCode::OK, Value::Null)
                    }
                    Some(_) => (StatusCode::OK, json!(format!("no option {:?}", option))),
                    None => error_reply(StatusCode::NOT_FOUND, "stale element reference", element),
                }
            }
            other => error_reply(StatusCode::INTERNAL_SERVER_ERROR, "javascript error", format!("unknown op: {:?}", other)),
        }
    }

    fn element_action(&mut self, id: &str, element: &str, action: &str, body: &Value) -> Reply {
        let origin = self.origin.clone();
        let page = &mut self.session(id).page;
        let Some(index) = page.elements.iter().position(|e| e.id == element) else {
            return error_reply(StatusCode::NOT_FOUND, "no such element", format!("no element {}", element));
        };

        if !page.elements[index].visible || !page.elements[index].enabled {
            return error_reply(StatusCode::BAD_REQUEST, "element not interactable", "element not interactable");
        }

        match action {
            "click" => {
                let el = &mut page.elements[index];
                if let Some(checked) = el.checked {
                    let radio = el.attributes.get("type").is_some_and(|t| t == "radio");
                    el.checked = Some(radio || !checked);
                }
                let reveals = el.reveals.clone();
                let target = el.navigate.clone();
                for other in page.elements.iter_mut() {
                    if reveals.contains(&other.id) {
                        other.visible = true;
                    }
                }
                match target {
                    Some(path) => self.navigate(id, &format!("{}{}", origin, path)),
                    None => (StatusCode::OK, Value::Null),
                }
            }
            "clear" | "value" if !page.elements[index].editable() => {
                error_reply(StatusCode::BAD_REQUEST, "invalid element state", "element is not editable")
            }
            "clear" => {
                page.elements[index].value = Some(String::new());
                (StatusCode::OK, Value::Null)
            }
            "value" => {
                // Key codes live in the private use area; they type nothing
                let typed: String = body["text"]
                    .as_str()
                    .unwrap_or_default()
                    .chars()
                    .filter(|c| !('\u{E000}'..='\u{F8FF}').contains(c))
                    .collect();
                let el = &mut page.elements[index];
                el.value = Some(format!("{}{}", el.value.clone().unwrap_or_default(), typed));
                (StatusCode::OK, Value::Null)
            }
            _ => error_reply(StatusCode::NOT_FOUND, "unknown command", action.to_string()),
        }
    }
}

/// Candidates for a query, shaped like the page script's output
fn collect(page: &PageDef, query: &Value) -> Value {
    let kind = query["kind"].as_str().unwrap_or_default();
    let selected: Vec<&ElementDef> = page
        .elements
        .iter()
        .filter(|el| match kind {
            "id" => el.attributes.get("id").map(String::as_str) == query["id"].as_str(),
            "css" => css_matches(el, query["css"].as_str().unwrap_or_default()),
            "test_id" => {
                el.attributes.get("data-testid").map(String::as_str) == query["id"].as_str()
            }
            "role" => el.role.as_deref() == query["role"].as_str() && el.visible,
            "label" => {
                matches!(el.tag.as_str(), "input" | "textarea" | "select")
                    || el.attributes.contains_key("aria-label")
            }
            "placeholder" => el.attributes.contains_key("placeholder"),
            "text" => !el.text.trim().is_empty(),
            _ => false,
        })
        .collect();

    let index: HashMap<&str, usize> = selected
        .iter()
        .enumerate()
        .map(|(i, el)| (el.id.as_str(), i))
        .collect();

    let candidates: Vec<Value> = selected
        .iter()
        .map(|el| {
            let parent = ancestors(page, el).find_map(|a| index.get(a).copied());
            let mut element = Map::new();
            element.insert(ELEMENT_KEY.to_string(), json!(el.id));
            json!({
                "element": element,
                "parent": parent,
                "tag": el.tag,
                "name": el.name,
                "text": el.text,
                "visible": el.visible,
                "enabled": el.enabled,
                "editable": el.editable(),
                "checked": el.checked,
                "value": el.value,
                "attributes": el.attributes,
            })
        })
        .collect();
    Value::Array(candidates)
}

/// Fixture ids of an element's ancestors, nearest first
fn ancestors<'a>(page: &'a PageDef, el: &'a ElementDef) -> impl Iterator<Item = &'a str> + 'a {
    std::iter::successors(el.parent.as_deref(), move |id| {
        page.elements
            .iter()
            .find(|e| e.id == *id)
            .and_then(|e| e.parent.as_deref())
    })
    .take(page.elements.len())
}

/// The handful of CSS forms fixtures use: `tag`, `#id`, `.class`, `[attr]`, `[attr="v"]`
fn css_matches(el: &ElementDef, css: &str) -> bool {
    let css = css.trim();
    if let Some(id) = css.strip_prefix('#') {
        return el.attributes.get("id").is_some_and(|v| v == id);
    }
    if let Some(class) = css.strip_prefix('.') {
        return el.has_class(class);
    }
    if let Some(attr) = css.strip_prefix('[').and_then(|c| c.strip_suffix(']')) {
        return match attr.split_once('=') {
            Some((name, value)) => {
                let value = value.trim_matches(|c| c == '"' || c == '\'');
                el.attributes.get(name).is_some_and(|v| v == value)
            }
            None => el.attributes.contains_key(attr),
        };
    }
    el.tag == css
}

fn reply((status, value): Reply) -> Response {
    (status, Json(json!({ "value": value }))).into_response()
}

/// Request body as JSON; an empty body reads as null
fn parse_body(body: &Bytes) -> Result<Value, Reply> {
    if body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| {
        error_reply(
            StatusCode::BAD_REQUEST,
            "invalid argument",
            format!("malformed JSON body: {}", e),
        )
    })
}

fn with_state(state: &SharedState, f: impl FnOnce(&mut MockState) -> Reply) -> Response {
    match state.lock() {
        Ok(mut state) => reply(f(&mut state)),
        Err(_) => reply(error_reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            "unknown error",
            "mock state poisoned",
        )),
    }
}

async fn status() -> Response {
    reply((StatusCode::OK, json!({ "ready": true, "message": "mock ready" })))
}

async fn new_session(State(state): State<SharedState>) -> Response {
    with_state(&state, |state| state.new_session())
}

async fn delete_session(State(state): State<SharedState>, Path(id): Path<String>) -> Response {
    with_state(&state, |state| state.delete_session(&id))
}

async fn session_command(
    State(state): State<SharedState>,
    Path((id, command)): Path<(String, String)>,
    method: Method,
    body: Bytes,
) -> Response {
    let body = match parse_body(&body) {
        Ok(body) => body,
        Err(rejected) => return reply(rejected),
    };
    let rest: Vec<&str> = command.split('/').filter(|s| !s.is_empty()).collect();
    with_state(&state, |state| {
        state.session_command(&id, method.as_str(), &rest, &body)
    })
}

/// Pages of the site under test; the runner only checks they answer
async fn site_page(method: Method, uri: Uri) -> Response {
    if method == Method::GET {
        (StatusCode::OK, "<html><body>mock site</body></html>").into_response()
    } else {
        reply(error_reply(
            StatusCode::NOT_FOUND,
            "unknown command",
            format!("{} {}", method, uri),
        ))
    }
}
