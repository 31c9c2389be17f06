//! WebDriver client for communicating with chromedriver/geckodriver
//!
//! Plain request/response over HTTP+JSON. Every command is logged at debug
//! level, mirroring what the driver sees.

use base64::Engine;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::common::{Error, Result};

use super::types::{DriverStatus, ElementRef, NewSession, WireError, WireResponse};

/// Connection to a WebDriver server
#[derive(Clone)]
pub struct WebDriverClient {
    http: reqwest::Client,
    base: Url,
}

impl WebDriverClient {
    /// Create a client for the server at `url`
    pub fn new(url: &str) -> Result<Self> {
        let mut base = Url::parse(url)
            .map_err(|e| Error::Config(format!("Invalid WebDriver URL '{}': {}", url, e)))?;
        // Url::join drops the last segment unless the path ends with '/'
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            http: reqwest::Client::new(),
            base,
        })
    }

    pub fn url(&self) -> &str {
        self.base.as_str()
    }

    /// Send a command and decode the `value` of the response
    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T> {
        let url = self
            .base
            .join(path)
            .map_err(|e| Error::Internal(format!("Bad WebDriver path '{}': {}", path, e)))?;

        tracing::debug!(
            "WebDriver >>> {} /{} {}",
            method,
            path,
            body.as_ref().map(|b| b.to_string()).unwrap_or_default()
        );

        let mut request = self.http.request(method.clone(), url);
        if method == Method::POST {
            request = request.json(&body.unwrap_or_else(|| json!({})));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() {
                Error::DriverNotRunning(self.base.to_string())
            } else {
                Error::DriverCommunication(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::DriverCommunication(e.to_string()))?;

        tracing::trace!("WebDriver <<< {} {}", status, text);

        if status.is_success() {
            let envelope: WireResponse<T> = serde_json::from_str(&text).map_err(|e| {
                Error::DriverCommunication(format!("Failed to parse response to /{}: {}", path, e))
            })?;
            return Ok(envelope.value);
        }

        match serde_json::from_str::<WireResponse<WireError>>(&text) {
            Ok(envelope) => Err(envelope.value.into()),
            Err(_) => Err(Error::DriverCommunication(format!(
                "HTTP {} from /{}: {}",
                status.as_u16(),
                path,
                text
            ))),
        }
    }

    /// Query server readiness
    pub async fn status(&self) -> Result<DriverStatus> {
        self.send(Method::GET, "status", None).await
    }

    /// Whether a server is answering and ready for new sessions
    pub async fn is_ready(&self) -> bool {
        matches!(self.status().await, Ok(status) if status.ready)
    }

    /// Create a new session (one fresh browser profile)
    pub async fn new_session(&self, capabilities: Value) -> Result<Session> {
        let created: NewSession = self
            .send(Method::POST, "session", Some(capabilities))
            .await
            .map_err(|e| match e {
                Error::DriverNotRunning(_) | Error::SessionFailed(_) => e,
                other => Error::SessionFailed(other.to_string()),
            })?;

        tracing::debug!("Created WebDriver session {}", created.session_id);

        Ok(Session {
            client: self.clone(),
            id: created.session_id,
        })
    }
}

/// An open WebDriver session
pub struct Session {
    client: WebDriverClient,
    id: String,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    async fn command<T: DeserializeOwned>(
        &self,
        method: Method,
        suffix: &str,
        body: Option<Value>,
    ) -> Result<T> {
        let path = if suffix.is_empty() {
            format!("session/{}", self.id)
        } else {
            format!("session/{}/{}", self.id, suffix)
        };
        self.client.send(method, &path, body).await
    }

    pub async fn navigate(&self, url: &str) -> Result<()> {
        let _: Value = self
            .command(Method::POST, "url", Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    pub async fn title(&self) -> Result<String> {
        self.command(Method::GET, "title", None).await
    }

    pub async fn current_url(&self) -> Result<String> {
        self.command(Method::GET, "url", None).await
    }

    /// Run a synchronous script and return its result
    pub async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        self.command(
            Method::POST,
            "execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    pub async fn element_click(&self, element: &str) -> Result<()> {
        let _: Value = self
            .command(Method::POST, &format!("element/{}/click", element), None)
            .await?;
        Ok(())
    }

    pub async fn element_clear(&self, element: &str) -> Result<()> {
        let _: Value = self
            .command(Method::POST, &format!("element/{}/clear", element), None)
            .await?;
        Ok(())
    }

    pub async fn element_send_keys(&self, element: &str, text: &str) -> Result<()> {
        let _: Value = self
            .command(
                Method::POST,
                &format!("element/{}/value", element),
                Some(json!({ "text": text })),
            )
            .await?;
        Ok(())
    }

    /// Switch into a frame element, or back to the top-level document
    pub async fn switch_to_frame(&self, frame: Option<&ElementRef>) -> Result<()> {
        let id = match frame {
            Some(r) => serde_json::to_value(r)?,
            None => Value::Null,
        };
        let _: Value = self
            .command(Method::POST, "frame", Some(json!({ "id": id })))
            .await?;
        Ok(())
    }

    /// PNG screenshot of the current viewport
    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        let encoded: String = self.command(Method::GET, "screenshot", None).await?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| Error::DriverCommunication(format!("Invalid screenshot data: {}", e)))
    }

    /// End the session and close its browser
    pub async fn delete(&self) -> Result<()> {
        match self.command::<Value>(Method::DELETE, "", None).await {
            Ok(_) => Ok(()),
            // Already gone: nothing left to release
            Err(Error::SessionFailed(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let client = WebDriverClient::new("http://localhost:4444/wd/hub").unwrap();
        assert_eq!(client.url(), "http://localhost:4444/wd/hub/");
        assert_eq!(
            client.base.join("session").unwrap().as_str(),
            "http://localhost:4444/wd/hub/session"
        );
    }

    #[test]
    fn test_invalid_url_is_config_error() {
        let err = WebDriverClient::new("not a url").err().unwrap();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_not_running() {
        // Port 9 (discard) is closed on any sane test machine
        let client = WebDriverClient::new("http://127.0.0.1:9").unwrap();
        let err = client.status().await.unwrap_err();
        assert!(matches!(err, Error::DriverNotRunning(_)));
        assert!(!client.is_ready().await);
    }
}
