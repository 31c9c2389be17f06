//! WebDriver server spawning logic
//!
//! When nothing answers at the configured driver URL, the matching driver
//! binary (chromedriver or geckodriver) is started on that port and polled
//! until it reports ready. The spawned process lives as long as the
//! returned [`DriverProcess`].

use std::process::Stdio;
use std::time::Duration;

use reqwest::Url;
use tokio::process::{Child, Command};

use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::webdriver::WebDriverClient;

/// Timeout for the driver to start up
const SPAWN_TIMEOUT_SECS: u64 = 10;

/// A driver process started by this run
pub struct DriverProcess {
    child: Child,
}

impl DriverProcess {
    /// Stop the driver and wait for it to exit
    pub async fn stop(mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::warn!("Failed to stop WebDriver server: {}", e);
        }
    }
}

/// Ensure a WebDriver server is answering, spawning one if necessary
///
/// Returns a client for the server and, when this call started it, the
/// process handle.
pub async fn ensure_driver_running(
    config: &Config,
) -> Result<(WebDriverClient, Option<DriverProcess>)> {
    let client = WebDriverClient::new(&config.driver.url)?;

    match client.status().await {
        Ok(status) => {
            if !status.ready {
                tracing::warn!(
                    "WebDriver server at {} is not ready: {}",
                    client.url(),
                    status.message
                );
            }
            return Ok((client, None));
        }
        Err(Error::DriverNotRunning(_)) => {}
        Err(e) => return Err(e),
    }

    let Some(executable) = config.driver_executable() else {
        return Err(Error::DriverUnavailable(client.url().to_string()));
    };

    let port = local_port(&config.driver.url)
        .ok_or_else(|| Error::DriverUnavailable(client.url().to_string()))?;

    tracing::info!(
        "Starting {} on port {}",
        executable.display(),
        port
    );

    let mut child = Command::new(&executable)
        .arg(format!("--port={}", port))
        .args(&config.driver.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::DriverStartFailed(format!("{}: {}", executable.display(), e)))?;

    // Wait for the driver to accept sessions
    let deadline = tokio::time::Instant::now() + Duration::from_secs(SPAWN_TIMEOUT_SECS);

    loop {
        if tokio::time::Instant::now() >= deadline {
            let _ = child.kill().await;
            return Err(Error::DriverSpawnTimeout(SPAWN_TIMEOUT_SECS));
        }

        tokio::time::sleep(Duration::from_millis(100)).await;

        if let Some(status) = child.try_wait()? {
            return Err(Error::DriverStartFailed(format!(
                "{} exited with {}",
                executable.display(),
                status
            )));
        }

        if client.is_ready().await {
            tracing::debug!("WebDriver server started successfully");
            return Ok((client, Some(DriverProcess { child })));
        }
    }
}

/// Port of a driver URL on this machine; `None` for remote servers
fn local_port(url: &str) -> Option<u16> {
    let url = Url::parse(url).ok()?;
    match url.host_str()? {
        "localhost" | "127.0.0.1" | "[::1]" | "::1" => url.port_or_known_default(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_port() {
        assert_eq!(local_port("http://localhost:9515"), Some(9515));
        assert_eq!(local_port("http://127.0.0.1:4444/wd/hub"), Some(4444));
        assert_eq!(local_port("http://localhost"), Some(80));
        assert_eq!(local_port("http://grid.example.com:4444"), None);
        assert_eq!(local_port("nonsense"), None);
    }

    #[tokio::test]
    async fn test_no_server_and_no_binary() {
        let mut config = Config::default();
        config.driver.url = "http://127.0.0.1:9".to_string();
        config.driver.path = Some("/nonexistent/chromedriver".into());

        let err = ensure_driver_running(&config).await.err().unwrap();
        assert!(matches!(err, Error::DriverStartFailed(_)));
        assert!(err.is_configuration());
    }
}
