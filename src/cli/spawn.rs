//! WebDriver spawning logic
//!
//! Spawns the driver executable when the configured endpoint is not
//! reachable, and stops it again once the run is over.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::process::{Child, Command as TokioCommand};

use crate::common::config::Config;
use crate::common::{Error, Result};

/// Timeout for a single readiness probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Interval between readiness probes while the driver starts
const PROBE_INTERVAL: Duration = Duration::from_millis(100);

/// How long a driver gets to exit after SIGTERM
const STOP_GRACE: Duration = Duration::from_secs(2);

/// A driver process started by this CLI
pub struct DriverProcess {
    child: Child,
}

impl DriverProcess {
    /// Stop the driver, gracefully where the platform allows
    pub async fn stop(mut self) {
        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            // SIGTERM lets chromedriver tear down its browsers
            unsafe {
                libc::kill(pid as i32, libc::SIGTERM);
            }
            if tokio::time::timeout(STOP_GRACE, self.child.wait()).await.is_ok() {
                tracing::debug!("WebDriver stopped");
                return;
            }
        }

        if let Err(e) = self.child.kill().await {
            tracing::warn!("Failed to stop WebDriver: {}", e);
        }
    }
}

/// Ensure a driver is listening at the configured URL, spawning it if allowed
///
/// Returns the spawned process, or `None` if a driver was already running.
pub async fn ensure_driver_running(config: &Config) -> Result<Option<DriverProcess>> {
    let url = &config.driver.url;

    match probe(url).await {
        Ok(()) => return Ok(None),
        Err(Error::DriverNotRunning(_)) if config.driver.spawn => {}
        Err(e) => return Err(e),
    }

    spawn_driver(config).await.map(Some)
}

/// Reply to `GET /status`
#[derive(Debug, Default, Deserialize)]
struct StatusReply {
    #[serde(default)]
    value: DriverStatus,
}

#[derive(Debug, Default, Deserialize)]
struct DriverStatus {
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    message: String,
}

async fn probe(url: &str) -> Result<()> {
    let http = reqwest::Client::builder().timeout(PROBE_TIMEOUT).build()?;
    let endpoint = format!("{}/status", url.trim_end_matches('/'));
    let reply: StatusReply = http
        .get(&endpoint)
        .send()
        .await
        .map_err(|_| Error::DriverNotRunning(url.to_string()))?
        .json()
        .await?;

    let status = reply.value;
    if !status.ready {
        tracing::debug!("WebDriver at {} reports not ready: {}", url, status.message);
    }
    Ok(())
}

/// Locate the driver executable for the configured browser
fn driver_executable(config: &Config) -> Result<PathBuf> {
    if let Some(path) = &config.driver.path {
        return Ok(path.clone());
    }
    let name = match config.browser.name.as_str() {
        "firefox" => "geckodriver",
        _ => "chromedriver",
    };
    which::which(name).map_err(|_| Error::DriverNotFound(name.to_string()))
}

/// Spawn the driver process
async fn spawn_driver(config: &Config) -> Result<DriverProcess> {
    let url = &config.driver.url;
    let port = reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.port_or_known_default())
        .ok_or_else(|| Error::Config(format!("Invalid WebDriver URL '{}'", url)))?;

    let exe = driver_executable(config)?;
    tracing::info!("Starting {} on port {}", exe.display(), port);

    let mut child = TokioCommand::new(&exe)
        .arg(format!("--port={}", port))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Internal(format!("Failed to spawn '{}': {}", exe.display(), e)))?;

    // Wait for the driver to start answering /status
    let secs = config.driver.startup_timeout_secs;
    let deadline = Instant::now() + Duration::from_secs(secs);

    loop {
        if Instant::now() >= deadline {
            let _ = child.kill().await;
            return Err(Error::DriverSpawnTimeout {
                url: url.clone(),
                secs,
            });
        }

        tokio::time::sleep(PROBE_INTERVAL).await;

        if let Ok(Some(status)) = child.try_wait() {
            return Err(Error::Internal(format!(
                "'{}' exited during startup with {}",
                exe.display(),
                status
            )));
        }

        if probe(url).await.is_ok() {
            tracing::debug!("WebDriver started successfully");
            return Ok(DriverProcess { child });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_driver_path_wins() {
        let mut config = Config::default();
        config.driver.path = Some(PathBuf::from("/opt/drivers/chromedriver"));
        assert_eq!(
            driver_executable(&config).unwrap(),
            PathBuf::from("/opt/drivers/chromedriver")
        );
    }

    #[tokio::test]
    async fn test_unreachable_driver_without_spawn() {
        let mut config = Config::default();
        config.driver.url = "http://127.0.0.1:9".to_string();
        config.driver.spawn = false;

        let err = ensure_driver_running(&config).await.err().unwrap();
        assert!(matches!(err, Error::DriverNotRunning(_)));
    }
}
