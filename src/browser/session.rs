//! Browser session lifecycle
//!
//! A [`Session`] owns exactly one page for the lifetime of one scenario. It
//! is not `Clone`, so only the scenario that opened it can drive or close it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::common::config::BrowserConfig;
use crate::common::{Error, Result};

use super::{Launcher, Page};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// A launch running on its own task
///
/// The driver may already hold a browser when the caller gives up on the
/// launch. Dropping an unfinished launch therefore lets the task complete and
/// closes whatever page it produced.
struct PendingLaunch {
    task: Option<JoinHandle<Result<Box<dyn Page>>>>,
    teardown_timeout: Duration,
}

impl PendingLaunch {
    fn start(launcher: Arc<dyn Launcher>, browser: BrowserConfig, teardown_timeout: Duration) -> Self {
        let task = tokio::spawn(async move { launcher.launch(&browser).await });
        Self {
            task: Some(task),
            teardown_timeout,
        }
    }

    async fn wait(&mut self) -> Result<Box<dyn Page>> {
        let Some(task) = self.task.as_mut() else {
            return Err(Error::Internal("launch already awaited".to_string()));
        };
        let joined = task.await;
        self.task = None;
        joined.map_err(|e| Error::SessionCreate(format!("launch task failed: {}", e)))?
    }
}

impl Drop for PendingLaunch {
    fn drop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            task.abort();
            return;
        };

        let teardown_timeout = self.teardown_timeout;
        tracing::debug!("Launch abandoned, closing its session once it starts");
        runtime.spawn(async move {
            let Ok(Ok(mut page)) = task.await else {
                return;
            };
            match tokio::time::timeout(teardown_timeout, page.close()).await {
                Ok(Ok(())) => tracing::debug!("Closed session of abandoned launch"),
                Ok(Err(e)) => tracing::warn!("Error closing session of abandoned launch: {}", e),
                Err(_) => tracing::warn!("Closing session of abandoned launch timed out"),
            }
        });
    }
}

/// An exclusively owned browser session
pub struct Session {
    id: u64,
    page: Option<Box<dyn Page>>,
    teardown_timeout: Duration,
}

impl Session {
    /// Launch a new session, bounded by `launch_timeout`
    ///
    /// If the launch times out, or this future is dropped, a browser the
    /// driver starts late is still closed.
    pub async fn open(
        launcher: Arc<dyn Launcher>,
        browser: &BrowserConfig,
        launch_timeout: Duration,
        teardown_timeout: Duration,
    ) -> Result<Self> {
        let mut pending = PendingLaunch::start(launcher, browser.clone(), teardown_timeout);
        let page = match tokio::time::timeout(launch_timeout, pending.wait()).await {
            Ok(page) => page?,
            Err(_) => {
                return Err(Error::SessionCreate(format!(
                    "browser did not start within {} ms",
                    launch_timeout.as_millis()
                )))
            }
        };

        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(session = id, "Session opened");

        Ok(Self {
            id,
            page: Some(page),
            teardown_timeout,
        })
    }

    /// Process-unique session number
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The session's page, or `SessionClosed` after [`Session::close`]
    pub fn page(&mut self) -> Result<&mut (dyn Page + 'static)> {
        self.page.as_deref_mut().ok_or(Error::SessionClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.page.is_none()
    }

    /// Close the page. Errors and hangs are logged and suppressed.
    ///
    /// Returns `true` if this call performed the close.
    pub async fn close(&mut self) -> bool {
        let Some(mut page) = self.page.take() else {
            return false;
        };

        match tokio::time::timeout(self.teardown_timeout, page.close()).await {
            Ok(Ok(())) => tracing::debug!(session = self.id, "Session closed"),
            Ok(Err(e)) => tracing::warn!(session = self.id, "Error closing session: {}", e),
            Err(_) => tracing::warn!(
                session = self.id,
                "Session close timed out after {} ms",
                self.teardown_timeout.as_millis()
            ),
        }
        true
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.page.is_some() {
            tracing::warn!(session = self.id, "Session dropped without being closed");
        }
    }
}
