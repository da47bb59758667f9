//! Error types for the scenario runner
//!
//! Failures fall into two groups. Locator, timeout, assertion and navigation
//! failures are expected outcomes of a flaky UI and end a scenario as `Fail`.
//! Everything else is an unexpected fault and ends it as `Error`.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the scenario runner
#[derive(Error, Debug)]
pub enum Error {
    // === WebDriver/Connection Errors ===
    #[error("WebDriver not reachable at {0}. Start chromedriver or set 'driver.path' in the config")]
    DriverNotRunning(String),

    #[error("Failed to spawn WebDriver: timed out waiting for {url} after {secs} seconds")]
    DriverSpawnTimeout { url: String, secs: u64 },

    #[error("WebDriver executable '{0}' not found. Install it or set 'driver.path' in the config")]
    DriverNotFound(String),

    #[error("WebDriver command '{command}' failed: {code}: {message}")]
    WebDriver {
        command: String,
        code: String,
        message: String,
    },

    // === Session Errors ===
    #[error("Browser session could not be created: {0}")]
    SessionCreate(String),

    #[error("Browser session is already closed")]
    SessionClosed,

    #[error("scenario aborted")]
    Aborted,

    // === Action Failures ===
    #[error("No element matches locator '{locator}'")]
    LocatorNotFound { locator: String },

    #[error("{action} did not complete within {timeout_ms} ms")]
    ActionTimeout { action: String, timeout_ms: u64 },

    #[error("Assertion failed: expected {expected}, got {actual}")]
    AssertionFailed { expected: String, actual: String },

    #[error("Navigation to '{url}' failed: {reason}")]
    NavigationFailed { url: String, reason: String },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Invalid scenario '{path}': {reason}")]
    ScenarioParse { path: String, reason: String },

    #[error("Invalid locator '{input}': {reason}")]
    InvalidLocator { input: String, reason: String },

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a locator not found error
    pub fn locator_not_found(locator: impl std::fmt::Display) -> Self {
        Self::LocatorNotFound {
            locator: locator.to_string(),
        }
    }

    /// Create an action timeout error
    pub fn action_timeout(action: impl Into<String>, timeout: Duration) -> Self {
        Self::ActionTimeout {
            action: action.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Create an assertion failed error
    pub fn assertion_failed(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::AssertionFailed {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a navigation failed error
    pub fn navigation_failed(url: &str, reason: impl Into<String>) -> Self {
        Self::NavigationFailed {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a scenario parse error
    pub fn scenario_parse(path: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Self::ScenarioParse {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether a best-effort step may tolerate this failure and continue
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::LocatorNotFound { .. } | Error::ActionTimeout { .. }
        )
    }

    /// WebDriver error code, if this came from the driver
    pub fn webdriver_code(&self) -> Option<&str> {
        match self {
            Error::WebDriver { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }

    /// The driver or an HTTP request gave up waiting
    ///
    /// The runner reports these as the step's own timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::ActionTimeout { .. } => true,
            Error::WebDriver { code, .. } => matches!(code.as_str(), "timeout" | "script timeout"),
            Error::Http(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Element interaction errors that go away once the locator is resolved again
    pub fn is_transient_interaction(&self) -> bool {
        matches!(
            self.webdriver_code(),
            Some("stale element reference")
                | Some("element click intercepted")
                | Some("element not interactable")
        )
    }

    /// Stable machine-readable code used in JSON reports
    pub fn code(&self) -> &'static str {
        match self {
            Error::LocatorNotFound { .. } => "LOCATOR_NOT_FOUND",
            Error::ActionTimeout { .. } => "ACTION_TIMEOUT",
            Error::AssertionFailed { .. } => "ASSERTION_FAILED",
            Error::NavigationFailed { .. } => "NAVIGATION_FAILED",
            Error::Aborted => "ABORTED",
            Error::DriverNotRunning(_)
            | Error::DriverSpawnTimeout { .. }
            | Error::DriverNotFound(_) => "DRIVER_UNAVAILABLE",
            Error::SessionCreate(_) | Error::SessionClosed => "SESSION_ERROR",
            Error::Config(_)
            | Error::ConfigParse(_)
            | Error::ScenarioParse { .. }
            | Error::InvalidLocator { .. } => "CONFIG_ERROR",
            _ => "UNEXPECTED_EXCEPTION",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_codes() {
        assert_eq!(Error::locator_not_found("#missing").code(), "LOCATOR_NOT_FOUND");
        assert_eq!(Error::assertion_failed("x", "y").code(), "ASSERTION_FAILED");
        assert_eq!(Error::navigation_failed("http://x", "refused").code(), "NAVIGATION_FAILED");
        assert_eq!(Error::Aborted.code(), "ABORTED");
        assert_eq!(Error::Internal("bad".to_string()).code(), "UNEXPECTED_EXCEPTION");
    }

    #[test]
    fn test_driver_timeouts() {
        let driver_timeout = |code: &str| Error::WebDriver {
            command: "navigate".to_string(),
            code: code.to_string(),
            message: "timeout".to_string(),
        };
        assert!(driver_timeout("timeout").is_timeout());
        assert!(driver_timeout("script timeout").is_timeout());
        assert!(!driver_timeout("unknown error").is_timeout());
        assert!(!Error::locator_not_found("#a").is_timeout());
    }

    #[test]
    fn test_only_locator_and_timeout_are_recoverable() {
        assert!(Error::locator_not_found("#a").is_recoverable());
        assert!(Error::action_timeout("wait", Duration::from_secs(1)).is_recoverable());
        assert!(!Error::assertion_failed("a", "b").is_recoverable());
        assert!(!Error::navigation_failed("u", "r").is_recoverable());
    }

    #[test]
    fn test_transient_interaction_codes() {
        let stale = Error::WebDriver {
            command: "element click".to_string(),
            code: "stale element reference".to_string(),
            message: "element is not attached".to_string(),
        };
        assert!(stale.is_transient_interaction());
        assert_eq!(stale.code(), "UNEXPECTED_EXCEPTION");

        let other = Error::WebDriver {
            command: "element click".to_string(),
            code: "unknown error".to_string(),
            message: "boom".to_string(),
        };
        assert!(!other.is_transient_interaction());
    }

    #[test]
    fn test_action_timeout_message() {
        let err = Error::action_timeout("click text=Entrar", Duration::from_millis(1500));
        assert_eq!(err.to_string(), "click text=Entrar did not complete within 1500 ms");
        assert_eq!(err.code(), "ACTION_TIMEOUT");
    }
}
