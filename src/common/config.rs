//! Configuration file handling

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Application under test
    #[serde(default)]
    pub target: TargetConfig,

    /// Browser session settings
    #[serde(default)]
    pub browser: BrowserConfig,

    /// WebDriver endpoint settings
    #[serde(default)]
    pub driver: DriverConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Credentials exposed to scenarios as `${email}` and `${password}`
    #[serde(default)]
    pub credentials: Credentials,

    /// Suite execution settings
    #[serde(default)]
    pub suite: SuiteConfig,
}

/// Application under test
#[derive(Debug, Deserialize, Clone)]
pub struct TargetConfig {
    /// Base URL relative scenario URLs are resolved against
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

/// Browser session settings
#[derive(Debug, Deserialize, Clone)]
pub struct BrowserConfig {
    /// WebDriver `browserName` capability ("chrome" or "firefox")
    #[serde(default = "default_browser_name")]
    pub name: String,

    /// Run without a visible window
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Window size
    #[serde(default)]
    pub viewport: Viewport,

    /// WebDriver page load strategy ("none", "eager" or "normal")
    #[serde(default = "default_page_load_strategy")]
    pub page_load_strategy: String,

    /// Extra browser command line arguments
    #[serde(default = "default_browser_args")]
    pub args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            name: default_browser_name(),
            headless: default_true(),
            viewport: Viewport::default(),
            page_load_strategy: default_page_load_strategy(),
            args: default_browser_args(),
        }
    }
}

fn default_browser_name() -> String {
    "chrome".to_string()
}
fn default_true() -> bool {
    true
}
fn default_page_load_strategy() -> String {
    "eager".to_string()
}
fn default_browser_args() -> Vec<String> {
    vec!["--disable-dev-shm-usage".to_string()]
}

/// Browser window size in CSS pixels
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// WebDriver endpoint settings
#[derive(Debug, Deserialize, Clone)]
pub struct DriverConfig {
    /// WebDriver server URL
    #[serde(default = "default_driver_url")]
    pub url: String,

    /// Driver executable; searched on PATH as `chromedriver` when unset
    pub path: Option<PathBuf>,

    /// Spawn the driver when the endpoint is not reachable
    #[serde(default = "default_true")]
    pub spawn: bool,

    /// How long to wait for a spawned driver to report ready
    #[serde(default = "default_driver_startup")]
    pub startup_timeout_secs: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            url: default_driver_url(),
            path: None,
            spawn: default_true(),
            startup_timeout_secs: default_driver_startup(),
        }
    }
}

fn default_driver_url() -> String {
    "http://localhost:9515".to_string()
}
fn default_driver_startup() -> u64 {
    10
}

/// Timeout settings
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Default timeout for element actions and assertions
    #[serde(default = "default_action")]
    pub action_ms: u64,

    /// Default timeout for navigation
    #[serde(default = "default_navigation")]
    pub navigation_ms: u64,

    /// Interval between readiness checks while waiting
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Wall-clock limit for a whole scenario
    #[serde(default = "default_scenario")]
    pub scenario_secs: u64,

    /// Limit for session creation
    #[serde(default = "default_launch")]
    pub launch_ms: u64,

    /// Limit for session teardown
    #[serde(default = "default_teardown")]
    pub teardown_ms: u64,

    /// Limit for a single `expect_json` HTTP request
    #[serde(default = "default_http")]
    pub http_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            action_ms: default_action(),
            navigation_ms: default_navigation(),
            poll_interval_ms: default_poll_interval(),
            scenario_secs: default_scenario(),
            launch_ms: default_launch(),
            teardown_ms: default_teardown(),
            http_ms: default_http(),
        }
    }
}

fn default_action() -> u64 {
    5_000
}
fn default_navigation() -> u64 {
    10_000
}
fn default_poll_interval() -> u64 {
    100
}
fn default_scenario() -> u64 {
    300
}
fn default_launch() -> u64 {
    30_000
}
fn default_teardown() -> u64 {
    5_000
}
fn default_http() -> u64 {
    30_000
}

impl Timeouts {
    pub fn action(&self) -> Duration {
        Duration::from_millis(self.action_ms)
    }

    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn scenario(&self) -> Duration {
        Duration::from_secs(self.scenario_secs)
    }

    pub fn launch(&self) -> Duration {
        Duration::from_millis(self.launch_ms)
    }

    pub fn teardown(&self) -> Duration {
        Duration::from_millis(self.teardown_ms)
    }

    pub fn http(&self) -> Duration {
        Duration::from_millis(self.http_ms)
    }
}

/// Login credentials for the application under test
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Credentials {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Suite execution settings
#[derive(Debug, Deserialize, Clone)]
pub struct SuiteConfig {
    /// Scenarios run concurrently, each with its own browser session
    #[serde(default = "default_jobs")]
    pub jobs: usize,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
        }
    }
}

fn default_jobs() -> usize {
    1
}

impl Config {
    /// Load configuration from the default config file, then apply
    /// environment overrides
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        let mut config = match config_path() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }

    /// Apply `WEBSCENARIO_*` environment overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(url) = lookup("WEBSCENARIO_BASE_URL") {
            self.target.base_url = url;
        }
        if let Some(url) = lookup("WEBSCENARIO_WEBDRIVER_URL") {
            self.driver.url = url;
        }
        if let Some(email) = lookup("WEBSCENARIO_EMAIL") {
            self.credentials.email = Some(email);
        }
        if let Some(password) = lookup("WEBSCENARIO_PASSWORD") {
            self.credentials.password = Some(password);
        }
    }

    /// Variables available to scenarios for `${name}` substitution
    pub fn variables(&self) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        vars.insert("base_url".to_string(), self.target.base_url.clone());
        if let Some(email) = &self.credentials.email {
            vars.insert("email".to_string(), email.clone());
        }
        if let Some(password) = &self.credentials.password {
            vars.insert("password".to_string(), password.clone());
        }
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.target.base_url, "http://localhost:3000");
        assert_eq!(config.driver.url, "http://localhost:9515");
        assert!(config.browser.headless);
        assert_eq!(config.browser.viewport, Viewport { width: 1280, height: 720 });
        assert_eq!(config.timeouts.action_ms, 5_000);
        assert_eq!(config.suite.jobs, 1);
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::from_toml(
            r#"
[target]
base_url = "http://127.0.0.1:8080"

[browser]
headless = false
viewport = { width = 390, height = 844 }

[timeouts]
action_ms = 1500

[credentials]
email = "admin@example.com"
"#,
        )
        .unwrap();

        assert_eq!(config.target.base_url, "http://127.0.0.1:8080");
        assert!(!config.browser.headless);
        assert_eq!(config.browser.viewport.width, 390);
        assert_eq!(config.browser.name, "chrome");
        assert_eq!(config.timeouts.action(), Duration::from_millis(1500));
        assert_eq!(config.timeouts.navigation_ms, 10_000);

        let vars = config.variables();
        assert_eq!(vars["base_url"], "http://127.0.0.1:8080");
        assert_eq!(vars["email"], "admin@example.com");
        assert!(!vars.contains_key("password"));
    }

    #[test]
    fn test_invalid_toml_is_config_parse_error() {
        let err = Config::from_toml("[timeouts]\naction_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, crate::common::Error::ConfigParse(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            "WEBSCENARIO_BASE_URL" => Some("http://staging.local".to_string()),
            "WEBSCENARIO_PASSWORD" => Some("s3cret".to_string()),
            "WEBSCENARIO_EMAIL" => Some(String::new()),
            _ => None,
        });

        assert_eq!(config.target.base_url, "http://staging.local");
        assert_eq!(config.credentials.password.as_deref(), Some("s3cret"));
        assert_eq!(config.credentials.email, None);
    }

    #[test]
    fn test_poll_interval_never_zero() {
        let mut timeouts = Timeouts::default();
        timeouts.poll_interval_ms = 0;
        assert_eq!(timeouts.poll_interval(), Duration::from_millis(1));
    }
}
