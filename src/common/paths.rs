//! Configuration, log and report paths
//!
//! Uses the directories crate for platform-appropriate locations:
//! - Linux: `~/.config/webscenario/`, `~/.local/share/webscenario/`
//! - macOS: `~/Library/Application Support/webscenario/`
//! - Windows: `%APPDATA%\webscenario\`

use std::io;
use std::path::PathBuf;

/// Application name used for all platform directories
const APP_NAME: &str = "webscenario";

/// Environment variable that points at an explicit config file
pub const CONFIG_ENV: &str = "WEBSCENARIO_CONFIG";

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", APP_NAME)
}

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
///
/// `WEBSCENARIO_CONFIG` takes precedence over the platform location
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the path to the log directory
pub fn log_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().join("logs"))
}

/// Get the directory JSON scenario reports are written to
pub fn reports_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().join("reports"))
}

/// Ensure the reports directory exists
pub fn ensure_reports_dir() -> io::Result<Option<PathBuf>> {
    if let Some(dir) = reports_dir() {
        if !dir.exists() {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(Some(dir))
    } else {
        Ok(None)
    }
}
