//! Common utilities shared by the CLI and the runner

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};

/// Resolve a scenario URL against the configured base URL.
///
/// Absolute URLs are returned unchanged; paths are joined onto the base
/// without doubling or dropping the separating slash.
pub fn resolve_url(base: &str, url: &str) -> String {
    if url.contains("://") || url.starts_with("data:") || url.starts_with("about:") {
        return url.to_string();
    }
    let base = base.trim_end_matches('/');
    if url.is_empty() {
        base.to_string()
    } else if let Some(rest) = url.strip_prefix('/') {
        format!("{}/{}", base, rest)
    } else {
        format!("{}/{}", base, url)
    }
}
