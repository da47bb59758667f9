//! Browser abstraction
//!
//! The runner talks to a browser only through [`Page`] and [`Launcher`], so a
//! real WebDriver session and the in-memory [`fake::FakeSite`] are
//! interchangeable.

pub mod fake;
pub mod session;
pub mod webdriver;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::common::config::BrowserConfig;
use crate::common::Result;
use crate::scenario::locator::Locator;

pub use session::Session;
pub use webdriver::{WebDriverLauncher, WebDriverPage};

/// Opaque handle to an element found by [`Page::query`]
///
/// Handles are only valid until the next query or navigation; they are never
/// cached across actions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub String);

/// Document load milestones, as reported by `document.readyState`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    /// Navigation committed; any ready state
    Commit,
    /// DOM parsed (`interactive` or `complete`)
    #[serde(alias = "domcontentloaded")]
    DomContentLoaded,
    /// All subresources loaded (`complete`)
    Load,
}

impl LoadState {
    /// Whether a `document.readyState` value satisfies this milestone
    pub fn satisfied_by(&self, ready_state: &str) -> bool {
        match self {
            LoadState::Commit => true,
            LoadState::DomContentLoaded => matches!(ready_state, "interactive" | "complete"),
            LoadState::Load => ready_state == "complete",
        }
    }
}

impl std::fmt::Display for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LoadState::Commit => "commit",
            LoadState::DomContentLoaded => "dom_content_loaded",
            LoadState::Load => "load",
        };
        f.write_str(s)
    }
}

/// Element conditions for `wait_for`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

impl std::fmt::Display for ElementState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ElementState::Visible => "visible",
            ElementState::Hidden => "hidden",
            ElementState::Attached => "attached",
            ElementState::Detached => "detached",
        };
        f.write_str(s)
    }
}

/// A single browser page owned by one session
#[async_trait]
pub trait Page: Send {
    /// Navigate to an absolute URL
    async fn goto(&mut self, url: &str) -> Result<()>;

    /// URL of the current document
    async fn current_url(&mut self) -> Result<String>;

    /// Current `document.readyState`
    async fn ready_state(&mut self) -> Result<String>;

    /// Resolve a locator to all currently attached matches, in document order
    async fn query(&mut self, locator: &Locator) -> Result<Vec<ElementRef>>;

    /// Whether the element is rendered
    async fn is_visible(&mut self, element: &ElementRef) -> Result<bool>;

    /// Rendered text of the element
    async fn text(&mut self, element: &ElementRef) -> Result<String>;

    /// Replace the value of an editable element
    async fn fill(&mut self, element: &ElementRef, value: &str) -> Result<()>;

    /// Click the element
    async fn click(&mut self, element: &ElementRef) -> Result<()>;

    /// Close the page and its browser context
    async fn close(&mut self) -> Result<()>;
}

/// Creates pages for new sessions
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Launch a fresh browser context with one page
    async fn launch(&self, browser: &BrowserConfig) -> Result<Box<dyn Page>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_state_milestones() {
        assert!(LoadState::Commit.satisfied_by("loading"));
        assert!(!LoadState::DomContentLoaded.satisfied_by("loading"));
        assert!(LoadState::DomContentLoaded.satisfied_by("interactive"));
        assert!(!LoadState::Load.satisfied_by("interactive"));
        assert!(LoadState::Load.satisfied_by("complete"));
    }

    #[test]
    fn test_load_state_accepts_playwright_spelling() {
        let state: LoadState = serde_yaml::from_str("domcontentloaded").unwrap();
        assert_eq!(state, LoadState::DomContentLoaded);
    }
}
