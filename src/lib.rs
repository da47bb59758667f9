//! webscenario - declarative browser scenarios over WebDriver
//!
//! This library loads UI test scenarios, runs them against a browser through
//! the W3C WebDriver protocol and reports structured outcomes.

pub mod browser;
pub mod cli;
pub mod commands;
pub mod common;
pub mod scenario;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use scenario::{Outcome, Scenario, ScenarioReport, ScenarioRunner};
