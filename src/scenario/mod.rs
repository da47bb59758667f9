//! Browser scenarios
//!
//! Scenarios are loaded from YAML (or built in code), executed by the
//! [`ScenarioRunner`] against a fresh browser session each, and reported
//! as structured [`ScenarioReport`]s.

pub mod builder;
pub mod config;
pub mod locator;
pub mod probe;
pub mod report;
pub mod runner;

pub use builder::{LoginFixture, ScenarioBuilder};
pub use config::{Action, Scenario, Step};
pub use locator::{Locator, LocatorKind};
pub use report::{
    report_stems, ActionRecord, ActionStatus, FailureKind, Outcome, ScenarioReport, SuiteSummary,
};
pub use runner::{AbortHandle, AbortSignal, Phase, ScenarioRunner};
