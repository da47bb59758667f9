//! Scenario reports
//!
//! Reports render for humans (colored, 1-based step numbers) and serialize to
//! JSON for tooling (0-based action indices).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use colored::Colorize;
use serde::{Serialize, Serializer};

use crate::common::{Error, Result};

use super::runner::Phase;

/// Category of an expected failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    LocatorNotFound,
    ActionTimeout,
    AssertionFailed,
    NavigationFailed,
}

impl FailureKind {
    /// The kind of an expected failure, `None` for unexpected faults
    pub fn of(error: &Error) -> Option<Self> {
        match error {
            Error::LocatorNotFound { .. } => Some(Self::LocatorNotFound),
            Error::ActionTimeout { .. } => Some(Self::ActionTimeout),
            Error::AssertionFailed { .. } => Some(Self::AssertionFailed),
            Error::NavigationFailed { .. } => Some(Self::NavigationFailed),
            _ => None,
        }
    }
}

/// Final result of a scenario
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Pass,
    /// The page under test did not behave as expected
    Fail {
        kind: FailureKind,
        reason: String,
        failed_action_index: usize,
    },
    /// The runner, driver or environment failed
    Error {
        cause: String,
        failed_action_index: Option<usize>,
    },
}

impl Outcome {
    /// Classify an error raised while running the action at `index`
    pub fn from_error(error: &Error, index: Option<usize>) -> Self {
        match (FailureKind::of(error), index) {
            (Some(kind), Some(failed_action_index)) => Outcome::Fail {
                kind,
                reason: error.to_string(),
                failed_action_index,
            },
            _ => Outcome::Error {
                cause: error.to_string(),
                failed_action_index: index,
            },
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Outcome::Pass => "pass",
            Outcome::Fail { .. } => "fail",
            Outcome::Error { .. } => "error",
        }
    }

    pub fn failed_action_index(&self) -> Option<usize> {
        match self {
            Outcome::Pass => None,
            Outcome::Fail {
                failed_action_index,
                ..
            } => Some(*failed_action_index),
            Outcome::Error {
                failed_action_index,
                ..
            } => *failed_action_index,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Outcome::Pass => None,
            Outcome::Fail { reason, .. } => Some(reason),
            Outcome::Error { cause, .. } => Some(cause),
        }
    }

    /// Process exit code: 0 pass, 1 fail, 2 error
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Pass => 0,
            Outcome::Fail { .. } => 1,
            Outcome::Error { .. } => 2,
        }
    }
}

fn serialize_status<S: Serializer>(outcome: &Outcome, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(outcome.status())
}

/// What happened to one action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Passed,
    /// Best-effort step that failed recoverably
    Tolerated,
    Failed,
    /// Not reached
    Skipped,
}

/// Per-action record
#[derive(Debug, Clone, Serialize)]
pub struct ActionRecord {
    pub index: usize,
    pub action: String,
    pub status: ActionStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

/// Structured result of one scenario run
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    #[serde(serialize_with = "serialize_status")]
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_action_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    pub actions: Vec<ActionRecord>,
    /// Lifecycle phases in the order they were entered
    #[serde(skip)]
    pub phases: Vec<Phase>,
}

impl ScenarioReport {
    pub fn new(
        name: &str,
        outcome: Outcome,
        duration: Duration,
        final_url: Option<String>,
        actions: Vec<ActionRecord>,
        phases: Vec<Phase>,
    ) -> Self {
        let kind = match &outcome {
            Outcome::Fail { kind, .. } => Some(*kind),
            _ => None,
        };
        Self {
            name: name.to_string(),
            kind,
            failed_action_index: outcome.failed_action_index(),
            reason: outcome.reason().map(str::to_string),
            outcome,
            duration_ms: duration.as_millis() as u64,
            final_url,
            actions,
            phases,
        }
    }

    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Pass
    }

    pub fn exit_code(&self) -> i32 {
        self.outcome.exit_code()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Report file name derived from the scenario name
    pub fn file_stem(&self) -> String {
        file_stem(&self.name)
    }

    /// Write `<dir>/<name>.json`, returning the path
    pub fn write_json(&self, dir: &Path) -> Result<PathBuf> {
        self.write_json_as(dir, &self.file_stem())
    }

    /// Write `<dir>/<stem>.json`, returning the path
    pub fn write_json_as(&self, dir: &Path, stem: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.json", stem));
        std::fs::write(&path, self.to_json()?)?;
        Ok(path)
    }

    /// Human-readable report
    pub fn render(&self) -> String {
        let mut out = String::new();
        let secs = self.duration_ms as f64 / 1000.0;

        let header = match &self.outcome {
            Outcome::Pass => format!("{} {} ({:.1}s)", "✓".green(), self.name.white().bold(), secs),
            Outcome::Fail { .. } => format!("{} {} ({:.1}s)", "✗".red(), self.name.white().bold(), secs),
            Outcome::Error { .. } => format!(
                "{} {} ({:.1}s)",
                "!".yellow().bold(),
                self.name.white().bold(),
                secs
            ),
        };
        out.push_str(&header);
        out.push('\n');

        for record in &self.actions {
            let label = format!("Step {}: {}", record.index + 1, record.action);
            let line = match record.status {
                ActionStatus::Passed => format!("  {} {}", "✓".green(), label),
                ActionStatus::Tolerated => format!(
                    "  {} {} {}",
                    "~".yellow(),
                    label,
                    format!("(tolerated: {})", record.error.as_deref().unwrap_or("")).dimmed()
                ),
                ActionStatus::Failed => format!("  {} {}", "✗".red(), label.red()),
                ActionStatus::Skipped => format!("  {} {}", "-".dimmed(), label.dimmed()),
            };
            out.push_str(&line);
            out.push('\n');
        }

        match &self.outcome {
            Outcome::Pass => {}
            Outcome::Fail {
                reason,
                failed_action_index,
                ..
            } => {
                out.push_str(&format!(
                    "  {} at step {}: {}\n",
                    "Failed".red().bold(),
                    failed_action_index + 1,
                    reason
                ));
            }
            Outcome::Error {
                cause,
                failed_action_index,
            } => {
                let at = failed_action_index
                    .map(|i| format!(" at step {}", i + 1))
                    .unwrap_or_default();
                out.push_str(&format!("  {}{}: {}\n", "Error".yellow().bold(), at, cause));
            }
        }

        if let Some(url) = &self.final_url {
            out.push_str(&format!("  {} {}\n", "Final URL:".dimmed(), url));
        }
        out
    }
}

/// Report file name for a scenario name
fn file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "scenario".to_string()
    } else {
        stem
    }
}

/// Distinct report file names for a suite. Names that sanitize to the same
/// stem get `-2`, `-3`, ... in suite order.
pub fn report_stems(reports: &[ScenarioReport]) -> Vec<String> {
    let mut used = HashSet::new();
    reports
        .iter()
        .map(|report| {
            let base = report.file_stem();
            let mut stem = base.clone();
            let mut n = 1;
            while !used.insert(stem.clone()) {
                n += 1;
                stem = format!("{}-{}", base, n);
            }
            if stem != base {
                tracing::warn!(
                    "Report name '{}' collides with another scenario; writing {}.json",
                    report.name,
                    stem
                );
            }
            stem
        })
        .collect()
}

/// Totals across a suite run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuiteSummary {
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
}

impl SuiteSummary {
    pub fn from_reports(reports: &[ScenarioReport]) -> Self {
        let mut summary = Self::default();
        for report in reports {
            match report.outcome {
                Outcome::Pass => summary.passed += 1,
                Outcome::Fail { .. } => summary.failed += 1,
                Outcome::Error { .. } => summary.errored += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.errored
    }

    /// Worst outcome across the suite
    pub fn exit_code(&self) -> i32 {
        if self.errored > 0 {
            2
        } else if self.failed > 0 {
            1
        } else {
            0
        }
    }

    pub fn render(&self) -> String {
        format!(
            "{} scenarios: {} passed, {} failed, {} errored",
            self.total(),
            self.passed.to_string().green(),
            self.failed.to_string().red(),
            self.errored.to_string().yellow()
        )
    }
}
