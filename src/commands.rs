//! CLI command definitions
//!
//! Defines the clap commands for the scenario runner CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run a single scenario file
    Run {
        /// Path to the scenario YAML
        scenario: PathBuf,

        /// Base URL of the application under test (overrides config)
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Parse a scenario and report brittle locators without launching a browser
    Validate {
        /// Path to the scenario YAML
        scenario: PathBuf,
    },

    /// Run every scenario in a directory
    Suite {
        /// Directory containing scenario YAML files (not searched recursively)
        dir: PathBuf,

        /// Base URL of the application under test (overrides config)
        #[arg(long)]
        base_url: Option<String>,

        /// Scenarios to run concurrently, each in its own browser
        #[arg(long, short)]
        jobs: Option<usize>,

        /// Only run scenarios carrying this tag
        #[arg(long, short)]
        tag: Option<String>,
    },
}
