//! CLI command handling
//!
//! Dispatches CLI commands to the scenario runner and formats output.
//! Returns the process exit code: 0 when every scenario passed, 1 when one
//! failed, 2 when one errored.

pub mod spawn;

use std::path::Path;
use std::sync::Arc;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use crate::browser::WebDriverLauncher;
use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::{paths, Error, Result};
use crate::scenario::{
    report_stems, AbortHandle, Scenario, ScenarioReport, ScenarioRunner, SuiteSummary,
};

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, abort: &AbortHandle) -> Result<i32> {
    match command {
        Commands::Run { scenario, base_url } => {
            let config = load_config(base_url)?;
            let scenario = Scenario::from_file(&scenario, &config.variables())?;
            print_warnings(&scenario);

            let reports = execute(config, std::slice::from_ref(&scenario), 1, abort, false).await?;
            let Some(report) = reports.into_iter().next() else {
                return Err(Error::Internal("runner returned no report".to_string()));
            };

            print!("{}", report.render());
            save_report(&report, &report.file_stem());
            Ok(report.exit_code())
        }

        Commands::Validate { scenario: path } => {
            let config = load_config(None)?;
            let scenario = Scenario::from_file(&path, &config.variables())?;

            println!(
                "{} {} ({} steps)",
                "✓".green(),
                scenario.name.white().bold(),
                scenario.steps.len()
            );
            if let Some(description) = &scenario.description {
                println!("  {}", description.dimmed());
            }
            for (index, step) in scenario.steps.iter().enumerate() {
                println!("  {}. {}", index + 1, step.action.describe());
            }
            print_warnings(&scenario);
            Ok(0)
        }

        Commands::Suite {
            dir,
            base_url,
            jobs,
            tag,
        } => {
            let config = load_config(base_url)?;
            let jobs = jobs.unwrap_or(config.suite.jobs);
            let scenarios = select_scenarios(&dir, &config, tag.as_deref())?;

            if scenarios.is_empty() {
                println!("No scenarios found in {}", dir.display());
                return Ok(0);
            }

            println!(
                "{} {} scenarios from {} ({} at a time)",
                "Running".blue().bold(),
                scenarios.len(),
                dir.display(),
                jobs.max(1)
            );

            let reports = execute(config, &scenarios, jobs, abort, true).await?;

            for (report, stem) in reports.iter().zip(report_stems(&reports)) {
                print!("{}", report.render());
                save_report(report, &stem);
            }

            let summary = SuiteSummary::from_reports(&reports);
            println!("\n{}", summary.render());
            Ok(summary.exit_code())
        }
    }
}

/// Load configuration and apply a command line base URL
fn load_config(base_url: Option<String>) -> Result<Config> {
    let mut config = Config::load()?;
    if let Some(url) = base_url {
        config.target.base_url = url;
    }
    Ok(config)
}

fn select_scenarios(dir: &Path, config: &Config, tag: Option<&str>) -> Result<Vec<Scenario>> {
    let scenarios = Scenario::load_all(dir, &config.variables())?;
    Ok(match tag {
        Some(tag) => scenarios.into_iter().filter(|s| s.has_tag(tag)).collect(),
        None => scenarios,
    })
}

fn print_warnings(scenario: &Scenario) {
    for warning in scenario.warnings() {
        println!("  {} {}", "warning:".yellow(), warning);
    }
}

/// Write the JSON report to the data directory; failures only warn
fn save_report(report: &ScenarioReport, stem: &str) {
    let dir = match paths::ensure_reports_dir() {
        Ok(Some(dir)) => dir,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!("Cannot create reports directory: {}", e);
            return;
        }
    };
    match report.write_json_as(&dir, stem) {
        Ok(path) => tracing::debug!("Report written to {}", path.display()),
        Err(e) => tracing::warn!("Failed to write report for '{}': {}", report.name, e),
    }
}

/// Start the driver if needed and run scenarios against it
async fn execute(
    config: Config,
    scenarios: &[Scenario],
    jobs: usize,
    abort: &AbortHandle,
    show_progress: bool,
) -> Result<Vec<ScenarioReport>> {
    let driver = spawn::ensure_driver_running(&config).await?;

    let launcher = Arc::new(WebDriverLauncher::new(config.driver.url.clone()));
    let runner = ScenarioRunner::new(config, launcher)?.with_abort(abort);

    let reports = if show_progress {
        let pb = ProgressBar::new(scenarios.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .map(|style| style.progress_chars("=> "))
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        let reports = runner
            .run_all_with(scenarios, jobs, |report| {
                pb.set_message(format!("{} {}", report.name, report.outcome.status()));
                pb.inc(1);
            })
            .await;
        pb.finish_and_clear();
        reports
    } else {
        runner.run_all(scenarios, jobs).await
    };

    if let Some(driver) = driver {
        driver.stop().await;
    }
    Ok(reports)
}
