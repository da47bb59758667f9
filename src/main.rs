//! webscenario - declarative browser scenarios over WebDriver
//!
//! Runs YAML scenarios against a web application through a W3C WebDriver
//! server and reports pass / fail / error per scenario.

use clap::Parser;
use commands::Commands;
use webscenario::common::logging;
use webscenario::scenario::AbortHandle;
use webscenario::{cli, commands};

#[derive(Parser)]
#[command(name = "webscenario", about = "Run declarative browser scenarios over WebDriver")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Held until exit so buffered log lines reach the file
    let _log_guard = logging::init_cli();

    let abort = AbortHandle::new();
    {
        let abort = abort.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, closing browser sessions");
                abort.abort();
            }
        });
    }

    let code = match cli::dispatch(cli.command, &abort).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            if let Some(path) = logging::log_path() {
                eprintln!("See {} for details", path.display());
            }
            2
        }
    };

    drop(_log_guard);
    std::process::exit(code);
}
