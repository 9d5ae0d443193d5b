//! # Tally POS Terminal Entry Point
//!
//! ```text
//! tally-terminal [--config <path>]
//! ```
//!
//! Without `--config`, `terminal.toml` is read from the platform config
//! directory when present. `TALLY_*` environment variables override it.

use std::path::PathBuf;
use std::process::ExitCode;

use tally_terminal::{init_tracing, run, TerminalConfig};
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let mut config_path: Option<PathBuf> = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => match args.next() {
                Some(path) => config_path = Some(PathBuf::from(path)),
                None => {
                    eprintln!("--config needs a path");
                    return ExitCode::FAILURE;
                }
            },
            "--help" | "-h" => {
                println!("Usage: tally-terminal [--config <path>]");
                return ExitCode::SUCCESS;
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                return ExitCode::FAILURE;
            }
        }
    }

    let config = match TerminalConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Terminal stopped with an error");
            ExitCode::FAILURE
        }
    }
}
