//! AI Gateway CLI
//!
//! Offline inspection of declarative AI Gateway configuration: validation,
//! routing explanations, cost previews and rendered filter configuration.

use anyhow::Result;
use clap::Parser;
use gateway_telemetry::{init_logging, LoggingConfig};

mod cli;
mod commands;
mod output;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    if let Err(e) = init_logging(&logging_config(cli.verbose, cli.json)) {
        eprintln!("{e}");
    }

    cli.execute().await
}

/// Logging for a verbosity count. Logs go to stderr so rendered documents
/// on stdout stay parseable.
fn logging_config(verbose: u8, json: bool) -> LoggingConfig {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    LoggingConfig::new()
        .with_level(level)
        .with_json(json)
        .with_target(verbose > 1)
        .with_stderr(true)
}
