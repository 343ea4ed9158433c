//! # AI Gateway Control Plane
//!
//! Loads declarative AI Gateway configuration from a directory, validates
//! it and compiles the filter configuration of every gateway.
//!
//! ## Usage
//!
//! ```bash
//! # Reconcile ./config once
//! ai-gateway-control-plane
//!
//! # Use a settings file and keep watching the configuration directory
//! ai-gateway-control-plane --settings controller.toml --watch
//!
//! # Environment overrides
//! AIGW_CONFIG_DIR=/etc/aigw AIGW_LOG_LEVEL=debug ai-gateway-control-plane
//! ```

mod controller;

use anyhow::{Context, Result};
use clap::Parser;
use controller::Controller;
use gateway_config::ControllerSettings;
use gateway_telemetry::{init_logging, Metrics};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "ai-gateway-control-plane", author, version, about, long_about = None)]
struct Args {
    /// Settings file (TOML, YAML or JSON)
    #[arg(short, long, env = "AIGW_SETTINGS")]
    settings: Option<PathBuf>,

    /// Configuration directory, overriding the settings
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Keep running and reconcile on every change
    #[arg(short, long)]
    watch: bool,

    /// Write rendered filter configuration to this directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

/// Application entry point
#[tokio::main]
async fn main() {
    let args = Args::parse();

    let settings = match load_settings(&args) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load settings: {e:#}");
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&settings.logging_config()) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config_dir = %settings.config_dir.display(),
        watch = settings.watch,
        "Starting AI Gateway control plane"
    );

    if let Err(e) = run(settings, args.output_dir).await {
        error!(error = %format!("{e:#}"), "Control plane failed");
        std::process::exit(1);
    }
}

/// Settings from file and environment, with command-line overrides on top.
fn load_settings(args: &Args) -> Result<ControllerSettings> {
    let mut settings = ControllerSettings::load(args.settings.as_deref())?;
    if let Some(dir) = &args.config_dir {
        settings.config_dir = dir.clone();
    }
    settings.watch |= args.watch;
    Ok(settings)
}

/// Main application logic
async fn run(settings: ControllerSettings, output_dir: Option<PathBuf>) -> Result<()> {
    let metrics = Arc::new(Metrics::new().context("Failed to register metrics")?);
    let mut controller = Controller::new(&settings, Arc::clone(&metrics)).with_output_dir(output_dir);

    let outcome = controller.reconcile()?;
    for (gateway, filter) in &outcome.filters {
        info!(gateway = %gateway, rules = filter.rules.len(), uuid = %filter.uuid, "Filter configuration compiled");
    }

    if !settings.watch {
        debug!(metrics = %metrics.render().unwrap_or_default(), "Final metrics");
        return Ok(());
    }

    watch(&mut controller, settings.debounce).await
}

/// Reconcile after every burst of file system events until interrupted.
///
/// Failed passes are logged; the last good configuration stays in effect.
async fn watch(controller: &mut Controller, debounce: Duration) -> Result<()> {
    let (tx, mut rx) = mpsc::channel::<Event>(1024);
    let mut watcher = RecommendedWatcher::new(
        move |result: Result<Event, notify::Error>| match result {
            Ok(event) => {
                let _ = tx.blocking_send(event);
            }
            Err(e) => warn!(error = %e, "File watcher error"),
        },
        Config::default(),
    )
    .context("Failed to create file watcher")?;
    watcher
        .watch(controller.config_dir(), RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch {}", controller.config_dir().display()))?;

    info!(
        path = %controller.config_dir().display(),
        debounce_ms = debounce.as_millis() as u64,
        "Watching configuration directory"
    );

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else {
                    warn!("File watcher stopped");
                    return Ok(());
                };
                if !is_relevant(&event) {
                    continue;
                }
                debug!(paths = ?event.paths, "Configuration change detected");

                // Collapse the burst of events from one edit into one pass.
                loop {
                    tokio::select! {
                        Some(_) = rx.recv() => continue,
                        () = tokio::time::sleep(debounce) => break,
                    }
                }

                if let Err(e) = controller.reconcile() {
                    error!(error = %format!("{e:#}"), "Reconciliation failed; keeping last configuration");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                return Ok(());
            }
        }
    }
}

fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind};

    #[test]
    fn test_args() {
        let args = Args::try_parse_from([
            "ai-gateway-control-plane",
            "--config-dir",
            "/etc/aigw",
            "--watch",
        ])
        .unwrap();
        assert_eq!(args.config_dir, Some(PathBuf::from("/etc/aigw")));
        assert!(args.watch);
        assert_eq!(args.output_dir, None);
    }

    #[test]
    fn test_relevant_events() {
        assert!(is_relevant(&Event::new(EventKind::Create(CreateKind::File))));
        assert!(!is_relevant(&Event::new(EventKind::Access(AccessKind::Any))));
    }
}
