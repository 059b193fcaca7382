//! `merlyad`: a small daemon binary wiring Sentinel's scheduler into an
//! always-on process.
//!
//! The original system embeds `SentinelAgent` directly inside the larger
//! assistant process (`athena_ai/agents/sentinel.py`); this binary stands
//! in for that "always-on monitoring" deployment mode as its own process,
//! following `aivcsd`'s `init_tracing`-then-`tracing::info!` shape.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use merlya_sentinel::{AlertManager, HealthCheck, Sentinel};
use tracing::Level;

const STATS_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "merlyad")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Merlya Sentinel daemon", long_about = None)]
struct Cli {
    /// Enable verbose (debug-level) logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines.
    #[arg(long)]
    json: bool,

    /// JSON file of `HealthCheck` definitions to load at startup. Defaults
    /// to `~/.merlya/sentinel.json`; a missing file starts with no checks
    /// configured, matching the original agent's "nothing is monitored
    /// until `add_check` is called" behavior.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn default_config_path() -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    home.join(".merlya").join("sentinel.json")
}

fn load_checks(path: &PathBuf) -> Vec<HealthCheck> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "no sentinel config found; starting with no health checks");
        return Vec::new();
    }
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<Vec<HealthCheck>>(&content) {
            Ok(checks) => checks,
            Err(err) => {
                tracing::error!(error = %err, path = %path.display(), "failed to parse sentinel config");
                Vec::new()
            }
        },
        Err(err) => {
            tracing::error!(error = %err, path = %path.display(), "failed to read sentinel config");
            Vec::new()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    merlya_core::telemetry::init_tracing(cli.json, level);

    tracing::info!("merlyad starting");

    let config_path = cli.config.unwrap_or_else(default_config_path);
    let checks = load_checks(&config_path);
    let check_count = checks.len();

    let alert_manager = AlertManager::new(None, false);
    let alert_callback = Arc::new(|alert: &merlya_sentinel::Alert| {
        tracing::warn!(
            check = %alert.check_name,
            severity = ?alert.severity,
            "sentinel alert"
        );
    });
    let sentinel = Arc::new(Sentinel::new(alert_manager, Some(alert_callback)));

    for check in checks {
        sentinel.add_check(check);
    }
    tracing::info!(checks = check_count, "loaded health checks");

    if check_count > 0 {
        sentinel.start()?;
        tracing::info!("sentinel scheduler started");
    } else {
        tracing::warn!("no health checks configured; idling without starting the scheduler");
    }

    let mut stats_ticker = tokio::time::interval(STATS_INTERVAL);
    stats_ticker.tick().await; // first tick fires immediately; skip it

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received shutdown signal");
                break;
            }
            _ = stats_ticker.tick() => {
                let stats = sentinel.stats();
                tracing::info!(
                    checks_run = stats.checks_run,
                    checks_passed = stats.checks_passed,
                    checks_failed = stats.checks_failed,
                    active_alerts = sentinel.get_alerts().len(),
                    "sentinel stats"
                );
            }
        }
    }

    sentinel.stop().await;
    tracing::info!("merlyad stopped");
    Ok(())
}
