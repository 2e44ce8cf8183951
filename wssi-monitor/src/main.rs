//! wssi-monitor - WSSI threshold alerting
//!
//! One pass by default; `--daemon` repeats every `--interval` seconds until
//! interrupted.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wssi_common::analytics::AnalyticsStore;
use wssi_common::config::{env_string, resolve_analytics_dir, DataDirInitializer, DataDirResolver, TomlConfig};
use wssi_monitor::store::init_alert_database;
use wssi_monitor::{Monitor, MonitorConfig};

/// Command-line arguments for wssi-monitor
#[derive(Parser, Debug)]
#[command(name = "wssi-monitor")]
#[command(about = "WSSI alert monitor")]
#[command(version)]
struct Args {
    /// Keep running, checking every --interval seconds
    #[arg(long)]
    daemon: bool,

    /// Seconds between checks in daemon mode
    #[arg(long, default_value = "300", env = "WSSI_MONITOR_INTERVAL")]
    interval: u64,

    /// Print the alerts a pass would send without sending or recording them
    #[arg(long)]
    dry_run: bool,

    /// Send a synthetic critical alert through every channel and exit
    #[arg(long)]
    test_alert: bool,

    /// Monitor config file (default: <data dir>/config/alerts.json)
    #[arg(short, long, env = "WSSI_MONITOR_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory (alerts.db, analytics store)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let toml = TomlConfig::load_default();
    let directives = toml.logging.directives(&["wssi_monitor", "wssi_common"], "info");
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| directives.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting WSSI Monitor (wssi-monitor) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();

    let data_dir = DataDirResolver::new("monitor")
        .with_cli_arg(args.data_dir)
        .with_toml(toml.clone())
        .resolve();
    let initializer = DataDirInitializer::new(data_dir);
    initializer.ensure_directory_exists()?;

    let config_path = args
        .config
        .unwrap_or_else(|| initializer.data_dir().join("config").join("alerts.json"));
    let config = MonitorConfig::load_or_create(&config_path)
        .with_context(|| format!("Failed to load monitor config {}", config_path.display()))?;
    info!("Monitor config: {}", config_path.display());
    if !config.any_channel_enabled() {
        warn!("No alert channels enabled; alerts will only be recorded");
    }

    let analytics_dir = resolve_analytics_dir(&toml, initializer.analytics_dir());
    let fallback_dir = env_string("WSSI_ANALYTICS_FALLBACK_DIR").map(PathBuf::from);
    info!("Analytics store: {}", analytics_dir.display());
    let store = AnalyticsStore::new(analytics_dir, fallback_dir);

    let db_path = initializer.alert_database_path();
    let pool = init_alert_database(&db_path)
        .await
        .with_context(|| format!("Failed to open alert database {}", db_path.display()))?;

    let monitor = Monitor::new(config, store, pool)?;

    if args.test_alert {
        let deliveries = monitor.send_test_alert(Utc::now()).await;
        let delivered = deliveries.iter().filter(|d| d.delivered).count();
        println!("Test alert sent ({} of {} channels delivered)", delivered, deliveries.len());
        for d in &deliveries {
            println!("  {} {}", if d.delivered { "+" } else { "-" }, d.channel.as_str());
        }
        return Ok(());
    }

    if args.dry_run {
        match monitor.plan().await? {
            None => println!("No WSSI data available"),
            Some(planned) => {
                println!("Dry run: would send {} alert(s)", planned.iter().filter(|p| !p.suppressed).count());
                for p in &planned {
                    let note = if p.suppressed { " (suppressed repeat)" } else { "" };
                    println!("  - {}: {}{}", p.alert.severity, p.alert.message, note);
                }
            }
        }
        return Ok(());
    }

    if args.daemon {
        let interval = Duration::from_secs(args.interval.max(1));
        monitor.run_daemon(interval, shutdown_signal()).await;
        return Ok(());
    }

    let summary = monitor.run_once(Utc::now()).await?;
    info!(
        "Pass complete: {} triggered, {} sent, {} suppressed, {} recovered",
        summary.triggered, summary.sent, summary.suppressed, summary.recovered
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C");
}
