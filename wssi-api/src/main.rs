//! wssi-api - WSSI analytics HTTP service
//!
//! Serves the upstream analytics artifacts to API-key holders, issues and
//! meters keys, runs Stripe checkout, and hosts the Fragility Brief archive.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wssi_api::api::admin::{ensure_admin_key, AdminBootstrap};
use wssi_api::config::ApiConfig;
use wssi_api::db::init_database;
use wssi_api::{build_router, AppState};
use wssi_common::config::{DataDirInitializer, DataDirResolver, TomlConfig};
use wssi_common::stripe::StripeConfig;

/// Command-line arguments for wssi-api
#[derive(Parser, Debug)]
#[command(name = "wssi-api")]
#[command(about = "WSSI analytics API")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8000", env = "WSSI_API_PORT")]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0", env = "WSSI_API_HOST")]
    host: String,

    /// Data directory (database, analytics store, brief archive)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let toml = TomlConfig::load_default();
    let directives = toml.logging.directives(&["wssi_api", "wssi_common", "tower_http"], "info");
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| directives.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting WSSI API (wssi-api) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();

    let data_dir = DataDirResolver::new("api")
        .with_cli_arg(args.data_dir)
        .with_toml(toml.clone())
        .resolve();
    let initializer = DataDirInitializer::new(data_dir);
    initializer.ensure_directory_exists()?;

    let db_path = initializer.api_database_path();
    info!("Database path: {}", db_path.display());
    let pool = init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let config = ApiConfig::from_env(initializer.data_dir(), &toml);
    info!("Analytics store: {}", config.analytics_dir.display());
    if let Some(fallback) = &config.analytics_fallback_dir {
        info!("Analytics fallback: {}", fallback.display());
    }
    info!("Brief archive: {} (keeping {})", config.briefs_dir.display(), config.brief_retention);
    if config.brief_publish_token.is_none() {
        warn!("WSSI_BRIEF_PUBLISH_TOKEN not set; brief publishing is disabled");
    }
    if config.analytics_ingest_token.is_none() {
        warn!("No ingest token set; analytics ingest is disabled");
    }

    match ensure_admin_key(&pool, config.bootstrap_admin_key.as_deref()).await {
        Ok(AdminBootstrap::Existing) => {}
        Ok(AdminBootstrap::Configured) => info!("Admin key taken from WSSI_BOOTSTRAP_ADMIN_KEY"),
        Ok(AdminBootstrap::Generated(key)) => {
            // Printed once; only the hash is stored
            println!("============================================================");
            println!("Bootstrap admin key (store it now, it is not shown again):");
            println!("{}", key);
            println!("============================================================");
        }
        Err(e) => {
            error!("Admin key bootstrap failed: {}", e);
            return Err(e.into());
        }
    }

    let stripe = StripeConfig::from_env();
    let readiness = stripe.readiness();
    info!(
        "Billing: checkout {}, webhook {}",
        if readiness.ready_for_checkout { "ready" } else { "not configured" },
        if readiness.ready_for_webhook { "ready" } else { "not configured" }
    );

    let state = AppState::new(pool, config, stripe).context("Failed to build application state")?;
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", args.host, args.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("wssi-api listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
