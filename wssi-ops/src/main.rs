//! wssi-ops - operator commands for the WSSI API
//!
//! Exit status: 0 success, 1 failed check or request, 2 missing input.

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wssi_common::config::TomlConfig;
use wssi_common::stripe::StripeConfig;
use wssi_ops::commands::{analytics, brief, stripe, Exit};
use wssi_ops::ApiClient;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_HASH"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ", ",
    env!("BUILD_PROFILE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "wssi-ops")]
#[command(about = "WSSI operator commands")]
#[command(version = LONG_VERSION)]
struct Cli {
    /// API base URL
    #[arg(long, global = true, env = "WSSI_API_BASE_URL", default_value = "http://localhost:8000")]
    base_url: String,

    /// HTTP timeout in seconds
    #[arg(long, global = true, default_value = "30")]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Publish today's brief edition
    PublishBrief(brief::PublishArgs),
    /// Show whether a brief can be published
    BriefReadiness,
    /// Upload local analytics artifacts to the API
    PushAnalytics(analytics::PushArgs),
    /// Check the local Stripe environment variables
    StripeReadiness,
    /// Look up the configured prices and coupons in Stripe
    StripeVerify,
}

async fn run(cli: Cli) -> anyhow::Result<Exit> {
    let mut out = std::io::stdout().lock();

    let client = || ApiClient::new(&cli.base_url, Duration::from_secs(cli.timeout.max(1)));
    debug!("API base URL: {}", cli.base_url);

    match &cli.command {
        Command::PublishBrief(args) => brief::publish(&client()?, args, &mut out).await,
        Command::BriefReadiness => brief::readiness(&client()?, &mut out).await,
        Command::PushAnalytics(args) => analytics::push(&client()?, args, &mut out).await,
        Command::StripeReadiness => stripe::readiness(&StripeConfig::from_env(), &mut out),
        Command::StripeVerify => stripe::verify(&StripeConfig::from_env(), None, &mut out).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let directives = TomlConfig::load_default()
        .logging
        .directives(&["wssi_ops", "wssi_common"], "warn");
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| directives.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(Cli::parse()).await {
        Ok(exit) => exit.into(),
        Err(e) => {
            eprintln!("ERROR: {:#}", e);
            Exit::Failure.into()
        }
    }
}
