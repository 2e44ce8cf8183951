//! wssi-api library interface
//!
//! Exposes the router and state so integration tests can drive the service
//! without binding a socket.

pub mod api;
pub mod briefs;
pub mod config;
pub mod credentials;
pub mod db;
pub mod error;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use wssi_common::analytics::AnalyticsStore;
use wssi_common::stripe::{StripeClient, StripeConfig};

use crate::briefs::BriefArchive;
use crate::config::ApiConfig;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// API database (keys, quotas, users, releases)
    pub db: SqlitePool,
    /// Analytics artifacts
    pub store: AnalyticsStore,
    pub config: Arc<ApiConfig>,
    pub stripe: Arc<StripeConfig>,
    /// Present when a Stripe secret key is configured
    pub stripe_client: Option<StripeClient>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: ApiConfig, stripe: StripeConfig) -> wssi_common::Result<Self> {
        let store = AnalyticsStore::new(config.analytics_dir.clone(), config.analytics_fallback_dir.clone());
        let stripe_client = stripe.client()?;
        Ok(Self {
            db,
            store,
            config: Arc::new(config),
            stripe: Arc::new(stripe),
            stripe_client,
            startup_time: Utc::now(),
        })
    }

    pub fn stale_after(&self) -> Duration {
        Duration::hours(self.config.stale_after_hours)
    }

    pub fn briefs(&self) -> BriefArchive {
        BriefArchive::new(
            self.db.clone(),
            self.store.clone(),
            self.config.briefs_dir.clone(),
            self.config.brief_retention,
            self.stale_after(),
        )
    }
}

/// Build application router
///
/// Metered data routes sit behind the API-key middleware; everything else
/// authenticates inside its handler (or not at all).
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;

    let metered = api::data_routes().layer(middleware::from_fn_with_state(state.clone(), api::metered_auth));

    Router::new()
        .merge(metered)
        .merge(api::health_routes())
        .merge(api::account_routes())
        .merge(api::admin_routes())
        .merge(api::billing_routes())
        .merge(api::ingest_routes())
        .merge(api::brief_routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
