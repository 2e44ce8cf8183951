//! Service index and health check (public)

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::AppState;

/// Data routes advertised by `GET /`
pub const ENDPOINTS: [&str; 18] = [
    "/wssi/current",
    "/wssi/history",
    "/themes",
    "/themes/{theme_id}",
    "/indicators",
    "/correlations",
    "/network",
    "/alerts",
    "/patterns",
    "/api/v1/wssi",
    "/api/v1/wssi/history",
    "/api/v1/themes",
    "/api/v1/themes/{theme_id}",
    "/api/v1/indicators",
    "/api/v1/correlations",
    "/api/v1/network",
    "/api/v1/alerts",
    "/api/v1/patterns",
];

#[derive(Debug, Serialize)]
pub struct ServiceIndex {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub endpoints: Vec<&'static str>,
    pub briefs: &'static str,
    pub health: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
    pub build: &'static str,
    pub uptime_seconds: i64,
}

/// GET /
pub async fn service_index() -> Json<ServiceIndex> {
    Json(ServiceIndex {
        name: "WSSI API",
        version: env!("CARGO_PKG_VERSION"),
        description: "Weighted Synchronous Stress Index analytics",
        endpoints: ENDPOINTS.to_vec(),
        briefs: "/briefs",
        health: "/health",
    })
}

/// GET /health
///
/// Does not touch the database or the analytics store.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let now = Utc::now();
    Json(HealthResponse {
        status: "healthy",
        timestamp: now,
        version: env!("CARGO_PKG_VERSION"),
        build: env!("GIT_HASH"),
        uptime_seconds: now.signed_duration_since(state.startup_time).num_seconds(),
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(service_index))
        .route("/health", get(health_check))
}
