//! Correlation, network, alert and pattern documents
//!
//! These artifacts are served as produced upstream. The only change is a
//! `generated_at` stamp for documents that do not carry one.

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde_json::Value;
use wssi_common::analytics::Dataset;

use crate::{ApiError, ApiResult, AppState};

async fn serve(state: &AppState, dataset: Dataset) -> ApiResult<Json<Value>> {
    let doc = state
        .store
        .load(dataset)
        .await
        .map_err(|e| ApiError::from_store(e, dataset.key()))?;
    let mut value = doc.value;

    if let Value::Object(map) = &mut value {
        if !map.contains_key("generated_at") {
            let status = state.store.status(dataset, state.stale_after(), Utc::now()).await;
            let stamp = status
                .generated_at
                .map(|ts| Value::String(ts.to_rfc3339()))
                .unwrap_or(Value::Null);
            map.insert("generated_at".to_string(), stamp);
        }
    }

    Ok(Json(value))
}

/// GET /correlations, /api/v1/correlations
pub async fn correlations(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    serve(&state, Dataset::Correlations).await
}

/// GET /network, /api/v1/network
pub async fn network(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    serve(&state, Dataset::Network).await
}

/// GET /alerts, /api/v1/alerts
pub async fn alerts(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    serve(&state, Dataset::Alerts).await
}

/// GET /patterns, /api/v1/patterns
pub async fn patterns(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    serve(&state, Dataset::Patterns).await
}

pub fn analytics_routes() -> Router<AppState> {
    Router::new()
        .route("/correlations", get(correlations))
        .route("/api/v1/correlations", get(correlations))
        .route("/network", get(network))
        .route("/api/v1/network", get(network))
        .route("/alerts", get(alerts))
        .route("/api/v1/alerts", get(alerts))
        .route("/patterns", get(patterns))
        .route("/api/v1/patterns", get(patterns))
}
