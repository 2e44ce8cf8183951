//! Analytics bundle ingest
//!
//! The upstream pipeline pushes its artifacts here. The whole bundle is
//! validated before the first file is written.

use axum::{body::Bytes, extract::State, http::HeaderMap, routing::post, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;
use wssi_common::analytics::Dataset;

use super::auth::{require_token, OperatorToken};
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct IngestBody {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub files: BTreeMap<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub status: &'static str,
    pub written_count: usize,
    pub files: Vec<String>,
    pub analytics_dir: String,
    pub source: String,
    pub received_at: DateTime<Utc>,
}

/// Check every entry of a bundle; returns the datasets in write order
pub fn validate_bundle(files: BTreeMap<String, Value>) -> ApiResult<Vec<(Dataset, Value)>> {
    if files.is_empty() {
        return Err(ApiError::bad_request("Bundle contains no files"));
    }

    let unknown: Vec<&str> = files
        .keys()
        .filter(|name| Dataset::from_file_name(name).is_none())
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        let accepted: Vec<&str> = Dataset::ALL.iter().map(|d| d.file_name()).collect();
        return Err(ApiError::bad_request(format!(
            "Unknown file(s): {}. Accepted: {}",
            unknown.join(", "),
            accepted.join(", ")
        )));
    }

    let mut bundle = Vec::with_capacity(files.len());
    for (name, doc) in files {
        if !(doc.is_object() || doc.is_array()) {
            return Err(ApiError::bad_request(format!("{} must be a JSON object or array", name)));
        }
        if let Some(dataset) = Dataset::from_file_name(&name) {
            bundle.push((dataset, doc));
        }
    }
    Ok(bundle)
}

/// POST /api/v1/analytics/ingest
pub async fn ingest(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> ApiResult<Json<IngestResponse>> {
    require_token(&headers, OperatorToken::Ingest, state.config.analytics_ingest_token.as_deref())?;

    let body: IngestBody = serde_json::from_slice(&body).map_err(|e| ApiError::bad_request(e.to_string()))?;
    let bundle = validate_bundle(body.files)?;
    let source = body
        .source
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    let mut written = Vec::with_capacity(bundle.len());
    for (dataset, doc) in &bundle {
        state.store.write(*dataset, doc).await?;
        written.push(dataset.file_name().to_string());
    }

    let analytics_dir = state.store.primary_dir().display().to_string();
    info!("Ingested {} artifact(s) from {} into {}", written.len(), source, analytics_dir);

    Ok(Json(IngestResponse {
        status: "ok",
        written_count: written.len(),
        files: written,
        analytics_dir,
        source,
        received_at: Utc::now(),
    }))
}

pub fn ingest_routes() -> Router<AppState> {
    Router::new().route("/api/v1/analytics/ingest", post(ingest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn files(pairs: Vec<(&str, Value)>) -> BTreeMap<String, Value> {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn test_validate_bundle_accepts_known_files() {
        let bundle = validate_bundle(files(vec![
            ("wssi-latest.json", json!({"wssi_value": 1.0})),
            ("alerts.json", json!({"active_alerts": []})),
            ("wssi-history.json", json!([])),
        ]))
        .unwrap();
        let datasets: Vec<Dataset> = bundle.iter().map(|(d, _)| *d).collect();
        assert_eq!(datasets, vec![Dataset::Alerts, Dataset::WssiHistory, Dataset::WssiLatest]);
    }

    #[test]
    fn test_validate_bundle_rejects_unknown_and_scalars() {
        assert!(validate_bundle(BTreeMap::new()).is_err());

        let unknown = validate_bundle(files(vec![
            ("wssi-latest.json", json!({})),
            ("secrets.json", json!({})),
        ]))
        .unwrap_err();
        assert!(unknown.to_string().contains("secrets.json"));

        assert!(validate_bundle(files(vec![("network.json", json!(42))])).is_err());
    }
}
