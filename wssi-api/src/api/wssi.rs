//! WSSI snapshot, history, theme and indicator endpoints
//!
//! Every route exists twice: the legacy path and its `/api/v1` twin. Both
//! point at the same handler, so payloads cannot drift apart.

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use wssi_common::analytics::{
    history_window, synthetic_history, Dataset, HistoryDocument, HistoryPoint, ThemeSignal, WssiSnapshot,
};

use crate::{ApiError, ApiResult, AppState};

pub const DEFAULT_HISTORY_DAYS: i64 = 30;
pub const MAX_HISTORY_DAYS: i64 = 365;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub days: Option<i64>,
}

/// Where history points came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HistorySource {
    /// `wssi-history.json`
    Recorded,
    /// Generated around the current value
    Synthetic,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub history: Vec<HistoryPoint>,
    pub count: usize,
    pub current: Option<f64>,
    pub source: HistorySource,
}

#[derive(Debug, Serialize)]
pub struct IndicatorsResponse {
    pub indicators: Vec<Value>,
    pub count: usize,
    pub active_themes: i64,
}

/// Requested window length, clamped to 1..=365
pub fn clamp_days(days: Option<i64>) -> usize {
    days.unwrap_or(DEFAULT_HISTORY_DAYS).clamp(1, MAX_HISTORY_DAYS) as usize
}

async fn load_snapshot(state: &AppState) -> ApiResult<WssiSnapshot> {
    state
        .store
        .snapshot()
        .await
        .map_err(|e| ApiError::from_store(e, "WSSI data"))
}

/// GET /wssi/current, /api/v1/wssi
pub async fn current(State(state): State<AppState>) -> ApiResult<Json<WssiSnapshot>> {
    Ok(Json(load_snapshot(&state).await?))
}

/// GET /wssi/history, /api/v1/wssi/history
///
/// Serves the recorded history when present, otherwise a synthetic series
/// around the current value. A missing snapshot only fails the request when
/// there is no recorded history to fall back on.
pub async fn history(
    State(state): State<AppState>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> ApiResult<Json<HistoryResponse>> {
    let Query(params) = params.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let days = clamp_days(params.days);

    let snapshot = match state.store.snapshot().await {
        Ok(snapshot) => Some(snapshot),
        Err(wssi_common::Error::NotFound(_)) => None,
        Err(e) => return Err(ApiError::from_store(e, "WSSI data")),
    };

    let recorded = match state.store.load_as::<HistoryDocument>(Dataset::WssiHistory).await {
        Ok(doc) => doc.history,
        Err(wssi_common::Error::NotFound(_)) => Vec::new(),
        Err(e) => {
            warn!("Ignoring unreadable history artifact: {}", e);
            Vec::new()
        }
    };

    let (points, source) = if recorded.is_empty() {
        let snapshot = snapshot.as_ref().ok_or_else(|| ApiError::data_unavailable("WSSI data"))?;
        let points = synthetic_history(snapshot.wssi_value, days, Utc::now().date_naive());
        (points, HistorySource::Synthetic)
    } else {
        (history_window(recorded, days), HistorySource::Recorded)
    };

    let current = snapshot
        .as_ref()
        .map(|s| s.wssi_value)
        .or_else(|| points.last().map(|p| p.wssi_value));

    Ok(Json(HistoryResponse {
        count: points.len(),
        history: points,
        current,
        source,
    }))
}

/// GET /themes, /api/v1/themes
pub async fn themes(State(state): State<AppState>) -> ApiResult<Json<Vec<ThemeSignal>>> {
    Ok(Json(load_snapshot(&state).await?.theme_signals))
}

/// GET /themes/:theme_id, /api/v1/themes/:theme_id
pub async fn theme_detail(
    State(state): State<AppState>,
    Path(theme_id): Path<String>,
) -> ApiResult<Json<ThemeSignal>> {
    let snapshot = load_snapshot(&state).await?;
    snapshot
        .theme_signals
        .into_iter()
        .find(|t| t.theme_id == theme_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound {
            code: "THEME_NOT_FOUND",
            message: format!("Theme '{}' not found", theme_id),
        })
}

/// GET /indicators, /api/v1/indicators
pub async fn indicators(State(state): State<AppState>) -> ApiResult<Json<IndicatorsResponse>> {
    let snapshot = load_snapshot(&state).await?;

    let from_file = match state.store.load(Dataset::Indicators).await {
        Ok(doc) => indicator_rows(doc.value),
        Err(wssi_common::Error::NotFound(_)) => Vec::new(),
        Err(e) => {
            warn!("Ignoring unreadable indicators artifact: {}", e);
            Vec::new()
        }
    };
    let indicators = if from_file.is_empty() {
        derive_indicators(&snapshot.theme_signals)
    } else {
        from_file
    };

    Ok(Json(IndicatorsResponse {
        count: indicators.len(),
        indicators,
        active_themes: snapshot.active_theme_count(),
    }))
}

/// Rows of an indicators artifact (`{"indicators": [...]}` or a bare array)
pub fn indicator_rows(doc: Value) -> Vec<Value> {
    match doc {
        Value::Array(rows) => rows,
        Value::Object(mut map) => match map.remove("indicators") {
            Some(Value::Array(rows)) => rows,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Flatten theme `indicator_details`, tagging each row with its theme
pub fn derive_indicators(themes: &[ThemeSignal]) -> Vec<Value> {
    themes
        .iter()
        .flat_map(|theme| {
            theme.indicator_details().iter().filter_map(move |detail| {
                let mut row = detail.as_object()?.clone();
                row.entry("theme_id")
                    .or_insert_with(|| Value::String(theme.theme_id.clone()));
                row.entry("theme_name")
                    .or_insert_with(|| Value::String(theme.theme_name.clone()));
                Some(Value::Object(row))
            })
        })
        .collect()
}

pub fn wssi_routes() -> Router<AppState> {
    Router::new()
        .route("/wssi/current", get(current))
        .route("/api/v1/wssi", get(current))
        .route("/wssi/history", get(history))
        .route("/api/v1/wssi/history", get(history))
        .route("/themes", get(themes))
        .route("/api/v1/themes", get(themes))
        .route("/themes/:theme_id", get(theme_detail))
        .route("/api/v1/themes/:theme_id", get(theme_detail))
        .route("/indicators", get(indicators))
        .route("/api/v1/indicators", get(indicators))
}
