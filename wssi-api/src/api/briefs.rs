//! Fragility Brief archive endpoints
//!
//! Free editions and the archive listing are public. Paid editions need a
//! paid-tier API key but do not charge quota.

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Path, Query, State},
    http::HeaderMap,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::auth::{require_token, ApiKey, OperatorToken};
use crate::briefs::render::render_archive_page;
use crate::briefs::{BriefDocument, BriefReadiness, PublishOutcome, PublishRequest, Variant};
use crate::credentials::hash_prefix;
use crate::db::releases::BriefReleaseRecord;
use crate::{ApiError, ApiResult, AppState};

const RELEASES_PATH: &str = "/api/v1/briefs/releases";
const DEFAULT_LIST_LIMIT: i64 = 26;
const ARCHIVE_PAGE_LIMIT: i64 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct PublishBody {
    pub release_date: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct VariantLinks {
    pub view_url: String,
    pub json_url: String,
}

#[derive(Debug, Serialize)]
pub struct ReleaseLinks {
    pub free: VariantLinks,
    pub paid: VariantLinks,
}

/// Release metadata plus where to read each edition
#[derive(Debug, Serialize)]
pub struct ReleaseView {
    #[serde(flatten)]
    pub release: BriefReleaseRecord,
    pub links: ReleaseLinks,
}

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub status: &'static str,
    pub release: ReleaseView,
    pub archive_page_url: String,
    pub pruned: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ReleaseList {
    pub releases: Vec<ReleaseView>,
    pub count: usize,
    pub archive_page_url: String,
}

fn release_view(state: &AppState, release: BriefReleaseRecord) -> ReleaseView {
    let link = |variant: Variant| {
        let base = format!("{}/{}/{}", RELEASES_PATH, release.release_id, variant.as_str());
        VariantLinks {
            view_url: state.config.public_url(&base),
            json_url: state.config.public_url(&format!("{}.json", base)),
        }
    };
    let links = ReleaseLinks {
        free: link(Variant::Free),
        paid: link(Variant::Paid),
    };
    ReleaseView { release, links }
}

fn release_not_found(release_id: &str) -> ApiError {
    ApiError::NotFound {
        code: "RELEASE_NOT_FOUND",
        message: format!("Brief release '{}' not found", release_id),
    }
}

fn parse_release_date(raw: Option<&str>) -> ApiResult<Option<NaiveDate>> {
    match raw.map(str::trim).filter(|d| !d.is_empty()) {
        None => Ok(None),
        Some(date) => NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| ApiError::bad_request(format!("release_date '{}' is not YYYY-MM-DD", date))),
    }
}

/// POST /api/v1/briefs/releases/publish
pub async fn publish(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> ApiResult<Json<PublishResponse>> {
    require_token(&headers, OperatorToken::Publish, state.config.brief_publish_token.as_deref())?;

    let body: PublishBody = if body.iter().all(u8::is_ascii_whitespace) {
        PublishBody::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::bad_request(e.to_string()))?
    };

    let request = PublishRequest {
        release_date: parse_release_date(body.release_date.as_deref())?,
        notes: body.notes,
        created_by: body
            .created_by
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| "api".to_string()),
    };

    match state.briefs().publish(request, Utc::now()).await? {
        PublishOutcome::Published { release, pruned } => {
            info!("Release {} published by {}", release.release_id, release.created_by);
            Ok(Json(PublishResponse {
                status: "published",
                release: release_view(&state, release),
                archive_page_url: state.config.public_url("/briefs"),
                pruned,
            }))
        }
        PublishOutcome::Blocked(readiness) => Err(ApiError::Conflict {
            code: "PUBLISH_BLOCKED",
            message: format!(
                "Publishing is blocked; missing core datasets: {}",
                readiness.core_missing.join(", ")
            ),
        }),
    }
}

/// GET /api/v1/briefs/releases/readiness
pub async fn readiness(State(state): State<AppState>) -> Json<BriefReadiness> {
    Json(state.briefs().readiness(Utc::now()).await)
}

/// GET /api/v1/briefs/releases
pub async fn list(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Json<ReleaseList>> {
    let Query(params) = params.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let records = state.briefs().list(params.limit.unwrap_or(DEFAULT_LIST_LIMIT)).await?;
    let releases: Vec<ReleaseView> = records.into_iter().map(|r| release_view(&state, r)).collect();
    Ok(Json(ReleaseList {
        count: releases.len(),
        releases,
        archive_page_url: state.config.public_url("/briefs"),
    }))
}

/// GET /api/v1/briefs/releases/latest
pub async fn latest(State(state): State<AppState>) -> ApiResult<Json<ReleaseView>> {
    let release = state.briefs().latest().await?.ok_or_else(|| ApiError::NotFound {
        code: "RELEASE_NOT_FOUND",
        message: "No brief has been published yet".to_string(),
    })?;
    Ok(Json(release_view(&state, release)))
}

async fn find_release(state: &AppState, release_id: &str) -> ApiResult<BriefReleaseRecord> {
    state
        .briefs()
        .find(release_id)
        .await?
        .ok_or_else(|| release_not_found(release_id))
}

fn stored_file_error(err: wssi_common::Error, release_id: &str) -> ApiError {
    match err {
        wssi_common::Error::NotFound(_) => release_not_found(release_id),
        other => ApiError::Common(other),
    }
}

async fn edition_html(state: &AppState, release_id: &str, variant: Variant) -> ApiResult<Html<String>> {
    let release = find_release(state, release_id).await?;
    let html = state
        .briefs()
        .read_html(&release, variant)
        .await
        .map_err(|e| stored_file_error(e, release_id))?;
    Ok(Html(html))
}

async fn edition_json(state: &AppState, release_id: &str, variant: Variant) -> ApiResult<Json<BriefDocument>> {
    let release = find_release(state, release_id).await?;
    let doc = state
        .briefs()
        .read_json(&release, variant)
        .await
        .map_err(|e| stored_file_error(e, release_id))?;
    Ok(Json(doc))
}

fn require_paid(key: &ApiKey) -> ApiResult<()> {
    if key.0.tier().is_paid() {
        Ok(())
    } else {
        Err(ApiError::Forbidden {
            code: "PAID_TIER_REQUIRED",
            message: "The subscriber edition requires a paid tier".to_string(),
        })
    }
}

/// GET /api/v1/briefs/releases/:release_id/free
pub async fn free_html(State(state): State<AppState>, Path(release_id): Path<String>) -> ApiResult<Html<String>> {
    edition_html(&state, &release_id, Variant::Free).await
}

/// GET /api/v1/briefs/releases/:release_id/free.json
pub async fn free_json(
    State(state): State<AppState>,
    Path(release_id): Path<String>,
) -> ApiResult<Json<BriefDocument>> {
    edition_json(&state, &release_id, Variant::Free).await
}

/// GET /api/v1/briefs/releases/:release_id/paid
pub async fn paid_html(
    State(state): State<AppState>,
    key: ApiKey,
    Path(release_id): Path<String>,
) -> ApiResult<Html<String>> {
    require_paid(&key)?;
    info!("Paid edition {} served to {}", release_id, hash_prefix(&key.0.key_hash));
    edition_html(&state, &release_id, Variant::Paid).await
}

/// GET /api/v1/briefs/releases/:release_id/paid.json
pub async fn paid_json(
    State(state): State<AppState>,
    key: ApiKey,
    Path(release_id): Path<String>,
) -> ApiResult<Json<BriefDocument>> {
    require_paid(&key)?;
    edition_json(&state, &release_id, Variant::Paid).await
}

/// GET /briefs
pub async fn archive_page(State(state): State<AppState>) -> ApiResult<Html<String>> {
    let releases = state.briefs().list(ARCHIVE_PAGE_LIMIT).await?;
    Ok(Html(render_archive_page(&releases)))
}

pub fn brief_routes() -> Router<AppState> {
    Router::new()
        .route("/briefs", get(archive_page))
        .route(RELEASES_PATH, get(list))
        .route("/api/v1/briefs/releases/publish", post(publish))
        .route("/api/v1/briefs/releases/readiness", get(readiness))
        .route("/api/v1/briefs/releases/latest", get(latest))
        .route("/api/v1/briefs/releases/:release_id/free", get(free_html))
        .route("/api/v1/briefs/releases/:release_id/free.json", get(free_json))
        .route("/api/v1/briefs/releases/:release_id/paid", get(paid_html))
        .route("/api/v1/briefs/releases/:release_id/paid.json", get(paid_json))
}
