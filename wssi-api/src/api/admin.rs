//! Admin endpoints (`X-Admin-Key`)

use axum::{
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use tracing::info;
use wssi_common::Tier;

use super::auth::require_admin;
use super::JsonBody;
use crate::credentials::{generate_admin_key, generate_api_key, hash_key, hash_prefix};
use crate::db::keys::{self, NewApiKey};
use crate::db::usage;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    pub name: String,
    pub tier: Tier,
    pub email: Option<String>,
    pub expires_days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CreateKeyResponse {
    pub key: String,
    pub name: String,
    pub tier: Tier,
    pub rate_limit: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub keys_by_tier: BTreeMap<String, i64>,
    pub requests_today: i64,
    pub timestamp: DateTime<Utc>,
}

/// POST /admin/create-key
pub async fn create_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(req): JsonBody<CreateKeyRequest>,
) -> ApiResult<Json<CreateKeyResponse>> {
    let admin = require_admin(&state, &headers).await?;

    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Key name is required"));
    }
    let now = Utc::now();
    let expires_at = match req.expires_days {
        Some(days) if days <= 0 => return Err(ApiError::bad_request("expires_days must be positive")),
        Some(days) => Some(
            Duration::try_days(days)
                .and_then(|delta| now.checked_add_signed(delta))
                .ok_or_else(|| ApiError::bad_request("expires_days out of range"))?,
        ),
        None => None,
    };

    let api_key = generate_api_key(req.tier);
    let key_hash = hash_key(&api_key);
    let record = keys::insert_key(
        &state.db,
        &NewApiKey {
            key_hash: &key_hash,
            name,
            email: req.email.as_deref(),
            tier: req.tier,
            rate_limit: req.tier.daily_limit(),
            expires_at,
            is_admin: false,
            user_id: None,
        },
        now,
    )
    .await?;

    info!(
        "Admin {} created {} key {}",
        hash_prefix(&admin.key_hash),
        req.tier,
        hash_prefix(&key_hash)
    );

    Ok(Json(CreateKeyResponse {
        key: api_key,
        name: record.name,
        tier: req.tier,
        rate_limit: record.rate_limit,
        created_at: record.created_at,
        expires_at: record.expires_at,
    }))
}

/// GET /admin/stats
pub async fn stats(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<StatsResponse>> {
    require_admin(&state, &headers).await?;
    let now = Utc::now();
    Ok(Json(StatsResponse {
        keys_by_tier: keys::count_by_tier(&state.db).await?,
        requests_today: usage::requests_on_day(&state.db, now).await?,
        timestamp: now,
    }))
}

/// Result of the startup admin-key check
#[derive(Debug, PartialEq, Eq)]
pub enum AdminBootstrap {
    /// An active admin key already exists
    Existing,
    /// `WSSI_BOOTSTRAP_ADMIN_KEY` was stored
    Configured,
    /// A fresh key was generated; it is shown exactly once
    Generated(String),
}

/// Make sure at least one active admin key exists
pub async fn ensure_admin_key(db: &SqlitePool, configured: Option<&str>) -> ApiResult<AdminBootstrap> {
    if keys::has_active_admin(db).await? {
        return Ok(AdminBootstrap::Existing);
    }

    let (api_key, outcome) = match configured {
        Some(key) => (key.to_string(), AdminBootstrap::Configured),
        None => {
            let key = generate_admin_key();
            (key.clone(), AdminBootstrap::Generated(key))
        }
    };
    let key_hash = hash_key(&api_key);

    // A configured key may survive, deactivated, from an earlier run
    sqlx::query("DELETE FROM api_keys WHERE key_hash = ? AND is_active = 0")
        .bind(&key_hash)
        .execute(db)
        .await?;

    keys::insert_key(
        db,
        &NewApiKey {
            key_hash: &key_hash,
            name: "bootstrap-admin",
            email: None,
            tier: Tier::Enterprise,
            rate_limit: Tier::Enterprise.daily_limit(),
            expires_at: None,
            is_admin: true,
            user_id: None,
        },
        Utc::now(),
    )
    .await?;
    info!("Bootstrap admin key {} created", hash_prefix(&key_hash));
    Ok(outcome)
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/create-key", post(create_key))
        .route("/admin/stats", get(stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_bootstrap_generates_once() {
        let (pool, _dir) = test_pool().await;

        let first = ensure_admin_key(&pool, None).await.unwrap();
        let AdminBootstrap::Generated(key) = first else {
            panic!("expected a generated key, got {:?}", first);
        };
        assert!(key.starts_with("wssi-admin-"));
        assert!(keys::find_active_admin(&pool, &hash_key(&key), Utc::now()).await.unwrap().is_some());

        assert_eq!(ensure_admin_key(&pool, None).await.unwrap(), AdminBootstrap::Existing);
    }

    #[tokio::test]
    async fn test_bootstrap_uses_configured_key() {
        let (pool, _dir) = test_pool().await;
        let outcome = ensure_admin_key(&pool, Some("fixed-admin-key")).await.unwrap();
        assert_eq!(outcome, AdminBootstrap::Configured);
        assert!(keys::find_active_admin(&pool, &hash_key("fixed-admin-key"), Utc::now())
            .await
            .unwrap()
            .is_some());
    }
}
