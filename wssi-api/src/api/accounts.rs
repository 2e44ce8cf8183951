//! Self-service keys, registration and login
//!
//! Access and refresh tokens are issued and stored (hashed) for the web
//! client; the API itself only ever accepts `X-API-Key`.

use axum::{extract::State, routing::post, Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, Transaction};
use tracing::info;
use uuid::Uuid;
use wssi_common::Tier;

use super::JsonBody;
use crate::credentials::{
    generate_api_key, generate_salt, generate_session_token, hash_key, hash_password, hash_prefix,
    normalize_email, validate_password, verify_password,
};
use crate::db::keys::{self, NewApiKey};
use crate::db::users::{self, NewUser, SessionKind, UserRecord};
use crate::{ApiError, ApiResult, AppState};

const ACCESS_TOKEN_TTL_SECS: i64 = 3600;
const REFRESH_TOKEN_TTL_DAYS: i64 = 30;

/// Tier named in a self-service request (default free)
///
/// Enterprise keys are only issued by an admin.
pub fn requested_tier(raw: Option<&str>) -> ApiResult<Tier> {
    let tier = match raw.map(str::trim).filter(|t| !t.is_empty()) {
        None => Tier::Free,
        Some(name) => name.parse::<Tier>().map_err(|e| ApiError::BadRequest {
            code: "INVALID_TIER",
            message: e,
        })?,
    };
    if tier == Tier::Enterprise {
        return Err(ApiError::BadRequest {
            code: "CONTACT_SALES_REQUIRED",
            message: "Enterprise access is arranged through sales".to_string(),
        });
    }
    Ok(tier)
}

fn valid_email(raw: &str) -> ApiResult<String> {
    normalize_email(raw).ok_or_else(|| ApiError::bad_request("A valid email address is required"))
}

// ============================================================================
// Request / response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct KeyRequest {
    pub email: String,
    pub tier: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct KeyRequestResponse {
    pub email: String,
    pub tier: Tier,
    pub api_key: String,
    pub rate_limit: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub tier: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct KeyLoginRequest {
    pub api_key: String,
}

#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub tier: Tier,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&UserRecord> for UserView {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            tier: user.tier(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            created_at: user.created_at,
        }
    }
}

/// Returned by register and login
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserView,
    pub api_key: String,
    pub tier: Tier,
    pub rate_limit: i64,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct KeyLoginResponse {
    pub tier: Tier,
    pub name: String,
    pub email: Option<String>,
    pub rate_limit: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

struct SessionTokens {
    access: String,
    refresh: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/keys/request
pub async fn request_key(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<KeyRequest>,
) -> ApiResult<Json<KeyRequestResponse>> {
    let email = valid_email(&req.email)?;
    let tier = requested_tier(req.tier.as_deref())?;
    let name = req.name.unwrap_or_else(|| email.clone());

    let api_key = generate_api_key(tier);
    let key_hash = hash_key(&api_key);
    let record = keys::insert_key(
        &state.db,
        &NewApiKey {
            key_hash: &key_hash,
            name: &name,
            email: Some(&email),
            tier,
            rate_limit: tier.daily_limit(),
            expires_at: None,
            is_admin: false,
            user_id: None,
        },
        Utc::now(),
    )
    .await?;

    info!("Issued {} key {}", tier, hash_prefix(&key_hash));
    Ok(Json(KeyRequestResponse {
        email,
        tier,
        api_key,
        rate_limit: record.rate_limit,
        created_at: record.created_at,
    }))
}

/// POST /api/v1/auth/register
pub async fn register(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let email = valid_email(&req.email)?;
    validate_password(&req.password).map_err(ApiError::bad_request)?;
    let tier = requested_tier(req.tier.as_deref())?;

    let now = Utc::now();
    let user_id = Uuid::new_v4().to_string();
    let salt = generate_salt();
    let password_hash = hash_password(&req.password, &salt);

    let mut tx = state.db.begin().await?;
    let user = users::insert_user(
        &mut *tx,
        &NewUser {
            id: &user_id,
            email: &email,
            password_hash: &password_hash,
            password_salt: &salt,
            tier,
            first_name: req.first_name.as_deref(),
            last_name: req.last_name.as_deref(),
        },
        now,
    )
    .await?
    .ok_or_else(|| ApiError::Conflict {
        code: "EMAIL_EXISTS",
        message: "An account with this email already exists".to_string(),
    })?;

    let api_key = issue_user_key(&mut tx, &user, tier, now).await?;
    let tokens = issue_sessions(&mut tx, &user.id, now).await?;
    tx.commit().await?;

    info!("Registered user {} on {} tier", user.id, tier);
    Ok(Json(auth_response(&user, tier, api_key, tokens)))
}

/// POST /api/v1/auth/login
///
/// Every login rotates the user's API key: a new key is issued and the
/// previous one stops working.
pub async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let invalid = || ApiError::Unauthorized {
        code: "INVALID_CREDENTIALS",
        message: "Invalid email or password".to_string(),
    };

    let email = normalize_email(&req.email).ok_or_else(invalid)?;
    let user = users::find_by_email(&state.db, &email).await?.ok_or_else(invalid)?;
    if !verify_password(&req.password, &user.password_salt, &user.password_hash) {
        return Err(invalid());
    }

    let now = Utc::now();
    let tier = user.tier();

    let mut tx = state.db.begin().await?;
    if let Some(previous) = &user.current_key_hash {
        keys::deactivate(&mut *tx, previous).await?;
    }
    let api_key = issue_user_key(&mut tx, &user, tier, now).await?;
    let tokens = issue_sessions(&mut tx, &user.id, now).await?;
    tx.commit().await?;

    info!("User {} logged in; key rotated", user.id);
    Ok(Json(auth_response(&user, tier, api_key, tokens)))
}

/// POST /api/v1/auth/key-login
///
/// Validates a key for the web client without charging quota.
pub async fn key_login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<KeyLoginRequest>,
) -> ApiResult<Json<KeyLoginResponse>> {
    let key_hash = hash_key(req.api_key.trim());
    let record = keys::find_active(&state.db, &key_hash, Utc::now())
        .await?
        .ok_or_else(ApiError::auth_invalid)?;

    Ok(Json(KeyLoginResponse {
        tier: record.tier(),
        name: record.name.clone(),
        email: record.email.clone(),
        rate_limit: record.rate_limit,
        created_at: record.created_at,
        expires_at: record.expires_at,
    }))
}

// ============================================================================
// Helpers
// ============================================================================

async fn issue_user_key(
    tx: &mut Transaction<'_, Sqlite>,
    user: &UserRecord,
    tier: Tier,
    now: DateTime<Utc>,
) -> ApiResult<String> {
    let api_key = generate_api_key(tier);
    let key_hash = hash_key(&api_key);
    keys::insert_key(
        &mut **tx,
        &NewApiKey {
            key_hash: &key_hash,
            name: &user.email,
            email: Some(&user.email),
            tier,
            rate_limit: tier.daily_limit(),
            expires_at: None,
            is_admin: false,
            user_id: Some(&user.id),
        },
        now,
    )
    .await?;
    users::set_current_key(&mut **tx, &user.id, &key_hash).await?;
    Ok(api_key)
}

async fn issue_sessions(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: &str,
    now: DateTime<Utc>,
) -> ApiResult<SessionTokens> {
    let access = generate_session_token();
    let refresh = generate_session_token();
    users::insert_session(
        &mut **tx,
        &hash_key(&access),
        user_id,
        SessionKind::Access,
        now + Duration::seconds(ACCESS_TOKEN_TTL_SECS),
        now,
    )
    .await?;
    users::insert_session(
        &mut **tx,
        &hash_key(&refresh),
        user_id,
        SessionKind::Refresh,
        now + Duration::days(REFRESH_TOKEN_TTL_DAYS),
        now,
    )
    .await?;
    Ok(SessionTokens { access, refresh })
}

fn auth_response(user: &UserRecord, tier: Tier, api_key: String, tokens: SessionTokens) -> AuthResponse {
    AuthResponse {
        user: UserView::from(user),
        api_key,
        tier,
        rate_limit: tier.daily_limit(),
        access_token: tokens.access,
        refresh_token: tokens.refresh,
        token_type: "bearer",
        expires_in: ACCESS_TOKEN_TTL_SECS,
    }
}

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/keys/request", post(request_key))
        .route("/api/v1/auth/register", post(register))
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/auth/key-login", post(key_login))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requested_tier() {
        assert_eq!(requested_tier(None).unwrap(), Tier::Free);
        assert_eq!(requested_tier(Some("  ")).unwrap(), Tier::Free);
        assert_eq!(requested_tier(Some(" basic ")).unwrap(), Tier::Basic);
        assert!(matches!(
            requested_tier(Some("Basic")).unwrap_err(),
            ApiError::BadRequest { code: "INVALID_TIER", .. }
        ));
        assert_eq!(requested_tier(Some("pro")).unwrap(), Tier::Pro);

        let enterprise = requested_tier(Some("enterprise")).unwrap_err();
        assert!(matches!(enterprise, ApiError::BadRequest { code: "CONTACT_SALES_REQUIRED", .. }));

        let unknown = requested_tier(Some("gold")).unwrap_err();
        assert!(matches!(unknown, ApiError::BadRequest { code: "INVALID_TIER", .. }));
    }
}
