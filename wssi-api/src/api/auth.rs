//! API key authentication and metering
//!
//! Data routes go through [`metered_auth`], which authenticates, charges the
//! daily quota and logs usage. Routes that need a key but must not consume
//! quota (checkout, key login, paid brief views) use the [`ApiKey`] extractor.

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::credentials::{hash_key, hash_prefix, token_matches};
use crate::db::keys::{self, ApiKeyRecord};
use crate::db::rate_limits::{self, RateLimitDecision};
use crate::db::usage;
use crate::{ApiError, ApiResult, AppState};

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Trimmed, non-empty header value
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> ApiResult<ApiKeyRecord> {
    let raw = header_str(headers, API_KEY_HEADER).ok_or_else(ApiError::auth_missing)?;
    let key_hash = hash_key(raw);
    match keys::find_active(&state.db, &key_hash, Utc::now()).await? {
        Some(record) => Ok(record),
        None => {
            debug!("Rejected API key {}", hash_prefix(&key_hash));
            Err(ApiError::auth_invalid())
        }
    }
}

/// Key that passed authentication for this request
#[derive(Debug, Clone)]
pub struct ApiKey(pub ApiKeyRecord);

#[async_trait]
impl FromRequestParts<AppState> for ApiKey {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(key) = parts.extensions.get::<ApiKey>() {
            return Ok(key.clone());
        }
        authenticate(state, &parts.headers).await.map(ApiKey)
    }
}

/// Authenticate, charge one request against the daily quota, log usage
pub async fn metered_auth(State(state): State<AppState>, mut request: Request, next: Next) -> ApiResult<Response> {
    let started = Instant::now();
    let key = authenticate(&state, request.headers()).await?;

    let info = match rate_limits::check_and_consume(&state.db, &key.key_hash, key.rate_limit, Utc::now()).await? {
        RateLimitDecision::Allowed(info) => info,
        RateLimitDecision::Limited(info) => {
            debug!("Quota exhausted for {} (limit {})", hash_prefix(&key.key_hash), info.limit);
            return Err(ApiError::RateLimited(info));
        }
    };

    let endpoint = request.uri().path().to_string();
    let key_hash = key.key_hash.clone();
    request.extensions_mut().insert(ApiKey(key));

    let mut response = next.run(request).await;
    info.apply_headers(response.headers_mut());

    let elapsed_ms = started.elapsed().as_millis() as i64;
    let status = response.status().as_u16();
    if let Err(e) = usage::log_request(&state.db, &key_hash, &endpoint, status, elapsed_ms, Utc::now()).await {
        warn!("Failed to log usage for {}: {}", endpoint, e);
    }

    Ok(response)
}

/// Verify an `X-Admin-Key` header against active admin keys
pub async fn require_admin(state: &AppState, headers: &HeaderMap) -> ApiResult<ApiKeyRecord> {
    let raw = header_str(headers, "X-Admin-Key").ok_or_else(|| ApiError::Unauthorized {
        code: "ADMIN_KEY_REQUIRED",
        message: "Admin key required in X-Admin-Key header".to_string(),
    })?;

    keys::find_active_admin(&state.db, &hash_key(raw), Utc::now())
        .await?
        .ok_or_else(|| ApiError::Forbidden {
            code: "ADMIN_INVALID",
            message: "Invalid admin key".to_string(),
        })
}

/// Shared-secret tokens guarding the operator endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorToken {
    Publish,
    Ingest,
}

impl OperatorToken {
    pub fn header(&self) -> &'static str {
        match self {
            OperatorToken::Publish => "X-Brief-Publish-Token",
            OperatorToken::Ingest => "X-Analytics-Ingest-Token",
        }
    }

    fn codes(&self) -> (&'static str, &'static str) {
        match self {
            OperatorToken::Publish => ("PUBLISH_TOKEN_REQUIRED", "PUBLISH_TOKEN_INVALID"),
            OperatorToken::Ingest => ("INGEST_TOKEN_REQUIRED", "INGEST_TOKEN_INVALID"),
        }
    }
}

/// Check an operator token header
///
/// A missing header is 401; a wrong token, or no token configured on the
/// server, is 403.
pub fn require_token(headers: &HeaderMap, kind: OperatorToken, expected: Option<&str>) -> ApiResult<()> {
    let (required_code, invalid_code) = kind.codes();

    let presented = header_str(headers, kind.header()).ok_or_else(|| ApiError::Unauthorized {
        code: required_code,
        message: format!("Token required in {} header", kind.header()),
    })?;

    match expected {
        Some(expected) if token_matches(presented, expected) => Ok(()),
        Some(_) => Err(ApiError::Forbidden {
            code: invalid_code,
            message: "Invalid token".to_string(),
        }),
        None => {
            warn!("{} presented but no token is configured on the server", kind.header());
            Err(ApiError::Forbidden {
                code: invalid_code,
                message: "Token authentication is not configured".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(name: &'static str, value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(name, HeaderValue::from_str(value).unwrap());
        h
    }

    #[test]
    fn test_header_str_trims_and_rejects_blank() {
        assert_eq!(header_str(&headers("x-api-key", " abc "), API_KEY_HEADER), Some("abc"));
        assert_eq!(header_str(&headers("x-api-key", "   "), API_KEY_HEADER), None);
        assert_eq!(header_str(&HeaderMap::new(), API_KEY_HEADER), None);
    }

    #[test]
    fn test_require_token_codes() {
        let publish = OperatorToken::Publish;
        let missing = require_token(&HeaderMap::new(), publish, Some("s3cret")).unwrap_err();
        assert!(matches!(missing, ApiError::Unauthorized { code: "PUBLISH_TOKEN_REQUIRED", .. }));

        let wrong = require_token(&headers("x-brief-publish-token", "nope"), publish, Some("s3cret")).unwrap_err();
        assert!(matches!(wrong, ApiError::Forbidden { code: "PUBLISH_TOKEN_INVALID", .. }));

        let unset = require_token(&headers("x-brief-publish-token", "s3cret"), publish, None).unwrap_err();
        assert!(matches!(unset, ApiError::Forbidden { code: "PUBLISH_TOKEN_INVALID", .. }));

        assert!(require_token(&headers("x-brief-publish-token", "s3cret"), publish, Some("s3cret")).is_ok());

        let ingest = require_token(&HeaderMap::new(), OperatorToken::Ingest, Some("t")).unwrap_err();
        assert!(matches!(ingest, ApiError::Unauthorized { code: "INGEST_TOKEN_REQUIRED", .. }));
    }
}
