//! Error types for wssi-api
//!
//! Every error response has the shape
//! `{"detail": {"code": "SOME_CODE", "message": "...", ...}}` so clients can
//! branch on `detail.code` without parsing messages.

use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::error;

use crate::db::rate_limits::RateLimitInfo;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or rejected credentials (401)
    #[error("{message}")]
    Unauthorized { code: &'static str, message: String },

    /// Authenticated but not allowed (403)
    #[error("{message}")]
    Forbidden { code: &'static str, message: String },

    /// Invalid request (400)
    #[error("{message}")]
    BadRequest { code: &'static str, message: String },

    /// Resource not found (404)
    #[error("{message}")]
    NotFound { code: &'static str, message: String },

    /// Conflict with existing state (409)
    #[error("{message}")]
    Conflict { code: &'static str, message: String },

    /// Upstream data or configuration not available (503)
    #[error("{message}")]
    Unavailable { code: &'static str, message: String },

    /// Third-party provider failed (502)
    #[error("{message}")]
    BadGateway { code: &'static str, message: String },

    /// Daily quota exhausted (429)
    #[error("Rate limit exceeded")]
    RateLimited(RateLimitInfo),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// wssi-common error
    #[error("Common error: {0}")]
    Common(#[from] wssi_common::Error),
}

impl ApiError {
    pub fn auth_missing() -> Self {
        ApiError::Unauthorized {
            code: "AUTH_MISSING",
            message: "API key required in X-API-Key header".to_string(),
        }
    }

    pub fn auth_invalid() -> Self {
        ApiError::Unauthorized {
            code: "AUTH_INVALID",
            message: "Invalid or expired API key".to_string(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            code: "INVALID_REQUEST",
            message: message.into(),
        }
    }

    /// Analytics artifact missing or unreadable
    pub fn data_unavailable(what: &str) -> Self {
        ApiError::Unavailable {
            code: "DATA_UNAVAILABLE",
            message: format!("{} not available", what),
        }
    }

    /// Map a store error for `what`: absent or corrupt artifacts become 503
    pub fn from_store(err: wssi_common::Error, what: &str) -> Self {
        match err {
            wssi_common::Error::NotFound(_) => ApiError::data_unavailable(what),
            wssi_common::Error::Json(e) => {
                error!("{} artifact is malformed: {}", what, e);
                ApiError::data_unavailable(what)
            }
            other => ApiError::Common(other),
        }
    }

    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::Unauthorized { code, message } => (StatusCode::UNAUTHORIZED, code, message.clone()),
            ApiError::Forbidden { code, message } => (StatusCode::FORBIDDEN, code, message.clone()),
            ApiError::BadRequest { code, message } => (StatusCode::BAD_REQUEST, code, message.clone()),
            ApiError::NotFound { code, message } => (StatusCode::NOT_FOUND, code, message.clone()),
            ApiError::Conflict { code, message } => (StatusCode::CONFLICT, code, message.clone()),
            ApiError::Unavailable { code, message } => {
                (StatusCode::SERVICE_UNAVAILABLE, code, message.clone())
            }
            ApiError::BadGateway { code, message } => (StatusCode::BAD_GATEWAY, code, message.clone()),
            ApiError::RateLimited(_) => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMIT_EXCEEDED",
                "Rate limit exceeded".to_string(),
            ),
            ApiError::Internal(_) | ApiError::Database(_) | ApiError::Io(_) | ApiError::Common(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            // Details stay in the log; clients get a generic message.
            error!("Request failed: {}", self);
        }

        let mut detail = Map::new();
        detail.insert("code".to_string(), json!(code));
        detail.insert("message".to_string(), json!(message));

        let mut headers = HeaderMap::new();
        if let ApiError::RateLimited(info) = &self {
            detail.insert("reset_at".to_string(), json!(info.reset_at.to_rfc3339()));
            info.apply_headers(&mut headers);
            headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("0"));
        }

        let body = Json(json!({ "detail": Value::Object(detail) }));
        (status, headers, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = ApiError::auth_missing().into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["detail"]["code"], "AUTH_MISSING");
        assert!(body["detail"]["message"].is_string());
    }

    #[tokio::test]
    async fn test_rate_limited_has_headers_and_reset() {
        let info = RateLimitInfo {
            limit: 100,
            remaining: 0,
            reset_at: Utc.with_ymd_and_hms(2026, 10, 20, 0, 0, 0).unwrap(),
        };
        let response = ApiError::RateLimited(info).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["X-RateLimit-Limit"], "100");
        assert_eq!(response.headers()["X-RateLimit-Remaining"], "0");
        assert_eq!(response.headers()["X-RateLimit-Reset"], "1792454400");
        let body = body_json(response).await;
        assert_eq!(body["detail"]["code"], "RATE_LIMIT_EXCEEDED");
        assert!(body["detail"]["reset_at"].as_str().unwrap().starts_with("2026-10-20T00:00:00"));
    }

    #[tokio::test]
    async fn test_internal_errors_hide_details() {
        let response = ApiError::Internal("secret path /etc/x".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["detail"]["code"], "INTERNAL_ERROR");
        assert!(!body["detail"]["message"].as_str().unwrap().contains("secret"));
    }

    #[test]
    fn test_store_not_found_maps_to_unavailable() {
        let err = ApiError::from_store(wssi_common::Error::NotFound("x".into()), "WSSI data");
        assert!(matches!(err, ApiError::Unavailable { code: "DATA_UNAVAILABLE", .. }));
    }
}
