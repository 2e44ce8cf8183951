//! HTTP API handlers for wssi-api

pub mod accounts;
pub mod admin;
pub mod analytics;
pub mod auth;
pub mod billing;
pub mod briefs;
pub mod health;
pub mod ingest;
pub mod wssi;

use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json, Router,
};
use serde::de::DeserializeOwned;

use crate::{ApiError, AppState};

pub use accounts::account_routes;
pub use admin::admin_routes;
pub use auth::{metered_auth, ApiKey};
pub use billing::billing_routes;
pub use briefs::brief_routes;
pub use health::health_routes;
pub use ingest::ingest_routes;

/// Routes that require an API key and consume daily quota
pub fn data_routes() -> Router<AppState> {
    Router::new().merge(wssi::wssi_routes()).merge(analytics::analytics_routes())
}

/// JSON body whose rejection uses the API error shape
///
/// `axum::Json` answers malformed bodies with plain text; clients of this API
/// expect `detail.code` on every error.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
        }
    }
}
