//! Stripe billing: public configuration, checkout sessions and webhooks
//!
//! Checkout authenticates with the API key but does not charge quota, so a
//! free key (whose quota is zero) can still upgrade itself.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};
use wssi_common::stripe::{
    verify_webhook_signature, CheckoutRequest, StripeReadiness, StripeVar, WEBHOOK_TOLERANCE_SECS,
};
use wssi_common::Tier;

use super::auth::{header_str, ApiKey};
use super::JsonBody;
use crate::credentials::hash_prefix;
use crate::db::keys;
use crate::db::users;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct TierOffer {
    pub name: &'static str,
    pub daily_limit: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_configured: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intro_coupon: Option<bool>,
    pub contact_sales: bool,
}

#[derive(Debug, Serialize)]
pub struct TierOffers {
    pub basic: TierOffer,
    pub pro: TierOffer,
    pub enterprise: TierOffer,
}

#[derive(Debug, Serialize)]
pub struct BillingConfigResponse {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publishable_key: Option<String>,
    pub readiness: StripeReadiness,
    pub tiers: TierOffers,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
    pub tier: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub checkout_url: Option<String>,
    pub tier: Tier,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub received: bool,
    pub event_type: String,
    pub applied: bool,
}

fn not_configured(what: &str) -> ApiError {
    ApiError::Unavailable {
        code: "BILLING_NOT_CONFIGURED",
        message: format!("Billing is not configured for {}", what),
    }
}

fn offer(state: &AppState, tier: Tier) -> TierOffer {
    let self_service = tier.self_service_checkout();
    TierOffer {
        name: tier.display_name(),
        daily_limit: tier.daily_limit(),
        price_configured: self_service.then(|| state.stripe.price_for(tier).is_some()),
        intro_coupon: self_service.then(|| state.stripe.coupon_for(tier).is_some()),
        contact_sales: !self_service,
    }
}

/// GET /api/v1/billing/config
pub async fn billing_config(State(state): State<AppState>) -> Json<BillingConfigResponse> {
    let readiness = state.stripe.readiness();
    Json(BillingConfigResponse {
        enabled: readiness.ready_for_checkout,
        publishable_key: state.stripe.get(StripeVar::PublishableKey).map(str::to_string),
        tiers: TierOffers {
            basic: offer(&state, Tier::Basic),
            pro: offer(&state, Tier::Pro),
            enterprise: offer(&state, Tier::Enterprise),
        },
        readiness,
    })
}

/// GET /api/v1/billing/readiness
pub async fn billing_readiness(State(state): State<AppState>) -> Json<StripeReadiness> {
    Json(state.stripe.readiness())
}

/// Tier a checkout may be opened for
pub fn checkout_tier(raw: &str) -> ApiResult<Tier> {
    let tier = raw.trim().parse::<Tier>().map_err(|e| ApiError::BadRequest {
        code: "INVALID_TIER",
        message: e,
    })?;
    match tier {
        Tier::Free => Err(ApiError::BadRequest {
            code: "INVALID_TIER",
            message: "The free tier needs no checkout".to_string(),
        }),
        Tier::Enterprise => Err(ApiError::BadRequest {
            code: "CONTACT_SALES_REQUIRED",
            message: "Enterprise access is arranged through sales".to_string(),
        }),
        paid => Ok(paid),
    }
}

/// POST /api/v1/billing/checkout-session
pub async fn checkout_session(
    State(state): State<AppState>,
    ApiKey(key): ApiKey,
    JsonBody(body): JsonBody<CheckoutBody>,
) -> ApiResult<Json<CheckoutResponse>> {
    let tier = checkout_tier(&body.tier)?;

    let readiness = state.stripe.readiness();
    let (Some(client), Some(price_id)) = (state.stripe_client.as_ref(), state.stripe.price_for(tier)) else {
        return Err(not_configured("checkout"));
    };
    if !readiness.ready_for_checkout {
        return Err(not_configured("checkout"));
    }

    let success_url = state
        .stripe
        .get(StripeVar::SuccessUrl)
        .map(str::to_string)
        .unwrap_or_else(|| state.config.public_url("/billing/success?session_id={CHECKOUT_SESSION_ID}"));
    let cancel_url = state
        .stripe
        .get(StripeVar::CancelUrl)
        .map(str::to_string)
        .unwrap_or_else(|| state.config.public_url("/billing/cancel"));

    let request = CheckoutRequest {
        tier,
        price_id: price_id.to_string(),
        coupon_id: state.stripe.coupon_for(tier).map(str::to_string),
        success_url,
        cancel_url,
        key_hash: key.key_hash.clone(),
        customer_email: key.email.clone(),
    };

    let session = client.create_checkout_session(&request).await.map_err(|e| {
        error!("Stripe checkout for {} failed: {}", hash_prefix(&key.key_hash), e);
        ApiError::BadGateway {
            code: "BILLING_PROVIDER_ERROR",
            message: "Payment provider rejected the checkout request".to_string(),
        }
    })?;

    Ok(Json(CheckoutResponse {
        session_id: session.id,
        checkout_url: session.url,
        tier,
    }))
}

/// POST /api/v1/billing/webhook
pub async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> ApiResult<Json<WebhookResponse>> {
    if !state.stripe.readiness().ready_for_webhook {
        return Err(not_configured("webhooks"));
    }
    let secret = state
        .stripe
        .get(StripeVar::WebhookSecret)
        .ok_or_else(|| not_configured("webhooks"))?;

    let invalid_signature = |message: String| ApiError::BadRequest {
        code: "WEBHOOK_SIGNATURE_INVALID",
        message,
    };
    let signature = header_str(&headers, "Stripe-Signature")
        .ok_or_else(|| invalid_signature("Missing Stripe-Signature header".to_string()))?;
    verify_webhook_signature(&body, signature, secret, WEBHOOK_TOLERANCE_SECS, Utc::now().timestamp())
        .map_err(|e| {
            warn!("Rejected webhook: {}", e);
            invalid_signature(e.to_string())
        })?;

    let event: Value = serde_json::from_slice(&body).map_err(|e| ApiError::bad_request(e.to_string()))?;
    let event_type = event
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let object = event.pointer("/data/object").cloned().unwrap_or(Value::Null);

    let applied = match event_type.as_str() {
        "checkout.session.completed" => apply_checkout_completed(&state, &object).await?,
        "customer.subscription.deleted" => apply_subscription_deleted(&state, &object).await?,
        other => {
            info!("Acknowledged unhandled Stripe event {}", other);
            false
        }
    };

    Ok(Json(WebhookResponse {
        received: true,
        event_type,
        applied,
    }))
}

fn str_at<'a>(object: &'a Value, pointer: &str) -> Option<&'a str> {
    object.pointer(pointer).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Upgrade the key named by the session and remember the customer
async fn apply_checkout_completed(state: &AppState, session: &Value) -> ApiResult<bool> {
    let Some(key_hash) = str_at(session, "/client_reference_id").or_else(|| str_at(session, "/metadata/key_hash"))
    else {
        warn!("checkout.session.completed without a key reference");
        return Ok(false);
    };
    let Some(tier) = str_at(session, "/metadata/tier").and_then(|t| t.parse::<Tier>().ok()) else {
        warn!("checkout.session.completed for {} without a valid tier", hash_prefix(key_hash));
        return Ok(false);
    };

    let Some(key) = keys::find_by_hash(&state.db, key_hash).await? else {
        warn!("checkout.session.completed for unknown key {}", hash_prefix(key_hash));
        return Ok(false);
    };

    keys::set_tier(&state.db, &key.key_hash, tier).await?;
    if let Some(user_id) = &key.user_id {
        users::set_tier(&state.db, user_id, tier).await?;
        if let Some(customer) = str_at(session, "/customer") {
            users::set_stripe_customer(&state.db, user_id, customer).await?;
        }
    }

    info!("Upgraded key {} to {}", hash_prefix(&key.key_hash), tier);
    Ok(true)
}

/// Downgrade everything tied to a cancelled subscription to free
async fn apply_subscription_deleted(state: &AppState, subscription: &Value) -> ApiResult<bool> {
    let mut applied = false;

    if let Some(customer) = str_at(subscription, "/customer") {
        if let Some(user) = users::find_by_stripe_customer(&state.db, customer).await? {
            users::set_tier(&state.db, &user.id, Tier::Free).await?;
            let changed = keys::set_tier_for_user(&state.db, &user.id, Tier::Free).await?;
            info!("Subscription ended for user {}; {} key(s) downgraded", user.id, changed);
            applied = true;
        }
    }

    if let Some(key_hash) = str_at(subscription, "/metadata/key_hash") {
        if keys::set_tier(&state.db, key_hash, Tier::Free).await? {
            info!("Subscription ended for key {}", hash_prefix(key_hash));
            applied = true;
        }
    }

    Ok(applied)
}

pub fn billing_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/billing/config", get(billing_config))
        .route("/api/v1/billing/readiness", get(billing_readiness))
        .route("/api/v1/billing/checkout-session", post(checkout_session))
        .route("/api/v1/billing/webhook", post(webhook))
}
