//! Stripe billing integration
//!
//! Billing is optional: every piece is driven by `STRIPE_*` environment
//! variables and the API reports which ones are missing instead of failing
//! at startup. Secret values are never echoed back; readiness only exposes
//! presence and prefix checks.

use crate::{Error, Result, Tier};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use std::collections::BTreeMap;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tracing::{debug, info};

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";
const USER_AGENT: &str = concat!("wssi-api/", env!("CARGO_PKG_VERSION"));

/// Seconds a webhook timestamp may drift from our clock
pub const WEBHOOK_TOLERANCE_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

/// Every Stripe environment variable the service understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StripeVar {
    PublishableKey,
    SecretKey,
    WebhookSecret,
    PriceBasic,
    PricePro,
    CouponBasic,
    CouponPro,
    SuccessUrl,
    CancelUrl,
}

impl StripeVar {
    pub const ALL: [StripeVar; 9] = [
        StripeVar::PublishableKey,
        StripeVar::SecretKey,
        StripeVar::WebhookSecret,
        StripeVar::PriceBasic,
        StripeVar::PricePro,
        StripeVar::CouponBasic,
        StripeVar::CouponPro,
        StripeVar::SuccessUrl,
        StripeVar::CancelUrl,
    ];

    pub fn env_name(&self) -> &'static str {
        match self {
            StripeVar::PublishableKey => "STRIPE_PUBLISHABLE_KEY",
            StripeVar::SecretKey => "STRIPE_SECRET_KEY",
            StripeVar::WebhookSecret => "STRIPE_WEBHOOK_SECRET",
            StripeVar::PriceBasic => "STRIPE_PRICE_BASIC",
            StripeVar::PricePro => "STRIPE_PRICE_PRO",
            StripeVar::CouponBasic => "STRIPE_COUPON_BASIC_INTRO",
            StripeVar::CouponPro => "STRIPE_COUPON_PRO_INTRO",
            StripeVar::SuccessUrl => "STRIPE_SUCCESS_URL",
            StripeVar::CancelUrl => "STRIPE_CANCEL_URL",
        }
    }

    /// Key used in readiness reports
    pub fn key(&self) -> &'static str {
        match self {
            StripeVar::PublishableKey => "publishable_key",
            StripeVar::SecretKey => "secret_key",
            StripeVar::WebhookSecret => "webhook_secret",
            StripeVar::PriceBasic => "price_basic",
            StripeVar::PricePro => "price_pro",
            StripeVar::CouponBasic => "coupon_basic",
            StripeVar::CouponPro => "coupon_pro",
            StripeVar::SuccessUrl => "success_url",
            StripeVar::CancelUrl => "cancel_url",
        }
    }

    /// Prefix check for a present value
    pub fn format_ok(&self, value: &str) -> bool {
        if value.is_empty() {
            return false;
        }
        match self {
            StripeVar::PublishableKey => value.starts_with("pk_live_") || value.starts_with("pk_test_"),
            StripeVar::SecretKey => value.starts_with("sk_live_") || value.starts_with("sk_test_"),
            StripeVar::WebhookSecret => value.starts_with("whsec_"),
            StripeVar::PriceBasic | StripeVar::PricePro => value.starts_with("price_"),
            StripeVar::SuccessUrl | StripeVar::CancelUrl => {
                value.starts_with("http://") || value.starts_with("https://")
            }
            StripeVar::CouponBasic | StripeVar::CouponPro => true,
        }
    }
}

/// Stripe settings read from the environment
#[derive(Debug, Clone, Default)]
pub struct StripeConfig {
    values: BTreeMap<StripeVar, String>,
}

impl StripeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(crate::config::env_string)
    }

    /// Build from any name → value lookup (tests pass a map)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let values = StripeVar::ALL
            .iter()
            .filter_map(|var| {
                lookup(var.env_name())
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .map(|v| (*var, v))
            })
            .collect();
        Self { values }
    }

    pub fn get(&self, var: StripeVar) -> Option<&str> {
        self.values.get(&var).map(String::as_str)
    }

    pub fn price_for(&self, tier: Tier) -> Option<&str> {
        match tier {
            Tier::Basic => self.get(StripeVar::PriceBasic),
            Tier::Pro => self.get(StripeVar::PricePro),
            Tier::Free | Tier::Enterprise => None,
        }
    }

    pub fn coupon_for(&self, tier: Tier) -> Option<&str> {
        match tier {
            Tier::Basic => self.get(StripeVar::CouponBasic),
            Tier::Pro => self.get(StripeVar::CouponPro),
            Tier::Free | Tier::Enterprise => None,
        }
    }

    pub fn readiness(&self) -> StripeReadiness {
        let env = StripeVar::ALL
            .iter()
            .map(|var| {
                let value = self.get(*var).unwrap_or("");
                let check = EnvCheck {
                    env_var: var.env_name().to_string(),
                    present: !value.is_empty(),
                    format_ok: var.format_ok(value),
                    len: value.len(),
                };
                (var.key().to_string(), check)
            })
            .collect();

        let has = |var: StripeVar| self.get(var).is_some();
        let ready_for_checkout = has(StripeVar::PublishableKey)
            && has(StripeVar::SecretKey)
            && has(StripeVar::PriceBasic)
            && has(StripeVar::PricePro);
        let ready_for_webhook = has(StripeVar::SecretKey) && has(StripeVar::WebhookSecret);

        StripeReadiness {
            stripe_module_available: true,
            env,
            ready_for_checkout,
            ready_for_webhook,
        }
    }

    /// Client for the configured secret key, if any
    pub fn client(&self) -> Result<Option<StripeClient>> {
        match self.get(StripeVar::SecretKey) {
            Some(key) => Ok(Some(StripeClient::new(key.to_string())?)),
            None => Ok(None),
        }
    }
}

/// Presence/format report for one variable
#[derive(Debug, Clone, Serialize)]
pub struct EnvCheck {
    #[serde(skip)]
    pub env_var: String,
    pub present: bool,
    pub format_ok: bool,
    #[serde(skip)]
    pub len: usize,
}

/// Billing readiness as served by `/api/v1/billing/readiness`
#[derive(Debug, Clone, Serialize)]
pub struct StripeReadiness {
    /// Always true: the client is compiled in. Kept for dashboard compatibility.
    pub stripe_module_available: bool,
    pub env: BTreeMap<String, EnvCheck>,
    pub ready_for_checkout: bool,
    pub ready_for_webhook: bool,
}

impl StripeReadiness {
    pub fn all_present(&self) -> bool {
        self.env.values().all(|c| c.present)
    }

    pub fn all_format_ok(&self) -> bool {
        self.env.values().filter(|c| c.present).all(|c| c.format_ok)
    }

    pub fn fully_ready(&self) -> bool {
        self.ready_for_checkout && self.ready_for_webhook && self.all_present() && self.all_format_ok()
    }
}

/// Show just enough of an id to recognise it
pub fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    match chars.len() {
        0 => "<missing>".to_string(),
        n if n <= 8 => format!("{}***", chars[0]),
        n => format!(
            "{}...{}",
            chars[..6].iter().collect::<String>(),
            chars[n - 4..].iter().collect::<String>()
        ),
    }
}

// ============================================================================
// API client
// ============================================================================

/// Parameters for a subscription checkout session
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub tier: Tier,
    pub price_id: String,
    pub coupon_id: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    /// Hash of the API key to upgrade once payment completes
    pub key_hash: String,
    pub customer_email: Option<String>,
}

/// The fields of a created session the API hands back
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

/// Thin form-encoded client for the Stripe REST API
#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    api_base: String,
}

impl StripeClient {
    pub fn new(secret_key: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            secret_key,
            api_base: STRIPE_API_BASE.to_string(),
        })
    }

    /// Point at a different API root (stripe-mock, tests)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
        let mut form: Vec<(String, String)> = vec![
            ("mode".into(), "subscription".into()),
            ("line_items[0][price]".into(), request.price_id.clone()),
            ("line_items[0][quantity]".into(), "1".into()),
            ("success_url".into(), request.success_url.clone()),
            ("cancel_url".into(), request.cancel_url.clone()),
            ("client_reference_id".into(), request.key_hash.clone()),
            ("metadata[tier]".into(), request.tier.as_str().into()),
            ("metadata[key_hash]".into(), request.key_hash.clone()),
            ("subscription_data[metadata][tier]".into(), request.tier.as_str().into()),
            ("subscription_data[metadata][key_hash]".into(), request.key_hash.clone()),
        ];
        if let Some(coupon) = &request.coupon_id {
            form.push(("discounts[0][coupon]".into(), coupon.clone()));
        }
        if let Some(email) = &request.customer_email {
            form.push(("customer_email".into(), email.clone()));
            form.push(("metadata[email]".into(), email.clone()));
        }

        debug!(tier = %request.tier, "Creating Stripe checkout session");
        let response = self
            .http
            .post(format!("{}/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await?;
        let session: CheckoutSession = Self::parse(response).await?;
        info!(session_id = %session.id, tier = %request.tier, "Stripe checkout session created");
        Ok(session)
    }

    pub async fn retrieve_price(&self, price_id: &str) -> Result<Value> {
        self.get_object("prices", price_id).await
    }

    pub async fn retrieve_coupon(&self, coupon_id: &str) -> Result<Value> {
        self.get_object("coupons", coupon_id).await
    }

    async fn get_object(&self, collection: &str, id: &str) -> Result<Value> {
        let response = self
            .http
            .get(format!("{}/{}/{}", self.api_base, collection, id))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        Self::parse(response).await
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }
        let body: Value = response.json().await.unwrap_or(Value::Null);
        let message = body
            .pointer("/error/message")
            .and_then(Value::as_str)
            .unwrap_or("no error message")
            .to_string();
        Err(Error::Upstream {
            status: status.as_u16(),
            message,
        })
    }
}

// ============================================================================
// Webhook signatures
// ============================================================================

/// Reasons a `Stripe-Signature` header is rejected
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("signature header has no timestamp")]
    MissingTimestamp,

    #[error("signature header has no v1 signatures")]
    NoSignatures,

    #[error("timestamp outside tolerance ({0}s drift)")]
    TimestampOutsideTolerance(i64),

    #[error("no signature matches the payload")]
    SignatureMismatch,

    #[error("invalid webhook secret")]
    InvalidSecret,
}

fn compute_signature(payload: &[u8], secret: &str, timestamp: i64) -> std::result::Result<String, WebhookError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| WebhookError::InvalidSecret)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Build a `Stripe-Signature` header value (test fixtures, local replay)
pub fn sign_webhook_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let signature = compute_signature(payload, secret, timestamp).unwrap_or_default();
    format!("t={},v1={}", timestamp, signature)
}

/// Verify a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=<hex>...]`)
pub fn verify_webhook_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> std::result::Result<(), WebhookError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value.to_string()),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(WebhookError::MissingTimestamp)?;
    if signatures.is_empty() {
        return Err(WebhookError::NoSignatures);
    }

    // `t=` is unauthenticated at this point, so the difference may not fit in i64
    let drift = now
        .checked_sub(timestamp)
        .map(i64::unsigned_abs)
        .and_then(|d| i64::try_from(d).ok())
        .unwrap_or(i64::MAX);
    if drift > tolerance_secs {
        return Err(WebhookError::TimestampOutsideTolerance(drift));
    }

    let expected = compute_signature(payload, secret, timestamp)?;
    let matched = signatures
        .iter()
        .any(|candidate| bool::from(expected.as_bytes().ct_eq(candidate.as_bytes())));
    if matched {
        Ok(())
    } else {
        Err(WebhookError::SignatureMismatch)
    }
}
