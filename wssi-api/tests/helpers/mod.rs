//! Shared setup for wssi-api integration tests
//!
//! Each test gets its own temp data directory, database and artifact set and
//! drives the router in-process with `oneshot`.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tower::ServiceExt;
use wssi_api::config::ApiConfig;
use wssi_api::credentials::hash_key;
use wssi_api::db::init_database;
use wssi_api::db::keys::{insert_key, NewApiKey};
use wssi_api::{build_router, AppState};
use wssi_common::stripe::StripeConfig;
use wssi_common::Tier;

pub const PUBLISH_TOKEN: &str = "test-publish-token";
pub const INGEST_TOKEN: &str = "test-ingest-token";
pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub data_dir: PathBuf,
    _dir: TempDir,
}

impl TestApp {
    /// App with every artifact present and no billing configured
    pub async fn new() -> Self {
        Self::build(true, StripeConfig::default()).await
    }

    /// App with an empty analytics store
    pub async fn without_artifacts() -> Self {
        Self::build(false, StripeConfig::default()).await
    }

    /// App whose Stripe settings come from `pairs`
    pub async fn with_stripe(pairs: &[(&str, &str)]) -> Self {
        let owned: Vec<(String, String)> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        let stripe = StripeConfig::from_lookup(|name| {
            owned.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone())
        });
        Self::build(true, stripe).await
    }

    async fn build(with_artifacts: bool, stripe: StripeConfig) -> Self {
        let dir = TempDir::new().unwrap();
        let data_dir = dir.path().to_path_buf();

        let mut config = ApiConfig::for_data_dir(&data_dir);
        config.brief_publish_token = Some(PUBLISH_TOKEN.to_string());
        config.analytics_ingest_token = Some(INGEST_TOKEN.to_string());
        config.brief_retention = 3;

        if with_artifacts {
            write_fixtures(&config.analytics_dir);
        }

        let pool = init_database(&data_dir.join("wssi_api.db")).await.unwrap();
        let state = AppState::new(pool, config, stripe).unwrap();
        let router = build_router(state.clone());

        Self {
            router,
            state,
            data_dir,
            _dir: dir,
        }
    }

    pub fn analytics_dir(&self) -> &Path {
        &self.state.config.analytics_dir
    }

    /// Store a key directly and return its plaintext
    pub async fn key(&self, raw: &str, tier: Tier) -> String {
        self.stored_key(raw, tier, false).await
    }

    pub async fn admin_key(&self, raw: &str) -> String {
        self.stored_key(raw, Tier::Enterprise, true).await
    }

    async fn stored_key(&self, raw: &str, tier: Tier, is_admin: bool) -> String {
        let key_hash = hash_key(raw);
        insert_key(
            &self.state.db,
            &NewApiKey {
                key_hash: &key_hash,
                name: "integration",
                email: Some("integration@example.com"),
                tier,
                rate_limit: tier.daily_limit(),
                expires_at: None,
                is_admin,
                user_id: None,
            },
            Utc::now(),
        )
        .await
        .unwrap();
        raw.to_string()
    }

    /// Send a request; returns status, headers and the body (JSON, or a string for non-JSON bodies)
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        headers: &[(&str, &str)],
        body: Option<Vec<u8>>,
    ) -> (StatusCode, HeaderMap, Value) {
        let mut request = Request::builder().method(method).uri(path);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let request = match body {
            Some(bytes) => request
                .header("content-type", "application/json")
                .body(Body::from(bytes))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, headers, body)
    }

    pub async fn get(&self, path: &str, headers: &[(&str, &str)]) -> (StatusCode, Value) {
        let (status, _, body) = self.send(Method::GET, path, headers, None).await;
        (status, body)
    }

    pub async fn post_json(&self, path: &str, headers: &[(&str, &str)], body: Value) -> (StatusCode, Value) {
        let (status, _, body) = self.send(Method::POST, path, headers, Some(body.to_string().into_bytes())).await;
        (status, body)
    }
}

/// `detail.code` of an error body
pub fn error_code(body: &Value) -> &str {
    body["detail"]["code"].as_str().unwrap_or("")
}

/// Drop volatile keys so two payloads can be compared
pub fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !matches!(k.as_str(), "timestamp" | "created_at" | "updated_at"))
                .map(|(k, v)| (k.clone(), canonical(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

pub fn snapshot_fixture() -> Value {
    json!({
        "wssi_value": 1.84,
        "wssi_score": 86.8,
        "wssi_delta": 0.12,
        "trend": "rising",
        "stress_level": "approaching",
        "active_themes": 4,
        "above_warning": 2,
        "calculation_timestamp": Utc::now().to_rfc3339(),
        "theme_signals": [
            {
                "theme_id": "food-system",
                "theme_name": "Food System",
                "category": "ecological",
                "stress_level": "critical",
                "mean_z_score": 2.41,
                "momentum_30d": 0.3,
                "indicator_details": [
                    {"indicator_id": "fao-food-price", "indicator_name": "FAO Food Price Index", "normalized_z": 2.6}
                ]
            },
            {
                "theme_id": "governance-decay",
                "theme_name": "Governance Decay",
                "category": "political",
                "stress_level": "approaching",
                "mean_z_score": -1.7,
                "momentum_30d": -0.1,
                "indicator_details": []
            },
            {
                "theme_id": "debt-stress",
                "theme_name": "Debt Stress",
                "category": "economic",
                "stress_level": "watch",
                "mean_z_score": 1.1,
                "momentum_30d": 0.05,
                "indicator_details": []
            },
            {
                "theme_id": "climate-shock",
                "theme_name": "Climate Shock",
                "category": "ecological",
                "stress_level": "stable",
                "mean_z_score": 0.4,
                "momentum_30d": 0.0,
                "indicator_details": []
            }
        ]
    })
}

fn history_fixture() -> Value {
    let today = Utc::now().date_naive();
    let history: Vec<Value> = (0..40)
        .rev()
        .map(|i| {
            let date = today - chrono::Duration::days(i);
            json!({
                "date": date.format("%Y-%m-%d").to_string(),
                "wssi_value": 1.0 + i as f64 * 0.01,
                "wssi_score": 70.0 + i as f64 * 0.1
            })
        })
        .collect();
    json!({ "history": history })
}

fn indicators_fixture() -> Value {
    json!({
        "indicators": [
            {
                "indicator_id": "fao-food-price",
                "indicator_name": "FAO Food Price Index",
                "source": "FAO",
                "raw_value": 131.2,
                "normalized_z": 2.6,
                "theme_id": "food-system",
                "date": "2026-10-01"
            },
            {
                "indicator_id": "gov-effectiveness",
                "indicator_name": "Government Effectiveness",
                "source": "WGI",
                "raw_value": -0.4,
                "normalized_z": -1.7,
                "theme_id": "governance-decay",
                "date": "2026-09-30"
            }
        ],
        "count": 2
    })
}

fn correlations_fixture() -> Value {
    json!({
        "generated_at": Utc::now().to_rfc3339(),
        "theme_level": {
            "pairs": [
                {"theme_a": "food-system", "theme_b": "debt-stress", "pearson_r": 0.62, "p_value": 0.01, "sample_n": 40},
                {"theme_a": "food-system", "theme_b": "governance-decay", "pearson_r": -0.81, "p_value": 0.001, "sample_n": 40}
            ],
            "matrix": {
                "food-system": {"debt-stress": 0.62, "governance-decay": -0.81},
                "debt-stress": {"food-system": 0.62, "governance-decay": null}
            }
        }
    })
}

fn network_fixture() -> Value {
    json!({
        "nodes": [{"id": "food-system"}, {"id": "debt-stress"}, {"id": "governance-decay"}],
        "edges": [
            {"id": "e1", "source": "food-system", "target": "debt-stress", "weight": 0.62},
            {"id": "e2", "source": "food-system", "target": "governance-decay", "weight": 0.81}
        ],
        "node_count": 3,
        "edge_count": 2
    })
}

pub fn alerts_fixture() -> Value {
    json!({
        "generated_at": Utc::now().to_rfc3339(),
        "active_alerts": [
            {"id": "a1", "severity": "critical", "status": "active", "theme_id": "food-system"}
        ],
        "recent_alerts": [
            {"id": "a0", "severity": "warning", "status": "resolved", "theme_id": "debt-stress"}
        ]
    })
}

fn patterns_fixture() -> Value {
    json!({
        "generated_at": Utc::now().to_rfc3339(),
        "matches": [
            {
                "episode_id": "2008-gfc",
                "label": "Global Financial Crisis",
                "period": "2007-2009",
                "confidence_tier": "high",
                "similarity_pct": 78.5,
                "diagnostics": {"overlap": ["debt-stress"], "missing_indicators": []}
            },
            {
                "episode_id": "2011-food",
                "label": "2011 Food Price Spike",
                "period": "2010-2011",
                "confidence_tier": "medium",
                "similarity_pct": 64.0,
                "diagnostics": {"overlap": ["food-system"], "missing_indicators": ["gov-effectiveness"]}
            }
        ]
    })
}

/// Write the full artifact set into `dir`
pub fn write_fixtures(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    let files = [
        ("wssi-latest.json", snapshot_fixture()),
        ("wssi-history.json", history_fixture()),
        ("indicators-latest.json", indicators_fixture()),
        ("correlations.json", correlations_fixture()),
        ("network.json", network_fixture()),
        ("alerts.json", alerts_fixture()),
        ("patterns.json", patterns_fixture()),
    ];
    for (name, doc) in files {
        std::fs::write(dir.join(name), serde_json::to_vec_pretty(&doc).unwrap()).unwrap();
    }
}
