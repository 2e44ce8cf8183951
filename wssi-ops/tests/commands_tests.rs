//! Operator commands against a stand-in API and Stripe server

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use wssi_common::stripe::{StripeClient, StripeConfig};
use wssi_ops::commands::analytics::PushArgs;
use wssi_ops::commands::brief::PublishArgs;
use wssi_ops::commands::{analytics, brief, stripe};
use wssi_ops::{ApiClient, Exit};

const PUBLISH_TOKEN: &str = "pub-token";

#[derive(Default)]
struct Stub {
    blocked: bool,
    published: Vec<Value>,
    ingested: Vec<(Option<String>, Value)>,
}

type Shared = Arc<Mutex<Stub>>;

fn detail(status: StatusCode, code: &str) -> Response {
    (status, Json(json!({"detail": {"code": code, "message": code}}))).into_response()
}

async fn publish(State(stub): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if headers.get("x-brief-publish-token").and_then(|v| v.to_str().ok()) != Some(PUBLISH_TOKEN) {
        return detail(StatusCode::FORBIDDEN, "PUBLISH_TOKEN_INVALID");
    }
    let date = body.get("release_date").and_then(Value::as_str).unwrap_or("2026-10-19").to_string();
    stub.lock().unwrap().published.push(body);
    Json(json!({
        "status": "published",
        "archive_page_url": "http://api.test/briefs",
        "release": {
            "release_id": format!("fb-{}-0001", date),
            "release_date": date,
            "published_at": "2026-10-19T08:00:00Z",
            "links": {
                "free": {"view_url": "http://api.test/free"},
                "paid": {"view_url": "http://api.test/paid"}
            }
        }
    }))
    .into_response()
}

async fn readiness(State(stub): State<Shared>) -> Json<Value> {
    let blocked = stub.lock().unwrap().blocked;
    Json(json!({
        "status": if blocked { "blocked" } else { "ready" },
        "publish_blocked": blocked,
        "core_missing": if blocked { json!(["wssi_latest"]) } else { json!([]) },
        "publish_health": {"missing_sections": [], "stale_sections": []},
        "dataset_status": {
            "wssi_latest": {"available": !blocked, "freshness": if blocked { "missing" } else { "fresh" }}
        }
    }))
}

async fn ingest(State(stub): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
    let token = headers
        .get("x-analytics-ingest-token")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let names: Vec<String> = body["files"].as_object().map(|m| m.keys().cloned().collect()).unwrap_or_default();
    stub.lock().unwrap().ingested.push((token, body));
    Json(json!({
        "status": "ok",
        "written_count": names.len(),
        "files": names,
        "analytics_dir": "/srv/wssi/analytics"
    }))
}

async fn stripe_object(Path((collection, id)): Path<(String, String)>) -> Response {
    let known: HashMap<&str, &str> = [("prices", "price_basic_123"), ("prices", "price_pro_456"), ("coupons", "INTRO50")]
        .into_iter()
        .map(|(c, i)| (i, c))
        .collect();
    if known.get(id.as_str()) == Some(&collection.as_str()) {
        return Json(json!({"id": id, "object": collection.trim_end_matches('s')})).into_response();
    }
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": {"message": format!("No such {}: '{}'", collection, id)}})),
    )
        .into_response()
}

async fn start_server() -> (SocketAddr, Shared) {
    let stub: Shared = Arc::new(Mutex::new(Stub::default()));
    let app = Router::new()
        .route("/api/v1/briefs/releases/publish", post(publish))
        .route("/api/v1/briefs/releases/readiness", get(readiness))
        .route("/api/v1/analytics/ingest", post(ingest))
        .route("/v1/:collection/:id", get(stripe_object))
        .with_state(stub.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, stub)
}

fn client(addr: SocketAddr) -> ApiClient {
    // Trailing slash is tolerated
    ApiClient::new(&format!("http://{}/", addr), Duration::from_secs(5)).unwrap()
}

fn report(out: Vec<u8>) -> String {
    String::from_utf8(out).unwrap()
}

#[tokio::test]
async fn test_publish_brief_prints_release() {
    let (addr, stub) = start_server().await;
    let args = PublishArgs {
        token: Some(PUBLISH_TOKEN.to_string()),
        release_date: Some("2026-10-19".to_string()),
        notes: None,
        created_by: "script".to_string(),
    };

    let mut out = Vec::new();
    let exit = brief::publish(&client(addr), &args, &mut out).await.unwrap();
    assert_eq!(exit, Exit::Success);

    let text = report(out);
    assert!(text.starts_with("PUBLISH_START\n"));
    assert!(text.contains("release_id: fb-2026-10-19-0001\n"));
    assert!(text.contains("paid_view_url: http://api.test/paid\n"));
    assert!(text.ends_with("PUBLISH_END\n"));

    let published = &stub.lock().unwrap().published;
    assert_eq!(published[0], json!({"created_by": "script", "release_date": "2026-10-19"}));
}

#[tokio::test]
async fn test_publish_brief_rejected_token_fails() {
    let (addr, stub) = start_server().await;
    let args = PublishArgs {
        token: Some("wrong".to_string()),
        created_by: "script".to_string(),
        ..PublishArgs::default()
    };
    let mut out = Vec::new();
    let exit = brief::publish(&client(addr), &args, &mut out).await.unwrap();
    assert_eq!(exit, Exit::Failure);
    assert!(out.is_empty());
    assert!(stub.lock().unwrap().published.is_empty());
}

#[tokio::test]
async fn test_brief_readiness_exit_follows_blocked_flag() {
    let (addr, stub) = start_server().await;

    let mut out = Vec::new();
    assert_eq!(brief::readiness(&client(addr), &mut out).await.unwrap(), Exit::Success);
    let text = report(out);
    assert!(text.contains("status: ready\n"));
    assert!(text.contains("dataset[wssi_latest]: available=yes freshness=fresh source=--\n"));

    stub.lock().unwrap().blocked = true;
    let mut out = Vec::new();
    assert_eq!(brief::readiness(&client(addr), &mut out).await.unwrap(), Exit::Failure);
    let text = report(out);
    assert!(text.contains("publish_blocked: yes\n"));
    assert!(text.contains("core_missing: wssi_latest\n"));
}

#[tokio::test]
async fn test_brief_readiness_unreachable_api_fails() {
    let unreachable = ApiClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
    let mut out = Vec::new();
    assert_eq!(brief::readiness(&unreachable, &mut out).await.unwrap(), Exit::Failure);
}

#[tokio::test]
async fn test_push_analytics_uploads_bundle() {
    let (addr, stub) = start_server().await;
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("wssi-latest.json"), r#"{"wssi_value": 0.8}"#).unwrap();
    std::fs::write(dir.path().join("network.json"), r#"{"nodes": [], "edges": []}"#).unwrap();
    std::fs::write(dir.path().join("README.txt"), "ignored").unwrap();

    let args = PushArgs {
        token: Some("ingest-token".to_string()),
        input_dir: dir.path().to_path_buf(),
        source: "nightly".to_string(),
        dry_run: false,
    };
    let mut out = Vec::new();
    assert_eq!(analytics::push(&client(addr), &args, &mut out).await.unwrap(), Exit::Success);

    let text = report(out);
    assert!(text.contains("file_count: 2\n"));
    assert!(text.contains("status: ok\n"));
    assert!(text.contains("written_count: 2\n"));
    assert!(text.contains("analytics_dir: /srv/wssi/analytics\n"));
    assert!(text.ends_with("INGEST_BUNDLE_END\n"));

    let ingested = &stub.lock().unwrap().ingested;
    assert_eq!(ingested.len(), 1);
    let (token, body) = &ingested[0];
    assert_eq!(token.as_deref(), Some("ingest-token"));
    assert_eq!(body["source"], "nightly");
    assert_eq!(body["files"]["wssi-latest.json"]["wssi_value"], 0.8);
}

fn stripe_config() -> StripeConfig {
    let values: HashMap<&str, &str> = [
        ("STRIPE_SECRET_KEY", "sk_test_abc"),
        ("STRIPE_WEBHOOK_SECRET", "whsec_abc"),
        ("STRIPE_PRICE_BASIC", "price_basic_123"),
        ("STRIPE_PRICE_PRO", "price_pro_456"),
        ("STRIPE_COUPON_BASIC_INTRO", "INTRO50"),
        ("STRIPE_COUPON_PRO_INTRO", "SPRING99"),
    ]
    .into_iter()
    .collect();
    StripeConfig::from_lookup(|name| values.get(name).map(|v| v.to_string()))
}

#[tokio::test]
async fn test_stripe_verify_reports_each_object() {
    let (addr, _stub) = start_server().await;
    let stripe_client = StripeClient::new("sk_test_abc".to_string())
        .unwrap()
        .with_api_base(format!("http://{}/v1", addr));

    let mut out = Vec::new();
    let exit = stripe::verify(&stripe_config(), Some(stripe_client), &mut out).await.unwrap();
    assert_eq!(exit, Exit::Failure);

    let text = report(out);
    assert!(text.starts_with("STRIPE_REMOTE_VERIFY_START\n"));
    assert!(text.contains("price_basic: ok (price_..._123)\n"));
    assert!(text.contains("price_pro: ok ("));
    assert!(text.contains("coupon_basic: ok (I***)\n"));
    assert!(text.contains("coupon_pro: error (S***) ["));
    assert!(text.contains("No such coupons: 'SPRING99'"));
    assert!(text.contains("webhook_secret_present: yes\n"));
    assert!(text.ends_with("STRIPE_REMOTE_VERIFY_END\n"));
}
