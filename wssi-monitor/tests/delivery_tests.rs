//! Webhook and Discord delivery against a local capture server

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use wssi_common::analytics::{AnalyticsStore, Dataset};
use wssi_monitor::config::{ChannelsConfig, DiscordChannel, WebhookChannel};
use wssi_monitor::store::{init_alert_database, recent_alerts};
use wssi_monitor::{Channel, Monitor, MonitorConfig};

#[derive(Debug, Clone)]
struct Captured {
    route: String,
    token: Option<String>,
    body: Value,
}

type Captures = Arc<Mutex<Vec<Captured>>>;

async fn capture(
    State(captures): State<Captures>,
    Path(route): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    let token = headers
        .get("x-alert-token")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    captures.lock().unwrap().push(Captured { route: route.clone(), token, body });
    if route == "broken" {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::NO_CONTENT
    }
}

async fn start_server() -> (SocketAddr, Captures) {
    let captures: Captures = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/hooks/:route", post(capture))
        .with_state(captures.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, captures)
}

fn channels(addr: SocketAddr, webhook_route: &str) -> ChannelsConfig {
    let mut headers = BTreeMap::new();
    headers.insert("X-Alert-Token".to_string(), "s3cret".to_string());
    ChannelsConfig {
        webhook: WebhookChannel {
            enabled: true,
            url: format!("http://{}/hooks/{}", addr, webhook_route),
            headers,
        },
        discord: DiscordChannel {
            enabled: true,
            webhook_url: format!("http://{}/hooks/discord", addr),
        },
        ..ChannelsConfig::default()
    }
}

async fn monitor(config: MonitorConfig, snapshot: Option<Value>) -> (Monitor, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = AnalyticsStore::new(dir.path().join("analytics"), None);
    if let Some(doc) = snapshot {
        store.write(Dataset::WssiLatest, &doc).await.unwrap();
    }
    let pool = init_alert_database(&dir.path().join("alerts.db")).await.unwrap();
    (Monitor::new(config, store, pool).unwrap(), dir)
}

#[tokio::test]
async fn test_test_alert_reaches_webhook_and_discord() {
    let (addr, captures) = start_server().await;
    let config = MonitorConfig {
        channels: channels(addr, "generic"),
        ..MonitorConfig::default()
    };
    let (monitor, _dir) = monitor(config, None).await;

    let deliveries = monitor.send_test_alert(Utc::now()).await;
    let delivered: Vec<Channel> = deliveries.iter().filter(|d| d.delivered).map(|d| d.channel).collect();
    assert_eq!(delivered, vec![Channel::Webhook, Channel::Discord]);

    let captured = captures.lock().unwrap().clone();
    assert_eq!(captured.len(), 2);

    let generic = captured.iter().find(|c| c.route == "generic").unwrap();
    assert_eq!(generic.token.as_deref(), Some("s3cret"));
    assert_eq!(generic.body["alert_type"], "test");
    assert_eq!(generic.body["severity"], "critical");
    assert_eq!(generic.body["wssi_value"], 2.34);

    let discord = captured.iter().find(|c| c.route == "discord").unwrap();
    assert_eq!(discord.token, None);
    assert_eq!(discord.body["embeds"][0]["color"], 16711680);
    assert!(discord.body["content"].as_str().unwrap().contains("TEST ALERT"));
}

#[tokio::test]
async fn test_error_status_counts_as_not_delivered() {
    let (addr, captures) = start_server().await;
    let config = MonitorConfig {
        channels: channels(addr, "broken"),
        ..MonitorConfig::default()
    };
    let (monitor, _dir) = monitor(config, None).await;

    let deliveries = monitor.send_test_alert(Utc::now()).await;
    let webhook = deliveries.iter().find(|d| d.channel == Channel::Webhook).unwrap();
    let discord = deliveries.iter().find(|d| d.channel == Channel::Discord).unwrap();
    assert!(!webhook.delivered);
    assert!(discord.delivered);
    assert_eq!(captures.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_pass_sends_each_alert_once() {
    let (addr, captures) = start_server().await;
    let config = MonitorConfig {
        channels: channels(addr, "generic"),
        ..MonitorConfig::default()
    };
    let snapshot = json!({
        "wssi_value": 1.62,
        "active_themes": 2,
        "above_warning": 1,
        "theme_signals": [
            {"theme_id": "debt-stress", "theme_name": "Debt Stress", "normalized_value": -2.2},
            {"theme_id": "climate", "theme_name": "Climate", "normalized_value": 0.3}
        ]
    });
    let (monitor, dir) = monitor(config, Some(snapshot)).await;

    let summary = monitor.run_once(Utc::now()).await.unwrap();
    assert_eq!(summary.sent, 2);

    let generic: Vec<Value> = captures
        .lock()
        .unwrap()
        .iter()
        .filter(|c| c.route == "generic")
        .map(|c| c.body.clone())
        .collect();
    assert_eq!(generic.len(), 2);
    assert_eq!(generic[0]["message"], "WSSI at 1.62 (approaching)");
    assert_eq!(generic[1]["theme_id"], "debt-stress");
    assert_eq!(generic[1]["message"], "Debt Stress at 2.20 (critical)");

    // Same readings again: nothing new goes out
    let again = monitor.run_once(Utc::now()).await.unwrap();
    assert_eq!(again.sent, 0);
    assert_eq!(captures.lock().unwrap().len(), 4);

    let pool = init_alert_database(&dir.path().join("alerts.db")).await.unwrap();
    let history = recent_alerts(&pool, 10).await.unwrap();
    assert_eq!(history.len(), 2);
}
