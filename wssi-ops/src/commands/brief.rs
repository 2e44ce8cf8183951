//! `publish-brief` and `brief-readiness`

use anyhow::Result;
use clap::Args;
use serde_json::{json, Map, Value};
use std::io::Write;

use super::{list_or_none, present, text, yes_no, Exit};
use crate::client::ApiClient;

pub const PUBLISH_PATH: &str = "/api/v1/briefs/releases/publish";
pub const READINESS_PATH: &str = "/api/v1/briefs/releases/readiness";

#[derive(Args, Debug, Clone, Default)]
pub struct PublishArgs {
    /// Publish token
    #[arg(long, env = "WSSI_BRIEF_PUBLISH_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Release date (YYYY-MM-DD); the server uses today when omitted
    #[arg(long)]
    pub release_date: Option<String>,

    /// Release notes
    #[arg(long)]
    pub notes: Option<String>,

    /// Creator label stored with the release
    #[arg(long, default_value = "script")]
    pub created_by: String,
}

pub fn publish_payload(args: &PublishArgs) -> Value {
    let mut body = Map::new();
    body.insert("created_by".into(), json!(args.created_by));
    if let Some(date) = present(&args.release_date) {
        body.insert("release_date".into(), json!(date));
    }
    if let Some(notes) = present(&args.notes) {
        body.insert("notes".into(), json!(notes));
    }
    Value::Object(body)
}

pub fn publish_report(response: &Value) -> String {
    let lines = [
        "PUBLISH_START".to_string(),
        format!("release_id: {}", text(response, "/release/release_id", "unknown")),
        format!("release_date: {}", text(response, "/release/release_date", "unknown")),
        format!("published_at: {}", text(response, "/release/published_at", "unknown")),
        format!("archive_page_url: {}", text(response, "/archive_page_url", "")),
        format!("free_view_url: {}", text(response, "/release/links/free/view_url", "")),
        format!("paid_view_url: {}", text(response, "/release/links/paid/view_url", "")),
        "PUBLISH_END".to_string(),
    ];
    lines.join("\n") + "\n"
}

pub async fn publish(client: &ApiClient, args: &PublishArgs, out: &mut impl Write) -> Result<Exit> {
    let Some(token) = present(&args.token) else {
        eprintln!("ERROR: missing publish token. Provide --token or set WSSI_BRIEF_PUBLISH_TOKEN.");
        return Ok(Exit::Usage);
    };

    let response = match client
        .post_json(PUBLISH_PATH, &[("X-Brief-Publish-Token", token)], &publish_payload(args))
        .await
    {
        Ok(response) => response,
        Err(e) => {
            eprintln!("ERROR: publish failed: {}", e);
            return Ok(Exit::Failure);
        }
    };

    out.write_all(publish_report(&response).as_bytes())?;
    Ok(Exit::Success)
}

/// Operator summary of a readiness response; the flag is `publish_blocked`
pub fn readiness_report(response: &Value) -> (String, bool) {
    let blocked = response
        .get("publish_blocked")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let mut lines = vec![
        "READINESS_START".to_string(),
        format!("status: {}", text(response, "/status", "unknown")),
        format!("publish_blocked: {}", yes_no(blocked)),
        format!("core_missing: {}", list_or_none(response, "/core_missing")),
        format!("missing_sections: {}", list_or_none(response, "/publish_health/missing_sections")),
        format!("stale_sections: {}", list_or_none(response, "/publish_health/stale_sections")),
    ];

    if let Some(datasets) = response.get("dataset_status").and_then(Value::as_object) {
        let mut keys: Vec<&String> = datasets.keys().collect();
        keys.sort();
        for key in keys {
            let row = &datasets[key.as_str()];
            let available = row.get("available").and_then(Value::as_bool).unwrap_or(false);
            lines.push(format!(
                "dataset[{}]: available={} freshness={} source={}",
                key,
                yes_no(available),
                text(row, "/freshness", "unknown"),
                text(row, "/source_path", "--"),
            ));
        }
    }

    lines.push("READINESS_END".to_string());
    (lines.join("\n") + "\n", blocked)
}

pub async fn readiness(client: &ApiClient, out: &mut impl Write) -> Result<Exit> {
    let response = match client.get_json(READINESS_PATH).await {
        Ok(response) => response,
        Err(e) => {
            eprintln!("ERROR: readiness check failed: {}", e);
            return Ok(Exit::Failure);
        }
    };

    let (report, blocked) = readiness_report(&response);
    out.write_all(report.as_bytes())?;
    Ok(if blocked { Exit::Failure } else { Exit::Success })
}
