//! `push-analytics`: upload local pipeline artifacts to the API

use anyhow::{Context, Result};
use clap::Args;
use serde_json::{json, Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use wssi_common::analytics::Dataset;
use wssi_common::config::env_string;

use super::{present, text, Exit};
use crate::client::ApiClient;

pub const INGEST_PATH: &str = "/api/v1/analytics/ingest";
pub const INGEST_TOKEN_HEADER: &str = "X-Analytics-Ingest-Token";

#[derive(Args, Debug, Clone)]
pub struct PushArgs {
    /// Ingest token; falls back to WSSI_BRIEF_PUBLISH_TOKEN
    #[arg(long, env = "WSSI_ANALYTICS_INGEST_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Directory holding the artifact files
    #[arg(long, env = "WSSI_LOCAL_ANALYTICS_DIR", default_value = "output/analytics")]
    pub input_dir: PathBuf,

    /// Source label recorded by the API
    #[arg(long, default_value = "manual-script")]
    pub source: String,

    /// Report what would be sent without sending it
    #[arg(long)]
    pub dry_run: bool,
}

impl PushArgs {
    fn token(&self) -> Option<String> {
        present(&self.token)
            .map(str::to_string)
            .or_else(|| env_string("WSSI_BRIEF_PUBLISH_TOKEN"))
    }
}

/// Read every known artifact present in `dir`
///
/// Unknown files are ignored; a known file that is not JSON is an error.
pub async fn load_bundle(dir: &Path) -> Result<Map<String, Value>> {
    let mut files = Map::new();
    for dataset in Dataset::ALL {
        let path = dir.join(dataset.file_name());
        if !path.is_file() {
            continue;
        }
        let raw = tokio::fs::read(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let doc: Value =
            serde_json::from_slice(&raw).with_context(|| format!("parsing {}", path.display()))?;
        files.insert(dataset.file_name().to_string(), doc);
    }
    Ok(files)
}

pub async fn push(client: &ApiClient, args: &PushArgs, out: &mut impl Write) -> Result<Exit> {
    let Some(token) = args.token() else {
        eprintln!(
            "ERROR: missing ingest token. Provide --token or set WSSI_ANALYTICS_INGEST_TOKEN (or WSSI_BRIEF_PUBLISH_TOKEN)."
        );
        return Ok(Exit::Usage);
    };
    if !args.input_dir.is_dir() {
        eprintln!("ERROR: input directory not found: {}", args.input_dir.display());
        return Ok(Exit::Usage);
    }

    let files = match load_bundle(&args.input_dir).await {
        Ok(files) => files,
        Err(e) => {
            eprintln!("ERROR: {:#}", e);
            return Ok(Exit::Usage);
        }
    };
    if files.is_empty() {
        eprintln!("ERROR: no analytics artifacts found in {}", args.input_dir.display());
        return Ok(Exit::Usage);
    }

    let names: Vec<&str> = files.keys().map(String::as_str).collect();
    writeln!(out, "INGEST_BUNDLE_START")?;
    writeln!(out, "input_dir: {}", args.input_dir.display())?;
    writeln!(out, "file_count: {}", files.len())?;
    writeln!(out, "files: {}", names.join(", "))?;

    if args.dry_run {
        writeln!(out, "mode: dry-run")?;
        writeln!(out, "INGEST_BUNDLE_END")?;
        return Ok(Exit::Success);
    }

    let body = json!({"source": args.source, "files": files});
    let response = match client
        .post_json(INGEST_PATH, &[(INGEST_TOKEN_HEADER, token.as_str())], &body)
        .await
    {
        Ok(response) => response,
        Err(e) => {
            eprintln!("ERROR: ingest failed: {}", e);
            return Ok(Exit::Failure);
        }
    };

    writeln!(out, "status: {}", text(&response, "/status", "unknown"))?;
    writeln!(
        out,
        "written_count: {}",
        response.get("written_count").and_then(Value::as_u64).unwrap_or(0)
    )?;
    writeln!(out, "analytics_dir: {}", text(&response, "/analytics_dir", ""))?;
    writeln!(out, "INGEST_BUNDLE_END")?;
    Ok(Exit::Success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(dir: &Path, token: Option<&str>, dry_run: bool) -> PushArgs {
        PushArgs {
            token: token.map(str::to_string),
            input_dir: dir.to_path_buf(),
            source: "manual-script".to_string(),
            dry_run,
        }
    }

    fn offline_client() -> ApiClient {
        ApiClient::new("http://127.0.0.1:9", std::time::Duration::from_secs(1)).unwrap()
    }

    #[tokio::test]
    async fn test_load_bundle_picks_known_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("wssi-latest.json"), r#"{"wssi_value": 1.2}"#).unwrap();
        std::fs::write(dir.path().join("alerts.json"), "[]").unwrap();
        std::fs::write(dir.path().join("notes.json"), "{}").unwrap();

        let files = load_bundle(dir.path()).await.unwrap();
        let names: Vec<&String> = files.keys().collect();
        assert_eq!(names, vec!["alerts.json", "wssi-latest.json"]);
        assert_eq!(files["wssi-latest.json"]["wssi_value"], 1.2);
    }

    #[tokio::test]
    async fn test_load_bundle_rejects_broken_json() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("network.json"), "{not json").unwrap();
        let err = load_bundle(dir.path()).await.unwrap_err();
        assert!(format!("{:#}", err).contains("network.json"));
    }

    #[tokio::test]
    async fn test_dry_run_reports_bundle_without_sending() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("wssi-latest.json"), "{}").unwrap();
        std::fs::write(dir.path().join("patterns.json"), "{}").unwrap();

        let mut out = Vec::new();
        let exit = push(&offline_client(), &args(dir.path(), Some("t"), true), &mut out)
            .await
            .unwrap();
        assert_eq!(exit, Exit::Success);
        let report = String::from_utf8(out).unwrap();
        assert!(report.starts_with("INGEST_BUNDLE_START\n"));
        assert!(report.contains("file_count: 2\n"));
        assert!(report.contains("files: patterns.json, wssi-latest.json\n"));
        assert!(report.contains("mode: dry-run\n"));
        assert!(report.ends_with("INGEST_BUNDLE_END\n"));
    }

    #[tokio::test]
    async fn test_usage_errors() {
        let dir = TempDir::new().unwrap();
        let mut out = Vec::new();

        let missing_dir = dir.path().join("nope");
        let exit = push(&offline_client(), &args(&missing_dir, Some("t"), true), &mut out)
            .await
            .unwrap();
        assert_eq!(exit, Exit::Usage);

        let exit = push(&offline_client(), &args(dir.path(), Some("t"), true), &mut out)
            .await
            .unwrap();
        assert_eq!(exit, Exit::Usage);
        assert!(out.is_empty());
    }
}
