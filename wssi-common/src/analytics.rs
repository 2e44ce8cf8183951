//! Analytics artifact store
//!
//! The WSSI analytics are computed upstream and delivered as a fixed set of JSON
//! files. This module locates them (runtime store first, bundled fallback
//! second), parses the handful of fields the serving layer relies on, and
//! reports per-dataset freshness. Everything else in a document is passed
//! through untouched.

use crate::{Error, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// One of the artifact files produced by the analytics pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    WssiLatest,
    WssiHistory,
    Indicators,
    Correlations,
    Network,
    Alerts,
    Patterns,
}

impl Dataset {
    pub const ALL: [Dataset; 7] = [
        Dataset::WssiLatest,
        Dataset::WssiHistory,
        Dataset::Indicators,
        Dataset::Correlations,
        Dataset::Network,
        Dataset::Alerts,
        Dataset::Patterns,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            Dataset::WssiLatest => "wssi-latest.json",
            Dataset::WssiHistory => "wssi-history.json",
            Dataset::Indicators => "indicators-latest.json",
            Dataset::Correlations => "correlations.json",
            Dataset::Network => "network.json",
            Dataset::Alerts => "alerts.json",
            Dataset::Patterns => "patterns.json",
        }
    }

    /// Reverse of [`Dataset::file_name`]; only known names are accepted
    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.file_name() == name)
    }

    /// Stable key used in readiness reports
    pub fn key(&self) -> &'static str {
        match self {
            Dataset::WssiLatest => "wssi_latest",
            Dataset::WssiHistory => "wssi_history",
            Dataset::Indicators => "indicators",
            Dataset::Correlations => "correlations",
            Dataset::Network => "network",
            Dataset::Alerts => "alerts",
            Dataset::Patterns => "patterns",
        }
    }

    /// Datasets without which nothing meaningful can be served or published
    pub fn is_core(&self) -> bool {
        matches!(self, Dataset::WssiLatest)
    }
}

/// A parsed artifact and the file it was read from
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub value: Value,
    pub source: PathBuf,
}

/// Freshness bucket for a dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Fresh,
    Stale,
    Missing,
}

/// Availability and age of one dataset
#[derive(Debug, Clone, Serialize)]
pub struct DatasetStatus {
    pub dataset: String,
    pub file_name: String,
    pub available: bool,
    pub source_path: Option<String>,
    pub generated_at: Option<DateTime<Utc>>,
    pub age_hours: Option<f64>,
    pub freshness: Freshness,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Two-level artifact lookup: runtime store, then bundled fallback
#[derive(Debug, Clone)]
pub struct AnalyticsStore {
    primary: PathBuf,
    fallback: Option<PathBuf>,
}

impl AnalyticsStore {
    pub fn new(primary: PathBuf, fallback: Option<PathBuf>) -> Self {
        Self { primary, fallback }
    }

    /// Directory ingested artifacts are written to
    pub fn primary_dir(&self) -> &Path {
        &self.primary
    }

    pub fn fallback_dir(&self) -> Option<&Path> {
        self.fallback.as_deref()
    }

    /// First existing path for `dataset`
    pub fn locate(&self, dataset: Dataset) -> Option<PathBuf> {
        let primary = self.primary.join(dataset.file_name());
        if primary.is_file() {
            return Some(primary);
        }
        let fallback = self.fallback.as_ref()?.join(dataset.file_name());
        if fallback.is_file() {
            debug!("{} served from fallback {}", dataset.file_name(), fallback.display());
            return Some(fallback);
        }
        None
    }

    /// Read and parse `dataset`
    pub async fn load(&self, dataset: Dataset) -> Result<LoadedDocument> {
        let source = self
            .locate(dataset)
            .ok_or_else(|| Error::NotFound(format!("{} not available", dataset.file_name())))?;
        let bytes = tokio::fs::read(&source).await?;
        let value: Value = serde_json::from_slice(&bytes)?;
        Ok(LoadedDocument { value, source })
    }

    /// Read `dataset` into a typed view
    pub async fn load_as<T: DeserializeOwned>(&self, dataset: Dataset) -> Result<T> {
        let doc = self.load(dataset).await?;
        Ok(serde_json::from_value(doc.value)?)
    }

    /// Current WSSI snapshot with theme ids filled in
    pub async fn snapshot(&self) -> Result<WssiSnapshot> {
        let mut snapshot: WssiSnapshot = self.load_as(Dataset::WssiLatest).await?;
        snapshot.normalize();
        Ok(snapshot)
    }

    /// Write `value` as `dataset` into the primary directory
    ///
    /// The document lands in a uniquely named temp file, is fsynced, then
    /// renamed into place so a concurrent reader never sees a half-written
    /// artifact and concurrent writers never share a temp file.
    pub async fn write(&self, dataset: Dataset, value: &Value) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.primary).await?;
        let target = self.primary.join(dataset.file_name());
        let tmp = self.primary.join(format!(
            ".{}.{}.{}.tmp",
            dataset.file_name(),
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let body = serde_json::to_vec_pretty(value)?;

        let staged = stage(&tmp, &body).await;
        let committed = match staged {
            Ok(()) => tokio::fs::rename(&tmp, &target).await,
            Err(e) => Err(e),
        };
        if let Err(e) = committed {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(target)
    }

    /// Availability and freshness of `dataset`
    pub async fn status(&self, dataset: Dataset, stale_after: Duration, now: DateTime<Utc>) -> DatasetStatus {
        let mut status = DatasetStatus {
            dataset: dataset.key().to_string(),
            file_name: dataset.file_name().to_string(),
            available: false,
            source_path: None,
            generated_at: None,
            age_hours: None,
            freshness: Freshness::Missing,
            error: None,
        };

        let doc = match self.load(dataset).await {
            Ok(doc) => doc,
            Err(Error::NotFound(_)) => return status,
            Err(e) => {
                warn!("{} unreadable: {}", dataset.file_name(), e);
                status.source_path = self.locate(dataset).map(|p| p.display().to_string());
                status.error = Some(e.to_string());
                return status;
            }
        };

        let generated_at = match generated_at(&doc.value) {
            Some(ts) => Some(ts),
            None => modified_at(&doc.source).await,
        };

        status.available = true;
        status.source_path = Some(doc.source.display().to_string());
        status.generated_at = generated_at;
        if let Some(ts) = generated_at {
            let age = now.signed_duration_since(ts);
            status.age_hours = Some((age.num_seconds() as f64 / 3600.0 * 100.0).round() / 100.0);
            status.freshness = if age > stale_after {
                Freshness::Stale
            } else {
                Freshness::Fresh
            };
        } else {
            status.freshness = Freshness::Stale;
        }
        status
    }
}

async fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
    let meta = tokio::fs::metadata(path).await.ok()?;
    meta.modified().ok().map(DateTime::<Utc>::from)
}

/// Generation time declared inside a document
///
/// Looks at `generated_at`, then `calculation_timestamp`.
pub fn generated_at(value: &Value) -> Option<DateTime<Utc>> {
    ["generated_at", "calculation_timestamp"]
        .iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .find_map(parse_timestamp)
}

/// Parse RFC 3339 or naive ISO-8601 (assumed UTC) timestamps
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    None
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

async fn stage(tmp: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(tmp)
        .await?;
    file.write_all(body).await?;
    file.sync_all().await
}

// ============================================================================
// Typed views
// ============================================================================

fn unknown() -> String {
    "unknown".to_string()
}

/// `wssi-latest.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WssiSnapshot {
    pub wssi_value: f64,
    #[serde(default)]
    pub wssi_score: f64,
    #[serde(default)]
    pub wssi_delta: f64,
    #[serde(default = "unknown")]
    pub trend: String,
    #[serde(default = "unknown")]
    pub stress_level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_themes: Option<i64>,
    #[serde(default)]
    pub above_warning: i64,
    #[serde(default)]
    pub calculation_timestamp: String,
    #[serde(default)]
    pub theme_signals: Vec<ThemeSignal>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WssiSnapshot {
    /// Fill derived fields older artifacts leave out
    pub fn normalize(&mut self) {
        for signal in &mut self.theme_signals {
            signal.ensure_id();
        }
        if self.active_themes.is_none() {
            self.active_themes = Some(self.theme_signals.len() as i64);
        }
    }

    /// `active_themes` as published, or the signal count when the artifact omits it
    pub fn active_theme_count(&self) -> i64 {
        self.active_themes.unwrap_or(self.theme_signals.len() as i64)
    }

    pub fn theme(&self, theme_id: &str) -> Option<&ThemeSignal> {
        self.theme_signals.iter().find(|t| t.theme_id == theme_id)
    }

    /// Themes ordered by stress magnitude, strongest first
    pub fn ranked_themes(&self) -> Vec<&ThemeSignal> {
        let mut themes: Vec<&ThemeSignal> = self.theme_signals.iter().collect();
        themes.sort_by(|a, b| {
            let a = a.normalized_value().unwrap_or(0.0).abs();
            let b = b.normalized_value().unwrap_or(0.0).abs();
            b.total_cmp(&a)
        });
        themes
    }
}

/// One entry of `theme_signals`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeSignal {
    #[serde(default)]
    pub theme_id: String,
    pub theme_name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default = "unknown")]
    pub stress_level: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ThemeSignal {
    pub fn ensure_id(&mut self) {
        if self.theme_id.trim().is_empty() {
            self.theme_id = theme_slug(&self.theme_name);
        }
    }

    /// Z-scored stress value (`normalized_value`, or `mean_z_score` in newer artifacts)
    pub fn normalized_value(&self) -> Option<f64> {
        self.extra
            .get("normalized_value")
            .or_else(|| self.extra.get("mean_z_score"))
            .and_then(Value::as_f64)
    }

    /// Per-indicator rows carried by newer artifacts
    pub fn indicator_details(&self) -> &[Value] {
        self.extra
            .get("indicator_details")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Theme id derived from a display name ("Food / Water" → "food---water")
pub fn theme_slug(name: &str) -> String {
    name.to_lowercase().replace([' ', '/'], "-")
}

/// One row of `wssi-history.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub date: String,
    pub wssi_value: f64,
    pub wssi_score: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `wssi-history.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryDocument {
    pub history: Vec<HistoryPoint>,
}

/// Last `days` points in ascending date order
pub fn history_window(mut points: Vec<HistoryPoint>, days: usize) -> Vec<HistoryPoint> {
    points.sort_by(|a, b| a.date.cmp(&b.date));
    let skip = points.len().saturating_sub(days);
    points.into_iter().skip(skip).collect()
}

/// Synthetic history around `current`, used when no history artifact exists
///
/// Produces `days` points ending on `today`, ascending.
pub fn synthetic_history(current: f64, days: usize, today: NaiveDate) -> Vec<HistoryPoint> {
    (0..days)
        .rev()
        .map(|i| {
            let date = today - Duration::days(i as i64);
            let variation = ((i % 7) as f64 - 3.0) * 0.1 + (i % 3) as f64 * 0.05;
            let value = current + variation;
            HistoryPoint {
                date: date.format("%Y-%m-%d").to_string(),
                wssi_value: round_to(value, 4),
                wssi_score: round_to((50.0 + value * 20.0).clamp(0.0, 100.0), 2),
                extra: Map::new(),
            }
        })
        .collect()
}

/// Round to `places` decimal places
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
