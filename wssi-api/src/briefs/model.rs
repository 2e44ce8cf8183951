//! Fragility Brief content model
//!
//! A brief is composed once from the analytics store into the full (paid)
//! document; the free document is derived from it by redaction so the two can
//! never disagree on the numbers they share.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;
use wssi_common::analytics::{round_to, AnalyticsStore, Dataset, Freshness, WssiSnapshot};
use wssi_common::Result;

/// Themes shown in the free variant
pub const FREE_THEME_LIMIT: usize = 3;

/// Pattern analogs carried in the paid variant
pub const PATTERN_LIMIT: usize = 3;

/// Correlation pairs carried in the paid variant
pub const CORRELATION_LIMIT: usize = 5;

/// Network nodes listed in the paid variant
pub const NETWORK_NODE_LIMIT: usize = 5;

pub const UPGRADE_NOTICE: &str = "The free edition shows the headline index and the three most stressed themes. \
Subscribe to a paid tier for every theme, active alert details, historical analogs, \
correlation pairs and the stress network.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Free,
    Paid,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Free => "free",
            Variant::Paid => "paid",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Headline {
    pub wssi_value: f64,
    pub wssi_score: f64,
    pub wssi_delta: f64,
    pub trend: String,
    pub stress_level: String,
    pub active_themes: i64,
    pub above_warning: i64,
    pub calculation_timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeSummary {
    pub theme_id: String,
    pub theme_name: String,
    pub category: String,
    pub stress_level: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDegree {
    pub id: String,
    pub label: String,
    pub degree: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSummary {
    pub node_count: usize,
    pub edge_count: usize,
    pub top_nodes: Vec<NodeDegree>,
}

/// One rendered edition of a brief
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BriefDocument {
    pub variant: Variant,
    pub release_date: String,
    pub generated_at: DateTime<Utc>,
    pub headline: Headline,
    pub themes: Vec<ThemeSummary>,
    pub active_alert_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_alerts: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_matches: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlations: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkSummary>,
    pub dataset_freshness: BTreeMap<String, Freshness>,
    pub notes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade_notice: Option<String>,
}

impl BriefDocument {
    /// Free edition of a paid document
    pub fn redact_free(&self) -> BriefDocument {
        BriefDocument {
            variant: Variant::Free,
            release_date: self.release_date.clone(),
            generated_at: self.generated_at,
            headline: self.headline.clone(),
            themes: self.themes.iter().take(FREE_THEME_LIMIT).cloned().collect(),
            active_alert_count: self.active_alert_count,
            active_alerts: None,
            pattern_matches: None,
            correlations: None,
            network: None,
            dataset_freshness: self.dataset_freshness.clone(),
            notes: self.notes.clone(),
            upgrade_notice: Some(UPGRADE_NOTICE.to_string()),
        }
    }
}

/// Build the paid document from the current analytics
///
/// Only the WSSI snapshot is required; every other section degrades to a note
/// when its dataset is missing or unreadable.
pub async fn compose(
    store: &AnalyticsStore,
    release_date: &str,
    extra_note: Option<&str>,
    stale_after: chrono::Duration,
    now: DateTime<Utc>,
) -> Result<BriefDocument> {
    let snapshot = store.snapshot().await?;

    let mut notes = Vec::new();
    if let Some(note) = extra_note.map(str::trim).filter(|n| !n.is_empty()) {
        notes.push(note.to_string());
    }

    let mut dataset_freshness = BTreeMap::new();
    for dataset in Dataset::ALL {
        let status = store.status(dataset, stale_after, now).await;
        match status.freshness {
            Freshness::Stale => notes.push(format!("{} is stale.", dataset.file_name())),
            Freshness::Missing if !dataset.is_core() => {
                notes.push(format!("{} is unavailable; its section is omitted.", dataset.file_name()))
            }
            _ => {}
        }
        dataset_freshness.insert(dataset.key().to_string(), status.freshness);
    }

    let alerts = load_optional(store, Dataset::Alerts).await;
    let active_alerts = alerts
        .as_ref()
        .and_then(|doc| doc.get("active_alerts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let pattern_matches = load_optional(store, Dataset::Patterns).await.map(|doc| top_patterns(&doc));
    let correlations = load_optional(store, Dataset::Correlations).await.map(|doc| top_correlations(&doc));
    let network = load_optional(store, Dataset::Network).await.map(|doc| summarize_network(&doc));

    Ok(BriefDocument {
        variant: Variant::Paid,
        release_date: release_date.to_string(),
        generated_at: now,
        headline: headline(&snapshot),
        themes: ranked_themes(&snapshot),
        active_alert_count: active_alerts.len(),
        active_alerts: Some(active_alerts),
        pattern_matches,
        correlations,
        network,
        dataset_freshness,
        notes,
        upgrade_notice: None,
    })
}

async fn load_optional(store: &AnalyticsStore, dataset: Dataset) -> Option<Value> {
    match store.load(dataset).await {
        Ok(doc) => Some(doc.value),
        Err(wssi_common::Error::NotFound(_)) => None,
        Err(e) => {
            warn!("Skipping {} in brief: {}", dataset.file_name(), e);
            None
        }
    }
}

fn headline(snapshot: &WssiSnapshot) -> Headline {
    Headline {
        wssi_value: snapshot.wssi_value,
        wssi_score: snapshot.wssi_score,
        wssi_delta: snapshot.wssi_delta,
        trend: snapshot.trend.clone(),
        stress_level: snapshot.stress_level.clone(),
        active_themes: snapshot.active_theme_count(),
        above_warning: snapshot.above_warning,
        calculation_timestamp: snapshot.calculation_timestamp.clone(),
    }
}

fn ranked_themes(snapshot: &WssiSnapshot) -> Vec<ThemeSummary> {
    snapshot
        .ranked_themes()
        .into_iter()
        .map(|t| ThemeSummary {
            theme_id: t.theme_id.clone(),
            theme_name: t.theme_name.clone(),
            category: t.category.clone(),
            stress_level: t.stress_level.clone(),
            value: t.normalized_value().map(|v| round_to(v, 3)),
        })
        .collect()
}

fn number(value: &Value, key: &str) -> f64 {
    value.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

/// Highest-similarity analogs
pub fn top_patterns(doc: &Value) -> Vec<Value> {
    let mut matches = doc
        .get("matches")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    matches.sort_by(|a, b| number(b, "similarity_pct").total_cmp(&number(a, "similarity_pct")));
    matches.truncate(PATTERN_LIMIT);
    matches
}

/// Strongest theme pairs by |pearson_r|
pub fn top_correlations(doc: &Value) -> Vec<Value> {
    let mut pairs: Vec<Value> = doc
        .pointer("/theme_level/pairs")
        .and_then(Value::as_array)
        .map(|pairs| {
            pairs
                .iter()
                .filter(|p| p.get("pearson_r").and_then(Value::as_f64).is_some_and(f64::is_finite))
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    pairs.sort_by(|a, b| number(b, "pearson_r").abs().total_cmp(&number(a, "pearson_r").abs()));
    pairs.truncate(CORRELATION_LIMIT);
    pairs
}

/// Node/edge counts and the best-connected nodes
pub fn summarize_network(doc: &Value) -> NetworkSummary {
    let nodes = doc.get("nodes").and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[]);
    let edges = doc.get("edges").and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[]);

    let mut degree: HashMap<&str, usize> = HashMap::new();
    for edge in edges {
        for end in ["source", "target"] {
            if let Some(id) = edge.get(end).and_then(Value::as_str) {
                *degree.entry(id).or_default() += 1;
            }
        }
    }

    let mut top_nodes: Vec<NodeDegree> = nodes
        .iter()
        .filter_map(|node| {
            let id = node.get("id").and_then(Value::as_str)?;
            let label = node.get("label").and_then(Value::as_str).unwrap_or(id);
            Some(NodeDegree {
                id: id.to_string(),
                label: label.to_string(),
                degree: degree.get(id).copied().unwrap_or(0),
            })
        })
        .collect();
    top_nodes.sort_by(|a, b| b.degree.cmp(&a.degree).then_with(|| a.id.cmp(&b.id)));
    top_nodes.truncate(NETWORK_NODE_LIMIT);

    NetworkSummary {
        node_count: nodes.len(),
        edge_count: edges.len(),
        top_nodes,
    }
}
