//! Threshold checks against a WSSI snapshot

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Map;
use wssi_common::analytics::WssiSnapshot;
use wssi_common::severity::classify;
use wssi_common::Severity;

use crate::config::ThresholdConfig;

/// State key used for the overall index
pub const WSSI_STATE_KEY: &str = "wssi";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    WssiThreshold,
    ThemeThreshold,
    Test,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::WssiThreshold => "wssi_threshold",
            AlertKind::ThemeThreshold => "theme_threshold",
            AlertKind::Test => "test",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub severity: Severity,
    /// None for the overall index
    pub theme_id: Option<String>,
    /// Magnitude that was classified
    pub value: f64,
    /// Cut-off for `severity`
    pub threshold: f64,
    pub message: String,
}

impl Alert {
    /// Key into `alert_state`
    pub fn state_key(&self) -> &str {
        self.theme_id.as_deref().unwrap_or(WSSI_STATE_KEY)
    }
}

/// One classified signal, alerting or not
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub state_key: String,
    pub severity: Severity,
    pub value: f64,
}

/// Classify the index and every theme that carries a value
pub fn readings(snapshot: &WssiSnapshot, thresholds: &ThresholdConfig) -> Vec<Reading> {
    let mut out = Vec::with_capacity(snapshot.theme_signals.len() + 1);
    out.push(Reading {
        state_key: WSSI_STATE_KEY.to_string(),
        severity: classify(snapshot.wssi_value, &thresholds.wssi()),
        value: snapshot.wssi_value.abs(),
    });

    let theme_thresholds = thresholds.theme();
    for theme in &snapshot.theme_signals {
        if let Some(value) = theme.normalized_value() {
            out.push(Reading {
                state_key: theme.theme_id.clone(),
                severity: classify(value, &theme_thresholds),
                value: value.abs(),
            });
        }
    }
    out
}

/// Alerts for the index and each theme above stable
pub fn check_thresholds(snapshot: &WssiSnapshot, thresholds: &ThresholdConfig) -> Vec<Alert> {
    let mut alerts = Vec::new();

    let wssi = thresholds.wssi();
    let severity = classify(snapshot.wssi_value, &wssi);
    if severity != Severity::Stable {
        alerts.push(Alert {
            kind: AlertKind::WssiThreshold,
            severity,
            theme_id: None,
            value: snapshot.wssi_value.abs(),
            threshold: wssi.threshold_for(severity),
            message: format!("WSSI at {:.2} ({})", snapshot.wssi_value, severity),
        });
    }

    let theme_thresholds = thresholds.theme();
    for theme in &snapshot.theme_signals {
        let Some(raw) = theme.normalized_value() else {
            continue;
        };
        let severity = classify(raw, &theme_thresholds);
        if severity == Severity::Stable {
            continue;
        }
        alerts.push(Alert {
            kind: AlertKind::ThemeThreshold,
            severity,
            theme_id: Some(theme.theme_id.clone()),
            value: raw.abs(),
            threshold: theme_thresholds.threshold_for(severity),
            message: format!("{} at {:.2} ({})", theme.theme_name, raw.abs(), severity),
        });
    }

    alerts
}

/// Synthetic critical alert used to exercise the channels
pub fn test_alert() -> Alert {
    Alert {
        kind: AlertKind::Test,
        severity: Severity::Critical,
        theme_id: None,
        value: 2.34,
        threshold: 2.0,
        message: "TEST ALERT: WSSI Monitor is working".to_string(),
    }
}

/// Snapshot rendered alongside [`test_alert`]
pub fn test_snapshot(now: DateTime<Utc>) -> WssiSnapshot {
    WssiSnapshot {
        wssi_value: 2.34,
        wssi_score: 75.5,
        wssi_delta: 0.0,
        trend: "stable".to_string(),
        stress_level: "critical".to_string(),
        active_themes: Some(11),
        above_warning: 3,
        calculation_timestamp: now.to_rfc3339(),
        theme_signals: Vec::new(),
        extra: Map::new(),
    }
}
