//! Alert history and per-signal alert state (`alerts.db`)

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use std::path::Path;
use wssi_common::{Result, Severity};

use crate::check::Alert;

fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Open `alerts.db` and create any missing tables
pub async fn init_alert_database(db_path: &Path) -> Result<SqlitePool> {
    let pool = wssi_common::db::open_pool(db_path).await?;
    create_schema(&pool).await?;
    Ok(pool)
}

pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS alert_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            alert_type TEXT NOT NULL,
            severity TEXT NOT NULL,
            theme_id TEXT,
            message TEXT,
            wssi_value REAL,
            threshold_value REAL,
            sent_at TEXT NOT NULL,
            acknowledged INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS alert_state (
            theme_id TEXT PRIMARY KEY,
            last_status TEXT NOT NULL,
            last_value REAL,
            alert_count INTEGER NOT NULL DEFAULT 0,
            first_alert_at TEXT,
            last_alert_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_alert_history_sent_at ON alert_history(sent_at)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Row of `alert_history`
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AlertRecord {
    pub id: i64,
    pub alert_type: String,
    pub severity: String,
    pub theme_id: Option<String>,
    pub message: Option<String>,
    pub wssi_value: Option<f64>,
    pub threshold_value: Option<f64>,
    pub sent_at: DateTime<Utc>,
    pub acknowledged: bool,
}

/// Row of `alert_state`
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AlertState {
    pub theme_id: String,
    pub last_status: String,
    pub last_value: Option<f64>,
    pub alert_count: i64,
    pub first_alert_at: Option<DateTime<Utc>>,
    pub last_alert_at: Option<DateTime<Utc>>,
}

impl AlertState {
    pub fn last_severity(&self) -> Option<Severity> {
        Severity::parse(&self.last_status)
    }
}

/// Append to history and bump the signal's state, atomically
pub async fn record_alert(pool: &SqlitePool, alert: &Alert, wssi_value: f64, now: DateTime<Utc>) -> Result<()> {
    let ts = fmt_ts(now);
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO alert_history (alert_type, severity, theme_id, message, wssi_value, threshold_value, sent_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(alert.kind.as_str())
    .bind(alert.severity.as_str())
    .bind(alert.theme_id.as_deref())
    .bind(&alert.message)
    .bind(wssi_value)
    .bind(alert.threshold)
    .bind(&ts)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO alert_state (theme_id, last_status, last_value, alert_count, first_alert_at, last_alert_at)
        VALUES (?, ?, ?, 1, ?, ?)
        ON CONFLICT(theme_id) DO UPDATE SET
            last_status = excluded.last_status,
            last_value = excluded.last_value,
            alert_count = alert_count + 1,
            first_alert_at = COALESCE(first_alert_at, excluded.first_alert_at),
            last_alert_at = excluded.last_alert_at
        "#,
    )
    .bind(alert.state_key())
    .bind(alert.severity.as_str())
    .bind(alert.value)
    .bind(&ts)
    .bind(&ts)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

pub async fn get_state(pool: &SqlitePool, state_key: &str) -> Result<Option<AlertState>> {
    let state = sqlx::query_as::<_, AlertState>(
        r#"
        SELECT theme_id, last_status, last_value, alert_count, first_alert_at, last_alert_at
        FROM alert_state
        WHERE theme_id = ?
        "#,
    )
    .bind(state_key)
    .fetch_optional(pool)
    .await?;
    Ok(state)
}

/// Mark a tracked signal as back to stable
///
/// Returns true when a non-stable state was reset; signals never alerted on
/// are left untracked.
pub async fn reset_to_stable(pool: &SqlitePool, state_key: &str, value: f64) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE alert_state SET last_status = 'stable', last_value = ? WHERE theme_id = ? AND last_status != 'stable'",
    )
    .bind(value)
    .bind(state_key)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Newest first
pub async fn recent_alerts(pool: &SqlitePool, limit: i64) -> Result<Vec<AlertRecord>> {
    let rows = sqlx::query_as::<_, AlertRecord>(
        r#"
        SELECT id, alert_type, severity, theme_id, message, wssi_value, threshold_value, sent_at, acknowledged
        FROM alert_history
        ORDER BY sent_at DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
pub(crate) async fn test_pool() -> (SqlitePool, tempfile::TempDir) {
    let dir = tempfile::TempDir::new().unwrap();
    let pool = init_alert_database(&dir.path().join("alerts.db")).await.unwrap();
    (pool, dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::{test_alert, AlertKind};
    use chrono::Duration;

    fn theme_alert(severity: Severity, value: f64) -> Alert {
        Alert {
            kind: AlertKind::ThemeThreshold,
            severity,
            theme_id: Some("food-system".to_string()),
            value,
            threshold: 1.0,
            message: format!("Food System at {:.2} ({})", value, severity),
        }
    }

    #[tokio::test]
    async fn test_record_alert_writes_history_and_state() {
        let (pool, _dir) = test_pool().await;
        let now = Utc::now();

        record_alert(&pool, &test_alert(), 2.34, now).await.unwrap();

        let history = recent_alerts(&pool, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].alert_type, "test");
        assert_eq!(history[0].severity, "critical");
        assert_eq!(history[0].theme_id, None);
        assert_eq!(history[0].threshold_value, Some(2.0));
        assert!(!history[0].acknowledged);

        let state = get_state(&pool, "wssi").await.unwrap().unwrap();
        assert_eq!(state.last_severity(), Some(Severity::Critical));
        assert_eq!(state.alert_count, 1);
        assert!(state.first_alert_at.is_some());
    }

    #[tokio::test]
    async fn test_state_upsert_counts_and_keeps_first_alert() {
        let (pool, _dir) = test_pool().await;
        let first = Utc::now() - Duration::hours(2);
        let later = Utc::now();

        record_alert(&pool, &theme_alert(Severity::Watch, 1.1), 0.5, first).await.unwrap();
        record_alert(&pool, &theme_alert(Severity::Critical, 2.2), 0.5, later).await.unwrap();

        let state = get_state(&pool, "food-system").await.unwrap().unwrap();
        assert_eq!(state.alert_count, 2);
        assert_eq!(state.last_status, "critical");
        assert_eq!(state.last_value, Some(2.2));
        assert!(state.first_alert_at.unwrap() < state.last_alert_at.unwrap());

        let history = recent_alerts(&pool, 10).await.unwrap();
        assert_eq!(history[0].severity, "critical");
        assert_eq!(history[1].severity, "watch");
    }

    #[tokio::test]
    async fn test_reset_to_stable() {
        let (pool, _dir) = test_pool().await;
        assert!(!reset_to_stable(&pool, "food-system", 0.2).await.unwrap());

        record_alert(&pool, &theme_alert(Severity::Approaching, 1.6), 0.5, Utc::now()).await.unwrap();
        assert!(reset_to_stable(&pool, "food-system", 0.2).await.unwrap());
        assert!(!reset_to_stable(&pool, "food-system", 0.1).await.unwrap());

        let state = get_state(&pool, "food-system").await.unwrap().unwrap();
        assert_eq!(state.last_severity(), Some(Severity::Stable));
        assert_eq!(state.last_value, Some(0.2));
        assert_eq!(state.alert_count, 1);
    }
}
