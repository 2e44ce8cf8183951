//! Database layer for wssi-api
//!
//! One SQLite file holds keys, users, rate-limit windows, usage logs and brief
//! release metadata. Timestamps are stored as fixed-width RFC 3339 text
//! (see [`fmt_ts`]) so string comparison in SQL matches time order.

pub mod keys;
pub mod rate_limits;
pub mod releases;
pub mod usage;
pub mod users;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use std::path::Path;
use wssi_common::Result;

/// Canonical text form of a stored timestamp
pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Open the API database and create any missing tables
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let pool = wssi_common::db::open_pool(db_path).await?;
    create_schema(&pool).await?;
    Ok(pool)
}

/// Create all tables (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_users_table(pool).await?;
    create_api_keys_table(pool).await?;
    create_user_sessions_table(pool).await?;
    create_rate_limits_table(pool).await?;
    create_usage_logs_table(pool).await?;
    create_brief_releases_table(pool).await?;
    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            password_salt TEXT NOT NULL,
            tier TEXT NOT NULL DEFAULT 'free',
            first_name TEXT,
            last_name TEXT,
            current_key_hash TEXT,
            stripe_customer_id TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_stripe_customer ON users(stripe_customer_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_api_keys_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS api_keys (
            key_hash TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT,
            tier TEXT NOT NULL DEFAULT 'free',
            rate_limit INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            expires_at TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            is_admin INTEGER NOT NULL DEFAULT 0,
            user_id TEXT REFERENCES users(id) ON DELETE SET NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_api_keys_user ON api_keys(user_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_user_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_sessions (
            token_hash TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            kind TEXT NOT NULL CHECK (kind IN ('access', 'refresh')),
            expires_at TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_rate_limits_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rate_limits (
            key_hash TEXT PRIMARY KEY REFERENCES api_keys(key_hash) ON DELETE CASCADE,
            requests_count INTEGER NOT NULL DEFAULT 0,
            reset_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_usage_logs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS usage_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            key_hash TEXT REFERENCES api_keys(key_hash) ON DELETE CASCADE,
            endpoint TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            status_code INTEGER NOT NULL,
            response_time_ms INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_usage_logs_timestamp ON usage_logs(timestamp)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_brief_releases_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS brief_releases (
            release_id TEXT PRIMARY KEY,
            release_date TEXT NOT NULL,
            published_at TEXT NOT NULL,
            created_by TEXT NOT NULL,
            notes TEXT,
            wssi_value REAL,
            wssi_score REAL,
            stress_level TEXT,
            free_path TEXT NOT NULL,
            paid_path TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_brief_releases_published ON brief_releases(published_at)")
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> (SqlitePool, tempfile::TempDir) {
    let dir = tempfile::TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("test.db")).await.unwrap();
    (pool, dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let (pool, _dir) = test_pool().await;
        create_schema(&pool).await.unwrap();

        let tables: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .unwrap();
        for expected in ["api_keys", "brief_releases", "rate_limits", "usage_logs", "user_sessions", "users"] {
            assert!(tables.iter().any(|t| t == expected), "missing {}", expected);
        }
    }

    #[test]
    fn test_fmt_ts_sorts_lexicographically() {
        use chrono::TimeZone;
        let a = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let b = a + chrono::Duration::microseconds(1);
        assert_eq!(fmt_ts(a), "2026-01-02T03:04:05.000000Z");
        assert!(fmt_ts(a) < fmt_ts(b));
    }
}
