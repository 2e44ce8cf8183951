//! Per-request usage log

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use wssi_common::time::next_utc_midnight;
use wssi_common::Result;

use super::fmt_ts;

pub async fn log_request(
    pool: &SqlitePool,
    key_hash: &str,
    endpoint: &str,
    status_code: u16,
    response_time_ms: i64,
    at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO usage_logs (key_hash, endpoint, timestamp, status_code, response_time_ms) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(key_hash)
    .bind(endpoint)
    .bind(fmt_ts(at))
    .bind(status_code as i64)
    .bind(response_time_ms)
    .execute(pool)
    .await?;
    Ok(())
}

/// Requests logged on the UTC day containing `now`
pub async fn requests_on_day(pool: &SqlitePool, now: DateTime<Utc>) -> Result<i64> {
    let end = next_utc_midnight(now);
    let start = end - chrono::Duration::days(1);
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM usage_logs WHERE timestamp >= ? AND timestamp < ?")
        .bind(fmt_ts(start))
        .bind(fmt_ts(end))
        .fetch_one(pool)
        .await?;
    Ok(count)
}
