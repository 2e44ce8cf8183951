//! Daily request quotas
//!
//! Each key has one row holding the request count for the current window and
//! the instant the window ends (the next UTC midnight after it started).

use axum::http::{HeaderMap, HeaderValue};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use wssi_common::time::next_utc_midnight;
use wssi_common::Result;

use super::fmt_ts;

/// Quota state after a metered request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitInfo {
    pub limit: i64,
    pub remaining: i64,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitInfo {
    /// Set `X-RateLimit-Limit`, `-Remaining` and `-Reset` (unix seconds)
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert("X-RateLimit-Limit", HeaderValue::from(self.limit));
        headers.insert("X-RateLimit-Remaining", HeaderValue::from(self.remaining.max(0)));
        headers.insert("X-RateLimit-Reset", HeaderValue::from(self.reset_at.timestamp()));
    }
}

/// Result of charging one request against a key's quota
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed(RateLimitInfo),
    Limited(RateLimitInfo),
}

/// Count one request for `key_hash` against `limit` requests per day
///
/// A request is rejected once the window's count has reached the limit, so a
/// limit of zero rejects everything.
pub async fn check_and_consume(
    pool: &SqlitePool,
    key_hash: &str,
    limit: i64,
    now: DateTime<Utc>,
) -> Result<RateLimitDecision> {
    let next_reset = fmt_ts(next_utc_midnight(now));
    let now_text = fmt_ts(now);

    let mut tx = pool.begin().await?;

    sqlx::query("INSERT OR IGNORE INTO rate_limits (key_hash, requests_count, reset_at) VALUES (?, 0, ?)")
        .bind(key_hash)
        .bind(&next_reset)
        .execute(&mut *tx)
        .await?;

    // Expired window: start over
    sqlx::query("UPDATE rate_limits SET requests_count = 0, reset_at = ? WHERE key_hash = ? AND reset_at <= ?")
        .bind(&next_reset)
        .bind(key_hash)
        .bind(&now_text)
        .execute(&mut *tx)
        .await?;

    let charged: Option<(i64, DateTime<Utc>)> = sqlx::query_as(
        r#"
        UPDATE rate_limits SET requests_count = requests_count + 1
        WHERE key_hash = ? AND requests_count < ?
        RETURNING requests_count, reset_at
        "#,
    )
    .bind(key_hash)
    .bind(limit)
    .fetch_optional(&mut *tx)
    .await?;

    let decision = match charged {
        Some((count, reset_at)) => RateLimitDecision::Allowed(RateLimitInfo {
            limit,
            remaining: limit - count,
            reset_at,
        }),
        None => {
            let reset_at: DateTime<Utc> = sqlx::query_scalar("SELECT reset_at FROM rate_limits WHERE key_hash = ?")
                .bind(key_hash)
                .fetch_one(&mut *tx)
                .await?;
            RateLimitDecision::Limited(RateLimitInfo {
                limit,
                remaining: 0,
                reset_at,
            })
        }
    };

    tx.commit().await?;
    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::keys::{insert_key, NewApiKey};
    use crate::db::test_pool;
    use chrono::{Duration, TimeZone};
    use wssi_common::Tier;

    async fn seed_key(pool: &SqlitePool, hash: &str, limit: i64) {
        let key = NewApiKey {
            key_hash: hash,
            name: "rl",
            email: None,
            tier: Tier::Basic,
            rate_limit: limit,
            expires_at: None,
            is_admin: false,
            user_id: None,
        };
        insert_key(pool, &key, Utc::now()).await.unwrap();
    }

    #[tokio::test]
    async fn test_counts_down_then_limits() {
        let (pool, _dir) = test_pool().await;
        seed_key(&pool, "k", 2).await;
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();

        let first = check_and_consume(&pool, "k", 2, now).await.unwrap();
        let RateLimitDecision::Allowed(info) = first else { panic!("expected allowed") };
        assert_eq!(info.remaining, 1);
        assert_eq!(info.reset_at, Utc.with_ymd_and_hms(2026, 10, 20, 0, 0, 0).unwrap());

        let second = check_and_consume(&pool, "k", 2, now).await.unwrap();
        assert!(matches!(second, RateLimitDecision::Allowed(RateLimitInfo { remaining: 0, .. })));

        let third = check_and_consume(&pool, "k", 2, now).await.unwrap();
        assert!(matches!(third, RateLimitDecision::Limited(_)));
    }

    #[tokio::test]
    async fn test_zero_limit_rejects_first_request() {
        let (pool, _dir) = test_pool().await;
        seed_key(&pool, "free", 0).await;
        let decision = check_and_consume(&pool, "free", 0, Utc::now()).await.unwrap();
        assert!(matches!(decision, RateLimitDecision::Limited(RateLimitInfo { remaining: 0, .. })));
    }

    #[tokio::test]
    async fn test_window_resets_at_midnight() {
        let (pool, _dir) = test_pool().await;
        seed_key(&pool, "k", 1).await;
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 23, 59, 0).unwrap();

        assert!(matches!(check_and_consume(&pool, "k", 1, now).await.unwrap(), RateLimitDecision::Allowed(_)));
        assert!(matches!(check_and_consume(&pool, "k", 1, now).await.unwrap(), RateLimitDecision::Limited(_)));

        let after = now + Duration::minutes(2);
        let decision = check_and_consume(&pool, "k", 1, after).await.unwrap();
        let RateLimitDecision::Allowed(info) = decision else { panic!("expected allowed after reset") };
        assert_eq!(info.reset_at, Utc.with_ymd_and_hms(2026, 10, 21, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_headers() {
        let info = RateLimitInfo {
            limit: 10,
            remaining: 4,
            reset_at: Utc.with_ymd_and_hms(2026, 10, 20, 0, 0, 0).unwrap(),
        };
        let mut headers = HeaderMap::new();
        info.apply_headers(&mut headers);
        assert_eq!(headers["X-RateLimit-Limit"], "10");
        assert_eq!(headers["X-RateLimit-Remaining"], "4");
        assert_eq!(headers["X-RateLimit-Reset"], "1792454400");
    }
}
