//! API key storage
//!
//! Keys are looked up by SHA-256 hash; the plaintext never reaches the
//! database.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteExecutor, SqlitePool};
use std::collections::BTreeMap;
use tracing::warn;
use wssi_common::{Result, Tier};

use super::fmt_ts;
use crate::credentials::hash_prefix;

/// Row of `api_keys`
#[derive(Debug, Clone, FromRow)]
pub struct ApiKeyRecord {
    pub key_hash: String,
    pub name: String,
    pub email: Option<String>,
    pub tier: String,
    pub rate_limit: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub is_admin: bool,
    pub user_id: Option<String>,
}

impl ApiKeyRecord {
    /// Parsed tier; unknown values are treated as free
    pub fn tier(&self) -> Tier {
        self.tier.parse().unwrap_or_else(|e| {
            warn!("Key {} has {}; treating as free", hash_prefix(&self.key_hash), e);
            Tier::Free
        })
    }
}

/// Fields for a key about to be stored
#[derive(Debug, Clone)]
pub struct NewApiKey<'a> {
    pub key_hash: &'a str,
    pub name: &'a str,
    pub email: Option<&'a str>,
    pub tier: Tier,
    pub rate_limit: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_admin: bool,
    pub user_id: Option<&'a str>,
}

pub async fn insert_key<'c>(
    db: impl SqliteExecutor<'c>,
    key: &NewApiKey<'_>,
    now: DateTime<Utc>,
) -> Result<ApiKeyRecord> {
    let record = sqlx::query_as::<_, ApiKeyRecord>(
        r#"
        INSERT INTO api_keys (key_hash, name, email, tier, rate_limit, created_at, expires_at, is_active, is_admin, user_id)
        VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
        RETURNING key_hash, name, email, tier, rate_limit, created_at, expires_at, is_active, is_admin, user_id
        "#,
    )
    .bind(key.key_hash)
    .bind(key.name)
    .bind(key.email)
    .bind(key.tier.as_str())
    .bind(key.rate_limit)
    .bind(fmt_ts(now))
    .bind(key.expires_at.map(fmt_ts))
    .bind(key.is_admin)
    .bind(key.user_id)
    .fetch_one(db)
    .await?;

    Ok(record)
}

/// Active, unexpired key with this hash
pub async fn find_active(pool: &SqlitePool, key_hash: &str, now: DateTime<Utc>) -> Result<Option<ApiKeyRecord>> {
    let record = sqlx::query_as::<_, ApiKeyRecord>(
        r#"
        SELECT key_hash, name, email, tier, rate_limit, created_at, expires_at, is_active, is_admin, user_id
        FROM api_keys
        WHERE key_hash = ? AND is_active = 1 AND (expires_at IS NULL OR expires_at > ?)
        "#,
    )
    .bind(key_hash)
    .bind(fmt_ts(now))
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Key with this hash regardless of state
pub async fn find_by_hash(pool: &SqlitePool, key_hash: &str) -> Result<Option<ApiKeyRecord>> {
    let record = sqlx::query_as::<_, ApiKeyRecord>(
        r#"
        SELECT key_hash, name, email, tier, rate_limit, created_at, expires_at, is_active, is_admin, user_id
        FROM api_keys
        WHERE key_hash = ?
        "#,
    )
    .bind(key_hash)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Active, unexpired admin key with this hash
pub async fn find_active_admin(pool: &SqlitePool, key_hash: &str, now: DateTime<Utc>) -> Result<Option<ApiKeyRecord>> {
    Ok(find_active(pool, key_hash, now).await?.filter(|k| k.is_admin))
}

pub async fn has_active_admin(pool: &SqlitePool) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM api_keys WHERE is_admin = 1 AND is_active = 1")
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

pub async fn deactivate<'c>(db: impl SqliteExecutor<'c>, key_hash: &str) -> Result<()> {
    sqlx::query("UPDATE api_keys SET is_active = 0 WHERE key_hash = ?")
        .bind(key_hash)
        .execute(db)
        .await?;
    Ok(())
}

/// Move a key to `tier` and start it on a fresh daily window
///
/// Returns false when no such key exists.
pub async fn set_tier(pool: &SqlitePool, key_hash: &str, tier: Tier) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let updated = sqlx::query("UPDATE api_keys SET tier = ?, rate_limit = ? WHERE key_hash = ?")
        .bind(tier.as_str())
        .bind(tier.daily_limit())
        .bind(key_hash)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    sqlx::query("DELETE FROM rate_limits WHERE key_hash = ?")
        .bind(key_hash)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(updated > 0)
}

/// Move every key owned by `user_id` to `tier`; returns the number changed
pub async fn set_tier_for_user(pool: &SqlitePool, user_id: &str, tier: Tier) -> Result<u64> {
    let result = sqlx::query("UPDATE api_keys SET tier = ?, rate_limit = ? WHERE user_id = ? AND is_admin = 0")
        .bind(tier.as_str())
        .bind(tier.daily_limit())
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Active non-admin keys grouped by tier
pub async fn count_by_tier(pool: &SqlitePool) -> Result<BTreeMap<String, i64>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT tier, COUNT(*) FROM api_keys WHERE is_active = 1 AND is_admin = 0 GROUP BY tier",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use chrono::Duration;

    fn new_key<'a>(hash: &'a str, tier: Tier) -> NewApiKey<'a> {
        NewApiKey {
            key_hash: hash,
            name: "test",
            email: Some("t@example.com"),
            tier,
            rate_limit: tier.daily_limit(),
            expires_at: None,
            is_admin: false,
            user_id: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let (pool, _dir) = test_pool().await;
        let now = Utc::now();
        let record = insert_key(&pool, &new_key("h1", Tier::Pro), now).await.unwrap();
        assert_eq!(record.tier(), Tier::Pro);
        assert_eq!(record.rate_limit, 100_000);
        assert!(record.is_active);

        let found = find_active(&pool, "h1", now).await.unwrap().unwrap();
        assert_eq!(found.email.as_deref(), Some("t@example.com"));
        assert!(find_active(&pool, "missing", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_and_inactive_keys_are_hidden() {
        let (pool, _dir) = test_pool().await;
        let now = Utc::now();
        let mut key = new_key("expiring", Tier::Basic);
        key.expires_at = Some(now + Duration::days(1));
        insert_key(&pool, &key, now).await.unwrap();
        assert!(find_active(&pool, "expiring", now).await.unwrap().is_some());
        assert!(find_active(&pool, "expiring", now + Duration::days(2)).await.unwrap().is_none());

        insert_key(&pool, &new_key("gone", Tier::Basic), now).await.unwrap();
        deactivate(&pool, "gone").await.unwrap();
        assert!(find_active(&pool, "gone", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_admin_lookup() {
        let (pool, _dir) = test_pool().await;
        let now = Utc::now();
        assert!(!has_active_admin(&pool).await.unwrap());

        let mut admin = new_key("admin", Tier::Enterprise);
        admin.is_admin = true;
        insert_key(&pool, &admin, now).await.unwrap();
        insert_key(&pool, &new_key("user", Tier::Basic), now).await.unwrap();

        assert!(has_active_admin(&pool).await.unwrap());
        assert!(find_active_admin(&pool, "admin", now).await.unwrap().is_some());
        assert!(find_active_admin(&pool, "user", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_tier_and_counts() {
        let (pool, _dir) = test_pool().await;
        let now = Utc::now();
        insert_key(&pool, &new_key("a", Tier::Free), now).await.unwrap();
        insert_key(&pool, &new_key("b", Tier::Free), now).await.unwrap();

        assert!(set_tier(&pool, "a", Tier::Pro).await.unwrap());
        assert!(!set_tier(&pool, "nope", Tier::Pro).await.unwrap());

        let a = find_active(&pool, "a", now).await.unwrap().unwrap();
        assert_eq!(a.tier(), Tier::Pro);
        assert_eq!(a.rate_limit, Tier::Pro.daily_limit());

        let counts = count_by_tier(&pool).await.unwrap();
        assert_eq!(counts.get("pro"), Some(&1));
        assert_eq!(counts.get("free"), Some(&1));
    }
}
