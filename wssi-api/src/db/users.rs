//! Registered users and their issued session tokens

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteExecutor, SqlitePool};
use wssi_common::{Result, Tier};

use super::fmt_ts;

/// Row of `users`
#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub password_salt: String,
    pub tier: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub current_key_hash: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn tier(&self) -> Tier {
        self.tier.parse().unwrap_or(Tier::Free)
    }
}

#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub id: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub password_salt: &'a str,
    pub tier: Tier,
    pub first_name: Option<&'a str>,
    pub last_name: Option<&'a str>,
}

/// Kind of token stored in `user_sessions`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Access,
    Refresh,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Access => "access",
            SessionKind::Refresh => "refresh",
        }
    }
}

const USER_COLUMNS: &str = "id, email, password_hash, password_salt, tier, first_name, last_name, \
                            current_key_hash, stripe_customer_id, created_at";

/// Insert a user; `None` when the email is already registered
pub async fn insert_user<'c>(
    db: impl SqliteExecutor<'c>,
    user: &NewUser<'_>,
    now: DateTime<Utc>,
) -> Result<Option<UserRecord>> {
    let sql = format!(
        "INSERT INTO users (id, email, password_hash, password_salt, tier, first_name, last_name, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING {}",
        USER_COLUMNS
    );
    let result = sqlx::query_as::<_, UserRecord>(&sql)
        .bind(user.id)
        .bind(user.email)
        .bind(user.password_hash)
        .bind(user.password_salt)
        .bind(user.tier.as_str())
        .bind(user.first_name)
        .bind(user.last_name)
        .bind(fmt_ts(now))
        .fetch_one(db)
        .await;

    match result {
        Ok(record) => Ok(Some(record)),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<UserRecord>> {
    let sql = format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS);
    Ok(sqlx::query_as::<_, UserRecord>(&sql)
        .bind(email)
        .fetch_optional(pool)
        .await?)
}

pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<UserRecord>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
    Ok(sqlx::query_as::<_, UserRecord>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?)
}

pub async fn find_by_stripe_customer(pool: &SqlitePool, customer_id: &str) -> Result<Option<UserRecord>> {
    let sql = format!("SELECT {} FROM users WHERE stripe_customer_id = ?", USER_COLUMNS);
    Ok(sqlx::query_as::<_, UserRecord>(&sql)
        .bind(customer_id)
        .fetch_optional(pool)
        .await?)
}

pub async fn set_current_key<'c>(db: impl SqliteExecutor<'c>, user_id: &str, key_hash: &str) -> Result<()> {
    sqlx::query("UPDATE users SET current_key_hash = ? WHERE id = ?")
        .bind(key_hash)
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn set_tier(pool: &SqlitePool, user_id: &str, tier: Tier) -> Result<()> {
    sqlx::query("UPDATE users SET tier = ? WHERE id = ?")
        .bind(tier.as_str())
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_stripe_customer(pool: &SqlitePool, user_id: &str, customer_id: &str) -> Result<()> {
    sqlx::query("UPDATE users SET stripe_customer_id = ? WHERE id = ?")
        .bind(customer_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn insert_session<'c>(
    db: impl SqliteExecutor<'c>,
    token_hash: &str,
    user_id: &str,
    kind: SessionKind,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO user_sessions (token_hash, user_id, kind, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(token_hash)
    .bind(user_id)
    .bind(kind.as_str())
    .bind(fmt_ts(expires_at))
    .bind(fmt_ts(now))
    .execute(db)
    .await?;
    Ok(())
}
