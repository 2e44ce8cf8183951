//! Brief release metadata

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use wssi_common::Result;

use super::fmt_ts;

/// Row of `brief_releases`
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BriefReleaseRecord {
    pub release_id: String,
    pub release_date: String,
    pub published_at: DateTime<Utc>,
    pub created_by: String,
    pub notes: Option<String>,
    pub wssi_value: Option<f64>,
    pub wssi_score: Option<f64>,
    pub stress_level: Option<String>,
    /// Stored free HTML; the JSON sits beside it
    #[serde(skip)]
    pub free_path: String,
    /// Stored paid HTML; the JSON sits beside it
    #[serde(skip)]
    pub paid_path: String,
}

const RELEASE_COLUMNS: &str = "release_id, release_date, published_at, created_by, notes, \
                               wssi_value, wssi_score, stress_level, free_path, paid_path";

pub async fn insert_release(pool: &SqlitePool, release: &BriefReleaseRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO brief_releases
            (release_id, release_date, published_at, created_by, notes, wssi_value, wssi_score, stress_level, free_path, paid_path)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&release.release_id)
    .bind(&release.release_date)
    .bind(fmt_ts(release.published_at))
    .bind(&release.created_by)
    .bind(&release.notes)
    .bind(release.wssi_value)
    .bind(release.wssi_score)
    .bind(&release.stress_level)
    .bind(&release.free_path)
    .bind(&release.paid_path)
    .execute(pool)
    .await?;
    Ok(())
}

/// Newest first
pub async fn list_releases(pool: &SqlitePool, limit: i64) -> Result<Vec<BriefReleaseRecord>> {
    let sql = format!(
        "SELECT {} FROM brief_releases ORDER BY published_at DESC, release_id DESC LIMIT ?",
        RELEASE_COLUMNS
    );
    Ok(sqlx::query_as::<_, BriefReleaseRecord>(&sql)
        .bind(limit)
        .fetch_all(pool)
        .await?)
}

pub async fn latest_release(pool: &SqlitePool) -> Result<Option<BriefReleaseRecord>> {
    Ok(list_releases(pool, 1).await?.into_iter().next())
}

pub async fn find_release(pool: &SqlitePool, release_id: &str) -> Result<Option<BriefReleaseRecord>> {
    let sql = format!("SELECT {} FROM brief_releases WHERE release_id = ?", RELEASE_COLUMNS);
    Ok(sqlx::query_as::<_, BriefReleaseRecord>(&sql)
        .bind(release_id)
        .fetch_optional(pool)
        .await?)
}

pub async fn count_releases(pool: &SqlitePool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM brief_releases")
        .fetch_one(pool)
        .await?)
}

/// Delete all but the newest `keep` rows, returning the deleted rows
pub async fn prune_releases(pool: &SqlitePool, keep: usize) -> Result<Vec<BriefReleaseRecord>> {
    let sql = format!(
        "SELECT {} FROM brief_releases ORDER BY published_at DESC, release_id DESC LIMIT -1 OFFSET ?",
        RELEASE_COLUMNS
    );

    let mut tx = pool.begin().await?;
    let stale = sqlx::query_as::<_, BriefReleaseRecord>(&sql)
        .bind(keep as i64)
        .fetch_all(&mut *tx)
        .await?;

    for release in &stale {
        sqlx::query("DELETE FROM brief_releases WHERE release_id = ?")
            .bind(&release.release_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    Ok(stale)
}
