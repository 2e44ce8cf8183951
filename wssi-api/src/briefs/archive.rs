//! Brief release persistence, retention and publish readiness

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;
use wssi_common::analytics::{AnalyticsStore, Dataset, DatasetStatus, Freshness};
use wssi_common::time::date_string;
use wssi_common::{Error, Result};

use super::model::{compose, BriefDocument, Variant};
use super::render::render_brief;
use crate::db::releases::{self, BriefReleaseRecord};

/// Brief sections and the dataset each one is built from
pub const SECTIONS: [(&str, Dataset); 6] = [
    ("headline", Dataset::WssiLatest),
    ("themes", Dataset::WssiLatest),
    ("alerts", Dataset::Alerts),
    ("patterns", Dataset::Patterns),
    ("correlations", Dataset::Correlations),
    ("network", Dataset::Network),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessStatus {
    Ready,
    Degraded,
    Blocked,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishHealth {
    pub missing_sections: Vec<String>,
    pub stale_sections: Vec<String>,
}

/// Whether a brief can be published from the current analytics
#[derive(Debug, Clone, Serialize)]
pub struct BriefReadiness {
    pub status: ReadinessStatus,
    pub publish_blocked: bool,
    pub core_missing: Vec<String>,
    pub dataset_status: BTreeMap<String, DatasetStatus>,
    pub publish_health: PublishHealth,
    pub checked_at: DateTime<Utc>,
}

/// Publish parameters
#[derive(Debug, Clone, Default)]
pub struct PublishRequest {
    pub release_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_by: String,
}

#[derive(Debug)]
pub enum PublishOutcome {
    Published {
        release: BriefReleaseRecord,
        pruned: Vec<String>,
    },
    Blocked(BriefReadiness),
}

/// Release archive rooted at `<data>/briefs`
#[derive(Debug, Clone)]
pub struct BriefArchive {
    db: SqlitePool,
    store: AnalyticsStore,
    root: PathBuf,
    retention: usize,
    stale_after: Duration,
}

impl BriefArchive {
    pub fn new(db: SqlitePool, store: AnalyticsStore, root: PathBuf, retention: usize, stale_after: Duration) -> Self {
        Self {
            db,
            store,
            root,
            retention: retention.max(1),
            stale_after,
        }
    }

    pub async fn readiness(&self, now: DateTime<Utc>) -> BriefReadiness {
        let mut dataset_status = BTreeMap::new();
        for dataset in Dataset::ALL {
            let status = self.store.status(dataset, self.stale_after, now).await;
            dataset_status.insert(dataset.key().to_string(), status);
        }

        let core_missing: Vec<String> = Dataset::ALL
            .iter()
            .filter(|d| d.is_core())
            .filter(|d| !dataset_status.get(d.key()).is_some_and(|s| s.available))
            .map(|d| d.key().to_string())
            .collect();

        let mut missing_sections = Vec::new();
        let mut stale_sections = Vec::new();
        for (section, dataset) in SECTIONS {
            match dataset_status.get(dataset.key()) {
                Some(s) if s.available && s.freshness == Freshness::Stale => stale_sections.push(section.to_string()),
                Some(s) if s.available => {}
                _ => missing_sections.push(section.to_string()),
            }
        }

        let publish_blocked = !core_missing.is_empty();
        let status = if publish_blocked {
            ReadinessStatus::Blocked
        } else if !missing_sections.is_empty() || !stale_sections.is_empty() {
            ReadinessStatus::Degraded
        } else {
            ReadinessStatus::Ready
        };

        BriefReadiness {
            status,
            publish_blocked,
            core_missing,
            dataset_status,
            publish_health: PublishHealth {
                missing_sections,
                stale_sections,
            },
            checked_at: now,
        }
    }

    /// Compose, render and store a release, then apply retention
    pub async fn publish(&self, request: PublishRequest, now: DateTime<Utc>) -> Result<PublishOutcome> {
        let readiness = self.readiness(now).await;
        if readiness.publish_blocked {
            warn!("Brief publish blocked; missing core datasets: {:?}", readiness.core_missing);
            return Ok(PublishOutcome::Blocked(readiness));
        }

        let release_date = request
            .release_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| date_string(now));
        let release_id = new_release_id(&release_date);

        let paid = compose(&self.store, &release_date, request.notes.as_deref(), self.stale_after, now).await?;
        let free = paid.redact_free();

        let dir = self.release_dir(&release_id);
        self.write_release_files(&dir, &free, &paid).await?;

        let record = BriefReleaseRecord {
            release_id: release_id.clone(),
            release_date,
            published_at: now,
            created_by: request.created_by,
            notes: request.notes.filter(|n| !n.trim().is_empty()),
            wssi_value: Some(paid.headline.wssi_value),
            wssi_score: Some(paid.headline.wssi_score),
            stress_level: Some(paid.headline.stress_level.clone()),
            free_path: dir.join("free.html").display().to_string(),
            paid_path: dir.join("paid.html").display().to_string(),
        };

        if let Err(e) = releases::insert_release(&self.db, &record).await {
            // Orphaned files would never be pruned
            let _ = tokio::fs::remove_dir_all(&dir).await;
            return Err(e);
        }
        info!("Published brief release {}", release_id);

        let pruned = self.apply_retention().await?;
        Ok(PublishOutcome::Published { release: record, pruned })
    }

    /// Delete releases beyond the retention cap; returns their ids
    pub async fn apply_retention(&self) -> Result<Vec<String>> {
        let stale = releases::prune_releases(&self.db, self.retention).await?;
        let mut pruned = Vec::with_capacity(stale.len());
        for release in stale {
            let dir = self.release_dir(&release.release_id);
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {}", dir.display(), e),
            }
            info!("Pruned brief release {}", release.release_id);
            pruned.push(release.release_id);
        }
        Ok(pruned)
    }

    pub async fn list(&self, limit: i64) -> Result<Vec<BriefReleaseRecord>> {
        releases::list_releases(&self.db, limit.clamp(1, 500)).await
    }

    pub async fn latest(&self) -> Result<Option<BriefReleaseRecord>> {
        releases::latest_release(&self.db).await
    }

    pub async fn find(&self, release_id: &str) -> Result<Option<BriefReleaseRecord>> {
        releases::find_release(&self.db, release_id).await
    }

    /// Stored HTML for one edition
    pub async fn read_html(&self, release: &BriefReleaseRecord, variant: Variant) -> Result<String> {
        let path = self.variant_path(release, variant, "html");
        read_file(&path).await.map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Stored JSON for one edition
    pub async fn read_json(&self, release: &BriefReleaseRecord, variant: Variant) -> Result<BriefDocument> {
        let path = self.variant_path(release, variant, "json");
        let bytes = read_file(&path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn release_dir(&self, release_id: &str) -> PathBuf {
        self.root.join(release_id)
    }

    fn variant_path(&self, release: &BriefReleaseRecord, variant: Variant, ext: &str) -> PathBuf {
        let html = match variant {
            Variant::Free => &release.free_path,
            Variant::Paid => &release.paid_path,
        };
        Path::new(html).with_extension(ext)
    }

    async fn write_release_files(&self, dir: &Path, free: &BriefDocument, paid: &BriefDocument) -> Result<()> {
        let staging = self.root.join(format!(
            ".{}.tmp",
            dir.file_name().and_then(|n| n.to_str()).unwrap_or("release")
        ));
        tokio::fs::create_dir_all(&staging).await?;

        for doc in [free, paid] {
            let name = doc.variant.as_str();
            tokio::fs::write(staging.join(format!("{}.html", name)), render_brief(doc)).await?;
            tokio::fs::write(staging.join(format!("{}.json", name)), serde_json::to_vec_pretty(doc)?).await?;
        }

        tokio::fs::rename(&staging, dir).await?;
        Ok(())
    }
}

async fn read_file(path: &Path) -> Result<Vec<u8>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(Error::NotFound(format!("Release file missing: {}", path.display())))
        }
        Err(e) => Err(e.into()),
    }
}

/// `fb-<date>-<8 hex>`
pub fn new_release_id(release_date: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("fb-{}-{}", release_date, &suffix[..8])
}
