//! Monitor passes: one-shot, daemon loop, dry run and test alert

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use wssi_common::analytics::{AnalyticsStore, WssiSnapshot};
use wssi_common::{Error, Result, Severity};

use crate::channels::{Delivery, Dispatcher};
use crate::check::{check_thresholds, readings, test_alert, test_snapshot, Alert};
use crate::config::MonitorConfig;
use crate::message::render;
use crate::store;

/// What one pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// False when no snapshot was available
    pub checked: bool,
    pub triggered: usize,
    pub sent: usize,
    pub suppressed: usize,
    /// Signals whose recorded state went back to stable
    pub recovered: usize,
}

/// An alert a pass would send, and whether suppression would hold it back
#[derive(Debug, Clone)]
pub struct PlannedAlert {
    pub alert: Alert,
    pub suppressed: bool,
}

pub struct Monitor {
    config: MonitorConfig,
    store: AnalyticsStore,
    db: SqlitePool,
    dispatcher: Dispatcher,
}

impl Monitor {
    pub fn new(config: MonitorConfig, store: AnalyticsStore, db: SqlitePool) -> Result<Self> {
        Ok(Self {
            config,
            store,
            db,
            dispatcher: Dispatcher::new()?,
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Current snapshot, or None when the artifact does not exist yet
    async fn load_snapshot(&self) -> Result<Option<WssiSnapshot>> {
        match self.store.snapshot().await {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn is_repeat(&self, alert: &Alert) -> Result<bool> {
        if !self.config.suppress_repeats {
            return Ok(false);
        }
        let state = store::get_state(&self.db, alert.state_key()).await?;
        Ok(state.and_then(|s| s.last_severity()) == Some(alert.severity))
    }

    /// Alerts the next pass would raise, without sending or recording anything
    pub async fn plan(&self) -> Result<Option<Vec<PlannedAlert>>> {
        let Some(snapshot) = self.load_snapshot().await? else {
            return Ok(None);
        };
        let mut planned = Vec::new();
        for alert in check_thresholds(&snapshot, &self.config.thresholds) {
            let suppressed = self.is_repeat(&alert).await?;
            planned.push(PlannedAlert { alert, suppressed });
        }
        Ok(Some(planned))
    }

    /// Check the snapshot once; send, record and reset state as needed
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<RunSummary> {
        let Some(snapshot) = self.load_snapshot().await? else {
            warn!("No WSSI snapshot available; nothing to check");
            return Ok(RunSummary::default());
        };

        let alerts = check_thresholds(&snapshot, &self.config.thresholds);
        let mut summary = RunSummary {
            checked: true,
            triggered: alerts.len(),
            ..RunSummary::default()
        };

        if alerts.is_empty() {
            info!("All clear. WSSI: {:.2}", snapshot.wssi_value);
        } else {
            info!("{} alert(s) triggered", alerts.len());
        }

        for alert in &alerts {
            if self.is_repeat(alert).await? {
                info!("Suppressed repeat: {}", alert.message);
                summary.suppressed += 1;
                continue;
            }

            info!("Sending: {}", alert.message);
            let rendered = render(alert, &snapshot, now, &self.config.dashboard_url);
            let deliveries = self.dispatcher.dispatch(&self.config.channels, &rendered).await;
            log_deliveries(&deliveries);

            store::record_alert(&self.db, alert, snapshot.wssi_value, now).await?;
            summary.sent += 1;
        }

        for reading in readings(&snapshot, &self.config.thresholds) {
            if reading.severity == Severity::Stable && store::reset_to_stable(&self.db, &reading.state_key, reading.value).await? {
                info!("{} returned to stable", reading.state_key);
                summary.recovered += 1;
            }
        }

        Ok(summary)
    }

    /// Push a synthetic critical alert through every channel
    ///
    /// Nothing is recorded in the alert store.
    pub async fn send_test_alert(&self, now: DateTime<Utc>) -> Vec<Delivery> {
        let rendered = render(&test_alert(), &test_snapshot(now), now, &self.config.dashboard_url);
        let deliveries = self.dispatcher.dispatch(&self.config.channels, &rendered).await;
        log_deliveries(&deliveries);
        deliveries
    }

    /// Run passes every `interval` until `shutdown` resolves
    ///
    /// A failed pass is logged and the loop carries on.
    pub async fn run_daemon<F>(&self, interval: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!("Monitor daemon started (interval: {}s)", interval.as_secs());
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once(Utc::now()).await {
                        error!("Monitor pass failed: {}", e);
                    }
                }
                _ = &mut shutdown => {
                    info!("Monitor daemon stopping");
                    break;
                }
            }
        }
    }
}

fn log_deliveries(deliveries: &[Delivery]) {
    for d in deliveries {
        info!("  {} {}", if d.delivered { "sent" } else { "not sent" }, d.channel.as_str());
    }
}
