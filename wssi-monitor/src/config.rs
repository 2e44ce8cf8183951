//! Monitor configuration (`alerts.json`)
//!
//! Every section is optional in the file; missing keys take the defaults
//! below. A missing file is created with the defaults on first run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;
use wssi_common::{Error, Result, Thresholds};

pub const DEFAULT_DASHBOARD_URL: &str = "https://dashboard.polycrisis.io";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub thresholds: ThresholdConfig,
    pub channels: ChannelsConfig,
    pub reporting: ReportingConfig,
    /// Skip an alert whose severity matches the last one recorded for that signal
    pub suppress_repeats: bool,
    /// Linked from alert bodies
    pub dashboard_url: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            thresholds: ThresholdConfig::default(),
            channels: ChannelsConfig::default(),
            reporting: ReportingConfig::default(),
            suppress_repeats: true,
            dashboard_url: DEFAULT_DASHBOARD_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub wssi_critical: f64,
    pub wssi_approaching: f64,
    pub wssi_watch: f64,
    pub theme_critical: f64,
    pub theme_approaching: f64,
    pub theme_watch: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        let t = Thresholds::default();
        Self {
            wssi_critical: t.critical,
            wssi_approaching: t.approaching,
            wssi_watch: t.watch,
            theme_critical: t.critical,
            theme_approaching: t.approaching,
            theme_watch: t.watch,
        }
    }
}

impl ThresholdConfig {
    /// Cut-offs for the overall index
    pub fn wssi(&self) -> Thresholds {
        Thresholds {
            critical: self.wssi_critical,
            approaching: self.wssi_approaching,
            watch: self.wssi_watch,
        }
    }

    /// Cut-offs for individual themes
    pub fn theme(&self) -> Thresholds {
        Thresholds {
            critical: self.theme_critical,
            approaching: self.theme_approaching,
            watch: self.theme_watch,
        }
    }

    fn validate(&self) -> Result<()> {
        for (name, t) in [("wssi", self.wssi()), ("theme", self.theme())] {
            let ordered = t.watch <= t.approaching && t.approaching <= t.critical;
            if !ordered || t.watch <= 0.0 {
                return Err(Error::Config(format!(
                    "{} thresholds must satisfy 0 < watch <= approaching <= critical (got {} / {} / {})",
                    name, t.watch, t.approaching, t.critical
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    pub email: EmailChannel,
    pub webhook: WebhookChannel,
    pub discord: DiscordChannel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailChannel {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    /// Sender address; the username is used when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub to: Vec<String>,
}

impl Default for EmailChannel {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: 587,
            username: String::new(),
            password: String::new(),
            from: None,
            to: Vec::new(),
        }
    }
}

impl EmailChannel {
    pub fn sender(&self) -> &str {
        match self.from.as_deref() {
            Some(from) if !from.trim().is_empty() => from,
            _ if !self.username.is_empty() => &self.username,
            _ => "alerts@wssi.io",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookChannel {
    pub enabled: bool,
    pub url: String,
    /// Extra request headers (e.g. an auth token)
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordChannel {
    pub enabled: bool,
    pub webhook_url: String,
}

/// Weekly report schedule; stored for the dashboard, not acted on here
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    pub weekly_report_day: String,
    pub weekly_report_time: String,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            weekly_report_day: "monday".to_string(),
            weekly_report_time: "09:00".to_string(),
        }
    }
}

impl MonitorConfig {
    /// Parse and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: MonitorConfig = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
        config.thresholds.validate()?;
        Ok(config)
    }

    /// Load `path`, writing the defaults there first if it does not exist
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }

        let config = Self::default();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(&config)?)?;
        info!("Created default monitor config at {}", path.display());
        Ok(config)
    }

    pub fn any_channel_enabled(&self) -> bool {
        self.channels.email.enabled || self.channels.webhook.enabled || self.channels.discord.enabled
    }
}
