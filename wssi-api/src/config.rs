//! Runtime settings for the API service
//!
//! Everything here comes from environment variables so the same binary runs
//! unchanged locally and behind a platform proxy. The analytics store may also
//! be set in config.toml.

use std::path::{Path, PathBuf};
use wssi_common::config::{env_parse, env_string, resolve_analytics_dir, TomlConfig};

/// Default number of brief releases kept on disk
pub const DEFAULT_BRIEF_RETENTION: usize = 26;

/// Default age after which a dataset counts as stale
pub const DEFAULT_STALE_AFTER_HOURS: i64 = 36;

/// Bundled analytics shipped alongside the service
pub const DEFAULT_FALLBACK_DIR: &str = "./output/analytics";

/// API service configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Runtime analytics store (ingest target)
    pub analytics_dir: PathBuf,
    /// Read-only analytics used when the runtime store lacks a file
    pub analytics_fallback_dir: Option<PathBuf>,
    /// Root of persisted brief releases
    pub briefs_dir: PathBuf,
    pub brief_publish_token: Option<String>,
    pub analytics_ingest_token: Option<String>,
    pub brief_retention: usize,
    /// Absolute base used for links in publish responses
    pub public_base_url: Option<String>,
    pub stale_after_hours: i64,
    pub bootstrap_admin_key: Option<String>,
}

impl ApiConfig {
    /// Read settings for a service rooted at `data_dir`
    pub fn from_env(data_dir: &Path, toml: &TomlConfig) -> Self {
        let publish_token = env_string("WSSI_BRIEF_PUBLISH_TOKEN");
        let ingest_token = env_string("WSSI_ANALYTICS_INGEST_TOKEN").or_else(|| publish_token.clone());

        Self {
            analytics_dir: resolve_analytics_dir(toml, data_dir.join("analytics")),
            analytics_fallback_dir: Some(
                env_string("WSSI_ANALYTICS_FALLBACK_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_FALLBACK_DIR)),
            ),
            briefs_dir: data_dir.join("briefs"),
            brief_publish_token: publish_token,
            analytics_ingest_token: ingest_token,
            brief_retention: env_parse("WSSI_BRIEF_RETENTION", DEFAULT_BRIEF_RETENTION).max(1),
            public_base_url: env_string("WSSI_PUBLIC_BASE_URL").map(|u| u.trim_end_matches('/').to_string()),
            stale_after_hours: env_parse("WSSI_STALE_AFTER_HOURS", DEFAULT_STALE_AFTER_HOURS),
            bootstrap_admin_key: env_string("WSSI_BOOTSTRAP_ADMIN_KEY"),
        }
    }

    /// Defaults rooted at `data_dir`, ignoring the environment
    pub fn for_data_dir(data_dir: &Path) -> Self {
        Self {
            analytics_dir: data_dir.join("analytics"),
            analytics_fallback_dir: None,
            briefs_dir: data_dir.join("briefs"),
            brief_publish_token: None,
            analytics_ingest_token: None,
            brief_retention: DEFAULT_BRIEF_RETENTION,
            public_base_url: None,
            stale_after_hours: DEFAULT_STALE_AFTER_HOURS,
            bootstrap_admin_key: None,
        }
    }

    /// Prefix `path` with the public base URL when one is configured
    pub fn public_url(&self, path: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}{}", base, path),
            None => path.to_string(),
        }
    }
}
