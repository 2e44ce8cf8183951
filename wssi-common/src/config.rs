//! Configuration loading and data directory resolution
//!
//! Data directory priority order (highest first):
//! 1. Command-line argument
//! 2. Environment variable (`WSSI_DATA_DIR`)
//! 3. TOML config file (`data_dir` key)
//! 4. OS-dependent compiled default

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "WSSI_DATA_DIR";

/// Environment variable overriding the analytics runtime store
pub const ANALYTICS_DIR_ENV: &str = "WSSI_ANALYTICS_DIR";

/// SQLite file holding keys, users, rate limits and brief metadata
pub const API_DATABASE_FILE: &str = "wssi_api.db";

/// SQLite file holding monitor alert history
pub const ALERT_DATABASE_FILE: &str = "alerts.db";

/// Optional TOML configuration (`~/.config/wssi/config.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Data directory override
    pub data_dir: Option<PathBuf>,
    /// Analytics runtime store override
    pub analytics_dir: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging section of the TOML config
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level applied to the binary's own targets when `RUST_LOG` is unset
    pub level: Option<String>,
}

impl LoggingConfig {
    /// Default `EnvFilter` directives: every target at the configured level,
    /// or at `fallback` when the config names none
    pub fn directives(&self, targets: &[&str], fallback: &str) -> String {
        let level = self
            .level
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(fallback);
        targets
            .iter()
            .map(|target| format!("{}={}", target, level))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl TomlConfig {
    /// Load from an explicit path
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse TOML {} failed: {}", path.display(), e)))
    }

    /// Load from the default location, falling back to defaults
    ///
    /// A missing or unreadable file is never fatal.
    pub fn load_default() -> Self {
        let Some(path) = default_config_path() else {
            return Self::default();
        };
        if !path.exists() {
            debug!("No config file at {}", path.display());
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Ignoring config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

/// Analytics runtime store: `WSSI_ANALYTICS_DIR`, then TOML `analytics_dir`,
/// then `default`
pub fn resolve_analytics_dir(toml: &TomlConfig, default: PathBuf) -> PathBuf {
    if let Some(path) = env_string(ANALYTICS_DIR_ENV) {
        return PathBuf::from(path);
    }
    toml.analytics_dir.clone().unwrap_or(default)
}

/// Default TOML config path for the platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("wssi").join("config.toml"))
}

/// OS-dependent default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("wssi"))
        .unwrap_or_else(|| PathBuf::from("./wssi_data"))
}

/// Resolves the data directory following the priority order above
#[derive(Debug, Clone)]
pub struct DataDirResolver {
    component: String,
    cli_arg: Option<PathBuf>,
    toml: Option<TomlConfig>,
}

impl DataDirResolver {
    /// `component` is only used for log lines (e.g. "api", "monitor")
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            cli_arg: None,
            toml: None,
        }
    }

    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    pub fn with_toml(mut self, toml: TomlConfig) -> Self {
        self.toml = Some(toml);
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            info!("[{}] data dir from command line: {}", self.component, path.display());
            return path.clone();
        }

        if let Ok(path) = std::env::var(DATA_DIR_ENV) {
            if !path.trim().is_empty() {
                info!("[{}] data dir from {}: {}", self.component, DATA_DIR_ENV, path);
                return PathBuf::from(path);
            }
        }

        let toml = self.toml.clone().unwrap_or_else(TomlConfig::load_default);
        if let Some(path) = toml.data_dir {
            info!("[{}] data dir from config file: {}", self.component, path.display());
            return path;
        }

        let path = default_data_dir();
        info!("[{}] data dir default: {}", self.component, path.display());
        path
    }
}

/// Creates the data directory and hands out well-known paths inside it
#[derive(Debug, Clone)]
pub struct DataDirInitializer {
    data_dir: PathBuf,
}

impl DataDirInitializer {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)?;
            info!("Created data directory: {}", self.data_dir.display());
        }
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn api_database_path(&self) -> PathBuf {
        self.data_dir.join(API_DATABASE_FILE)
    }

    pub fn alert_database_path(&self) -> PathBuf {
        self.data_dir.join(ALERT_DATABASE_FILE)
    }

    pub fn analytics_dir(&self) -> PathBuf {
        self.data_dir.join("analytics")
    }

    pub fn briefs_dir(&self) -> PathBuf {
        self.data_dir.join("briefs")
    }
}

/// Read a non-empty, trimmed environment variable
pub fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read and parse an environment variable, falling back to `default`
///
/// Unparsable values are logged and ignored.
pub fn env_parse<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(name) {
        Some(raw) => match raw.parse::<T>() {
            Ok(value) => value,
            Err(e) => {
                warn!("Ignoring {}={}: {}", name, raw, e);
                default
            }
        },
        None => default,
    }
}
