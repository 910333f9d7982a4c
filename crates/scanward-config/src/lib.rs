//! scanward.toml configuration parser.
//!
//! Every section except `[stalled_scans]` is optional and falls back to
//! the defaults below. The stalled-scan timings have no default: a
//! missing value fails to parse instead of silently disabling recovery.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

const HOUR: u64 = 60 * 60;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("unknown log level: {0}")]
    LogLevel(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanwardConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub scans: ScansConfig,
    pub stalled_scans: StalledScansConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScansConfig {
    /// Initial concurrency budget.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
    /// Failed scans are requeued this many times before staying `Error`.
    #[serde(default)]
    pub max_failed_scan_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StalledScansConfig {
    pub check_interval_hours: u64,
    pub client_timeout_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetricsConfig {
    #[serde(default = "default_model_metrics_interval_secs")]
    pub model_metrics_interval_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_concurrency_limit() -> usize {
    7
}

fn default_model_metrics_interval_secs() -> u64 {
    15
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

impl Default for ScansConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            max_failed_scan_retries: 0,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            model_metrics_interval_secs: default_model_metrics_interval_secs(),
        }
    }
}

impl StalledScansConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_hours.saturating_mul(HOUR))
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_hours.saturating_mul(HOUR))
    }
}

impl MetricsConfig {
    pub fn model_metrics_interval(&self) -> Duration {
        Duration::from_secs(self.model_metrics_interval_secs)
    }
}

impl ScanwardConfig {
    /// Read, parse, and validate a config file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: ScanwardConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::LogLevel(self.log_level.clone()));
        }
        if self.stalled_scans.check_interval_hours == 0 {
            return Err(ConfigError::NotPositive {
                field: "stalled_scans.check_interval_hours",
            });
        }
        if self.stalled_scans.client_timeout_hours == 0 {
            return Err(ConfigError::NotPositive {
                field: "stalled_scans.client_timeout_hours",
            });
        }
        if self.metrics.model_metrics_interval_secs == 0 {
            return Err(ConfigError::NotPositive {
                field: "metrics.model_metrics_interval_secs",
            });
        }
        Ok(())
    }
}
