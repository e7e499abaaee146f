use serde::Deserialize;
use std::{fs, path::PathBuf, time::Duration};

use crate::pipeline::ImportSettings;

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub uri: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl DatabaseConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportConfig {
    /// IANA zone name, e.g. `Europe/London`.
    #[serde(default = "default_reference_time_zone")]
    pub reference_time_zone: String,
    pub inbox_dir: Option<PathBuf>,
    pub archive_dir: Option<PathBuf>,
    #[serde(default = "default_file_extension")]
    pub file_extension: Option<String>,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            reference_time_zone: default_reference_time_zone(),
            inbox_dir: None,
            archive_dir: None,
            file_extension: default_file_extension(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl ImportConfig {
    pub fn settings(&self) -> anyhow::Result<ImportSettings> {
        let reference_tz = self
            .reference_time_zone
            .parse::<chrono_tz::Tz>()
            .map_err(|e| anyhow::anyhow!("invalid import.reference_time_zone '{}': {e}", self.reference_time_zone))?;
        Ok(ImportSettings { reference_tz })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub import: ImportConfig,
    pub metrics: Option<MetricsConfig>,
}

fn default_max_connections() -> u32 {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    200
}

fn default_reference_time_zone() -> String {
    "Europe/London".to_string()
}

fn default_file_extension() -> Option<String> {
    Some("uff".to_string())
}

fn default_poll_interval_secs() -> u64 {
    30
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("D0010_CONFIG").unwrap_or_else(|_| "d0010-config.toml".to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config file '{path}': {e}"))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        cfg.import.settings()?;
        Ok(cfg)
    }
}
