//! Configuration infrastructure
//!
//! JSON-file backed application configuration with sensible defaults.
//! Settings fall into two groups: operational (database path, logging)
//! and pipeline tuning (scraper concurrency bounds, estimated-sales
//! thresholds).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;
use tracing::info;

use crate::domain::value_objects::ConcurrencyBounds;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub scraping: ScrapingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Sqlite URL, e.g. `sqlite://pricewatch.db`.
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let path = data_dir().join("pricewatch.db");
        Self {
            url: format!("sqlite://{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// tracing env-filter directive, e.g. `info` or `pricewatch=debug`.
    pub filter: String,
    /// Write a log file in addition to stderr.
    pub file_output: bool,
    pub log_dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            file_output: false,
            log_dir: data_dir().join("logs"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapingConfig {
    /// Allowed range for both scraper concurrency tunables. Out-of-range
    /// requests are clamped, not rejected.
    pub concurrency_bounds: ConcurrencyBounds,
    /// Overall time limit for one store-update run, in seconds.
    pub update_timeout_secs: u64,
    /// Outer retries of the update task for transient gateway failures.
    pub max_task_retries: u32,
    /// Delay between those retries, in seconds.
    pub task_retry_delay_secs: u64,
    /// Directory where raw scrape records are archived.
    pub archive_dir: PathBuf,
    /// Stores whose stock counters reset erratically; large deltas from
    /// them are not counted as sales.
    pub unreliable_stock_stores: Vec<i64>,
    /// Minimum delta at which an unreliable store's decrease is ignored.
    pub unreliable_stock_sales_threshold: i32,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            concurrency_bounds: ConcurrencyBounds::default(),
            update_timeout_secs: 3600,
            max_task_retries: 2,
            task_retry_delay_secs: 10,
            archive_dir: data_dir().join("scrapings"),
            unreliable_stock_stores: Vec::new(),
            unreliable_stock_sales_threshold: 10,
        }
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pricewatch")
}

/// Default location of the config file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pricewatch")
        .join("config.json")
}

impl AppConfig {
    /// Load the configuration from `path`, creating it with defaults when
    /// missing.
    pub async fn load_or_create(path: &PathBuf) -> Result<Self> {
        if path.exists() {
            let raw = fs::read_to_string(path)
                .await
                .with_context(|| format!("reading config file {}", path.display()))?;
            let config: Self = serde_json::from_str(&raw)
                .with_context(|| format!("parsing config file {}", path.display()))?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save(path).await?;
            info!(path = %path.display(), "created default configuration");
            Ok(config)
        }
    }

    pub async fn save(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw)
            .await
            .with_context(|| format!("writing config file {}", path.display()))?;
        Ok(())
    }
}
