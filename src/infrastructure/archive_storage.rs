//! File-backed archive storage for raw scrape records
//!
//! One JSON document per store-update run, written to a private directory
//! and never read back by the live pipeline. The path layout keeps runs
//! listable per store and per day.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

use crate::domain::entities::Store;
use crate::domain::services::ArchiveStorage;

pub struct FileArchiveStorage {
    base_dir: PathBuf,
}

impl FileArchiveStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

#[async_trait]
impl ArchiveStorage for FileArchiveStorage {
    async fn store_scrape_record(
        &self,
        store: &Store,
        job_id: &str,
        document: &serde_json::Value,
    ) -> Result<String> {
        let dir = self
            .base_dir
            .join(store.id.to_string())
            .join(Utc::now().format("%Y-%m-%d").to_string());
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating archive directory {}", dir.display()))?;

        let path = dir.join(format!("{job_id}.json"));
        let raw = serde_json::to_vec_pretty(document)?;
        fs::write(&path, raw)
            .await
            .with_context(|| format!("writing scrape record {}", path.display()))?;

        debug!(store = %store.name, path = %path.display(), "archived scrape record");
        Ok(path.display().to_string())
    }
}
