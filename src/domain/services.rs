//! External collaborator seams
//!
//! The scraper layer, the archive store and the staff notifier are all
//! outside this crate; the pipeline consumes them through these traits.

use async_trait::async_trait;
use anyhow::Result;

use crate::domain::entities::{Entity, Store};
use crate::domain::value_objects::{ConcurrencyParams, ScrapeResult};

/// Per-store scraper invocation surface. Implementations own their retry
/// and backoff behavior; the orchestrator treats failures as transient.
#[async_trait]
pub trait ScraperGateway: Send + Sync {
    /// Scrape the store's listings for the given scraper-level category
    /// names.
    async fn products_for_categories(
        &self,
        store: &Store,
        category_names: &[String],
        params: ConcurrencyParams,
    ) -> Result<ScrapeResult>;

    /// Scrape specific discovery URLs directly. Used by the second pass to
    /// re-check listings the store miscategorizes.
    async fn products_for_urls(
        &self,
        store: &Store,
        urls: &[String],
        params: ConcurrencyParams,
    ) -> Result<ScrapeResult>;
}

/// Immutable audit storage for raw scrape records. Written once per
/// successful run, never read back by the live pipeline.
#[async_trait]
pub trait ArchiveStorage: Send + Sync {
    /// Persist the document and return its storage path/URL.
    async fn store_scrape_record(
        &self,
        store: &Store,
        job_id: &str,
        document: &serde_json::Value,
    ) -> Result<String>;
}

/// Staff notification delivery (email or similar), external to this crate.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_dissociation(
        &self,
        entity: &Entity,
        dissociated_by: &str,
        original_associator: &str,
        reason: Option<&str>,
    ) -> Result<()>;
}

/// Default notifier that only logs. Delivery backends live outside the
/// pipeline.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_dissociation(
        &self,
        entity: &Entity,
        dissociated_by: &str,
        original_associator: &str,
        reason: Option<&str>,
    ) -> Result<()> {
        tracing::info!(
            entity_id = entity.id,
            dissociated_by,
            original_associator,
            reason = reason.unwrap_or("-"),
            "entity dissociated by another user"
        );
        Ok(())
    }
}
