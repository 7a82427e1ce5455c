//! Store update orchestration
//!
//! Drives one store's pricing update end to end: resolves the target
//! categories, clamps concurrency parameters, invokes the scraper gateway
//! (two passes), hands the merged listing set to the reconciler, archives
//! the raw scrape and finalizes the update-log status.
//!
//! Status state machine: Pending -> InProcess -> {Success, Error}. A
//! failure after listings were committed never rolls them back; the Error
//! status tells operators to investigate.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{error, info, warn};

use crate::application::reconciler::ListingReconciler;
use crate::domain::entities::{Category, Store, StoreUpdateLog, UpdateStatus};
use crate::domain::repositories::{
    EntityRepository, ProductRepository, StoreRepository, UpdateLogRepository,
};
use crate::domain::services::{ArchiveStorage, ScraperGateway};
use crate::domain::value_objects::{
    ConcurrencyBounds, ConcurrencyParams, ScrapeRecord, ScrapeResult,
};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub concurrency_bounds: ConcurrencyBounds,
    /// Overall time limit for one run.
    pub update_timeout: Duration,
    /// Bounded retries of the scraping phase for transient gateway
    /// failures. Reconciliation is never retried.
    pub max_task_retries: u32,
    pub task_retry_delay: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency_bounds: ConcurrencyBounds::default(),
            update_timeout: Duration::from_secs(3600),
            max_task_retries: 2,
            task_retry_delay: Duration::from_secs(10),
        }
    }
}

pub struct StoreUpdateOrchestrator {
    store_repo: Arc<dyn StoreRepository>,
    entity_repo: Arc<dyn EntityRepository>,
    update_log_repo: Arc<dyn UpdateLogRepository>,
    gateway: Arc<dyn ScraperGateway>,
    archive: Arc<dyn ArchiveStorage>,
    reconciler: ListingReconciler,
    config: OrchestratorConfig,
}

impl StoreUpdateOrchestrator {
    pub fn new(
        store_repo: Arc<dyn StoreRepository>,
        product_repo: Arc<dyn ProductRepository>,
        entity_repo: Arc<dyn EntityRepository>,
        update_log_repo: Arc<dyn UpdateLogRepository>,
        gateway: Arc<dyn ScraperGateway>,
        archive: Arc<dyn ArchiveStorage>,
        config: OrchestratorConfig,
    ) -> Self {
        let reconciler = ListingReconciler::new(entity_repo.clone(), product_repo);
        Self {
            store_repo,
            entity_repo,
            update_log_repo,
            gateway,
            archive,
            reconciler,
            config,
        }
    }

    /// Run one store pricing update. `category_ids` narrows the store's
    /// configured categories; `update_log_id` resumes a previously created
    /// log row instead of opening a new one.
    pub async fn update_store(
        &self,
        store_id: i64,
        category_ids: Option<&[i64]>,
        discover_urls_concurrency: Option<u32>,
        products_for_url_concurrency: Option<u32>,
        update_log_id: Option<i64>,
    ) -> Result<StoreUpdateLog> {
        let store = self
            .store_repo
            .find_by_id(store_id)
            .await?
            .with_context(|| format!("no store with id {store_id}"))?;
        if !store.is_active {
            bail!("store {} is inactive", store.name);
        }

        let categories = self.sanitize_categories(store_id, category_ids).await?;
        if categories.is_empty() {
            bail!("store {} has no categories to update", store.name);
        }

        let params = ConcurrencyParams::sanitize(
            discover_urls_concurrency,
            products_for_url_concurrency,
            self.config.concurrency_bounds,
        );

        let mut log = match update_log_id {
            Some(id) => {
                let log = self
                    .update_log_repo
                    .find_by_id(id)
                    .await?
                    .with_context(|| format!("no update log with id {id}"))?;
                if log.status.is_terminal() {
                    bail!("update log {id} already finished as {:?}", log.status);
                }
                log
            }
            None => self.update_log_repo.create(store_id).await?,
        };

        log.discovery_urls_concurrency = Some(params.discover_urls_concurrency);
        log.products_for_url_concurrency = Some(params.products_for_url_concurrency);
        if log.status == UpdateStatus::Pending {
            Self::transition(&mut log, UpdateStatus::InProcess)?;
        }
        self.update_log_repo.update(&log).await?;
        self.update_log_repo
            .set_categories(log.id, &categories.iter().map(|c| c.id).collect::<Vec<_>>())
            .await?;

        info!(
            store = %store.name,
            job_id = %log.job_id,
            categories = categories.len(),
            "store update started"
        );

        let outcome = tokio::time::timeout(
            self.config.update_timeout,
            self.execute(&store, &categories, params, &mut log),
        )
        .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                self.fail(&mut log, &format!("{err:#}")).await?;
                return Err(err);
            }
            Err(_) => {
                let message = format!(
                    "timed out after {}s",
                    self.config.update_timeout.as_secs()
                );
                self.fail(&mut log, &message).await?;
                bail!("store update for {} {message}", store.name);
            }
        }

        self.update_log_repo
            .find_by_id(log.id)
            .await?
            .context("update log vanished mid-run")
    }

    async fn execute(
        &self,
        store: &Store,
        categories: &[Category],
        params: ConcurrencyParams,
        log: &mut StoreUpdateLog,
    ) -> Result<()> {
        let category_ids: Vec<i64> = categories.iter().map(|c| c.id).collect();
        let scraper_names: Vec<String> =
            categories.iter().map(|c| c.scraper_name.clone()).collect();

        let scrape = self
            .scrape_with_retry(store, &scraper_names, &category_ids, params)
            .await?;

        let stats = self
            .reconciler
            .reconcile(store, &category_ids, &scrape)
            .await?;

        let record = ScrapeRecord {
            categories: scraper_names,
            discovery_urls_without_products: scrape.discovery_urls_without_products.clone(),
            listings: scrape.listings.clone(),
        };
        let registry_file = self
            .archive
            .store_scrape_record(store, &log.job_id, &serde_json::to_value(&record)?)
            .await?;

        log.registry_file = Some(registry_file);
        log.available_products_count = Some(self.entity_repo.count_available(store.id).await?);
        log.unavailable_products_count =
            Some(self.entity_repo.count_unavailable(store.id).await?);
        log.discovery_urls_without_products_count =
            Some(scrape.discovery_urls_without_products.len() as i64);

        if stats.is_clean() {
            Self::transition(log, UpdateStatus::Success)?;
            log.status_message = Some(format!(
                "created {}, updated {}, cleared {}",
                stats.created, stats.updated, stats.cleared
            ));
        } else {
            Self::transition(log, UpdateStatus::Error)?;
            log.status_message = Some(format!(
                "{} listings failed; first: {}",
                stats.errors.len(),
                stats.errors[0]
            ));
        }
        self.update_log_repo.update(log).await?;

        info!(
            store = %store.name,
            job_id = %log.job_id,
            status = ?log.status,
            "store update finished"
        );

        Ok(())
    }

    /// The scraping phase, retried a bounded number of times for transient
    /// gateway failures. Once it returns, nothing is retried anymore, so
    /// history rows can never be duplicated by retries.
    async fn scrape_with_retry(
        &self,
        store: &Store,
        scraper_names: &[String],
        category_ids: &[i64],
        params: ConcurrencyParams,
    ) -> Result<ScrapeResult> {
        let mut attempt = 0u32;
        loop {
            match self.scrape(store, scraper_names, category_ids, params).await {
                Ok(result) => return Ok(result),
                Err(err) if attempt < self.config.max_task_retries => {
                    attempt += 1;
                    warn!(
                        store = %store.name,
                        attempt,
                        error = %err,
                        "scrape failed, retrying"
                    );
                    tokio::time::sleep(self.config.task_retry_delay).await;
                }
                Err(err) => {
                    error!(store = %store.name, error = %err, "scrape retries exhausted");
                    return Err(err);
                }
            }
        }
    }

    /// Two-pass scrape: the store's declared categories first, then a
    /// direct re-check of the discovery URLs of entities whose assigned
    /// category is targeted but whose last scraped category is not. The
    /// second pass overwrites the first on key collisions.
    async fn scrape(
        &self,
        store: &Store,
        scraper_names: &[String],
        category_ids: &[i64],
        params: ConcurrencyParams,
    ) -> Result<ScrapeResult> {
        let mut result = self
            .gateway
            .products_for_categories(store, scraper_names, params)
            .await?;

        let miscategorized = self
            .entity_repo
            .find_miscategorized(store.id, category_ids)
            .await?;

        if !miscategorized.is_empty() {
            let mut urls: Vec<String> = miscategorized
                .into_iter()
                .map(|e| e.discovery_url)
                .collect();
            urls.sort();
            urls.dedup();

            let second_pass = self.gateway.products_for_urls(store, &urls, params).await?;
            result.merge(second_pass);
        }

        Ok(result)
    }

    async fn sanitize_categories(
        &self,
        store_id: i64,
        requested: Option<&[i64]>,
    ) -> Result<Vec<Category>> {
        let configured = self.store_repo.categories(store_id).await?;
        Ok(match requested {
            Some(ids) => configured
                .into_iter()
                .filter(|c| ids.contains(&c.id))
                .collect(),
            None => configured,
        })
    }

    /// Every status write goes through here so an illegal move in the
    /// Pending -> InProcess -> {Success, Error} machine surfaces as an
    /// error instead of silently clobbering the log.
    fn transition(log: &mut StoreUpdateLog, next: UpdateStatus) -> Result<()> {
        if !log.status.can_transition_to(next) {
            bail!(
                "illegal update-log transition {:?} -> {next:?} on log {}",
                log.status,
                log.id
            );
        }
        log.status = next;
        Ok(())
    }

    async fn fail(&self, log: &mut StoreUpdateLog, message: &str) -> Result<()> {
        if log.status.is_terminal() {
            return Ok(());
        }
        Self::transition(log, UpdateStatus::Error)?;
        log.status_message = Some(message.to_string());
        self.update_log_repo.update(log).await
    }
}
