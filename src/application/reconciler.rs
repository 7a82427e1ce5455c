//! Listing reconciliation
//!
//! Matches one store's freshly scraped listing set against its existing
//! entities by the (store, key) natural key and applies creates, updates
//! and active-registry clears. Each listing is its own atomic unit; a
//! failure on one listing never touches the others.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::application::price_history::PriceHistoryRecorder;
use crate::domain::entities::{Entity, Store};
use crate::domain::repositories::{EntityRepository, ProductRepository};
use crate::domain::value_objects::{NewRegistry, ReconcileStats, ScrapeResult, ScrapedListing};

/// Audit-log user recorded for changes applied by the automatic pipeline.
pub const PIPELINE_USER: &str = "system";

#[derive(Clone)]
pub struct ListingReconciler {
    entity_repo: Arc<dyn EntityRepository>,
    product_repo: Arc<dyn ProductRepository>,
    recorder: PriceHistoryRecorder,
}

impl ListingReconciler {
    pub fn new(
        entity_repo: Arc<dyn EntityRepository>,
        product_repo: Arc<dyn ProductRepository>,
    ) -> Self {
        let recorder = PriceHistoryRecorder::new(entity_repo.clone());
        Self {
            entity_repo,
            product_repo,
            recorder,
        }
    }

    /// Reconcile a scraped listing set against the store's entities in the
    /// targeted categories. Listing-level failures are isolated and
    /// reported through the returned stats.
    pub async fn reconcile(
        &self,
        store: &Store,
        category_ids: &[i64],
        scrape: &ScrapeResult,
    ) -> Result<ReconcileStats> {
        let mut stats = ReconcileStats::default();

        let scraped_keys: HashSet<&str> = scrape.listings.iter().map(|l| l.key.as_str()).collect();

        // Entities the store stopped reporting this cycle lose their
        // active registry; the rows themselves are kept.
        for entity in self.entity_repo.find_in_scope(store.id, category_ids).await? {
            if entity.active_registry_id.is_some() && !scraped_keys.contains(entity.key.as_str()) {
                self.recorder.clear_active(entity.id).await?;
                stats.cleared += 1;
            }
        }

        for listing in &scrape.listings {
            match self.process_listing(store, listing).await {
                Ok(created) => {
                    if created {
                        stats.created += 1;
                    } else {
                        stats.updated += 1;
                    }
                }
                Err(err) => {
                    warn!(store = %store.name, key = %listing.key, error = %err,
                        "listing reconcile failed");
                    stats.errors.push(format!("{}: {err:#}", listing.key));
                }
            }
        }

        info!(
            store = %store.name,
            created = stats.created,
            updated = stats.updated,
            cleared = stats.cleared,
            errors = stats.errors.len(),
            "reconcile pass finished"
        );

        Ok(stats)
    }

    /// Returns true when a new entity was created for the listing.
    async fn process_listing(&self, store: &Store, listing: &ScrapedListing) -> Result<bool> {
        let Some(category) = self
            .product_repo
            .find_category_by_scraper_name(&listing.category)
            .await?
        else {
            bail!("unknown scraped category {:?}", listing.category);
        };

        match self
            .entity_repo
            .find_by_store_and_key(store.id, &listing.key)
            .await?
        {
            Some(mut entity) => {
                let before = entity.tracked_fields();

                entity.scraped_category_id = category.id;
                entity.currency = listing.currency.clone();
                entity.condition = listing.condition;
                entity.name = listing.name.clone();
                entity.cell_plan_name = listing.cell_plan_name.clone();
                entity.part_number = listing.part_number.clone();
                entity.sku = listing.sku.clone();
                entity.ean = listing.ean.clone();
                entity.url = listing.url.clone();
                entity.discovery_url = listing.discovery_url.clone();
                entity.picture_urls = listing.picture_urls_json();
                entity.description = listing.description.clone();

                let log = if entity.tracked_fields() != before {
                    Some((PIPELINE_USER, before))
                } else {
                    None
                };

                self.entity_repo
                    .apply_listing_update(
                        &entity,
                        &NewRegistry::from(listing),
                        log.as_ref().map(|(u, f)| (*u, f)),
                    )
                    .await?;

                Ok(false)
            }
            None => {
                let now = Utc::now();
                let entity = Entity {
                    id: 0,
                    store_id: store.id,
                    category_id: category.id,
                    scraped_category_id: category.id,
                    currency: listing.currency.clone(),
                    condition: listing.condition,
                    product_id: None,
                    cell_plan_id: None,
                    active_registry_id: None,
                    name: listing.name.clone(),
                    cell_plan_name: listing.cell_plan_name.clone(),
                    part_number: listing.part_number.clone(),
                    sku: listing.sku.clone(),
                    ean: listing.ean.clone(),
                    key: listing.key.clone(),
                    url: listing.url.clone(),
                    discovery_url: listing.discovery_url.clone(),
                    picture_urls: listing.picture_urls_json(),
                    description: listing.description.clone(),
                    is_visible: true,
                    last_association: None,
                    last_association_user: None,
                    creation_date: now,
                    last_updated: now,
                };

                self.entity_repo
                    .create_with_registry(&entity, &NewRegistry::from(listing))
                    .await?;

                Ok(true)
            }
        }
    }
}
