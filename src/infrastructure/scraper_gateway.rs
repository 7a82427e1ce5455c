//! Scraper gateway adapters
//!
//! The real per-store scrapers live in an external service. This module
//! ships two stand-ins: a replay gateway that feeds a previously archived
//! scrape record back through the pipeline (backfills, postmortems), and a
//! feature-gated simulated gateway for demo runs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;

use crate::domain::entities::Store;
use crate::domain::services::ScraperGateway;
use crate::domain::value_objects::{ConcurrencyParams, ScrapeRecord, ScrapeResult};

/// Replays an archived scrape record as if the store had just been
/// scraped.
pub struct JsonScraperGateway {
    record: ScrapeRecord,
}

impl JsonScraperGateway {
    pub fn new(record: ScrapeRecord) -> Self {
        Self { record }
    }

    pub async fn from_file(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading scrape record {}", path.display()))?;
        let record: ScrapeRecord = serde_json::from_str(&raw)
            .with_context(|| format!("parsing scrape record {}", path.display()))?;
        Ok(Self::new(record))
    }
}

#[async_trait]
impl ScraperGateway for JsonScraperGateway {
    async fn products_for_categories(
        &self,
        _store: &Store,
        category_names: &[String],
        _params: ConcurrencyParams,
    ) -> Result<ScrapeResult> {
        Ok(ScrapeResult {
            listings: self
                .record
                .listings
                .iter()
                .filter(|l| category_names.contains(&l.category))
                .cloned()
                .collect(),
            discovery_urls_without_products: self.record.discovery_urls_without_products.clone(),
        })
    }

    async fn products_for_urls(
        &self,
        _store: &Store,
        urls: &[String],
        _params: ConcurrencyParams,
    ) -> Result<ScrapeResult> {
        Ok(ScrapeResult {
            listings: self
                .record
                .listings
                .iter()
                .filter(|l| urls.contains(&l.discovery_url) || urls.contains(&l.url))
                .cloned()
                .collect(),
            discovery_urls_without_products: Vec::new(),
        })
    }
}

#[cfg(feature = "simulate-scraper")]
pub use simulated::SimulatedScraperGateway;

#[cfg(feature = "simulate-scraper")]
mod simulated {
    use super::{async_trait, ConcurrencyParams, Result, ScrapeResult, ScraperGateway, Store};
    use crate::domain::entities::Condition;
    use crate::domain::value_objects::ScrapedListing;
    use chrono::Utc;
    use rust_decimal::Decimal;

    /// Generates plausible random listings. Demo/test tool only.
    pub struct SimulatedScraperGateway {
        pub listings_per_category: usize,
    }

    impl Default for SimulatedScraperGateway {
        fn default() -> Self {
            Self {
                listings_per_category: 20,
            }
        }
    }

    fn simulated_listing(store: &Store, category: &str, index: usize) -> ScrapedListing {
        let normal = Decimal::from(fastrand::u32(10_000..1_000_000));
        ScrapedListing {
            key: format!("{category}-{index}"),
            name: format!("{category} item {index}"),
            category: category.to_string(),
            currency: "CLP".into(),
            condition: Condition::New,
            stock: fastrand::i32(0..50),
            normal_price: normal,
            offer_price: normal * Decimal::new(9, 1),
            cell_monthly_payment: None,
            cell_plan_name: None,
            part_number: None,
            sku: Some(format!("SKU-{index}")),
            ean: None,
            url: format!("https://{}.example/p/{category}/{index}", store.scraper_class),
            discovery_url: format!("https://{}.example/c/{category}", store.scraper_class),
            picture_urls: vec![],
            description: None,
            timestamp: Utc::now(),
        }
    }

    #[async_trait]
    impl ScraperGateway for SimulatedScraperGateway {
        async fn products_for_categories(
            &self,
            store: &Store,
            category_names: &[String],
            _params: ConcurrencyParams,
        ) -> Result<ScrapeResult> {
            let mut result = ScrapeResult::default();
            for category in category_names {
                for index in 0..self.listings_per_category {
                    result
                        .listings
                        .push(simulated_listing(store, category, index));
                }
            }
            Ok(result)
        }

        async fn products_for_urls(
            &self,
            _store: &Store,
            _urls: &[String],
            _params: ConcurrencyParams,
        ) -> Result<ScrapeResult> {
            Ok(ScrapeResult::default())
        }
    }
}
