//! Value objects of the pricing pipeline
//!
//! Scraped listing DTOs as returned by the scraper gateway, scrape-result
//! merging, concurrency parameter sanitizing and reconcile run statistics.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::entities::Condition;

/// A normalized listing record returned by a store scraper for one
/// product page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedListing {
    /// Scraper-stable identifier; natural key together with the store.
    pub key: String,
    pub name: String,
    /// Category name as reported by the scraper layer.
    pub category: String,
    /// ISO currency code.
    pub currency: String,
    pub condition: Condition,
    pub stock: i32,
    pub normal_price: Decimal,
    pub offer_price: Decimal,
    pub cell_monthly_payment: Option<Decimal>,
    pub cell_plan_name: Option<String>,
    pub part_number: Option<String>,
    pub sku: Option<String>,
    pub ean: Option<String>,
    pub url: String,
    pub discovery_url: String,
    pub picture_urls: Vec<String>,
    pub description: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ScrapedListing {
    /// Picture URLs serialized the way the entity row stores them.
    pub fn picture_urls_json(&self) -> Option<String> {
        if self.picture_urls.is_empty() {
            None
        } else {
            serde_json::to_string(&self.picture_urls).ok()
        }
    }
}

/// Everything one scraper gateway call produced: the listings plus the
/// discovery URLs that yielded no product (kept for the audit archive).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrapeResult {
    pub listings: Vec<ScrapedListing>,
    pub discovery_urls_without_products: Vec<String>,
}

impl ScrapeResult {
    /// Merge another scrape pass into this one. Later listings overwrite
    /// earlier ones with the same key, so a two-pass scrape collapses to
    /// a single listing set before reconciliation.
    pub fn merge(&mut self, other: ScrapeResult) {
        let mut by_key: HashMap<String, usize> = self
            .listings
            .iter()
            .enumerate()
            .map(|(i, l)| (l.key.clone(), i))
            .collect();

        for listing in other.listings {
            match by_key.get(&listing.key) {
                Some(&i) => self.listings[i] = listing,
                None => {
                    by_key.insert(listing.key.clone(), self.listings.len());
                    self.listings.push(listing);
                }
            }
        }

        self.discovery_urls_without_products
            .extend(other.discovery_urls_without_products);
    }
}

/// Allowed range for the scraper concurrency tunables.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConcurrencyBounds {
    pub min: u32,
    pub max: u32,
}

impl Default for ConcurrencyBounds {
    fn default() -> Self {
        Self { min: 1, max: 10 }
    }
}

/// Concurrency parameters forwarded to the scraper gateway. Out-of-range
/// requests are normalized into the configured bounds, never rejected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConcurrencyParams {
    pub discover_urls_concurrency: u32,
    pub products_for_url_concurrency: u32,
}

impl Default for ConcurrencyParams {
    fn default() -> Self {
        Self {
            discover_urls_concurrency: 3,
            products_for_url_concurrency: 10,
        }
    }
}

impl ConcurrencyParams {
    /// Resolve optional overrides against defaults and clamp both values
    /// into the configured bounds.
    pub fn sanitize(
        discover_urls_concurrency: Option<u32>,
        products_for_url_concurrency: Option<u32>,
        bounds: ConcurrencyBounds,
    ) -> Self {
        let defaults = Self::default();
        Self {
            discover_urls_concurrency: discover_urls_concurrency
                .unwrap_or(defaults.discover_urls_concurrency)
                .clamp(bounds.min, bounds.max),
            products_for_url_concurrency: products_for_url_concurrency
                .unwrap_or(defaults.products_for_url_concurrency)
                .clamp(bounds.min, bounds.max),
        }
    }
}

/// Outcome counts of one reconcile pass over a store's listing set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileStats {
    /// Entities created for previously-unseen keys.
    pub created: usize,
    /// Existing entities refreshed with a new registry.
    pub updated: usize,
    /// Entities whose active registry was cleared because the store no
    /// longer reports their key.
    pub cleared: usize,
    /// Listing-level failures, isolated per listing.
    pub errors: Vec<String>,
}

impl ReconcileStats {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Input for one new price/stock registry row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRegistry {
    pub timestamp: DateTime<Utc>,
    pub stock: i32,
    pub normal_price: Decimal,
    pub offer_price: Decimal,
    pub cell_monthly_payment: Option<Decimal>,
}

impl From<&ScrapedListing> for NewRegistry {
    fn from(listing: &ScrapedListing) -> Self {
        Self {
            timestamp: listing.timestamp,
            stock: listing.stock,
            normal_price: listing.normal_price,
            offer_price: listing.offer_price,
            cell_monthly_payment: listing.cell_monthly_payment,
        }
    }
}

/// The archived scrape record written once per run and replayable through
/// the JSON scraper gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeRecord {
    /// Scraper-level category names covered by the run.
    pub categories: Vec<String>,
    pub discovery_urls_without_products: Vec<String>,
    pub listings: Vec<ScrapedListing>,
}

/// A group of available entities erroneously associated to the same
/// (store, product, cell plan) tuple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictGroup {
    pub store_id: i64,
    pub product_id: i64,
    pub cell_plan_id: Option<i64>,
    pub entities: Vec<crate::domain::entities::Entity>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn listing(key: &str, stock: i32) -> ScrapedListing {
        ScrapedListing {
            key: key.into(),
            name: format!("Listing {key}"),
            category: "Notebooks".into(),
            currency: "CLP".into(),
            condition: Condition::New,
            stock,
            normal_price: dec!(100.00),
            offer_price: dec!(90.00),
            cell_monthly_payment: None,
            cell_plan_name: None,
            part_number: None,
            sku: None,
            ean: None,
            url: format!("https://store.example/p/{key}"),
            discovery_url: "https://store.example/c/notebooks".into(),
            picture_urls: vec![],
            description: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn merge_overwrites_by_key_and_keeps_new_keys() {
        let mut first = ScrapeResult {
            listings: vec![listing("a", 5), listing("b", 1)],
            discovery_urls_without_products: vec!["https://store.example/empty".into()],
        };
        let second = ScrapeResult {
            listings: vec![listing("b", 9), listing("c", 2)],
            discovery_urls_without_products: vec![],
        };

        first.merge(second);

        assert_eq!(first.listings.len(), 3);
        let b = first.listings.iter().find(|l| l.key == "b").unwrap();
        assert_eq!(b.stock, 9);
        assert_eq!(first.discovery_urls_without_products.len(), 1);
    }

    #[rstest]
    #[case(None, None, 3, 10)]
    #[case(Some(0), None, 1, 10)]
    #[case(Some(99), Some(99), 10, 10)]
    #[case(Some(5), Some(2), 5, 2)]
    fn sanitize_clamps_into_bounds(
        #[case] discover: Option<u32>,
        #[case] products: Option<u32>,
        #[case] expected_discover: u32,
        #[case] expected_products: u32,
    ) {
        let params = ConcurrencyParams::sanitize(discover, products, ConcurrencyBounds::default());
        assert_eq!(params.discover_urls_concurrency, expected_discover);
        assert_eq!(params.products_for_url_concurrency, expected_products);
    }

    #[test]
    fn empty_picture_urls_serialize_to_none() {
        let mut l = listing("a", 1);
        assert_eq!(l.picture_urls_json(), None);
        l.picture_urls = vec!["https://img.example/1.jpg".into()];
        assert_eq!(
            l.picture_urls_json().unwrap(),
            r#"["https://img.example/1.jpg"]"#
        );
    }
}
