//! Shared testing infrastructure
//!
//! In-memory database context with all repositories wired, plus fixture
//! builders and a scripted scraper gateway for orchestration tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::domain::entities::{Category, Condition, Product, Store};
use crate::domain::repositories::{ProductRepository, StoreRepository};
use crate::domain::services::ScraperGateway;
use crate::domain::value_objects::{ConcurrencyParams, ScrapeResult, ScrapedListing};
use crate::infrastructure::{
    DatabaseConnection, SqliteEntityRepository, SqliteProductRepository, SqliteStoreRepository,
    SqliteUpdateLogRepository,
};

/// Fresh in-memory database with every repository wired. Each test gets an
/// isolated instance.
pub struct TestContext {
    pub db: DatabaseConnection,
    pub store_repo: Arc<SqliteStoreRepository>,
    pub product_repo: Arc<SqliteProductRepository>,
    pub entity_repo: Arc<SqliteEntityRepository>,
    pub update_log_repo: Arc<SqliteUpdateLogRepository>,
}

impl TestContext {
    pub async fn new() -> Result<Self> {
        let db = DatabaseConnection::new("sqlite::memory:").await?;
        db.migrate().await?;
        let pool = db.pool().clone();

        Ok(Self {
            store_repo: Arc::new(SqliteStoreRepository::new(pool.clone())),
            product_repo: Arc::new(SqliteProductRepository::new(pool.clone())),
            entity_repo: Arc::new(SqliteEntityRepository::new(pool.clone())),
            update_log_repo: Arc::new(SqliteUpdateLogRepository::new(pool)),
            db,
        })
    }

    /// Seed one active store configured for one category ("Notebooks").
    pub async fn seed_store(&self) -> Result<(Store, Category)> {
        let category_id = self
            .product_repo
            .create_category(&Category {
                id: 0,
                name: "Notebooks".into(),
                scraper_name: "Notebooks".into(),
            })
            .await?;
        let category = Category {
            id: category_id,
            name: "Notebooks".into(),
            scraper_name: "Notebooks".into(),
        };

        let mut store = Store {
            id: 0,
            name: "Test Store".into(),
            country: "CL".into(),
            is_active: true,
            scraper_class: "test_store".into(),
            scraper_extra_args: None,
        };
        store.id = self.store_repo.create(&store).await?;
        self.store_repo
            .set_categories(store.id, &[category_id])
            .await?;

        Ok((store, category))
    }

    /// Seed an extra category configured for the given store.
    pub async fn seed_category(&self, store: &Store, name: &str) -> Result<Category> {
        let category_id = self
            .product_repo
            .create_category(&Category {
                id: 0,
                name: name.into(),
                scraper_name: name.into(),
            })
            .await?;

        let mut ids: Vec<i64> = self
            .store_repo
            .categories(store.id)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();
        ids.push(category_id);
        self.store_repo.set_categories(store.id, &ids).await?;

        Ok(Category {
            id: category_id,
            name: name.into(),
            scraper_name: name.into(),
        })
    }

    pub async fn seed_product(&self, name: &str, category_id: i64) -> Result<Product> {
        let mut product = Product {
            id: 0,
            name: name.into(),
            category_id,
            association_name: None,
        };
        product.id = self.product_repo.create(&product).await?;
        Ok(product)
    }
}

/// Listing fixture with sane defaults.
pub fn listing(key: &str, stock: i32, offer_price: Decimal) -> ScrapedListing {
    listing_at(key, stock, offer_price, Utc::now())
}

pub fn listing_at(
    key: &str,
    stock: i32,
    offer_price: Decimal,
    timestamp: DateTime<Utc>,
) -> ScrapedListing {
    ScrapedListing {
        key: key.into(),
        name: format!("Listing {key}"),
        category: "Notebooks".into(),
        currency: "CLP".into(),
        condition: Condition::New,
        stock,
        normal_price: offer_price + Decimal::from(10),
        offer_price,
        cell_monthly_payment: None,
        cell_plan_name: None,
        part_number: None,
        sku: Some(format!("SKU-{key}")),
        ean: None,
        url: format!("https://store.example/p/{key}"),
        discovery_url: "https://store.example/c/notebooks".into(),
        picture_urls: vec![],
        description: Some("A test listing".into()),
        timestamp,
    }
}

/// Scripted gateway: returns queued results in order for category scrapes
/// and a fixed (default empty) result for direct-URL scrapes.
pub struct ScriptedGateway {
    category_responses: Mutex<VecDeque<Result<ScrapeResult>>>,
    url_response: Mutex<ScrapeResult>,
    response_delay: Mutex<Duration>,
    pub category_calls: Mutex<u32>,
    pub url_calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedGateway {
    pub fn new(responses: Vec<Result<ScrapeResult>>) -> Self {
        Self {
            category_responses: Mutex::new(responses.into_iter().collect()),
            url_response: Mutex::new(ScrapeResult::default()),
            response_delay: Mutex::new(Duration::ZERO),
            category_calls: Mutex::new(0),
            url_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn single(result: ScrapeResult) -> Self {
        Self::new(vec![Ok(result)])
    }

    pub async fn set_url_response(&self, result: ScrapeResult) {
        *self.url_response.lock().await = result;
    }

    /// Make every subsequent category scrape stall, for deadline tests.
    pub async fn set_response_delay(&self, delay: Duration) {
        *self.response_delay.lock().await = delay;
    }
}

#[async_trait]
impl ScraperGateway for ScriptedGateway {
    async fn products_for_categories(
        &self,
        _store: &Store,
        _category_names: &[String],
        _params: ConcurrencyParams,
    ) -> Result<ScrapeResult> {
        *self.category_calls.lock().await += 1;
        let delay = *self.response_delay.lock().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match self.category_responses.lock().await.pop_front() {
            Some(result) => result,
            None => bail!("scripted gateway exhausted"),
        }
    }

    async fn products_for_urls(
        &self,
        _store: &Store,
        urls: &[String],
        _params: ConcurrencyParams,
    ) -> Result<ScrapeResult> {
        self.url_calls.lock().await.push(urls.to_vec());
        Ok(self.url_response.lock().await.clone())
    }
}
