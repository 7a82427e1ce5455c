//! Ledger semantics: availability, active-registry clearing and the
//! offline estimated-sales batch over real database rows

use chrono::{Duration, Utc};
use pricewatch::application::price_history::{PriceHistoryRecorder, SalesEstimationConfig};
use pricewatch::application::ListingReconciler;
use pricewatch::domain::repositories::EntityRepository;
use pricewatch::domain::value_objects::{NewRegistry, ScrapeResult};
use pricewatch::domain::Entity;
use pricewatch::test_utils::{listing, TestContext};
use rust_decimal_macros::dec;

struct Setup {
    ctx: TestContext,
    store: pricewatch::domain::Store,
    category: pricewatch::domain::Category,
    reconciler: ListingReconciler,
    recorder: PriceHistoryRecorder,
}

async fn setup() -> Setup {
    let ctx = TestContext::new().await.unwrap();
    let (store, category) = ctx.seed_store().await.unwrap();
    let reconciler = ListingReconciler::new(ctx.entity_repo.clone(), ctx.product_repo.clone());
    let recorder = PriceHistoryRecorder::new(ctx.entity_repo.clone());
    Setup {
        ctx,
        store,
        category,
        reconciler,
        recorder,
    }
}

impl Setup {
    /// Create one entity through the reconciler and return it.
    async fn entity(&self, key: &str, stock: i32) -> Entity {
        let scrape = ScrapeResult {
            listings: vec![listing(key, stock, dec!(90.00))],
            discovery_urls_without_products: vec![],
        };
        let stats = self
            .reconciler
            .reconcile(&self.store, &[self.category.id], &scrape)
            .await
            .unwrap();
        assert!(stats.is_clean());
        self.ctx
            .entity_repo
            .find_by_store_and_key(self.store.id, key)
            .await
            .unwrap()
            .unwrap()
    }

    /// Append one more registry row with the given stock, spaced after the
    /// existing ledger.
    async fn append(&self, entity_id: i64, stock: i32, minutes: i64) {
        self.recorder
            .record(
                entity_id,
                &NewRegistry {
                    timestamp: Utc::now() + Duration::minutes(minutes),
                    stock,
                    normal_price: dec!(100.00),
                    offer_price: dec!(90.00),
                    cell_monthly_payment: None,
                },
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn availability_requires_an_active_registry_with_nonzero_stock() {
    let s = setup().await;
    // One pass creates both, so neither counts as disappeared
    let scrape = ScrapeResult {
        listings: vec![
            listing("sku-in", 5, dec!(90.00)),
            listing("sku-out", 0, dec!(90.00)),
        ],
        discovery_urls_without_products: vec![],
    };
    s.reconciler
        .reconcile(&s.store, &[s.category.id], &scrape)
        .await
        .unwrap();
    let in_stock = s
        .ctx
        .entity_repo
        .find_by_store_and_key(s.store.id, "sku-in")
        .await
        .unwrap()
        .unwrap();
    let sold_out = s
        .ctx
        .entity_repo
        .find_by_store_and_key(s.store.id, "sku-out")
        .await
        .unwrap()
        .unwrap();

    assert!(s.recorder.is_available(&in_stock).await.unwrap());
    assert!(!s.recorder.is_available(&sold_out).await.unwrap());

    assert_eq!(s.ctx.entity_repo.count_available(s.store.id).await.unwrap(), 1);
    assert_eq!(
        s.ctx.entity_repo.count_unavailable(s.store.id).await.unwrap(),
        1
    );
    let available = s.ctx.entity_repo.find_available(s.store.id).await.unwrap();
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].key, "sku-in");

    // Clearing the pointer makes the in-stock entity unavailable without
    // touching its ledger
    s.recorder.clear_active(in_stock.id).await.unwrap();
    let in_stock = s
        .ctx
        .entity_repo
        .find_by_id(in_stock.id)
        .await
        .unwrap()
        .unwrap();
    assert!(in_stock.active_registry_id.is_none());
    assert!(!s.recorder.is_available(&in_stock).await.unwrap());
    assert_eq!(s.ctx.entity_repo.history(in_stock.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn sales_batch_stamps_small_decreases_only() {
    let s = setup().await;
    let entity = s.entity("sku-1", 100).await;
    s.append(entity.id, 95, 10).await; // 5% drop: attributable
    s.append(entity.id, 80, 20).await; // 15-unit drop from 95: a reset
    s.append(entity.id, 120, 30).await; // restock

    let stamped = s
        .recorder
        .estimate_sales(&SalesEstimationConfig::default())
        .await
        .unwrap();
    assert_eq!(stamped, 1);

    let ledger = s.ctx.entity_repo.history(entity.id).await.unwrap();
    let stamps: Vec<Option<i32>> = ledger
        .iter()
        .map(|h| h.estimated_sales_since_previous_registry)
        .collect();
    assert_eq!(stamps, vec![None, Some(5), None, None]);
}

#[tokio::test]
async fn unreliable_store_deltas_at_the_threshold_are_suppressed() {
    let s = setup().await;
    let entity = s.entity("sku-1", 100).await;
    s.append(entity.id, 95, 10).await; // delta 5
    s.append(entity.id, 91, 20).await; // delta 4

    let config = SalesEstimationConfig {
        unreliable_stock_stores: vec![s.store.id],
        unreliable_stock_sales_threshold: 5,
    };
    let stamped = s.recorder.estimate_sales(&config).await.unwrap();
    assert_eq!(stamped, 1);

    let ledger = s.ctx.entity_repo.history(entity.id).await.unwrap();
    assert_eq!(ledger[1].estimated_sales_since_previous_registry, None);
    assert_eq!(ledger[2].estimated_sales_since_previous_registry, Some(4));
}

#[tokio::test]
async fn unknown_stock_rows_are_invisible_to_the_sales_walk() {
    let s = setup().await;
    let entity = s.entity("sku-1", 100).await;
    s.append(entity.id, -1, 10).await; // stock unknown
    s.append(entity.id, 95, 20).await;

    let stamped = s
        .recorder
        .estimate_sales(&SalesEstimationConfig::default())
        .await
        .unwrap();
    assert_eq!(stamped, 1);

    // The drop is measured against the last known reading, skipping the
    // sentinel row
    let ledger = s.ctx.entity_repo.history(entity.id).await.unwrap();
    assert_eq!(ledger[2].estimated_sales_since_previous_registry, Some(5));
    assert_eq!(ledger[1].estimated_sales_since_previous_registry, None);
}

#[tokio::test]
async fn sales_walk_never_pairs_rows_across_entities() {
    let s = setup().await;
    let first = s.entity("sku-1", 100).await;
    s.append(first.id, 95, 10).await;
    // Second entity opens far below the first one's closing stock; that
    // gap must not register as a sale
    let second = s.entity("sku-2", 3).await;
    s.append(second.id, 3, 10).await;

    let stamped = s
        .recorder
        .estimate_sales(&SalesEstimationConfig::default())
        .await
        .unwrap();
    assert_eq!(stamped, 1);

    let ledger = s.ctx.entity_repo.history(second.id).await.unwrap();
    assert!(ledger
        .iter()
        .all(|h| h.estimated_sales_since_previous_registry.is_none()));
}
