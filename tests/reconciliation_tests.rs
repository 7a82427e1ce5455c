//! Reconciliation of scraped listings against existing entities

use pricewatch::application::ListingReconciler;
use pricewatch::domain::repositories::EntityRepository;
use pricewatch::domain::value_objects::ScrapeResult;
use pricewatch::test_utils::{listing, listing_at, TestContext};
use rust_decimal_macros::dec;

fn scrape(listings: Vec<pricewatch::domain::ScrapedListing>) -> ScrapeResult {
    ScrapeResult {
        listings,
        discovery_urls_without_products: vec![],
    }
}

#[tokio::test]
async fn new_listing_creates_unassociated_entity_with_first_registry() {
    let ctx = TestContext::new().await.unwrap();
    let (store, category) = ctx.seed_store().await.unwrap();
    let reconciler = ListingReconciler::new(ctx.entity_repo.clone(), ctx.product_repo.clone());

    let stats = reconciler
        .reconcile(
            &store,
            &[category.id],
            &scrape(vec![listing("sku-1", 5, dec!(90.00))]),
        )
        .await
        .unwrap();

    assert_eq!(stats.created, 1);
    assert!(stats.is_clean());

    let entity = ctx
        .entity_repo
        .find_by_store_and_key(store.id, "sku-1")
        .await
        .unwrap()
        .expect("entity should exist");
    assert_eq!(entity.product_id, None);
    assert!(entity.is_visible);

    let registry = ctx
        .entity_repo
        .get_active_registry(entity.id)
        .await
        .unwrap()
        .expect("active registry should be set");
    assert_eq!(registry.stock, 5);
    assert_eq!(registry.offer_price, dec!(90.00));
    assert_eq!(entity.active_registry_id, Some(registry.id));

    let history = ctx.entity_repo.history(entity.id).await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn reconcile_twice_is_idempotent_on_entities_and_appends_history() {
    let ctx = TestContext::new().await.unwrap();
    let (store, category) = ctx.seed_store().await.unwrap();
    let reconciler = ListingReconciler::new(ctx.entity_repo.clone(), ctx.product_repo.clone());

    for _ in 0..2 {
        reconciler
            .reconcile(
                &store,
                &[category.id],
                &scrape(vec![listing("sku-1", 5, dec!(90.00))]),
            )
            .await
            .unwrap();
    }

    let entity = ctx
        .entity_repo
        .find_by_store_and_key(store.id, "sku-1")
        .await
        .unwrap()
        .unwrap();

    // At most one entity per (store, key); one history row per run
    let history = ctx.entity_repo.history(entity.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].stock, 5);
    assert_eq!(history[0].offer_price, history[1].offer_price);

    // No audit row: nothing tracked changed between the identical runs
    assert!(ctx.entity_repo.logs(entity.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn disappearance_clears_active_registry_and_reappearance_restores_it() {
    let ctx = TestContext::new().await.unwrap();
    let (store, category) = ctx.seed_store().await.unwrap();
    let reconciler = ListingReconciler::new(ctx.entity_repo.clone(), ctx.product_repo.clone());

    reconciler
        .reconcile(
            &store,
            &[category.id],
            &scrape(vec![listing("sku-1", 5, dec!(90.00))]),
        )
        .await
        .unwrap();

    // Listing gone this cycle
    let stats = reconciler
        .reconcile(&store, &[category.id], &scrape(vec![]))
        .await
        .unwrap();
    assert_eq!(stats.cleared, 1);

    let entity = ctx
        .entity_repo
        .find_by_store_and_key(store.id, "sku-1")
        .await
        .unwrap()
        .expect("entity row must survive disappearance");
    assert_eq!(entity.active_registry_id, None);
    // No history row is written for a disappearance
    assert_eq!(ctx.entity_repo.history(entity.id).await.unwrap().len(), 1);

    // Reappearance
    reconciler
        .reconcile(
            &store,
            &[category.id],
            &scrape(vec![listing("sku-1", 3, dec!(85.00))]),
        )
        .await
        .unwrap();

    let entity = ctx.entity_repo.find_by_id(entity.id).await.unwrap().unwrap();
    assert!(entity.active_registry_id.is_some());
    let registry = ctx
        .entity_repo
        .get_active_registry(entity.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(registry.stock, 3);
    assert_eq!(ctx.entity_repo.history(entity.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn metadata_change_writes_one_audit_row_with_before_image() {
    let ctx = TestContext::new().await.unwrap();
    let (store, category) = ctx.seed_store().await.unwrap();
    let reconciler = ListingReconciler::new(ctx.entity_repo.clone(), ctx.product_repo.clone());

    reconciler
        .reconcile(
            &store,
            &[category.id],
            &scrape(vec![listing("sku-1", 5, dec!(90.00))]),
        )
        .await
        .unwrap();

    let mut renamed = listing("sku-1", 5, dec!(90.00));
    renamed.name = "Renamed listing".into();
    reconciler
        .reconcile(&store, &[category.id], &scrape(vec![renamed]))
        .await
        .unwrap();

    let entity = ctx
        .entity_repo
        .find_by_store_and_key(store.id, "sku-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entity.name, "Renamed listing");

    let logs = ctx.entity_repo.logs(entity.id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].fields.name, "Listing sku-1");
}

#[tokio::test]
async fn active_registry_tracks_latest_processed_timestamp() {
    let ctx = TestContext::new().await.unwrap();
    let (store, category) = ctx.seed_store().await.unwrap();
    let reconciler = ListingReconciler::new(ctx.entity_repo.clone(), ctx.product_repo.clone());

    let t1 = chrono::Utc::now();
    let t2 = t1 + chrono::Duration::hours(6);

    for ts in [t1, t2] {
        reconciler
            .reconcile(
                &store,
                &[category.id],
                &scrape(vec![listing_at("sku-1", 5, dec!(90.00), ts)]),
            )
            .await
            .unwrap();
    }

    let entity = ctx
        .entity_repo
        .find_by_store_and_key(store.id, "sku-1")
        .await
        .unwrap()
        .unwrap();
    let registry = ctx
        .entity_repo
        .get_active_registry(entity.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(registry.timestamp.timestamp(), t2.timestamp());

    let history = ctx.entity_repo.history(entity.id).await.unwrap();
    assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[tokio::test]
async fn listing_failure_is_isolated_from_the_rest_of_the_run() {
    let ctx = TestContext::new().await.unwrap();
    let (store, category) = ctx.seed_store().await.unwrap();
    let reconciler = ListingReconciler::new(ctx.entity_repo.clone(), ctx.product_repo.clone());

    let mut bad = listing("sku-bad", 1, dec!(10.00));
    bad.category = "NoSuchCategory".into();

    let stats = reconciler
        .reconcile(
            &store,
            &[category.id],
            &scrape(vec![
                listing("sku-1", 5, dec!(90.00)),
                bad,
                listing("sku-2", 2, dec!(50.00)),
            ]),
        )
        .await
        .unwrap();

    assert_eq!(stats.created, 2);
    assert_eq!(stats.errors.len(), 1);
    assert!(stats.errors[0].contains("sku-bad"));

    // Both good listings committed despite the failure between them
    for key in ["sku-1", "sku-2"] {
        assert!(ctx
            .entity_repo
            .find_by_store_and_key(store.id, key)
            .await
            .unwrap()
            .is_some());
    }
    assert!(ctx
        .entity_repo
        .find_by_store_and_key(store.id, "sku-bad")
        .await
        .unwrap()
        .is_none());
}
