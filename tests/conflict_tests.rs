//! Conflict detection over associated, available entities

use std::sync::Arc;

use pricewatch::application::{AssociationManager, ConflictDetector, ListingReconciler};
use pricewatch::domain::repositories::EntityRepository;
use pricewatch::domain::services::LogNotifier;
use pricewatch::domain::value_objects::ScrapeResult;
use pricewatch::domain::Entity;
use pricewatch::test_utils::{listing, TestContext};
use rust_decimal_macros::dec;

struct Setup {
    ctx: TestContext,
    store: pricewatch::domain::Store,
    category: pricewatch::domain::Category,
    manager: AssociationManager,
    detector: ConflictDetector,
}

async fn setup(listings: Vec<pricewatch::domain::value_objects::ScrapedListing>) -> Setup {
    let ctx = TestContext::new().await.unwrap();
    let (store, category) = ctx.seed_store().await.unwrap();

    let reconciler = ListingReconciler::new(ctx.entity_repo.clone(), ctx.product_repo.clone());
    let stats = reconciler
        .reconcile(
            &store,
            &[category.id],
            &ScrapeResult {
                listings,
                discovery_urls_without_products: vec![],
            },
        )
        .await
        .unwrap();
    assert!(stats.is_clean());

    let manager = AssociationManager::new(
        ctx.entity_repo.clone(),
        ctx.product_repo.clone(),
        Arc::new(LogNotifier),
    );
    let detector = ConflictDetector::new(ctx.entity_repo.clone());

    Setup {
        ctx,
        store,
        category,
        manager,
        detector,
    }
}

impl Setup {
    async fn entity(&self, key: &str) -> Entity {
        self.ctx
            .entity_repo
            .find_by_store_and_key(self.store.id, key)
            .await
            .unwrap()
            .unwrap()
    }
}

#[tokio::test]
async fn duplicate_associations_to_one_product_form_a_single_group() {
    let s = setup(vec![
        listing("sku-1", 5, dec!(90.00)),
        listing("sku-2", 3, dec!(85.00)),
        listing("sku-3", 1, dec!(70.00)),
    ])
    .await;

    let duplicated = s.ctx.seed_product("ThinkPad X1", s.category.id).await.unwrap();
    let other = s.ctx.seed_product("MacBook Air", s.category.id).await.unwrap();

    let a = s.entity("sku-1").await;
    let b = s.entity("sku-2").await;
    let c = s.entity("sku-3").await;
    s.manager.associate(a.id, "staff", duplicated.id, None).await.unwrap();
    s.manager.associate(b.id, "staff", duplicated.id, None).await.unwrap();
    s.manager.associate(c.id, "staff", other.id, None).await.unwrap();

    let groups = s.detector.find_conflicts(None, None).await.unwrap();
    assert_eq!(groups.len(), 1);

    let group = &groups[0];
    assert_eq!(group.store_id, s.store.id);
    assert_eq!(group.product_id, duplicated.id);
    assert_eq!(group.cell_plan_id, None);
    let mut keys: Vec<&str> = group.entities.iter().map(|e| e.key.as_str()).collect();
    keys.sort();
    assert_eq!(keys, vec!["sku-1", "sku-2"]);
}

#[tokio::test]
async fn unavailable_entities_never_conflict() {
    let s = setup(vec![
        listing("sku-1", 5, dec!(90.00)),
        listing("sku-2", 0, dec!(85.00)), // sold out
    ])
    .await;

    let product = s.ctx.seed_product("ThinkPad X1", s.category.id).await.unwrap();
    let a = s.entity("sku-1").await;
    let b = s.entity("sku-2").await;
    s.manager.associate(a.id, "staff", product.id, None).await.unwrap();
    s.manager.associate(b.id, "staff", product.id, None).await.unwrap();

    assert!(s.detector.find_conflicts(None, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn distinct_cell_plans_keep_entities_out_of_conflict() {
    let s = setup(vec![
        listing("sku-1", 5, dec!(90.00)),
        listing("sku-2", 3, dec!(85.00)),
    ])
    .await;

    let phone = s.ctx.seed_product("Phone X", s.category.id).await.unwrap();
    let plan_a = s.ctx.seed_product("plan-5gb", s.category.id).await.unwrap();
    let plan_b = s.ctx.seed_product("plan-20gb", s.category.id).await.unwrap();

    let a = s.entity("sku-1").await;
    let b = s.entity("sku-2").await;
    s.manager
        .associate(a.id, "staff", phone.id, Some(plan_a.id))
        .await
        .unwrap();
    s.manager
        .associate(b.id, "staff", phone.id, Some(plan_b.id))
        .await
        .unwrap();

    assert!(s.detector.find_conflicts(None, None).await.unwrap().is_empty());

    // Same plan on both: now they collide
    s.manager
        .associate(b.id, "staff", phone.id, Some(plan_a.id))
        .await
        .unwrap();
    let groups = s.detector.find_conflicts(None, None).await.unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].cell_plan_id, Some(plan_a.id));
}

#[tokio::test]
async fn store_filter_narrows_the_report() {
    let s = setup(vec![
        listing("sku-1", 5, dec!(90.00)),
        listing("sku-2", 3, dec!(85.00)),
    ])
    .await;

    let product = s.ctx.seed_product("ThinkPad X1", s.category.id).await.unwrap();
    let a = s.entity("sku-1").await;
    let b = s.entity("sku-2").await;
    s.manager.associate(a.id, "staff", product.id, None).await.unwrap();
    s.manager.associate(b.id, "staff", product.id, None).await.unwrap();

    let hit = s
        .detector
        .find_conflicts(Some(&[s.store.id]), None)
        .await
        .unwrap();
    assert_eq!(hit.len(), 1);

    let miss = s.detector.find_conflicts(Some(&[9999]), None).await.unwrap();
    assert!(miss.is_empty());

    let wrong_category = s
        .detector
        .find_conflicts(None, Some(&[9999]))
        .await
        .unwrap();
    assert!(wrong_category.is_empty());
}
