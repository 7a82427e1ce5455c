//! Manual product association and dissociation

use std::sync::Arc;

use pricewatch::application::{AssociationManager, ListingReconciler};
use pricewatch::domain::repositories::{EntityRepository, ProductRepository};
use pricewatch::domain::services::LogNotifier;
use pricewatch::domain::value_objects::ScrapeResult;
use pricewatch::domain::{Entity, EntityError};
use pricewatch::test_utils::{listing, TestContext};
use rust_decimal_macros::dec;

struct Setup {
    ctx: TestContext,
    store: pricewatch::domain::Store,
    category: pricewatch::domain::Category,
    manager: AssociationManager,
}

async fn setup() -> Setup {
    let ctx = TestContext::new().await.unwrap();
    let (store, category) = ctx.seed_store().await.unwrap();
    let manager = AssociationManager::new(
        ctx.entity_repo.clone(),
        ctx.product_repo.clone(),
        Arc::new(LogNotifier),
    );
    Setup {
        ctx,
        store,
        category,
        manager,
    }
}

impl Setup {
    /// Create an entity by running one listing through the reconciler.
    async fn entity(&self, key: &str) -> Entity {
        let reconciler =
            ListingReconciler::new(self.ctx.entity_repo.clone(), self.ctx.product_repo.clone());
        reconciler
            .reconcile(
                &self.store,
                &[self.category.id],
                &ScrapeResult {
                    listings: vec![listing(key, 5, dec!(90.00))],
                    discovery_urls_without_products: vec![],
                },
            )
            .await
            .unwrap();
        self.ctx
            .entity_repo
            .find_by_store_and_key(self.store.id, key)
            .await
            .unwrap()
            .unwrap()
    }
}

fn entity_error(err: &anyhow::Error) -> Option<&EntityError> {
    err.downcast_ref::<EntityError>()
}

#[tokio::test]
async fn associate_stamps_metadata_and_writes_audit_row() {
    let s = setup().await;
    let entity = s.entity("sku-1").await;
    let product = s.ctx.seed_product("Canonical P", s.category.id).await.unwrap();

    let updated = s
        .manager
        .associate(entity.id, "alice", product.id, None)
        .await
        .unwrap();

    assert_eq!(updated.product_id, Some(product.id));
    assert_eq!(updated.last_association_user.as_deref(), Some("alice"));
    assert!(updated.last_association.is_some());
    updated.validate().unwrap();

    let logs = s.ctx.entity_repo.logs(entity.id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].fields.product_id, None); // before-image
    assert_eq!(logs[0].user, "alice");
}

#[tokio::test]
async fn associate_rejects_hidden_entity_without_writes() {
    let s = setup().await;
    let mut entity = s.entity("sku-1").await;
    entity.is_visible = false;
    s.ctx.entity_repo.update_fields(&entity).await.unwrap();
    let product = s.ctx.seed_product("Canonical P", s.category.id).await.unwrap();

    let err = s
        .manager
        .associate(entity.id, "alice", product.id, None)
        .await
        .unwrap_err();
    assert_eq!(entity_error(&err), Some(&EntityError::Hidden));

    let reloaded = s.ctx.entity_repo.find_by_id(entity.id).await.unwrap().unwrap();
    assert_eq!(reloaded.product_id, None);
    // update_fields above wrote no audit row either
    assert!(s.ctx.entity_repo.logs(entity.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn associate_rejects_category_mismatch() {
    let s = setup().await;
    let entity = s.entity("sku-1").await;
    let other_category = s.ctx.seed_category(&s.store, "Cells").await.unwrap();
    let product = s
        .ctx
        .seed_product("Wrong category", other_category.id)
        .await
        .unwrap();

    let err = s
        .manager
        .associate(entity.id, "alice", product.id, None)
        .await
        .unwrap_err();
    assert!(matches!(
        entity_error(&err),
        Some(EntityError::CategoryMismatch { .. })
    ));
}

#[tokio::test]
async fn reassociating_the_identical_pair_is_rejected_and_writes_nothing() {
    let s = setup().await;
    let entity = s.entity("sku-1").await;
    let product = s.ctx.seed_product("Canonical P", s.category.id).await.unwrap();

    s.manager
        .associate(entity.id, "alice", product.id, None)
        .await
        .unwrap();
    let log_count = s.ctx.entity_repo.logs(entity.id).await.unwrap().len();

    let err = s
        .manager
        .associate(entity.id, "alice", product.id, None)
        .await
        .unwrap_err();
    assert_eq!(entity_error(&err), Some(&EntityError::SameAssociation));
    assert_eq!(
        s.ctx.entity_repo.logs(entity.id).await.unwrap().len(),
        log_count
    );

    // Changing only the cell plan is a legal re-association
    let plan = s.ctx.seed_product("Plan", s.category.id).await.unwrap();
    let updated = s
        .manager
        .associate(entity.id, "alice", product.id, Some(plan.id))
        .await
        .unwrap();
    assert_eq!(updated.cell_plan_id, Some(plan.id));
    updated.validate().unwrap();
}

#[tokio::test]
async fn dissociate_requires_an_association() {
    let s = setup().await;
    let entity = s.entity("sku-1").await;

    let err = s
        .manager
        .dissociate(entity.id, "alice", None)
        .await
        .unwrap_err();
    assert_eq!(entity_error(&err), Some(&EntityError::NotAssociated));
}

#[tokio::test]
async fn dissociation_reason_rules() {
    let s = setup().await;
    let product = s.ctx.seed_product("Canonical P", s.category.id).await.unwrap();

    // Self-correction must not carry a reason
    let entity = s.entity("sku-1").await;
    s.manager
        .associate(entity.id, "alice", product.id, None)
        .await
        .unwrap();
    let err = s
        .manager
        .dissociate(entity.id, "alice", Some("mistake"))
        .await
        .unwrap_err();
    assert_eq!(entity_error(&err), Some(&EntityError::ReasonNotAllowed));

    let cleared = s.manager.dissociate(entity.id, "alice", None).await.unwrap();
    assert_eq!(cleared.product_id, None);
    assert_eq!(cleared.last_association, None);
    assert_eq!(cleared.last_association_user, None);
    cleared.validate().unwrap();

    // A different user undoing the association may give a reason
    let entity = s.entity("sku-2").await;
    s.manager
        .associate(entity.id, "alice", product.id, None)
        .await
        .unwrap();
    let cleared = s
        .manager
        .dissociate(entity.id, "bob", Some("wrong product"))
        .await
        .unwrap();
    assert_eq!(cleared.product_id, None);
}

#[tokio::test]
async fn dissociation_audit_row_lands_with_the_field_clear() {
    let s = setup().await;
    let entity = s.entity("sku-1").await;
    let product = s.ctx.seed_product("Canonical P", s.category.id).await.unwrap();

    s.manager
        .associate(entity.id, "alice", product.id, None)
        .await
        .unwrap();
    let cleared = s
        .manager
        .dissociate(entity.id, "bob", Some("wrong product"))
        .await
        .unwrap();
    assert_eq!(cleared.product_id, None);

    // One row per effective change, newest first; the dissociation's
    // before-image still carries the association
    let logs = s.ctx.entity_repo.logs(entity.id).await.unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].user, "bob");
    assert_eq!(logs[0].fields.product_id, Some(product.id));
    assert_eq!(logs[1].user, "alice");
    assert_eq!(logs[1].fields.product_id, None);
}

#[tokio::test]
async fn cell_plan_auto_association_matches_sibling_plan_names() {
    let s = setup().await;

    // Canonical plan with an association name
    let mut plan = pricewatch::domain::Product {
        id: 0,
        name: "Plan 5GB".into(),
        category_id: s.category.id,
        association_name: Some("plan-5gb".into()),
    };
    plan.id = s.ctx.product_repo.create(&plan).await.unwrap();

    let product = s.ctx.seed_product("Phone X", s.category.id).await.unwrap();

    // Two listings of the same phone, both bundling the plan
    let reconciler =
        ListingReconciler::new(s.ctx.entity_repo.clone(), s.ctx.product_repo.clone());
    let mut a = listing("phone-a", 5, dec!(90.00));
    a.name = "Phone X".into();
    a.cell_plan_name = Some("plan-5gb".into());
    let mut b = listing("phone-b", 5, dec!(95.00));
    b.name = "Phone X".into();
    b.cell_plan_name = Some("plan-5gb".into());
    reconciler
        .reconcile(
            &s.store,
            &[s.category.id],
            &ScrapeResult {
                listings: vec![a, b],
                discovery_urls_without_products: vec![],
            },
        )
        .await
        .unwrap();

    let entity_a = s
        .ctx
        .entity_repo
        .find_by_store_and_key(s.store.id, "phone-a")
        .await
        .unwrap()
        .unwrap();
    let entity_b = s
        .ctx
        .entity_repo
        .find_by_store_and_key(s.store.id, "phone-b")
        .await
        .unwrap()
        .unwrap();

    // Associate the sibling first so it is eligible for a cell plan
    s.manager
        .associate(entity_b.id, "alice", product.id, None)
        .await
        .unwrap();
    // The second association's side effect resolves both siblings' plans
    s.manager
        .associate(entity_a.id, "alice", product.id, None)
        .await
        .unwrap();

    let entity_a = s.ctx.entity_repo.find_by_id(entity_a.id).await.unwrap().unwrap();
    let entity_b = s.ctx.entity_repo.find_by_id(entity_b.id).await.unwrap().unwrap();
    assert_eq!(entity_a.cell_plan_id, Some(plan.id));
    assert_eq!(entity_b.cell_plan_id, Some(plan.id));
    entity_a.validate().unwrap();
    entity_b.validate().unwrap();
}
