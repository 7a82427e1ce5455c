//! Repository interfaces of the pricing pipeline
//!
//! Trait definitions for the persistence seams. The sqlite implementations
//! live in the infrastructure layer; tests may substitute their own.

use async_trait::async_trait;
use anyhow::Result;

use crate::domain::entities::{
    Category, Entity, EntityHistory, EntityLog, Product, Store, StoreUpdateLog, TrackedFields,
};
use crate::domain::value_objects::{ConflictGroup, NewRegistry};

#[async_trait]
pub trait StoreRepository: Send + Sync {
    async fn create(&self, store: &Store) -> Result<i64>;
    async fn find_by_id(&self, store_id: i64) -> Result<Option<Store>>;
    async fn find_all_active(&self) -> Result<Vec<Store>>;
    /// Replace the set of categories this store is scraped for.
    async fn set_categories(&self, store_id: i64, category_ids: &[i64]) -> Result<()>;
    /// Categories this store is configured to be scraped for.
    async fn categories(&self, store_id: i64) -> Result<Vec<Category>>;
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn create_category(&self, category: &Category) -> Result<i64>;
    async fn find_category(&self, category_id: i64) -> Result<Option<Category>>;
    async fn find_category_by_scraper_name(&self, scraper_name: &str) -> Result<Option<Category>>;
    async fn create(&self, product: &Product) -> Result<i64>;
    async fn find_by_id(&self, product_id: i64) -> Result<Option<Product>>;
    /// Canonical lookup used by cell-plan auto-association.
    async fn find_by_association_name(&self, association_name: &str) -> Result<Option<Product>>;
}

/// Persistence of entities, their price/stock ledger and audit log.
///
/// `create_with_registry` and `append_registry` each run in a single
/// transaction so every listing's create/update is its own atomic unit.
#[async_trait]
pub trait EntityRepository: Send + Sync {
    async fn find_by_id(&self, entity_id: i64) -> Result<Option<Entity>>;
    /// Natural-key lookup; the reconciler only ever matches through this.
    async fn find_by_store_and_key(&self, store_id: i64, key: &str) -> Result<Option<Entity>>;
    /// Entities in scope for a store update: assigned or scraped category
    /// within the target set.
    async fn find_in_scope(&self, store_id: i64, category_ids: &[i64]) -> Result<Vec<Entity>>;
    /// Entities whose assigned category is targeted but whose last scraped
    /// category is not; their discovery URLs get a direct re-check.
    async fn find_miscategorized(
        &self,
        store_id: i64,
        category_ids: &[i64],
    ) -> Result<Vec<Entity>>;
    /// Sibling lookup for cell-plan auto-association (same store, same
    /// display name).
    async fn find_by_store_and_name(&self, store_id: i64, name: &str) -> Result<Vec<Entity>>;

    /// Insert a new entity together with its first registry row and point
    /// the active registry at it, atomically. Returns the stored entity.
    async fn create_with_registry(
        &self,
        entity: &Entity,
        registry: &NewRegistry,
    ) -> Result<Entity>;
    /// Persist the mutable columns of an existing entity.
    async fn update_fields(&self, entity: &Entity) -> Result<()>;
    /// Persist the mutable columns and, when a before-image is given, the
    /// audit log row in one transaction, so an association change can
    /// never land without its audit trail.
    async fn update_fields_with_log(
        &self,
        entity: &Entity,
        log: Option<(&str, &TrackedFields)>,
    ) -> Result<()>;
    /// One scraped-listing update as a single atomic unit: persist the
    /// entity's refreshed metadata, append the registry row, repoint the
    /// active registry and (when a before-image is given) write the audit
    /// log row, all in one transaction.
    async fn apply_listing_update(
        &self,
        entity: &Entity,
        registry: &NewRegistry,
        log: Option<(&str, &TrackedFields)>,
    ) -> Result<EntityHistory>;
    /// Append a registry row and repoint the active registry, atomically.
    async fn append_registry(&self, entity_id: i64, registry: &NewRegistry)
        -> Result<EntityHistory>;
    /// Null out the active registry without touching the ledger.
    async fn clear_active_registry(&self, entity_id: i64) -> Result<()>;

    async fn get_active_registry(&self, entity_id: i64) -> Result<Option<EntityHistory>>;
    /// Full ledger of one entity in timestamp order.
    async fn history(&self, entity_id: i64) -> Result<Vec<EntityHistory>>;
    /// Whole-ledger walk input for the estimated-sales batch: rows ordered
    /// by (entity, timestamp), excluding the unknown-stock sentinel, each
    /// paired with its entity's store id.
    async fn histories_for_sales_estimation(&self) -> Result<Vec<(i64, EntityHistory)>>;
    async fn set_estimated_sales(&self, history_id: i64, units: i32) -> Result<()>;

    async fn logs(&self, entity_id: i64) -> Result<Vec<EntityLog>>;

    /// Entities with a non-null active registry and non-zero stock.
    async fn find_available(&self, store_id: i64) -> Result<Vec<Entity>>;
    async fn count_available(&self, store_id: i64) -> Result<i64>;
    async fn count_unavailable(&self, store_id: i64) -> Result<i64>;

    /// Associated, available entities grouped by (store, product, cell
    /// plan), groups with more than one member only.
    async fn conflicts(
        &self,
        store_ids: Option<&[i64]>,
        category_ids: Option<&[i64]>,
    ) -> Result<Vec<ConflictGroup>>;
}

#[async_trait]
pub trait UpdateLogRepository: Send + Sync {
    /// Create a fresh log row in Pending state.
    async fn create(&self, store_id: i64) -> Result<StoreUpdateLog>;
    async fn find_by_id(&self, log_id: i64) -> Result<Option<StoreUpdateLog>>;
    /// Persist status, counts, parameters and registry-file pointer.
    async fn update(&self, log: &StoreUpdateLog) -> Result<()>;
    async fn set_categories(&self, log_id: i64, category_ids: &[i64]) -> Result<()>;
    async fn categories(&self, log_id: i64) -> Result<Vec<i64>>;
    /// Latest run per store, for the operator status view.
    async fn find_latest_for_store(&self, store_id: i64) -> Result<Option<StoreUpdateLog>>;
}
