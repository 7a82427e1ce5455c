//! Price history recording
//!
//! Maintains the append-only price/stock ledger and the active-registry
//! pointer. `record` and `clear_active` are the only two entry points that
//! move the pointer; nothing else in the crate assigns it.
//!
//! Also hosts the offline estimated-sales batch that walks the ledger and
//! attributes stock decreases as units sold.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::domain::entities::{Entity, EntityHistory};
use crate::domain::repositories::EntityRepository;
use crate::domain::value_objects::NewRegistry;

/// Tuning of the estimated-sales batch.
#[derive(Debug, Clone, Default)]
pub struct SalesEstimationConfig {
    /// Stores whose stock counters reset erratically.
    pub unreliable_stock_stores: Vec<i64>,
    /// Deltas at or above this value from an unreliable store are ignored.
    pub unreliable_stock_sales_threshold: i32,
}

/// Units attributable as sales between two consecutive stock readings.
///
/// A decrease counts only when it is strictly positive and below 10% of
/// the prior reading; larger drops look like counter resets, not sales.
/// Unreliable stores additionally have a hard delta cutoff.
pub fn attributable_sales(
    previous_stock: i32,
    current_stock: i32,
    store_is_unreliable: bool,
    unreliable_threshold: i32,
) -> Option<i32> {
    let delta = previous_stock - current_stock;
    if delta <= 0 {
        return None;
    }
    // strict 10% cap: delta must be less than previous_stock / 10;
    // widened because delta * 10 can exceed i32 on extreme readings
    if i64::from(delta) * 10 >= i64::from(previous_stock) {
        return None;
    }
    if store_is_unreliable && delta >= unreliable_threshold {
        return None;
    }
    Some(delta)
}

#[derive(Clone)]
pub struct PriceHistoryRecorder {
    entity_repo: Arc<dyn EntityRepository>,
}

impl PriceHistoryRecorder {
    pub fn new(entity_repo: Arc<dyn EntityRepository>) -> Self {
        Self { entity_repo }
    }

    /// Append a new immutable registry row and point the entity's active
    /// registry at it.
    pub async fn record(&self, entity_id: i64, registry: &NewRegistry) -> Result<EntityHistory> {
        let history = self.entity_repo.append_registry(entity_id, registry).await?;
        debug!(
            entity_id,
            history_id = history.id,
            stock = history.stock,
            "recorded price registry"
        );
        Ok(history)
    }

    /// Null out the active registry: the store no longer reports this
    /// listing in the current cycle. No ledger row is written.
    pub async fn clear_active(&self, entity_id: i64) -> Result<()> {
        self.entity_repo.clear_active_registry(entity_id).await
    }

    /// Whether the entity currently has an available listing.
    pub async fn is_available(&self, entity: &Entity) -> Result<bool> {
        if entity.active_registry_id.is_none() {
            return Ok(false);
        }
        Ok(self
            .entity_repo
            .get_active_registry(entity.id)
            .await?
            .map(|h| h.is_available())
            .unwrap_or(false))
    }

    /// Offline batch: walk every entity's ledger in timestamp order and
    /// stamp attributable sales on the later row of each qualifying pair.
    /// Returns the number of rows stamped.
    pub async fn estimate_sales(&self, config: &SalesEstimationConfig) -> Result<usize> {
        let rows = self.entity_repo.histories_for_sales_estimation().await?;

        let mut stamped = 0usize;
        let mut previous: Option<(i64, EntityHistory)> = None;

        for (store_id, history) in rows {
            if let Some((_, ref prev)) = previous {
                if prev.entity_id == history.entity_id {
                    let unreliable = config.unreliable_stock_stores.contains(&store_id);
                    if let Some(units) = attributable_sales(
                        prev.stock,
                        history.stock,
                        unreliable,
                        config.unreliable_stock_sales_threshold,
                    ) {
                        self.entity_repo
                            .set_estimated_sales(history.id, units)
                            .await?;
                        stamped += 1;
                    }
                }
            }
            previous = Some((store_id, history));
        }

        info!(stamped, "estimated-sales batch finished");
        Ok(stamped)
    }
}
