//! Task queue entry points
//!
//! Thin wrappers matching the signatures the external scheduler and
//! manual operator triggers dispatch: per-store pricing updates (optionally
//! resuming a logged job), archive replays and the full-ledger
//! estimated-sales recompute.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::application::orchestrator::StoreUpdateOrchestrator;
use crate::application::price_history::{PriceHistoryRecorder, SalesEstimationConfig};
use crate::domain::entities::StoreUpdateLog;

/// Payload of one "update store pricing" task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreUpdateRequest {
    pub store_id: i64,
    /// None means all categories the store is configured for.
    pub category_ids: Option<Vec<i64>>,
    pub discover_urls_concurrency: Option<u32>,
    pub products_for_url_concurrency: Option<u32>,
    /// Resume a previously created update log instead of opening a new
    /// one.
    pub update_log_id: Option<i64>,
}

impl StoreUpdateRequest {
    pub fn for_store(store_id: i64) -> Self {
        Self {
            store_id,
            category_ids: None,
            discover_urls_concurrency: None,
            products_for_url_concurrency: None,
            update_log_id: None,
        }
    }
}

/// Run one store pricing update.
pub async fn store_update(
    orchestrator: &StoreUpdateOrchestrator,
    request: StoreUpdateRequest,
) -> Result<StoreUpdateLog> {
    info!(store_id = request.store_id, "store update task dispatched");
    orchestrator
        .update_store(
            request.store_id,
            request.category_ids.as_deref(),
            request.discover_urls_concurrency,
            request.products_for_url_concurrency,
            request.update_log_id,
        )
        .await
}

/// Recompute estimated sales over the whole ledger. Returns the number of
/// history rows stamped.
pub async fn recompute_estimated_sales(
    recorder: &PriceHistoryRecorder,
    config: &SalesEstimationConfig,
) -> Result<usize> {
    info!("estimated-sales recompute task dispatched");
    recorder.estimate_sales(config).await
}
