//! Application layer
//!
//! Use cases of the pricing pipeline: listing reconciliation, price
//! history recording, product association, the store-update orchestrator,
//! conflict detection and the task entry points.

pub mod association;
pub mod conflicts;
pub mod orchestrator;
pub mod price_history;
pub mod reconciler;
pub mod tasks;

pub use association::AssociationManager;
pub use conflicts::ConflictDetector;
pub use orchestrator::StoreUpdateOrchestrator;
pub use price_history::{PriceHistoryRecorder, SalesEstimationConfig};
pub use reconciler::ListingReconciler;
