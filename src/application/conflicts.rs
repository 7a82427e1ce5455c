//! Conflict detection
//!
//! Read-only data-quality check: finds available entities erroneously
//! associated to the same (store, product, cell plan) tuple. Conflicts are
//! reported for manual remediation, never auto-resolved.

use std::sync::Arc;

use anyhow::Result;

use crate::domain::repositories::EntityRepository;
use crate::domain::value_objects::ConflictGroup;

pub struct ConflictDetector {
    entity_repo: Arc<dyn EntityRepository>,
}

impl ConflictDetector {
    pub fn new(entity_repo: Arc<dyn EntityRepository>) -> Self {
        Self { entity_repo }
    }

    /// Every (store, product, cell plan) tuple carrying more than one
    /// available entity, optionally narrowed to specific stores or
    /// categories.
    pub async fn find_conflicts(
        &self,
        store_ids: Option<&[i64]>,
        category_ids: Option<&[i64]>,
    ) -> Result<Vec<ConflictGroup>> {
        self.entity_repo.conflicts(store_ids, category_ids).await
    }
}
