//! Entity-to-product association
//!
//! Links and unlinks entities to canonical products (plus an optional
//! bundled cell-plan product) on behalf of staff users, with an audit log
//! row for every effective change. Domain rejections come back as
//! [`EntityError`] values; they never leave partial state behind.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, warn};

use crate::domain::entities::{Entity, Product, SpecsProvider};
use crate::domain::error::EntityError;
use crate::domain::repositories::{EntityRepository, ProductRepository};
use crate::domain::services::Notifier;

pub struct AssociationManager {
    entity_repo: Arc<dyn EntityRepository>,
    product_repo: Arc<dyn ProductRepository>,
    notifier: Arc<dyn Notifier>,
}

impl AssociationManager {
    pub fn new(
        entity_repo: Arc<dyn EntityRepository>,
        product_repo: Arc<dyn ProductRepository>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            entity_repo,
            product_repo,
            notifier,
        }
    }

    /// Associate an entity to a product (and optionally a cell plan).
    ///
    /// Rejections (hidden entity, category mismatch, identical pair)
    /// surface as [`EntityError`] and write nothing.
    pub async fn associate(
        &self,
        entity_id: i64,
        user: &str,
        product_id: i64,
        cell_plan_id: Option<i64>,
    ) -> Result<Entity> {
        let mut entity = self
            .entity_repo
            .find_by_id(entity_id)
            .await?
            .with_context(|| format!("no entity with id {entity_id}"))?;

        let product = self
            .product_repo
            .find_by_id(product_id)
            .await?
            .with_context(|| format!("no product with id {product_id}"))?;

        if !entity.is_visible {
            return Err(EntityError::Hidden.into());
        }

        // The catalogue's metamodel owns the product's category; go
        // through the capability rather than the raw row.
        if product.category_id() != entity.category_id {
            return Err(EntityError::CategoryMismatch {
                entity_category_id: entity.category_id,
                product_category_id: product.category_id(),
            }
            .into());
        }

        if entity.product_id == Some(product_id) && entity.cell_plan_id == cell_plan_id {
            return Err(EntityError::SameAssociation.into());
        }

        if let Some(cell_plan_id) = cell_plan_id {
            self.product_repo
                .find_by_id(cell_plan_id)
                .await?
                .with_context(|| format!("no cell plan product with id {cell_plan_id}"))?;
        }

        let before = entity.tracked_fields();

        entity.product_id = Some(product_id);
        entity.cell_plan_id = cell_plan_id;
        entity.last_association = Some(Utc::now());
        entity.last_association_user = Some(user.to_string());

        // Field update and audit row commit together.
        let changed = entity.tracked_fields() != before;
        self.entity_repo
            .update_fields_with_log(&entity, changed.then_some((user, &before)))
            .await?;

        // Best-effort side effect; never rolls back the association.
        if entity
            .cell_plan_name
            .as_deref()
            .is_some_and(|n| !n.is_empty())
        {
            if let Err(err) = self.auto_associate_cell_plans(&entity, user).await {
                warn!(entity_id = entity.id, error = %err,
                    "cell-plan auto-association failed");
            }
        }

        self.entity_repo
            .find_by_id(entity.id)
            .await?
            .context("entity vanished after association")
    }

    /// Undo an entity's product association.
    ///
    /// A `reason` is only accepted when the dissociating user differs from
    /// the original associator; undoing one's own association needs no
    /// justification. A different user's dissociation notifies the
    /// original associator.
    pub async fn dissociate(
        &self,
        entity_id: i64,
        user: &str,
        reason: Option<&str>,
    ) -> Result<Entity> {
        let mut entity = self
            .entity_repo
            .find_by_id(entity_id)
            .await?
            .with_context(|| format!("no entity with id {entity_id}"))?;

        if entity.product_id.is_none() {
            return Err(EntityError::NotAssociated.into());
        }

        let original_associator = entity.last_association_user.clone();
        let is_self_correction = original_associator.as_deref() == Some(user);

        if reason.is_some() && is_self_correction {
            return Err(EntityError::ReasonNotAllowed.into());
        }

        let before = entity.tracked_fields();

        entity.product_id = None;
        entity.cell_plan_id = None;
        entity.last_association = None;
        entity.last_association_user = None;

        self.entity_repo
            .update_fields_with_log(&entity, Some((user, &before)))
            .await?;

        if !is_self_correction {
            if let Some(original) = original_associator {
                if let Err(err) = self
                    .notifier
                    .notify_dissociation(&entity, user, &original, reason)
                    .await
                {
                    warn!(entity_id = entity.id, error = %err,
                        "dissociation notification failed");
                }
            }
        }

        Ok(entity)
    }

    /// Scan sibling entities at the same store with the same display name
    /// and try to resolve their bundled plan name against the canonical
    /// association-name lookup. Best effort; a miss is only logged.
    async fn auto_associate_cell_plans(&self, entity: &Entity, user: &str) -> Result<()> {
        let siblings = self
            .entity_repo
            .find_by_store_and_name(entity.store_id, &entity.name)
            .await?;

        for mut sibling in siblings {
            let Some(plan_name) = sibling.cell_plan_name.clone().filter(|n| !n.is_empty()) else {
                continue;
            };
            // A cell plan can only hang off an associated entity.
            if sibling.product_id.is_none() {
                continue;
            }

            let Some(plan) = self.lookup_plan(&plan_name).await? else {
                debug!(plan_name = %plan_name, "no canonical cell plan matched");
                continue;
            };

            if sibling.cell_plan_id == Some(plan.id) {
                continue;
            }

            let before = sibling.tracked_fields();
            sibling.cell_plan_id = Some(plan.id);

            self.entity_repo
                .update_fields_with_log(&sibling, Some((user, &before)))
                .await?;

            debug!(
                sibling_id = sibling.id,
                cell_plan_id = plan.id,
                "auto-associated cell plan"
            );
        }

        Ok(())
    }

    async fn lookup_plan(&self, plan_name: &str) -> Result<Option<Product>> {
        self.product_repo.find_by_association_name(plan_name).await
    }
}
