//! Typed domain errors for entity mutations
//!
//! These are the rejection reasons surfaced synchronously to operator
//! actions. They are never retried automatically and never leave partial
//! state behind.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntityError {
    #[error("Hidden entities cannot be associated")]
    Hidden,

    #[error("Product category ({product_category_id}) does not match entity category ({entity_category_id})")]
    CategoryMismatch {
        entity_category_id: i64,
        product_category_id: i64,
    },

    #[error("Re-association must change the product or cell plan")]
    SameAssociation,

    #[error("Entity is not associated to any product")]
    NotAssociated,

    #[error("A dissociation reason must not be given when undoing one's own association")]
    ReasonNotAllowed,

    #[error("Entity invariant violated: {0}")]
    InvariantViolation(String),
}
