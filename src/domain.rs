//! Domain module - Core business logic and entities
//!
//! This module contains the domain entities, value objects, domain errors
//! and the trait seams (repositories, external services) of the pricing
//! pipeline. Each module is its own file in the domain/ directory.

pub mod entities;
pub mod error;
pub mod repositories;
pub mod services;
pub mod value_objects;

// Re-export commonly used items for convenience
pub use entities::{
    Category, Condition, Entity, EntityHistory, EntityLog, Product, Store, StoreUpdateLog,
    TrackedFields, UpdateStatus,
};
pub use error::EntityError;
pub use value_objects::{ConcurrencyBounds, ConcurrencyParams, ReconcileStats, ScrapeResult, ScrapedListing};
