//! pricewatch - store price-update and entity-reconciliation pipeline
//!
//! Backend core of a price-comparison platform: per-store scrape
//! ingestion, reconciliation of scraped listings against known entities,
//! append-only price/stock history with availability semantics, manual
//! product association with audit logging, and duplicate-association
//! conflict detection.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;

pub mod test_utils;
