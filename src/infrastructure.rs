//! Infrastructure layer
//!
//! Sqlite persistence, configuration, logging bootstrap, archive storage
//! and the scraper gateway adapters.

pub mod archive_storage;
pub mod config;
pub mod database_connection;
pub mod entity_repository;
pub mod logging;
pub mod scraper_gateway;
pub mod store_repository;
pub mod update_log_repository;

// Re-export commonly used items
pub use archive_storage::FileArchiveStorage;
pub use config::AppConfig;
pub use database_connection::DatabaseConnection;
pub use entity_repository::SqliteEntityRepository;
pub use scraper_gateway::JsonScraperGateway;
pub use store_repository::{SqliteProductRepository, SqliteStoreRepository};
pub use update_log_repository::SqliteUpdateLogRepository;
