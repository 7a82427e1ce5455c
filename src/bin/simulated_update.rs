//! One-shot sanity run against the simulated scraper gateway
//!
//! Seeds a throwaway in-memory database with one store and two categories,
//! runs a full store update through the simulated gateway and prints the
//! resulting log. Build with `--features simulate-scraper`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use pricewatch::application::orchestrator::{OrchestratorConfig, StoreUpdateOrchestrator};
use pricewatch::application::tasks::{self, StoreUpdateRequest};
use pricewatch::domain::entities::{Category, Store};
use pricewatch::domain::repositories::{ProductRepository, StoreRepository};
use pricewatch::infrastructure::scraper_gateway::SimulatedScraperGateway;
use pricewatch::infrastructure::{
    DatabaseConnection, FileArchiveStorage, SqliteEntityRepository, SqliteProductRepository,
    SqliteStoreRepository, SqliteUpdateLogRepository,
};

#[tokio::main]
async fn main() -> Result<()> {
    pricewatch::infrastructure::logging::init_logging()?;

    let db = DatabaseConnection::new("sqlite::memory:").await?;
    db.migrate().await?;
    let pool = db.pool().clone();

    let store_repo = Arc::new(SqliteStoreRepository::new(pool.clone()));
    let product_repo = Arc::new(SqliteProductRepository::new(pool.clone()));
    let entity_repo = Arc::new(SqliteEntityRepository::new(pool.clone()));
    let update_log_repo = Arc::new(SqliteUpdateLogRepository::new(pool));

    let mut category_ids = Vec::new();
    for name in ["Notebooks", "Cells"] {
        category_ids.push(
            product_repo
                .create_category(&Category {
                    id: 0,
                    name: name.into(),
                    scraper_name: name.into(),
                })
                .await?,
        );
    }

    let store_id = store_repo
        .create(&Store {
            id: 0,
            name: "Simulated Store".into(),
            country: "CL".into(),
            is_active: true,
            scraper_class: "simulated".into(),
            scraper_extra_args: None,
        })
        .await?;
    store_repo.set_categories(store_id, &category_ids).await?;

    let archive_dir = std::env::temp_dir().join("pricewatch-simulated");
    let orchestrator = StoreUpdateOrchestrator::new(
        store_repo,
        product_repo,
        entity_repo,
        update_log_repo,
        Arc::new(SimulatedScraperGateway::default()),
        Arc::new(FileArchiveStorage::new(archive_dir)),
        OrchestratorConfig {
            task_retry_delay: Duration::from_millis(100),
            ..OrchestratorConfig::default()
        },
    );

    let log = tasks::store_update(&orchestrator, StoreUpdateRequest::for_store(store_id)).await?;
    println!(
        "simulated run {} finished: {:?} ({})",
        log.job_id,
        log.status,
        log.status_message.as_deref().unwrap_or("-")
    );

    Ok(())
}
