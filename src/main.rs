//! Operational command-line entry point
//!
//! Dispatches the pipeline's task entry points by hand:
//!
//! ```text
//! pricewatch replay <store-id> <archive.json>   # replay an archived scrape
//! pricewatch recompute-sales                    # estimated-sales batch
//! pricewatch conflicts                          # duplicate-association report
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use pricewatch::application::orchestrator::{OrchestratorConfig, StoreUpdateOrchestrator};
use pricewatch::application::tasks::{self, StoreUpdateRequest};
use pricewatch::application::{ConflictDetector, PriceHistoryRecorder, SalesEstimationConfig};
use pricewatch::infrastructure::config::default_config_path;
use pricewatch::infrastructure::logging::init_logging_with_config;
use pricewatch::infrastructure::{
    AppConfig, DatabaseConnection, FileArchiveStorage, JsonScraperGateway, SqliteEntityRepository,
    SqliteProductRepository, SqliteStoreRepository, SqliteUpdateLogRepository,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load_or_create(&default_config_path()).await?;
    init_logging_with_config(&config.logging)?;

    let db = DatabaseConnection::new(&config.database.url).await?;
    db.migrate().await?;
    let pool = db.pool().clone();

    let store_repo = Arc::new(SqliteStoreRepository::new(pool.clone()));
    let product_repo = Arc::new(SqliteProductRepository::new(pool.clone()));
    let entity_repo = Arc::new(SqliteEntityRepository::new(pool.clone()));
    let update_log_repo = Arc::new(SqliteUpdateLogRepository::new(pool));

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("replay") => {
            let store_id: i64 = args
                .get(1)
                .context("usage: pricewatch replay <store-id> <archive.json>")?
                .parse()?;
            let path = PathBuf::from(
                args.get(2)
                    .context("usage: pricewatch replay <store-id> <archive.json>")?,
            );

            let gateway = Arc::new(JsonScraperGateway::from_file(&path).await?);
            let archive = Arc::new(FileArchiveStorage::new(config.scraping.archive_dir.clone()));
            let orchestrator = StoreUpdateOrchestrator::new(
                store_repo,
                product_repo,
                entity_repo,
                update_log_repo,
                gateway,
                archive,
                OrchestratorConfig {
                    concurrency_bounds: config.scraping.concurrency_bounds,
                    update_timeout: std::time::Duration::from_secs(
                        config.scraping.update_timeout_secs,
                    ),
                    max_task_retries: config.scraping.max_task_retries,
                    task_retry_delay: std::time::Duration::from_secs(
                        config.scraping.task_retry_delay_secs,
                    ),
                },
            );

            let log =
                tasks::store_update(&orchestrator, StoreUpdateRequest::for_store(store_id)).await?;
            println!(
                "run {} finished: {:?} ({})",
                log.job_id,
                log.status,
                log.status_message.as_deref().unwrap_or("-")
            );
        }
        Some("recompute-sales") => {
            let recorder = PriceHistoryRecorder::new(entity_repo);
            let stamped = tasks::recompute_estimated_sales(
                &recorder,
                &SalesEstimationConfig {
                    unreliable_stock_stores: config.scraping.unreliable_stock_stores.clone(),
                    unreliable_stock_sales_threshold: config
                        .scraping
                        .unreliable_stock_sales_threshold,
                },
            )
            .await?;
            println!("stamped estimated sales on {stamped} history rows");
        }
        Some("conflicts") => {
            let detector = ConflictDetector::new(entity_repo);
            let groups = detector.find_conflicts(None, None).await?;
            if groups.is_empty() {
                println!("no conflicting associations found");
            }
            for group in groups {
                println!(
                    "store {} product {} cell_plan {:?}: {} entities ({})",
                    group.store_id,
                    group.product_id,
                    group.cell_plan_id,
                    group.entities.len(),
                    group
                        .entities
                        .iter()
                        .map(|e| e.id.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
        }
        _ => {
            bail!("usage: pricewatch <replay|recompute-sales|conflicts> ...");
        }
    }

    Ok(())
}
