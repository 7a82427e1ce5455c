//! Sqlite repository for store update logs

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

use crate::domain::entities::{StoreUpdateLog, UpdateStatus};
use crate::domain::repositories::UpdateLogRepository;

#[derive(Clone)]
pub struct SqliteUpdateLogRepository {
    pool: SqlitePool,
}

impl SqliteUpdateLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn log_from_row(row: &SqliteRow) -> Result<StoreUpdateLog> {
    Ok(StoreUpdateLog {
        id: row.get("id"),
        job_id: row.get("job_id"),
        store_id: row.get("store_id"),
        status: row.try_get("status")?,
        status_message: row.get("status_message"),
        discovery_urls_concurrency: row.get("discovery_urls_concurrency"),
        products_for_url_concurrency: row.get("products_for_url_concurrency"),
        creation_date: row.get("creation_date"),
        last_updated: row.get("last_updated"),
        registry_file: row.get("registry_file"),
        available_products_count: row.get("available_products_count"),
        unavailable_products_count: row.get("unavailable_products_count"),
        discovery_urls_without_products_count: row.get("discovery_urls_without_products_count"),
    })
}

#[async_trait]
impl UpdateLogRepository for SqliteUpdateLogRepository {
    async fn create(&self, store_id: i64) -> Result<StoreUpdateLog> {
        let now = Utc::now();
        let job_id = Uuid::new_v4().to_string();

        let id = sqlx::query(
            "INSERT INTO store_update_logs \
             (job_id, store_id, status, creation_date, last_updated) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&job_id)
        .bind(store_id)
        .bind(UpdateStatus::Pending)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(StoreUpdateLog {
            id,
            job_id,
            store_id,
            status: UpdateStatus::Pending,
            status_message: None,
            discovery_urls_concurrency: None,
            products_for_url_concurrency: None,
            creation_date: now,
            last_updated: now,
            registry_file: None,
            available_products_count: None,
            unavailable_products_count: None,
            discovery_urls_without_products_count: None,
        })
    }

    async fn find_by_id(&self, log_id: i64) -> Result<Option<StoreUpdateLog>> {
        let row = sqlx::query("SELECT * FROM store_update_logs WHERE id = ?")
            .bind(log_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(log_from_row).transpose()
    }

    async fn update(&self, log: &StoreUpdateLog) -> Result<()> {
        sqlx::query(
            "UPDATE store_update_logs SET \
                 status = ?, status_message = ?, discovery_urls_concurrency = ?, \
                 products_for_url_concurrency = ?, registry_file = ?, \
                 available_products_count = ?, unavailable_products_count = ?, \
                 discovery_urls_without_products_count = ?, last_updated = ? \
             WHERE id = ?",
        )
        .bind(log.status)
        .bind(&log.status_message)
        .bind(log.discovery_urls_concurrency)
        .bind(log.products_for_url_concurrency)
        .bind(&log.registry_file)
        .bind(log.available_products_count)
        .bind(log.unavailable_products_count)
        .bind(log.discovery_urls_without_products_count)
        .bind(Utc::now())
        .bind(log.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_categories(&self, log_id: i64, category_ids: &[i64]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM store_update_log_categories WHERE log_id = ?")
            .bind(log_id)
            .execute(&mut *tx)
            .await?;

        for category_id in category_ids {
            sqlx::query(
                "INSERT INTO store_update_log_categories (log_id, category_id) VALUES (?, ?)",
            )
            .bind(log_id)
            .bind(category_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn categories(&self, log_id: i64) -> Result<Vec<i64>> {
        let rows = sqlx::query(
            "SELECT category_id FROM store_update_log_categories WHERE log_id = ? \
             ORDER BY category_id",
        )
        .bind(log_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| r.get("category_id")).collect())
    }

    async fn find_latest_for_store(&self, store_id: i64) -> Result<Option<StoreUpdateLog>> {
        let row = sqlx::query(
            "SELECT * FROM store_update_logs WHERE store_id = ? \
             ORDER BY creation_date DESC, id DESC LIMIT 1",
        )
        .bind(store_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(log_from_row).transpose()
    }
}
