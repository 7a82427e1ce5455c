//! Sqlite repositories for stores, categories and canonical products

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::domain::entities::{Category, Product, Store};
use crate::domain::repositories::{ProductRepository, StoreRepository};

#[derive(Clone)]
pub struct SqliteStoreRepository {
    pool: SqlitePool,
}

impl SqliteStoreRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn store_from_row(row: &SqliteRow) -> Store {
    Store {
        id: row.get("id"),
        name: row.get("name"),
        country: row.get("country"),
        is_active: row.get("is_active"),
        scraper_class: row.get("scraper_class"),
        scraper_extra_args: row.get("scraper_extra_args"),
    }
}

fn category_from_row(row: &SqliteRow) -> Category {
    Category {
        id: row.get("id"),
        name: row.get("name"),
        scraper_name: row.get("scraper_name"),
    }
}

#[async_trait]
impl StoreRepository for SqliteStoreRepository {
    async fn create(&self, store: &Store) -> Result<i64> {
        let id = sqlx::query(
            "INSERT INTO stores (name, country, is_active, scraper_class, scraper_extra_args) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&store.name)
        .bind(&store.country)
        .bind(store.is_active)
        .bind(&store.scraper_class)
        .bind(&store.scraper_extra_args)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(id)
    }

    async fn find_by_id(&self, store_id: i64) -> Result<Option<Store>> {
        let row = sqlx::query("SELECT * FROM stores WHERE id = ?")
            .bind(store_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(store_from_row))
    }

    async fn find_all_active(&self) -> Result<Vec<Store>> {
        let rows = sqlx::query("SELECT * FROM stores WHERE is_active = 1 ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(store_from_row).collect())
    }

    async fn set_categories(&self, store_id: i64, category_ids: &[i64]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM store_categories WHERE store_id = ?")
            .bind(store_id)
            .execute(&mut *tx)
            .await?;

        for category_id in category_ids {
            sqlx::query("INSERT INTO store_categories (store_id, category_id) VALUES (?, ?)")
                .bind(store_id)
                .bind(category_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn categories(&self, store_id: i64) -> Result<Vec<Category>> {
        let rows = sqlx::query(
            "SELECT c.* FROM categories c \
             JOIN store_categories sc ON sc.category_id = c.id \
             WHERE sc.store_id = ? ORDER BY c.name",
        )
        .bind(store_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(category_from_row).collect())
    }
}

#[derive(Clone)]
pub struct SqliteProductRepository {
    pool: SqlitePool,
}

impl SqliteProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn product_from_row(row: &SqliteRow) -> Product {
    Product {
        id: row.get("id"),
        name: row.get("name"),
        category_id: row.get("category_id"),
        association_name: row.get("association_name"),
    }
}

#[async_trait]
impl ProductRepository for SqliteProductRepository {
    async fn create_category(&self, category: &Category) -> Result<i64> {
        let id = sqlx::query("INSERT INTO categories (name, scraper_name) VALUES (?, ?)")
            .bind(&category.name)
            .bind(&category.scraper_name)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        Ok(id)
    }

    async fn find_category(&self, category_id: i64) -> Result<Option<Category>> {
        let row = sqlx::query("SELECT * FROM categories WHERE id = ?")
            .bind(category_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(category_from_row))
    }

    async fn find_category_by_scraper_name(&self, scraper_name: &str) -> Result<Option<Category>> {
        let row = sqlx::query("SELECT * FROM categories WHERE scraper_name = ?")
            .bind(scraper_name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(category_from_row))
    }

    async fn create(&self, product: &Product) -> Result<i64> {
        let id = sqlx::query(
            "INSERT INTO products (name, category_id, association_name) VALUES (?, ?, ?)",
        )
        .bind(&product.name)
        .bind(product.category_id)
        .bind(&product.association_name)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(id)
    }

    async fn find_by_id(&self, product_id: i64) -> Result<Option<Product>> {
        let row = sqlx::query("SELECT * FROM products WHERE id = ?")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(product_from_row))
    }

    async fn find_by_association_name(&self, association_name: &str) -> Result<Option<Product>> {
        let row = sqlx::query("SELECT * FROM products WHERE association_name = ?")
            .bind(association_name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(product_from_row))
    }
}
