// Database connection and pool management
// This module handles SQLite database connections using sqlx

use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        // Create the database file (and its directory) if necessary
        if database_url != "sqlite::memory:" {
            let db_path = database_url
                .trim_start_matches("sqlite://")
                .trim_start_matches("sqlite:");

            if !Path::new(db_path).exists() {
                if let Some(parent) = Path::new(db_path).parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                std::fs::File::create(db_path)?;
            }
        }

        // An in-memory database exists per connection, so it must not be
        // shared across a pool.
        let max_connections = if database_url == "sqlite::memory:" { 1 } else { 10 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS stores (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                country TEXT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                scraper_class TEXT NOT NULL,
                scraper_extra_args TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                scraper_name TEXT NOT NULL UNIQUE
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS store_categories (
                store_id INTEGER NOT NULL REFERENCES stores(id) ON DELETE CASCADE,
                category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
                PRIMARY KEY (store_id, category_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS products (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                category_id INTEGER NOT NULL REFERENCES categories(id),
                association_name TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS entities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                store_id INTEGER NOT NULL REFERENCES stores(id),
                category_id INTEGER NOT NULL REFERENCES categories(id),
                scraped_category_id INTEGER NOT NULL REFERENCES categories(id),
                currency TEXT NOT NULL,
                condition TEXT NOT NULL,
                product_id INTEGER REFERENCES products(id),
                cell_plan_id INTEGER REFERENCES products(id),
                active_registry_id INTEGER,
                name TEXT NOT NULL,
                cell_plan_name TEXT,
                part_number TEXT,
                sku TEXT,
                ean TEXT,
                key TEXT NOT NULL,
                url TEXT NOT NULL,
                discovery_url TEXT NOT NULL,
                picture_urls TEXT,
                description TEXT,
                is_visible BOOLEAN NOT NULL DEFAULT 1,
                last_association DATETIME,
                last_association_user TEXT,
                creation_date DATETIME NOT NULL,
                last_updated DATETIME NOT NULL,
                UNIQUE (store_id, key)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_entities_store_name ON entities (store_id, name)",
            r#"
            CREATE TABLE IF NOT EXISTS entity_histories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
                timestamp DATETIME NOT NULL,
                stock INTEGER NOT NULL,
                normal_price TEXT NOT NULL,
                offer_price TEXT NOT NULL,
                cell_monthly_payment TEXT,
                estimated_sales_since_previous_registry INTEGER
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_entity_histories_entity_ts \
             ON entity_histories (entity_id, timestamp)",
            r#"
            CREATE TABLE IF NOT EXISTS entity_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
                user TEXT NOT NULL,
                creation_date DATETIME NOT NULL,
                category_id INTEGER NOT NULL,
                scraped_category_id INTEGER NOT NULL,
                currency TEXT NOT NULL,
                condition TEXT NOT NULL,
                product_id INTEGER,
                cell_plan_id INTEGER,
                name TEXT NOT NULL,
                cell_plan_name TEXT,
                part_number TEXT,
                sku TEXT,
                ean TEXT,
                url TEXT NOT NULL,
                discovery_url TEXT NOT NULL,
                picture_urls TEXT,
                description TEXT,
                is_visible BOOLEAN NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS store_update_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id TEXT NOT NULL UNIQUE,
                store_id INTEGER NOT NULL REFERENCES stores(id),
                status TEXT NOT NULL,
                status_message TEXT,
                discovery_urls_concurrency INTEGER,
                products_for_url_concurrency INTEGER,
                creation_date DATETIME NOT NULL,
                last_updated DATETIME NOT NULL,
                registry_file TEXT,
                available_products_count INTEGER,
                unavailable_products_count INTEGER,
                discovery_urls_without_products_count INTEGER
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS store_update_log_categories (
                log_id INTEGER NOT NULL REFERENCES store_update_logs(id) ON DELETE CASCADE,
                category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
                PRIMARY KEY (log_id, category_id)
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }
}
