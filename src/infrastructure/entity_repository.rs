//! Sqlite repository for entities, their price/stock ledger and audit log
//!
//! Implements the composite write operations of the reconciliation
//! pipeline. `create_with_registry` and `append_registry` run in a single
//! transaction each, so every listing's create/update is its own atomic
//! unit and a mid-run failure never corrupts previously committed rows.

use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};

use crate::domain::entities::{Entity, EntityHistory, EntityLog, TrackedFields};
use crate::domain::repositories::EntityRepository;
use crate::domain::value_objects::{ConflictGroup, NewRegistry};

#[derive(Clone)]
pub struct SqliteEntityRepository {
    pool: SqlitePool,
}

impl SqliteEntityRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn placeholders(n: usize) -> String {
        vec!["?"; n].join(", ")
    }
}

const ENTITY_COLUMNS: &str = "id, store_id, category_id, scraped_category_id, currency, \
     condition, product_id, cell_plan_id, active_registry_id, name, cell_plan_name, \
     part_number, sku, ean, key, url, discovery_url, picture_urls, description, \
     is_visible, last_association, last_association_user, creation_date, last_updated";

fn entity_from_row(row: &SqliteRow) -> Result<Entity> {
    Ok(Entity {
        id: row.get("id"),
        store_id: row.get("store_id"),
        category_id: row.get("category_id"),
        scraped_category_id: row.get("scraped_category_id"),
        currency: row.get("currency"),
        condition: row.try_get("condition")?,
        product_id: row.get("product_id"),
        cell_plan_id: row.get("cell_plan_id"),
        active_registry_id: row.get("active_registry_id"),
        name: row.get("name"),
        cell_plan_name: row.get("cell_plan_name"),
        part_number: row.get("part_number"),
        sku: row.get("sku"),
        ean: row.get("ean"),
        key: row.get("key"),
        url: row.get("url"),
        discovery_url: row.get("discovery_url"),
        picture_urls: row.get("picture_urls"),
        description: row.get("description"),
        is_visible: row.get("is_visible"),
        last_association: row.get("last_association"),
        last_association_user: row.get("last_association_user"),
        creation_date: row.get("creation_date"),
        last_updated: row.get("last_updated"),
    })
}

fn decimal_column(row: &SqliteRow, column: &str) -> Result<Decimal> {
    let raw: String = row.get(column);
    Decimal::from_str(&raw).with_context(|| format!("invalid decimal in column {column}: {raw}"))
}

fn optional_decimal_column(row: &SqliteRow, column: &str) -> Result<Option<Decimal>> {
    let raw: Option<String> = row.get(column);
    raw.map(|s| {
        Decimal::from_str(&s).with_context(|| format!("invalid decimal in column {column}: {s}"))
    })
    .transpose()
}

fn history_from_row(row: &SqliteRow) -> Result<EntityHistory> {
    Ok(EntityHistory {
        id: row.get("id"),
        entity_id: row.get("entity_id"),
        timestamp: row.get("timestamp"),
        stock: row.get("stock"),
        normal_price: decimal_column(row, "normal_price")?,
        offer_price: decimal_column(row, "offer_price")?,
        cell_monthly_payment: optional_decimal_column(row, "cell_monthly_payment")?,
        estimated_sales_since_previous_registry: row
            .get("estimated_sales_since_previous_registry"),
    })
}

async fn update_entity_row(
    conn: &mut SqliteConnection,
    entity: &Entity,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE entities SET
            category_id = ?, scraped_category_id = ?, currency = ?, condition = ?,
            product_id = ?, cell_plan_id = ?, name = ?, cell_plan_name = ?,
            part_number = ?, sku = ?, ean = ?, url = ?, discovery_url = ?,
            picture_urls = ?, description = ?, is_visible = ?,
            last_association = ?, last_association_user = ?, last_updated = ?
        WHERE id = ?
        "#,
    )
    .bind(entity.category_id)
    .bind(entity.scraped_category_id)
    .bind(&entity.currency)
    .bind(entity.condition)
    .bind(entity.product_id)
    .bind(entity.cell_plan_id)
    .bind(&entity.name)
    .bind(&entity.cell_plan_name)
    .bind(&entity.part_number)
    .bind(&entity.sku)
    .bind(&entity.ean)
    .bind(&entity.url)
    .bind(&entity.discovery_url)
    .bind(&entity.picture_urls)
    .bind(&entity.description)
    .bind(entity.is_visible)
    .bind(entity.last_association)
    .bind(&entity.last_association_user)
    .bind(now)
    .bind(entity.id)
    .execute(conn)
    .await?;

    Ok(())
}

async fn insert_log_row(
    conn: &mut SqliteConnection,
    entity_id: i64,
    user: &str,
    fields: &TrackedFields,
    now: DateTime<Utc>,
) -> Result<i64> {
    let id = sqlx::query(
        r#"
        INSERT INTO entity_logs
        (entity_id, user, creation_date, category_id, scraped_category_id,
         currency, condition, product_id, cell_plan_id, name, cell_plan_name,
         part_number, sku, ean, url, discovery_url, picture_urls, description,
         is_visible)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entity_id)
    .bind(user)
    .bind(now)
    .bind(fields.category_id)
    .bind(fields.scraped_category_id)
    .bind(&fields.currency)
    .bind(fields.condition)
    .bind(fields.product_id)
    .bind(fields.cell_plan_id)
    .bind(&fields.name)
    .bind(&fields.cell_plan_name)
    .bind(&fields.part_number)
    .bind(&fields.sku)
    .bind(&fields.ean)
    .bind(&fields.url)
    .bind(&fields.discovery_url)
    .bind(&fields.picture_urls)
    .bind(&fields.description)
    .bind(fields.is_visible)
    .execute(conn)
    .await?
    .last_insert_rowid();

    Ok(id)
}

fn log_from_row(row: &SqliteRow) -> Result<EntityLog> {
    Ok(EntityLog {
        id: row.get("id"),
        entity_id: row.get("entity_id"),
        user: row.get("user"),
        creation_date: row.get("creation_date"),
        fields: TrackedFields {
            category_id: row.get("category_id"),
            scraped_category_id: row.get("scraped_category_id"),
            currency: row.get("currency"),
            condition: row.try_get("condition")?,
            product_id: row.get("product_id"),
            cell_plan_id: row.get("cell_plan_id"),
            name: row.get("name"),
            cell_plan_name: row.get("cell_plan_name"),
            part_number: row.get("part_number"),
            sku: row.get("sku"),
            ean: row.get("ean"),
            url: row.get("url"),
            discovery_url: row.get("discovery_url"),
            picture_urls: row.get("picture_urls"),
            description: row.get("description"),
            is_visible: row.get("is_visible"),
        },
    })
}

#[async_trait]
impl EntityRepository for SqliteEntityRepository {
    async fn find_by_id(&self, entity_id: i64) -> Result<Option<Entity>> {
        let row = sqlx::query(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities WHERE id = ?"
        ))
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(entity_from_row).transpose()
    }

    async fn find_by_store_and_key(&self, store_id: i64, key: &str) -> Result<Option<Entity>> {
        let row = sqlx::query(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities WHERE store_id = ? AND key = ?"
        ))
        .bind(store_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(entity_from_row).transpose()
    }

    async fn find_in_scope(&self, store_id: i64, category_ids: &[i64]) -> Result<Vec<Entity>> {
        if category_ids.is_empty() {
            return Ok(Vec::new());
        }

        let marks = Self::placeholders(category_ids.len());
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM entities \
             WHERE store_id = ? AND (category_id IN ({marks}) OR scraped_category_id IN ({marks}))"
        );

        let mut query = sqlx::query(&sql).bind(store_id);
        for id in category_ids {
            query = query.bind(id);
        }
        for id in category_ids {
            query = query.bind(id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(entity_from_row).collect()
    }

    async fn find_miscategorized(
        &self,
        store_id: i64,
        category_ids: &[i64],
    ) -> Result<Vec<Entity>> {
        if category_ids.is_empty() {
            return Ok(Vec::new());
        }

        let marks = Self::placeholders(category_ids.len());
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM entities \
             WHERE store_id = ? AND category_id IN ({marks}) \
               AND scraped_category_id NOT IN ({marks})"
        );

        let mut query = sqlx::query(&sql).bind(store_id);
        for id in category_ids {
            query = query.bind(id);
        }
        for id in category_ids {
            query = query.bind(id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(entity_from_row).collect()
    }

    async fn find_by_store_and_name(&self, store_id: i64, name: &str) -> Result<Vec<Entity>> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities WHERE store_id = ? AND name = ?"
        ))
        .bind(store_id)
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entity_from_row).collect()
    }

    async fn create_with_registry(
        &self,
        entity: &Entity,
        registry: &NewRegistry,
    ) -> Result<Entity> {
        entity.validate()?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let entity_id = sqlx::query(
            r#"
            INSERT INTO entities
            (store_id, category_id, scraped_category_id, currency, condition,
             product_id, cell_plan_id, active_registry_id, name, cell_plan_name,
             part_number, sku, ean, key, url, discovery_url, picture_urls,
             description, is_visible, last_association, last_association_user,
             creation_date, last_updated)
            VALUES (?, ?, ?, ?, ?, ?, ?, NULL, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entity.store_id)
        .bind(entity.category_id)
        .bind(entity.scraped_category_id)
        .bind(&entity.currency)
        .bind(entity.condition)
        .bind(entity.product_id)
        .bind(entity.cell_plan_id)
        .bind(&entity.name)
        .bind(&entity.cell_plan_name)
        .bind(&entity.part_number)
        .bind(&entity.sku)
        .bind(&entity.ean)
        .bind(&entity.key)
        .bind(&entity.url)
        .bind(&entity.discovery_url)
        .bind(&entity.picture_urls)
        .bind(&entity.description)
        .bind(entity.is_visible)
        .bind(entity.last_association)
        .bind(&entity.last_association_user)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let history_id = sqlx::query(
            r#"
            INSERT INTO entity_histories
            (entity_id, timestamp, stock, normal_price, offer_price, cell_monthly_payment)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entity_id)
        .bind(registry.timestamp)
        .bind(registry.stock)
        .bind(registry.normal_price.to_string())
        .bind(registry.offer_price.to_string())
        .bind(registry.cell_monthly_payment.map(|d| d.to_string()))
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query("UPDATE entities SET active_registry_id = ? WHERE id = ?")
            .bind(history_id)
            .bind(entity_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.find_by_id(entity_id)
            .await?
            .context("entity vanished right after creation")
    }

    async fn update_fields(&self, entity: &Entity) -> Result<()> {
        entity.validate()?;

        let mut conn = self.pool.acquire().await?;
        update_entity_row(&mut conn, entity, Utc::now()).await
    }

    async fn update_fields_with_log(
        &self,
        entity: &Entity,
        log: Option<(&str, &TrackedFields)>,
    ) -> Result<()> {
        entity.validate()?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        update_entity_row(&mut tx, entity, now).await?;
        if let Some((user, fields)) = log {
            insert_log_row(&mut tx, entity.id, user, fields, now).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn apply_listing_update(
        &self,
        entity: &Entity,
        registry: &NewRegistry,
        log: Option<(&str, &TrackedFields)>,
    ) -> Result<EntityHistory> {
        entity.validate()?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let history_id = sqlx::query(
            r#"
            INSERT INTO entity_histories
            (entity_id, timestamp, stock, normal_price, offer_price, cell_monthly_payment)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entity.id)
        .bind(registry.timestamp)
        .bind(registry.stock)
        .bind(registry.normal_price.to_string())
        .bind(registry.offer_price.to_string())
        .bind(registry.cell_monthly_payment.map(|d| d.to_string()))
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query(
            r#"
            UPDATE entities SET
                scraped_category_id = ?, currency = ?, condition = ?, name = ?,
                cell_plan_name = ?, part_number = ?, sku = ?, ean = ?, url = ?,
                discovery_url = ?, picture_urls = ?, description = ?,
                active_registry_id = ?, last_updated = ?
            WHERE id = ?
            "#,
        )
        .bind(entity.scraped_category_id)
        .bind(&entity.currency)
        .bind(entity.condition)
        .bind(&entity.name)
        .bind(&entity.cell_plan_name)
        .bind(&entity.part_number)
        .bind(&entity.sku)
        .bind(&entity.ean)
        .bind(&entity.url)
        .bind(&entity.discovery_url)
        .bind(&entity.picture_urls)
        .bind(&entity.description)
        .bind(history_id)
        .bind(now)
        .bind(entity.id)
        .execute(&mut *tx)
        .await?;

        if let Some((user, fields)) = log {
            insert_log_row(&mut tx, entity.id, user, fields, now).await?;
        }

        let row = sqlx::query("SELECT * FROM entity_histories WHERE id = ?")
            .bind(history_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        history_from_row(&row)
    }

    async fn append_registry(
        &self,
        entity_id: i64,
        registry: &NewRegistry,
    ) -> Result<EntityHistory> {
        let mut tx = self.pool.begin().await?;

        let history_id = sqlx::query(
            r#"
            INSERT INTO entity_histories
            (entity_id, timestamp, stock, normal_price, offer_price, cell_monthly_payment)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entity_id)
        .bind(registry.timestamp)
        .bind(registry.stock)
        .bind(registry.normal_price.to_string())
        .bind(registry.offer_price.to_string())
        .bind(registry.cell_monthly_payment.map(|d| d.to_string()))
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query("UPDATE entities SET active_registry_id = ?, last_updated = ? WHERE id = ?")
            .bind(history_id)
            .bind(Utc::now())
            .bind(entity_id)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query("SELECT * FROM entity_histories WHERE id = ?")
            .bind(history_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        history_from_row(&row)
    }

    async fn clear_active_registry(&self, entity_id: i64) -> Result<()> {
        sqlx::query("UPDATE entities SET active_registry_id = NULL, last_updated = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(entity_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get_active_registry(&self, entity_id: i64) -> Result<Option<EntityHistory>> {
        let row = sqlx::query(
            "SELECT h.* FROM entity_histories h \
             JOIN entities e ON e.active_registry_id = h.id \
             WHERE e.id = ?",
        )
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(history_from_row).transpose()
    }

    async fn history(&self, entity_id: i64) -> Result<Vec<EntityHistory>> {
        let rows = sqlx::query(
            "SELECT * FROM entity_histories WHERE entity_id = ? ORDER BY timestamp, id",
        )
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(history_from_row).collect()
    }

    async fn histories_for_sales_estimation(&self) -> Result<Vec<(i64, EntityHistory)>> {
        let rows = sqlx::query(
            "SELECT e.store_id AS store_id, h.* FROM entity_histories h \
             JOIN entities e ON e.id = h.entity_id \
             WHERE h.stock != -1 \
             ORDER BY h.entity_id, h.timestamp, h.id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| Ok((row.get("store_id"), history_from_row(row)?)))
            .collect()
    }

    async fn set_estimated_sales(&self, history_id: i64, units: i32) -> Result<()> {
        sqlx::query(
            "UPDATE entity_histories SET estimated_sales_since_previous_registry = ? WHERE id = ?",
        )
        .bind(units)
        .bind(history_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn logs(&self, entity_id: i64) -> Result<Vec<EntityLog>> {
        let rows = sqlx::query(
            "SELECT * FROM entity_logs WHERE entity_id = ? ORDER BY creation_date DESC, id DESC",
        )
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(log_from_row).collect()
    }

    async fn find_available(&self, store_id: i64) -> Result<Vec<Entity>> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities WHERE store_id = ? AND id IN ( \
                 SELECT e.id FROM entities e \
                 JOIN entity_histories h ON h.id = e.active_registry_id \
                 WHERE h.stock != 0)"
        ))
        .bind(store_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entity_from_row).collect()
    }

    async fn count_available(&self, store_id: i64) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS c FROM entities e \
             JOIN entity_histories h ON h.id = e.active_registry_id \
             WHERE e.store_id = ? AND h.stock != 0",
        )
        .bind(store_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("c"))
    }

    async fn count_unavailable(&self, store_id: i64) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS c FROM entities e \
             LEFT JOIN entity_histories h ON h.id = e.active_registry_id \
             WHERE e.store_id = ? AND (e.active_registry_id IS NULL OR h.stock = 0)",
        )
        .bind(store_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("c"))
    }

    async fn conflicts(
        &self,
        store_ids: Option<&[i64]>,
        category_ids: Option<&[i64]>,
    ) -> Result<Vec<ConflictGroup>> {
        let mut sql = String::from(
            "SELECT e.store_id, e.product_id, e.cell_plan_id FROM entities e \
             JOIN entity_histories h ON h.id = e.active_registry_id \
             WHERE e.product_id IS NOT NULL AND h.stock != 0",
        );

        if let Some(ids) = store_ids {
            sql.push_str(&format!(
                " AND e.store_id IN ({})",
                Self::placeholders(ids.len())
            ));
        }
        if let Some(ids) = category_ids {
            sql.push_str(&format!(
                " AND e.category_id IN ({})",
                Self::placeholders(ids.len())
            ));
        }

        sql.push_str(
            " GROUP BY e.store_id, e.product_id, e.cell_plan_id HAVING COUNT(*) > 1",
        );

        let mut query = sqlx::query(&sql);
        if let Some(ids) = store_ids {
            for id in ids {
                query = query.bind(id);
            }
        }
        if let Some(ids) = category_ids {
            for id in ids {
                query = query.bind(id);
            }
        }

        let group_rows = query.fetch_all(&self.pool).await?;
        let mut groups = Vec::with_capacity(group_rows.len());

        for row in group_rows {
            let store_id: i64 = row.get("store_id");
            let product_id: i64 = row.get("product_id");
            let cell_plan_id: Option<i64> = row.get("cell_plan_id");

            let entity_sql = format!(
                "SELECT {ENTITY_COLUMNS} FROM entities e2 \
                 WHERE e2.store_id = ? AND e2.product_id = ? \
                   AND e2.cell_plan_id IS ? \
                   AND e2.id IN ( \
                       SELECT e.id FROM entities e \
                       JOIN entity_histories h ON h.id = e.active_registry_id \
                       WHERE h.stock != 0)"
            );

            let entity_rows = sqlx::query(&entity_sql)
                .bind(store_id)
                .bind(product_id)
                .bind(cell_plan_id)
                .fetch_all(&self.pool)
                .await?;

            groups.push(ConflictGroup {
                store_id,
                product_id,
                cell_plan_id,
                entities: entity_rows
                    .iter()
                    .map(entity_from_row)
                    .collect::<Result<Vec<_>>>()?,
            });
        }

        Ok(groups)
    }
}
