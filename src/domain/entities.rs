//! Domain entities
//!
//! Core rows of the pricing pipeline: stores, categories, canonical
//! products, store listings (entities), their price/stock ledger and the
//! audit/update log records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, Type};

use crate::domain::error::EntityError;

/// A retailer/website being scraped. Mostly static reference data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    pub id: i64,
    pub name: String,
    pub country: String,
    pub is_active: bool,
    /// Identifier of the scraper implementation for this store.
    pub scraper_class: String,
    /// Opaque blob forwarded to the scraper as-is.
    pub scraper_extra_args: Option<String>,
}

/// A product taxonomy node (e.g. "Notebooks").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    /// The name the scraper layer uses for this category.
    pub scraper_name: String,
}

/// Canonical catalogue entry that entities get matched to. Owned by the
/// catalogue subsystem; never hard-deleted through this pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub category_id: i64,
    /// Canonical lookup string used by cell-plan auto-association.
    pub association_name: Option<String>,
}

/// Capability surface of the catalogue's dynamic metamodel. The pipeline
/// only ever needs a product's category; specs are opaque.
pub trait SpecsProvider {
    fn category_id(&self) -> i64;
    fn specs(&self) -> serde_json::Value;
}

impl SpecsProvider for Product {
    fn category_id(&self) -> i64 {
        self.category_id
    }

    fn specs(&self) -> serde_json::Value {
        serde_json::Value::Object(serde_json::Map::new())
    }
}

/// Listing condition as reported by stores, keyed by schema.org URI.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Condition {
    Damaged,
    New,
    Refurbished,
    Used,
}

impl Condition {
    pub fn as_uri(self) -> &'static str {
        match self {
            Self::Damaged => "https://schema.org/DamagedCondition",
            Self::New => "https://schema.org/NewCondition",
            Self::Refurbished => "https://schema.org/RefurbishedCondition",
            Self::Used => "https://schema.org/UsedCondition",
        }
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            "https://schema.org/DamagedCondition" => Some(Self::Damaged),
            "https://schema.org/NewCondition" => Some(Self::New),
            "https://schema.org/RefurbishedCondition" => Some(Self::Refurbished),
            "https://schema.org/UsedCondition" => Some(Self::Used),
            _ => None,
        }
    }
}

impl Type<sqlx::Sqlite> for Condition {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <String as Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'q> Encode<'q, sqlx::Sqlite> for Condition {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as Encode<sqlx::Sqlite>>::encode(self.as_uri().to_string(), buf)
    }
}

impl<'r> Decode<'r, sqlx::Sqlite> for Condition {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as Decode<sqlx::Sqlite>>::decode(value)?;
        Self::from_uri(&s).ok_or_else(|| format!("Invalid Condition URI: {s}").into())
    }
}

/// The mutable entity fields captured by [`EntityLog`] snapshots. An audit
/// row is written only when at least one of these actually changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedFields {
    pub category_id: i64,
    pub scraped_category_id: i64,
    pub currency: String,
    pub condition: Condition,
    pub product_id: Option<i64>,
    pub cell_plan_id: Option<i64>,
    pub name: String,
    pub cell_plan_name: Option<String>,
    pub part_number: Option<String>,
    pub sku: Option<String>,
    pub ean: Option<String>,
    pub url: String,
    pub discovery_url: String,
    /// JSON-serialized list of picture URLs.
    pub picture_urls: Option<String>,
    pub description: Option<String>,
    pub is_visible: bool,
}

/// A specific listing of a (possibly not-yet-identified) product at one
/// store. Natural key is `(store_id, key)` where `key` is the
/// scraper-stable identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: i64,
    pub store_id: i64,
    /// Assigned category, staff-correctable.
    pub category_id: i64,
    /// Category as last reported by the scraper; may differ from the
    /// assigned one when the store miscategorizes.
    pub scraped_category_id: i64,
    /// ISO currency code of the listing's prices.
    pub currency: String,
    pub condition: Condition,
    /// None means "not yet associated".
    pub product_id: Option<i64>,
    /// Secondary bundled product; only meaningful for cell-plan listings.
    pub cell_plan_id: Option<i64>,
    /// Pointer to the latest EntityHistory row, or None when the store no
    /// longer reports this listing. Written exclusively by the price
    /// history recorder.
    pub active_registry_id: Option<i64>,
    pub name: String,
    pub cell_plan_name: Option<String>,
    pub part_number: Option<String>,
    pub sku: Option<String>,
    pub ean: Option<String>,
    pub key: String,
    pub url: String,
    pub discovery_url: String,
    pub picture_urls: Option<String>,
    pub description: Option<String>,
    pub is_visible: bool,
    pub last_association: Option<DateTime<Utc>>,
    pub last_association_user: Option<String>,
    pub creation_date: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Entity {
    pub fn is_associated(&self) -> bool {
        self.product_id.is_some()
    }

    /// Snapshot of the audit-tracked fields, used for change detection.
    pub fn tracked_fields(&self) -> TrackedFields {
        TrackedFields {
            category_id: self.category_id,
            scraped_category_id: self.scraped_category_id,
            currency: self.currency.clone(),
            condition: self.condition,
            product_id: self.product_id,
            cell_plan_id: self.cell_plan_id,
            name: self.name.clone(),
            cell_plan_name: self.cell_plan_name.clone(),
            part_number: self.part_number.clone(),
            sku: self.sku.clone(),
            ean: self.ean.clone(),
            url: self.url.clone(),
            discovery_url: self.discovery_url.clone(),
            picture_urls: self.picture_urls.clone(),
            description: self.description.clone(),
            is_visible: self.is_visible,
        }
    }

    /// Write-time invariants. Every repository save path calls this; a
    /// violation is a programming error surfaced as
    /// [`EntityError::InvariantViolation`], never persisted.
    pub fn validate(&self) -> Result<(), EntityError> {
        if self.last_association_user.is_some() != self.last_association.is_some() {
            return Err(EntityError::InvariantViolation(
                "association date and user must be both set or both null".into(),
            ));
        }

        if !self.is_visible && self.is_associated() {
            return Err(EntityError::InvariantViolation(
                "entity cannot be associated and hidden at the same time".into(),
            ));
        }

        if self.product_id.is_none() && self.cell_plan_id.is_some() {
            return Err(EntityError::InvariantViolation(
                "entity cannot have a cell plan without a primary association".into(),
            ));
        }

        if self.is_associated() != self.last_association_user.is_some() {
            return Err(EntityError::InvariantViolation(
                "an association must carry its resolver, and only then".into(),
            ));
        }

        Ok(())
    }
}

/// One immutable price/stock observation for an entity. Append-only; the
/// only post-insert mutation is the estimated-sales batch stamping its
/// derived column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityHistory {
    pub id: i64,
    pub entity_id: i64,
    pub timestamp: DateTime<Utc>,
    /// 0 means out of stock, -1 means stock unknown.
    pub stock: i32,
    pub normal_price: Decimal,
    pub offer_price: Decimal,
    pub cell_monthly_payment: Option<Decimal>,
    /// Units estimated sold between the previous registry and this one.
    /// Computed by the offline batch; None until then.
    pub estimated_sales_since_previous_registry: Option<i32>,
}

impl EntityHistory {
    pub fn is_available(&self) -> bool {
        self.stock != 0
    }
}

/// Before-image audit snapshot of an entity's tracked fields, written only
/// when a mutation actually changed at least one of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityLog {
    pub id: i64,
    pub entity_id: i64,
    pub user: String,
    pub creation_date: DateTime<Utc>,
    pub fields: TrackedFields,
}

/// Status of one store-update orchestration run.
///
/// State machine: Pending -> InProcess -> {Success, Error}; the last two
/// are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum UpdateStatus {
    Pending,
    InProcess,
    Success,
    Error,
}

impl UpdateStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProcess)
                | (Self::InProcess, Self::Success)
                | (Self::InProcess, Self::Error)
        )
    }
}

impl Type<sqlx::Sqlite> for UpdateStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <String as Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'q> Encode<'q, sqlx::Sqlite> for UpdateStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        let s = match self {
            Self::Pending => "Pending",
            Self::InProcess => "InProcess",
            Self::Success => "Success",
            Self::Error => "Error",
        };
        <String as Encode<sqlx::Sqlite>>::encode(s.to_string(), buf)
    }
}

impl<'r> Decode<'r, sqlx::Sqlite> for UpdateStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as Decode<sqlx::Sqlite>>::decode(value)?;
        match s.as_str() {
            "Pending" => Ok(Self::Pending),
            "InProcess" => Ok(Self::InProcess),
            "Success" => Ok(Self::Success),
            "Error" => Ok(Self::Error),
            _ => Err(format!("Invalid UpdateStatus: {s}").into()),
        }
    }
}

/// One row per orchestration run, with status, the concurrency parameters
/// actually used, result counts and a pointer to the archived raw scrape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreUpdateLog {
    pub id: i64,
    /// External job identifier of the run.
    pub job_id: String,
    pub store_id: i64,
    pub status: UpdateStatus,
    pub status_message: Option<String>,
    pub discovery_urls_concurrency: Option<u32>,
    pub products_for_url_concurrency: Option<u32>,
    pub creation_date: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    /// Path of the archived raw-scrape JSON document, set on success.
    pub registry_file: Option<String>,
    pub available_products_count: Option<i64>,
    pub unavailable_products_count: Option<i64>,
    pub discovery_urls_without_products_count: Option<i64>,
}
