//! Persistence behind the `PricingStore` trait: PostgreSQL for deployments, in-memory for tests and demos.
//!
//! Every mutating method is atomic. Ownership is checked inside the same transaction as the write,
//! so a table that belongs to someone else is indistinguishable from a missing one (`NotFound`).

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{connect_with_retry, ensure_database_exists, PgStore};

use crate::error::AppError;
use crate::model::{
    Draft, DraftFields, DraftUpdate, Product, ProductInput, PublishedVersion, TableSummary, Template,
    TemplateUpsert, VersionSummary,
};
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait PricingStore: Send + Sync {
    /// Cheap connectivity check used by `/ready`.
    async fn ping(&self) -> Result<(), AppError>;

    /// Insert or replace the template with `upsert.version`. The default flag is left untouched.
    async fn upsert_template(&self, upsert: &TemplateUpsert) -> Result<Template, AppError>;

    /// Clear the default flag everywhere and set it on `version`. NotFound if the version is unknown.
    async fn set_default_template(&self, version: &str) -> Result<Template, AppError>;

    async fn default_template(&self) -> Result<Option<Template>, AppError>;

    async fn template_by_version(&self, version: &str) -> Result<Option<Template>, AppError>;

    /// All templates, public or not.
    async fn list_templates(&self) -> Result<Vec<Template>, AppError>;

    /// Table plus draft in one transaction, bound to the current default template.
    async fn create_table(&self, owner: Uuid, fields: &DraftFields) -> Result<Draft, AppError>;

    /// Most recently updated first.
    async fn list_tables(&self, owner: Uuid) -> Result<Vec<TableSummary>, AppError>;

    async fn get_draft(&self, owner: Uuid, table_id: Uuid) -> Result<Draft, AppError>;

    /// Merge `update` into the locked draft, validate it, write the scalars and reconcile any
    /// provided arrays; all or nothing.
    async fn update_draft(&self, owner: Uuid, table_id: Uuid, update: &DraftUpdate) -> Result<Draft, AppError>;

    /// Update the product named by `product.id` (reconciling its prices) or append a new one.
    /// Prices are checked against the payment types of the locked draft.
    async fn upsert_product(&self, owner: Uuid, table_id: Uuid, product: &ProductInput) -> Result<Product, AppError>;

    async fn delete_product(&self, owner: Uuid, table_id: Uuid, product_id: Uuid) -> Result<(), AppError>;

    async fn set_table_template(&self, owner: Uuid, table_id: Uuid, template_id: Uuid) -> Result<(), AppError>;

    /// Removes prices, products, features, feature groups, draft, published versions and the table.
    async fn delete_table(&self, owner: Uuid, table_id: Uuid) -> Result<(), AppError>;

    /// Append a snapshot of the current draft as version `max + 1`.
    async fn publish(&self, owner: Uuid, table_id: Uuid) -> Result<PublishedVersion, AppError>;

    /// Newest first.
    async fn list_versions(&self, owner: Uuid, table_id: Uuid) -> Result<Vec<VersionSummary>, AppError>;

    /// Published version `version`, or the latest when `None`. No owner check: this backs the public render.
    async fn published_version(&self, table_id: Uuid, version: Option<i32>) -> Result<Option<PublishedVersion>, AppError>;
}

pub(crate) fn table_not_found(table_id: Uuid) -> AppError {
    AppError::NotFound(format!("price table {}", table_id))
}
