//! Draft editing: create, read, update by diff, single-product edits, delete.

use crate::error::AppError;
use crate::model::{Draft, DraftFields, DraftUpdate, NewTable, Product, ProductInput, TableSummary};
use crate::service::validation::DraftValidator;
use crate::store::PricingStore;
use uuid::Uuid;

pub struct DraftEditor;

impl DraftEditor {
    /// New table and draft bound to the default template. NotFound when no default template exists.
    pub async fn create(store: &dyn PricingStore, owner: Uuid, input: &NewTable) -> Result<Draft, AppError> {
        let fields = DraftFields::from_new(input);
        DraftValidator::validate_fields(&fields)?;
        let draft = store.create_table(owner, &fields).await?;
        tracing::info!(%owner, table_id = %draft.table_id, "created price table");
        Ok(draft)
    }

    pub async fn list(store: &dyn PricingStore, owner: Uuid) -> Result<Vec<TableSummary>, AppError> {
        store.list_tables(owner).await
    }

    pub async fn get_draft(store: &dyn PricingStore, owner: Uuid, table_id: Uuid) -> Result<Draft, AppError> {
        store.get_draft(owner, table_id).await
    }

    /// Merge scalars field by field and replace `products` / `featureGroups` by diff when present.
    /// The store merges and validates against the draft it has locked.
    pub async fn update(store: &dyn PricingStore, owner: Uuid, table_id: Uuid, update: DraftUpdate) -> Result<Draft, AppError> {
        let draft = store.update_draft(owner, table_id, &update).await?;
        tracing::info!(
            %owner,
            %table_id,
            products = draft.products.len(),
            feature_groups = draft.feature_groups.len(),
            "updated draft"
        );
        Ok(draft)
    }

    /// Update the product named by `input.id` or append a new one.
    pub async fn upsert_product(
        store: &dyn PricingStore,
        owner: Uuid,
        table_id: Uuid,
        input: &ProductInput,
    ) -> Result<Product, AppError> {
        let product = store.upsert_product(owner, table_id, input).await?;
        tracing::info!(%owner, %table_id, product_id = %product.id, "saved product");
        Ok(product)
    }

    pub async fn get_product(store: &dyn PricingStore, owner: Uuid, table_id: Uuid, product_id: Uuid) -> Result<Product, AppError> {
        store
            .get_draft(owner, table_id)
            .await?
            .products
            .into_iter()
            .find(|p| p.id == product_id)
            .ok_or_else(|| AppError::NotFound(format!("product {}", product_id)))
    }

    pub async fn delete_product(store: &dyn PricingStore, owner: Uuid, table_id: Uuid, product_id: Uuid) -> Result<(), AppError> {
        store.delete_product(owner, table_id, product_id).await?;
        tracing::info!(%owner, %table_id, %product_id, "deleted product");
        Ok(())
    }

    pub async fn delete(store: &dyn PricingStore, owner: Uuid, table_id: Uuid) -> Result<(), AppError> {
        store.delete_table(owner, table_id).await?;
        tracing::info!(%owner, %table_id, "deleted price table");
        Ok(())
    }
}
