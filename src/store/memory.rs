//! In-process store. Each mutation runs against a copy of the state and is swapped in only on success,
//! which gives the same all-or-nothing behaviour as a database transaction.

use super::{table_not_found, PricingStore};
use crate::error::AppError;
use crate::model::{
    compare_versions, Draft, DraftFields, DraftUpdate, FeatureGroup, FeatureGroupInput, PriceTable, Product,
    ProductInput, PublishedData, PublishedVersion, TableSummary, Template, TemplateUpsert, VersionSummary,
};
use crate::service::reconcile::{self, Action};
use crate::service::DraftValidator;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Clone)]
struct TableRecord {
    table: PriceTable,
    draft: Draft,
    versions: Vec<PublishedVersion>,
}

#[derive(Clone, Default)]
struct State {
    templates: Vec<Template>,
    tables: Vec<TableRecord>,
}

impl State {
    fn template(&self, id: Uuid) -> Result<&Template, AppError> {
        self.templates
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| AppError::NotFound(format!("template {}", id)))
    }

    fn owned(&self, owner: Uuid, table_id: Uuid) -> Result<&TableRecord, AppError> {
        self.tables
            .iter()
            .find(|r| r.table.id == table_id && r.table.owner_id == owner)
            .ok_or_else(|| table_not_found(table_id))
    }

    fn owned_mut(&mut self, owner: Uuid, table_id: Uuid) -> Result<&mut TableRecord, AppError> {
        self.tables
            .iter_mut()
            .find(|r| r.table.id == table_id && r.table.owner_id == owner)
            .ok_or_else(|| table_not_found(table_id))
    }

    /// Draft with `template_version` resolved from the table's current template.
    fn draft_view(&self, record: &TableRecord) -> Result<Draft, AppError> {
        let mut draft = record.draft.clone();
        draft.template_version = self.template(record.table.template_id)?.version.clone();
        Ok(draft)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<R>(&self, f: impl FnOnce(&State) -> Result<R, AppError>) -> Result<R, AppError> {
        let state = self
            .state
            .lock()
            .map_err(|_| AppError::Internal("store lock poisoned".into()))?;
        f(&state)
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut State) -> Result<R, AppError>) -> Result<R, AppError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| AppError::Internal("store lock poisoned".into()))?;
        let mut next = state.clone();
        let out = f(&mut next)?;
        *state = next;
        Ok(out)
    }
}

fn reconcile_groups(current: &[FeatureGroup], inbound: &[FeatureGroupInput]) -> Result<Vec<FeatureGroup>, AppError> {
    let persisted: Vec<Uuid> = current.iter().map(|g| g.id).collect();
    let plan = reconcile::plan("feature group", &persisted, inbound)?;
    tracing::debug!(
        updated = plan.updated(),
        inserted = plan.inserted(),
        deleted = plan.delete.len(),
        "reconciled feature groups"
    );
    plan.steps
        .iter()
        .map(|step| {
            let existing: Vec<Uuid> = match step.action {
                Action::Update => current
                    .iter()
                    .find(|g| g.id == step.id)
                    .map(|g| g.features.iter().map(|f| f.id).collect())
                    .unwrap_or_default(),
                Action::Insert => Vec::new(),
            };
            let features = reconcile::plan("feature", &existing, &step.item.features)?;
            let features = features.steps.iter().map(|s| s.item.to_feature(s.id)).collect();
            Ok(step.item.to_group(step.id, features))
        })
        .collect()
}

fn build_product(existing: Option<&Product>, id: Uuid, input: &ProductInput) -> Result<Product, AppError> {
    let persisted: Vec<Uuid> = existing
        .map(|p| p.prices.iter().map(|price| price.id).collect())
        .unwrap_or_default();
    let prices = reconcile::plan("price", &persisted, &input.prices)?;
    let prices = prices.steps.iter().map(|s| s.item.to_price(s.id)).collect();
    Ok(input.to_product(id, prices))
}

fn reconcile_products(current: &[Product], inbound: &[ProductInput]) -> Result<Vec<Product>, AppError> {
    let persisted: Vec<Uuid> = current.iter().map(|p| p.id).collect();
    let plan = reconcile::plan("product", &persisted, inbound)?;
    tracing::debug!(
        updated = plan.updated(),
        inserted = plan.inserted(),
        deleted = plan.delete.len(),
        "reconciled products"
    );
    plan.steps
        .iter()
        .map(|step| build_product(current.iter().find(|p| p.id == step.id), step.id, step.item))
        .collect()
}

fn apply_fields(draft: &mut Draft, fields: &DraftFields) {
    draft.name = fields.name.clone();
    draft.stripe_public_key = fields.stripe_public_key.clone();
    draft.paddle_public_key = fields.paddle_public_key.clone();
    draft.currency_settings = fields.currency_settings.clone();
    draft.payment_types = fields.payment_types.clone();
    draft.html_template = fields.html_template.clone();
    draft.custom_css = fields.custom_css.clone();
}

/// Drop feature references that no longer point at a feature of the draft.
fn prune_feature_refs(draft: &mut Draft) {
    let live: HashSet<Uuid> = draft.feature_ids().into_iter().collect();
    for product in &mut draft.products {
        product.feature_ids.retain(|id| live.contains(id));
    }
}

#[async_trait]
impl PricingStore for MemoryStore {
    async fn ping(&self) -> Result<(), AppError> {
        self.read(|_| Ok(()))
    }

    async fn upsert_template(&self, upsert: &TemplateUpsert) -> Result<Template, AppError> {
        self.mutate(|state| {
            let now = Utc::now();
            if let Some(existing) = state.templates.iter_mut().find(|t| t.version == upsert.version) {
                existing.name = upsert.name.clone();
                existing.html_template = upsert.html_template.clone();
                existing.custom_css = upsert.custom_css.clone();
                existing.is_public = upsert.is_public;
                existing.updated_at = now;
                return Ok(existing.clone());
            }
            let template = Template {
                id: Uuid::new_v4(),
                name: upsert.name.clone(),
                version: upsert.version.clone(),
                is_public: upsert.is_public,
                is_default: false,
                html_template: upsert.html_template.clone(),
                custom_css: upsert.custom_css.clone(),
                created_at: now,
                updated_at: now,
            };
            state.templates.push(template.clone());
            Ok(template)
        })
    }

    async fn set_default_template(&self, version: &str) -> Result<Template, AppError> {
        self.mutate(|state| {
            if !state.templates.iter().any(|t| t.version == version) {
                return Err(AppError::NotFound(format!("template version {}", version)));
            }
            let mut chosen = None;
            for t in &mut state.templates {
                t.is_default = t.version == version;
                if t.is_default {
                    chosen = Some(t.clone());
                }
            }
            chosen.ok_or_else(|| AppError::NotFound(format!("template version {}", version)))
        })
    }

    async fn default_template(&self) -> Result<Option<Template>, AppError> {
        self.read(|state| Ok(state.templates.iter().find(|t| t.is_default).cloned()))
    }

    async fn template_by_version(&self, version: &str) -> Result<Option<Template>, AppError> {
        self.read(|state| Ok(state.templates.iter().find(|t| t.version == version).cloned()))
    }

    async fn list_templates(&self) -> Result<Vec<Template>, AppError> {
        self.read(|state| {
            let mut templates = state.templates.clone();
            templates.sort_by(|a, b| compare_versions(&a.version, &b.version));
            Ok(templates)
        })
    }

    async fn create_table(&self, owner: Uuid, fields: &DraftFields) -> Result<Draft, AppError> {
        self.mutate(|state| {
            let template = state
                .templates
                .iter()
                .find(|t| t.is_default)
                .ok_or_else(|| AppError::NotFound("default template".into()))?;
            let now = Utc::now();
            let table = PriceTable {
                id: Uuid::new_v4(),
                owner_id: owner,
                template_id: template.id,
                created_at: now,
                updated_at: now,
            };
            let draft = Draft {
                id: Uuid::new_v4(),
                table_id: table.id,
                name: fields.name.clone(),
                stripe_public_key: fields.stripe_public_key.clone(),
                paddle_public_key: fields.paddle_public_key.clone(),
                currency_settings: fields.currency_settings.clone(),
                payment_types: fields.payment_types.clone(),
                template_version: template.version.clone(),
                html_template: fields.html_template.clone(),
                custom_css: fields.custom_css.clone(),
                products: Vec::new(),
                feature_groups: Vec::new(),
                updated_at: now,
            };
            state.tables.push(TableRecord {
                table,
                draft: draft.clone(),
                versions: Vec::new(),
            });
            Ok(draft)
        })
    }

    async fn list_tables(&self, owner: Uuid) -> Result<Vec<TableSummary>, AppError> {
        self.read(|state| {
            let mut summaries: Vec<TableSummary> = state
                .tables
                .iter()
                .filter(|r| r.table.owner_id == owner)
                .map(|r| TableSummary {
                    id: r.table.id,
                    name: r.draft.name.clone(),
                    is_published: !r.versions.is_empty(),
                    latest_version: r.versions.iter().map(|v| v.version).max(),
                    updated_at: r.table.updated_at.max(r.draft.updated_at),
                })
                .collect();
            summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            Ok(summaries)
        })
    }

    async fn get_draft(&self, owner: Uuid, table_id: Uuid) -> Result<Draft, AppError> {
        self.read(|state| state.draft_view(state.owned(owner, table_id)?))
    }

    async fn update_draft(&self, owner: Uuid, table_id: Uuid, update: &DraftUpdate) -> Result<Draft, AppError> {
        self.mutate(|state| {
            let record = state.owned_mut(owner, table_id)?;
            let changes = DraftValidator::changes_for(&record.draft, update)?;
            let draft = &mut record.draft;
            apply_fields(draft, &changes.fields);
            if let Some(groups) = &changes.feature_groups {
                draft.feature_groups = reconcile_groups(&draft.feature_groups, groups)?;
            }
            if let Some(products) = &changes.products {
                let live: HashSet<Uuid> = draft.feature_ids().into_iter().collect();
                reconcile::check_feature_refs(products, &live)?;
                draft.products = reconcile_products(&draft.products, products)?;
            }
            prune_feature_refs(draft);
            let now = Utc::now();
            draft.updated_at = now;
            record.table.updated_at = now;
            let record = record.clone();
            state.draft_view(&record)
        })
    }

    async fn upsert_product(&self, owner: Uuid, table_id: Uuid, input: &ProductInput) -> Result<Product, AppError> {
        self.mutate(|state| {
            let record = state.owned_mut(owner, table_id)?;
            let draft = &mut record.draft;
            DraftValidator::validate_product(input, &draft.payment_types)?;
            let live: HashSet<Uuid> = draft.feature_ids().into_iter().collect();
            reconcile::check_product_feature_refs(input, &live)?;
            let product = match input.id {
                Some(id) => {
                    let slot = draft
                        .products
                        .iter_mut()
                        .find(|p| p.id == id)
                        .ok_or_else(|| AppError::NotFound(format!("product {}", id)))?;
                    *slot = build_product(Some(&*slot), id, input)?;
                    slot.clone()
                }
                None => {
                    let product = build_product(None, Uuid::new_v4(), input)?;
                    draft.products.push(product.clone());
                    product
                }
            };
            let now = Utc::now();
            draft.updated_at = now;
            record.table.updated_at = now;
            Ok(product)
        })
    }

    async fn delete_product(&self, owner: Uuid, table_id: Uuid, product_id: Uuid) -> Result<(), AppError> {
        self.mutate(|state| {
            let record = state.owned_mut(owner, table_id)?;
            let before = record.draft.products.len();
            record.draft.products.retain(|p| p.id != product_id);
            if record.draft.products.len() == before {
                return Err(AppError::NotFound(format!("product {}", product_id)));
            }
            let now = Utc::now();
            record.draft.updated_at = now;
            record.table.updated_at = now;
            Ok(())
        })
    }

    async fn set_table_template(&self, owner: Uuid, table_id: Uuid, template_id: Uuid) -> Result<(), AppError> {
        self.mutate(|state| {
            state.template(template_id)?;
            let record = state.owned_mut(owner, table_id)?;
            record.table.template_id = template_id;
            record.table.updated_at = Utc::now();
            Ok(())
        })
    }

    async fn delete_table(&self, owner: Uuid, table_id: Uuid) -> Result<(), AppError> {
        self.mutate(|state| {
            state.owned(owner, table_id)?;
            state.tables.retain(|r| r.table.id != table_id);
            Ok(())
        })
    }

    async fn publish(&self, owner: Uuid, table_id: Uuid) -> Result<PublishedVersion, AppError> {
        self.mutate(|state| {
            let draft = state.draft_view(state.owned(owner, table_id)?)?;
            let record = state.owned_mut(owner, table_id)?;
            let published = PublishedVersion {
                id: Uuid::new_v4(),
                table_id,
                version: record.versions.iter().map(|v| v.version).max().unwrap_or(0) + 1,
                published_at: Utc::now(),
                data: PublishedData::from(&draft),
            };
            record.versions.push(published.clone());
            Ok(published)
        })
    }

    async fn list_versions(&self, owner: Uuid, table_id: Uuid) -> Result<Vec<VersionSummary>, AppError> {
        self.read(|state| {
            let mut versions: Vec<VersionSummary> = state
                .owned(owner, table_id)?
                .versions
                .iter()
                .map(|v| VersionSummary {
                    version: v.version,
                    published_at: v.published_at,
                })
                .collect();
            versions.sort_by(|a, b| b.version.cmp(&a.version));
            Ok(versions)
        })
    }

    async fn published_version(&self, table_id: Uuid, version: Option<i32>) -> Result<Option<PublishedVersion>, AppError> {
        self.read(|state| {
            let Some(record) = state.tables.iter().find(|r| r.table.id == table_id) else {
                return Ok(None);
            };
            let found = match version {
                Some(n) => record.versions.iter().find(|v| v.version == n),
                None => record.versions.iter().max_by_key(|v| v.version),
            };
            Ok(found.cloned())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewTable;
    use serde_json::json;

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .upsert_template(&TemplateUpsert {
                name: None,
                version: "0.2".into(),
                html_template: "{{#each products}}{{name}}{{/each}}".into(),
                custom_css: Default::default(),
                is_public: true,
            })
            .await
            .unwrap();
        store.set_default_template("0.2").await.unwrap();
        store
    }

    fn update(body: serde_json::Value) -> DraftUpdate {
        serde_json::from_value(body).unwrap()
    }

    #[tokio::test]
    async fn failed_mutation_leaves_state_untouched() {
        let store = seeded().await;
        let owner = Uuid::new_v4();
        let draft = store
            .create_table(owner, &DraftFields::from_new(&NewTable::default()))
            .await
            .unwrap();
        let bad = update(
            json!({"name": "Renamed", "products": [{"id": Uuid::new_v4(), "name": "Ghost"}]}),
        );
        assert!(matches!(
            store.update_draft(owner, draft.table_id, &bad).await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(store.get_draft(owner, draft.table_id).await.unwrap(), draft);
    }

    #[tokio::test]
    async fn removing_a_feature_prunes_product_references() {
        let store = seeded().await;
        let owner = Uuid::new_v4();
        let draft = store
            .create_table(owner, &DraftFields::from_new(&NewTable::default()))
            .await
            .unwrap();
        let draft = store
            .update_draft(
                owner,
                draft.table_id,
                &update(json!({"featureGroups": [{"name": "Core", "features": [{"name": "SSO"}]}]})),
            )
            .await
            .unwrap();
        let sso = draft.feature_groups[0].features[0].id;
        let draft = store
            .update_draft(
                owner,
                draft.table_id,
                &update(json!({"products": [{"name": "Pro", "featureIds": [sso]}]})),
            )
            .await
            .unwrap();
        assert_eq!(draft.products[0].feature_ids, vec![sso]);

        let draft = store
            .update_draft(owner, draft.table_id, &update(json!({"featureGroups": []})))
            .await
            .unwrap();
        assert!(draft.products[0].feature_ids.is_empty());
    }
}
