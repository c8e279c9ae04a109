//! Editor, publish and render flows against the in-memory store.

use async_trait::async_trait;
use pricetable::model::{
    Draft, DraftFields, DraftUpdate, NewTable, Product, ProductInput, PublishedVersion, TableSummary, Template,
    TemplateUpsert, VersionSummary,
};
use pricetable::{AppError, DraftEditor, MemoryStore, PricingStore, Publisher, RenderEngine, TemplateService};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

async fn store_with_default(version: &str) -> MemoryStore {
    let store = MemoryStore::new();
    TemplateService::seed_builtins(&store, version).await.unwrap();
    store
}

fn update(body: Value) -> DraftUpdate {
    serde_json::from_value(body).unwrap()
}

fn product(body: Value) -> ProductInput {
    serde_json::from_value(body).unwrap()
}

async fn table(store: &MemoryStore, owner: Uuid) -> Uuid {
    DraftEditor::create(store, owner, &NewTable::default())
        .await
        .unwrap()
        .table_id
}

#[tokio::test]
async fn create_needs_a_default_template() {
    let store = MemoryStore::new();
    let err = DraftEditor::create(&store, Uuid::new_v4(), &NewTable::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn create_seeds_draft_from_defaults() {
    let store = store_with_default("0.2").await;
    let owner = Uuid::new_v4();
    let draft = DraftEditor::create(&store, owner, &NewTable::default()).await.unwrap();
    assert_eq!(draft.template_version, "0.2");
    assert_eq!(draft.currency_settings.base_currency, "USD");
    assert_eq!(draft.payment_types[0].name, "Month");
    assert!(draft.products.is_empty());
    assert!(draft.html_template.is_none());

    let listed = DraftEditor::list(&store, owner).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(!listed[0].is_published);
    assert_eq!(listed[0].latest_version, None);
}

#[tokio::test]
async fn products_are_replaced_by_diff() {
    let store = store_with_default("0.2").await;
    let owner = Uuid::new_v4();
    let table_id = table(&store, owner).await;

    let draft = DraftEditor::update(
        &store,
        owner,
        table_id,
        update(json!({"products": [
            {"name": "Basic", "prices": [{"paymentTypeName": "Month", "unitAmount": 900, "currency": "USD"}]},
            {"name": "Pro", "prices": [{"paymentTypeName": "Month", "unitAmount": 2900, "currency": "USD"}]}
        ]})),
    )
    .await
    .unwrap();
    let basic = draft.products[0].clone();
    let pro = draft.products[1].clone();

    let draft = DraftEditor::update(
        &store,
        owner,
        table_id,
        update(json!({"products": [
            {"id": pro.id, "name": "Pro+", "prices": [
                {"id": pro.prices[0].id, "paymentTypeName": "Month", "unitAmount": 3900, "currency": "USD"}
            ]},
            {"name": "Enterprise"}
        ]})),
    )
    .await
    .unwrap();

    let names: Vec<&str> = draft.products.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Pro+", "Enterprise"]);
    assert_eq!(draft.products[0].id, pro.id);
    assert_eq!(draft.products[0].prices[0].id, pro.prices[0].id);
    assert_eq!(draft.products[0].prices[0].unit_amount, 3900);
    assert!(draft.products.iter().all(|p| p.id != basic.id));
    assert!(draft.products[1].prices.is_empty());
}

#[tokio::test]
async fn foreign_ids_are_not_found_and_leave_draft_unchanged() {
    let store = store_with_default("0.2").await;
    let owner = Uuid::new_v4();
    let first = table(&store, owner).await;
    let second = table(&store, owner).await;

    let other = DraftEditor::update(
        &store,
        owner,
        second,
        update(json!({"products": [{"name": "Other", "prices": [
            {"paymentTypeName": "Month", "unitAmount": 100, "currency": "USD"}
        ]}]})),
    )
    .await
    .unwrap();
    let before = DraftEditor::update(
        &store,
        owner,
        first,
        update(json!({"products": [{"name": "Mine"}]})),
    )
    .await
    .unwrap();

    let err = DraftEditor::update(
        &store,
        owner,
        first,
        update(json!({"name": "Changed", "products": [{"id": other.products[0].id, "name": "Stolen"}]})),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = DraftEditor::update(
        &store,
        owner,
        first,
        update(json!({"products": [{"id": before.products[0].id, "name": "Mine", "prices": [
            {"id": other.products[0].prices[0].id, "paymentTypeName": "Month", "unitAmount": 1, "currency": "USD"}
        ]}]})),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    assert_eq!(DraftEditor::get_draft(&store, owner, first).await.unwrap(), before);
}

#[tokio::test]
async fn duplicate_ids_and_price_pairs_are_rejected() {
    let store = store_with_default("0.2").await;
    let owner = Uuid::new_v4();
    let table_id = table(&store, owner).await;
    let draft = DraftEditor::update(&store, owner, table_id, update(json!({"products": [{"name": "Pro"}]})))
        .await
        .unwrap();
    let id = draft.products[0].id;

    let err = DraftEditor::update(
        &store,
        owner,
        table_id,
        update(json!({"products": [{"id": id, "name": "A"}, {"id": id, "name": "B"}]})),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = DraftEditor::update(
        &store,
        owner,
        table_id,
        update(json!({"products": [{"name": "Pro", "prices": [
            {"paymentTypeName": "Month", "unitAmount": 100, "currency": "USD"},
            {"paymentTypeName": "Month", "unitAmount": 200, "currency": "USD"}
        ]}]})),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn dropping_a_payment_type_still_in_use_is_rejected() {
    let store = store_with_default("0.2").await;
    let owner = Uuid::new_v4();
    let table_id = table(&store, owner).await;
    DraftEditor::update(
        &store,
        owner,
        table_id,
        update(json!({"products": [{"name": "Pro", "prices": [
            {"paymentTypeName": "Month", "unitAmount": 100, "currency": "USD"}
        ]}]})),
    )
    .await
    .unwrap();

    let err = DraftEditor::update(
        &store,
        owner,
        table_id,
        update(json!({"paymentTypes": [{"name": "Year", "type": "cycle", "unitName": "/year"}]})),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn tables_are_invisible_to_other_owners() {
    let store = store_with_default("0.2").await;
    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();
    let table_id = table(&store, owner).await;

    assert!(matches!(
        DraftEditor::get_draft(&store, stranger, table_id).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        DraftEditor::update(&store, stranger, table_id, update(json!({"name": "x"}))).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        Publisher::publish(&store, stranger, table_id).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        DraftEditor::delete(&store, stranger, table_id).await,
        Err(AppError::NotFound(_))
    ));
    assert!(DraftEditor::list(&store, stranger).await.unwrap().is_empty());
}

#[tokio::test]
async fn publish_appends_versions() {
    let store = store_with_default("0.2").await;
    let owner = Uuid::new_v4();
    let table_id = table(&store, owner).await;

    let v1 = Publisher::publish(&store, owner, table_id).await.unwrap();
    let v2 = Publisher::publish(&store, owner, table_id).await.unwrap();
    assert_eq!(v1.version, 1);
    assert_eq!(v2.version, 2);
    assert_eq!(v1.data, v2.data);

    let versions = Publisher::list_versions(&store, owner, table_id).await.unwrap();
    let numbers: Vec<i32> = versions.iter().map(|v| v.version).collect();
    assert_eq!(numbers, vec![2, 1]);

    let listed = DraftEditor::list(&store, owner).await.unwrap();
    assert!(listed[0].is_published);
    assert_eq!(listed[0].latest_version, Some(2));
}

#[tokio::test]
async fn publishing_a_full_draft_twice_yields_identical_data() {
    let store = store_with_default("0.2").await;
    let owner = Uuid::new_v4();
    let table_id = table(&store, owner).await;
    let draft = DraftEditor::update(
        &store,
        owner,
        table_id,
        update(json!({
            "name": "Full plans",
            "currencySettings": {"availableCurrencies": ["USD", "EUR"]},
            "featureGroups": [
                {"name": "Core", "features": [{"name": "API"}, {"name": "Webhooks"}]},
                {"name": "Security", "features": [{"name": "SSO"}]}
            ],
            "products": [
                {"name": "Basic", "prices": [
                    {"paymentTypeName": "Month", "unitAmount": 900, "currency": "USD"},
                    {"paymentTypeName": "Month", "unitAmount": 800, "currency": "EUR"}
                ]},
                {"name": "Pro", "isHighlighted": true, "prices": [
                    {"paymentTypeName": "Month", "unitAmount": 2900, "currency": "USD"}
                ]}
            ]
        })),
    )
    .await
    .unwrap();
    let sso = draft.feature_groups[1].features[0].id;
    let pro = draft.products[1].id;
    DraftEditor::upsert_product(
        &store,
        owner,
        table_id,
        &product(json!({"id": pro, "name": "Pro", "isHighlighted": true, "featureIds": [sso], "prices": [
            {"id": draft.products[1].prices[0].id, "paymentTypeName": "Month", "unitAmount": 2900, "currency": "USD"}
        ]})),
    )
    .await
    .unwrap();

    let first = Publisher::publish(&store, owner, table_id).await.unwrap();
    let second = Publisher::publish(&store, owner, table_id).await.unwrap();
    assert_eq!(first.data, second.data);
    assert_eq!(first.data.products.len(), 2);
    assert_eq!(first.data.products[0].prices.len(), 2);
    assert_eq!(first.data.products[1].feature_ids, vec![sso]);
    assert_eq!(first.data.feature_groups.len(), 2);
}

/// Applies a competing edit from another request right before the wrapped update runs.
struct CompetingEdit {
    inner: MemoryStore,
    owner: Uuid,
    fired: AtomicBool,
}

#[async_trait]
impl PricingStore for CompetingEdit {
    async fn ping(&self) -> Result<(), AppError> {
        self.inner.ping().await
    }
    async fn upsert_template(&self, upsert: &TemplateUpsert) -> Result<Template, AppError> {
        self.inner.upsert_template(upsert).await
    }
    async fn set_default_template(&self, version: &str) -> Result<Template, AppError> {
        self.inner.set_default_template(version).await
    }
    async fn default_template(&self) -> Result<Option<Template>, AppError> {
        self.inner.default_template().await
    }
    async fn template_by_version(&self, version: &str) -> Result<Option<Template>, AppError> {
        self.inner.template_by_version(version).await
    }
    async fn list_templates(&self) -> Result<Vec<Template>, AppError> {
        self.inner.list_templates().await
    }
    async fn create_table(&self, owner: Uuid, fields: &DraftFields) -> Result<Draft, AppError> {
        self.inner.create_table(owner, fields).await
    }
    async fn list_tables(&self, owner: Uuid) -> Result<Vec<TableSummary>, AppError> {
        self.inner.list_tables(owner).await
    }
    async fn get_draft(&self, owner: Uuid, table_id: Uuid) -> Result<Draft, AppError> {
        self.inner.get_draft(owner, table_id).await
    }
    async fn update_draft(&self, owner: Uuid, table_id: Uuid, update: &DraftUpdate) -> Result<Draft, AppError> {
        if !self.fired.swap(true, Ordering::SeqCst) {
            let rename: DraftUpdate = serde_json::from_value(json!({"name": "Renamed elsewhere"})).unwrap();
            self.inner.update_draft(self.owner, table_id, &rename).await?;
            let monthly: ProductInput = serde_json::from_value(json!({"name": "Monthly", "prices": [
                {"paymentTypeName": "Month", "unitAmount": 500, "currency": "USD"}
            ]}))
            .unwrap();
            self.inner.upsert_product(self.owner, table_id, &monthly).await?;
        }
        self.inner.update_draft(owner, table_id, update).await
    }
    async fn upsert_product(&self, owner: Uuid, table_id: Uuid, product: &ProductInput) -> Result<Product, AppError> {
        self.inner.upsert_product(owner, table_id, product).await
    }
    async fn delete_product(&self, owner: Uuid, table_id: Uuid, product_id: Uuid) -> Result<(), AppError> {
        self.inner.delete_product(owner, table_id, product_id).await
    }
    async fn set_table_template(&self, owner: Uuid, table_id: Uuid, template_id: Uuid) -> Result<(), AppError> {
        self.inner.set_table_template(owner, table_id, template_id).await
    }
    async fn delete_table(&self, owner: Uuid, table_id: Uuid) -> Result<(), AppError> {
        self.inner.delete_table(owner, table_id).await
    }
    async fn publish(&self, owner: Uuid, table_id: Uuid) -> Result<PublishedVersion, AppError> {
        self.inner.publish(owner, table_id).await
    }
    async fn list_versions(&self, owner: Uuid, table_id: Uuid) -> Result<Vec<VersionSummary>, AppError> {
        self.inner.list_versions(owner, table_id).await
    }
    async fn published_version(&self, table_id: Uuid, version: Option<i32>) -> Result<Option<PublishedVersion>, AppError> {
        self.inner.published_version(table_id, version).await
    }
}

async fn competing_store(owner: Uuid) -> (CompetingEdit, Uuid) {
    let inner = store_with_default("0.2").await;
    let table_id = table(&inner, owner).await;
    let store = CompetingEdit {
        inner,
        owner,
        fired: AtomicBool::new(false),
    };
    (store, table_id)
}

#[tokio::test]
async fn update_merges_against_the_latest_committed_draft() {
    let owner = Uuid::new_v4();
    let (store, table_id) = competing_store(owner).await;
    let draft = DraftEditor::update(&store, owner, table_id, update(json!({"stripePublicKey": "pk_test"})))
        .await
        .unwrap();
    assert_eq!(draft.name, "Renamed elsewhere");
    assert_eq!(draft.stripe_public_key.as_deref(), Some("pk_test"));
    assert_eq!(draft.products.len(), 1);
}

#[tokio::test]
async fn payment_type_check_sees_prices_committed_by_other_requests() {
    let owner = Uuid::new_v4();
    let (store, table_id) = competing_store(owner).await;
    let err = DraftEditor::update(
        &store,
        owner,
        table_id,
        update(json!({"paymentTypes": [{"name": "Year", "type": "cycle", "unitName": "/year"}]})),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let draft = store.get_draft(owner, table_id).await.unwrap();
    assert_eq!(draft.payment_types[0].name, "Month");
    assert_eq!(draft.products[0].prices[0].payment_type_name, "Month");
}

#[tokio::test]
async fn render_serves_published_data_only() {
    let store = store_with_default("0.2").await;
    let engine = RenderEngine::new();
    let owner = Uuid::new_v4();
    let table_id = table(&store, owner).await;

    let err = Publisher::render_published(&store, &engine, table_id, None).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    DraftEditor::update(
        &store,
        owner,
        table_id,
        update(json!({"products": [
            {"name": "Starter", "prices": [{"paymentTypeName": "Month", "unitAmount": 1099, "currency": "USD"}]},
            {"name": "Scale"}
        ]})),
    )
    .await
    .unwrap();
    Publisher::publish(&store, owner, table_id).await.unwrap();

    DraftEditor::update(
        &store,
        owner,
        table_id,
        update(json!({"products": [{"name": "Unreleased"}]})),
    )
    .await
    .unwrap();

    let html = Publisher::render_published(&store, &engine, table_id, None).await.unwrap();
    assert!(html.starts_with("<style>\n"));
    let style_end = html.find("</style>").unwrap();
    let starter = html.find("Starter").unwrap();
    let scale = html.find("Scale").unwrap();
    assert!(style_end < starter && starter < scale);
    assert!(html.contains("$10.99"));
    assert!(html.contains("Price not available"));
    assert!(!html.contains("Unreleased"));

    let preview = Publisher::preview(&store, &engine, owner, table_id).await.unwrap();
    assert!(preview.contains("Unreleased"));

    Publisher::publish(&store, owner, table_id).await.unwrap();
    let latest = Publisher::render_published(&store, &engine, table_id, None).await.unwrap();
    assert!(latest.contains("Unreleased"));
    let first = Publisher::render_published(&store, &engine, table_id, Some(1)).await.unwrap();
    assert!(first.contains("Starter"));
    assert!(matches!(
        Publisher::render_published(&store, &engine, table_id, Some(9)).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn delete_removes_draft_and_versions() {
    let store = store_with_default("0.2").await;
    let engine = RenderEngine::new();
    let owner = Uuid::new_v4();
    let table_id = table(&store, owner).await;
    DraftEditor::update(&store, owner, table_id, update(json!({"products": [{"name": "Pro"}]})))
        .await
        .unwrap();
    Publisher::publish(&store, owner, table_id).await.unwrap();

    DraftEditor::delete(&store, owner, table_id).await.unwrap();

    assert!(matches!(
        DraftEditor::get_draft(&store, owner, table_id).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        Publisher::render_published(&store, &engine, table_id, None).await,
        Err(AppError::NotFound(_))
    ));
    assert!(store.published_version(table_id, Some(1)).await.unwrap().is_none());
}

#[tokio::test]
async fn single_product_operations() {
    let store = store_with_default("0.2").await;
    let owner = Uuid::new_v4();
    let table_id = table(&store, owner).await;

    let created = DraftEditor::upsert_product(
        &store,
        owner,
        table_id,
        &product(json!({"name": "Team", "prices": [
            {"paymentTypeName": "Month", "unitAmount": 4900, "currency": "USD"}
        ]})),
    )
    .await
    .unwrap();
    let fetched = DraftEditor::get_product(&store, owner, table_id, created.id).await.unwrap();
    assert_eq!(fetched, created);

    let updated = DraftEditor::upsert_product(
        &store,
        owner,
        table_id,
        &product(json!({"id": created.id, "name": "Team", "prices": [
            {"paymentTypeName": "Month", "unitAmount": 900, "currency": "EUR"}
        ]})),
    )
    .await
    .unwrap();
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.prices.len(), 1);
    assert_ne!(updated.prices[0].id, created.prices[0].id);

    let missing = product(json!({"id": Uuid::new_v4(), "name": "Ghost"}));
    assert!(matches!(
        DraftEditor::upsert_product(&store, owner, table_id, &missing).await,
        Err(AppError::NotFound(_))
    ));

    DraftEditor::delete_product(&store, owner, table_id, created.id).await.unwrap();
    assert!(matches!(
        DraftEditor::get_product(&store, owner, table_id, created.id).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn feature_references_must_exist() {
    let store = store_with_default("0.2").await;
    let owner = Uuid::new_v4();
    let table_id = table(&store, owner).await;
    let draft = DraftEditor::update(
        &store,
        owner,
        table_id,
        update(json!({"featureGroups": [{"name": "Support", "features": [{"name": "Email"}, {"name": "Phone"}]}]})),
    )
    .await
    .unwrap();
    let email = draft.feature_groups[0].features[0].id;

    let draft = DraftEditor::update(
        &store,
        owner,
        table_id,
        update(json!({"products": [{"name": "Pro", "featureIds": [email]}]})),
    )
    .await
    .unwrap();
    assert_eq!(draft.products[0].feature_ids, vec![email]);

    let err = DraftEditor::update(
        &store,
        owner,
        table_id,
        update(json!({"products": [{"name": "Pro", "featureIds": [Uuid::new_v4()]}]})),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn upgrade_moves_table_to_latest_template() {
    let store = store_with_default("0.1").await;
    let owner = Uuid::new_v4();
    let table_id = table(&store, owner).await;
    assert_eq!(DraftEditor::get_draft(&store, owner, table_id).await.unwrap().template_version, "0.1");

    let outcome = TemplateService::upgrade(&store, owner, table_id).await.unwrap();
    assert!(outcome.upgraded);
    assert_eq!(outcome.message, "Upgraded to template version 0.2");
    assert_eq!(DraftEditor::get_draft(&store, owner, table_id).await.unwrap().template_version, "0.2");

    let again = TemplateService::upgrade(&store, owner, table_id).await.unwrap();
    assert!(!again.upgraded);
    assert_eq!(again.message, "Already using the latest template version");
}

#[tokio::test]
async fn customize_copies_template_into_draft() {
    let store = store_with_default("0.2").await;
    let owner = Uuid::new_v4();
    let table_id = table(&store, owner).await;

    let draft = TemplateService::customize(&store, owner, table_id).await.unwrap();
    let template = store.template_by_version("0.2").await.unwrap().unwrap();
    assert_eq!(draft.html_template.as_deref(), Some(template.html_template.as_str()));
    assert_eq!(draft.custom_css, template.custom_css);
}

#[tokio::test]
async fn update_default_switches_the_single_default() {
    let store = store_with_default("0.2").await;
    let input = TemplateUpsert {
        name: Some("Compact".into()),
        version: "0.3".into(),
        html_template: "<ul>{{#each products}}<li>{{name}}</li>{{/each}}</ul>".into(),
        custom_css: serde_json::Map::new(),
        is_public: true,
    };
    let template = TemplateService::update_default(&store, &input).await.unwrap();
    assert!(template.is_default);

    let defaults: Vec<String> = store
        .list_templates()
        .await
        .unwrap()
        .into_iter()
        .filter(|t| t.is_default)
        .map(|t| t.version)
        .collect();
    assert_eq!(defaults, vec!["0.3".to_string()]);
    assert_eq!(TemplateService::latest(&store).await.unwrap().version, "0.3");

    let owner = Uuid::new_v4();
    let draft = DraftEditor::create(&store, owner, &NewTable::default()).await.unwrap();
    assert_eq!(draft.template_version, "0.3");

    let broken = TemplateUpsert {
        html_template: "{{#each products}}".into(),
        version: "0.4".into(),
        ..input
    };
    assert!(matches!(
        TemplateService::update_default(&store, &broken).await,
        Err(AppError::Validation(_))
    ));
}
