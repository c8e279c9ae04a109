//! PostgreSQL store. Each mutation is one transaction: the owning `price_tables` row is locked first,
//! then child rows are reconciled against the inbound arrays.

use super::{table_not_found, PricingStore};
use crate::error::AppError;
use crate::migration::qualified_table;
use crate::model::{
    CssRules, CurrencySettings, Draft, DraftFields, DraftUpdate, Feature, FeatureGroup, FeatureGroupInput,
    FeatureInput, PaymentType, Price, PriceInput, Product, ProductInput, PublishedData, PublishedVersion,
    TableSummary, Template, TemplateUpsert, UsageTier, VersionSummary,
};
use crate::service::reconcile::{self, Action, Step};
use crate::service::DraftValidator;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{ConnectOptions, FromRow, PgConnection, PgPool};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

const TEMPLATE_COLUMNS: &str =
    "id, name, version, is_public, is_default, html_template, custom_css, created_at, updated_at";

const DUPLICATE_PRICE: &str = "a product has more than one price for the same payment type and currency";

#[derive(FromRow)]
struct TemplateRow {
    id: Uuid,
    name: Option<String>,
    version: String,
    is_public: bool,
    is_default: bool,
    html_template: String,
    custom_css: Json<CssRules>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TemplateRow> for Template {
    fn from(row: TemplateRow) -> Self {
        Template {
            id: row.id,
            name: row.name,
            version: row.version,
            is_public: row.is_public,
            is_default: row.is_default,
            html_template: row.html_template,
            custom_css: row.custom_css.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct DraftRow {
    id: Uuid,
    table_id: Uuid,
    name: String,
    stripe_public_key: Option<String>,
    paddle_public_key: Option<String>,
    currency_settings: Json<CurrencySettings>,
    payment_types: Json<Vec<PaymentType>>,
    template_version: String,
    html_template: Option<String>,
    custom_css: Json<CssRules>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct GroupRow {
    id: Uuid,
    name: String,
    description: String,
    image_url: Option<String>,
}

#[derive(FromRow)]
struct FeatureRow {
    id: Uuid,
    group_id: Uuid,
    name: String,
    description: String,
    image_url: Option<String>,
    available_feature_icon_url: Option<String>,
    unavailable_feature_icon_url: Option<String>,
}

#[derive(FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    description: String,
    is_highlighted: bool,
    highlight_text: Option<String>,
    button_text: Option<String>,
    button_link: Option<String>,
    stripe_product_id: Option<String>,
    paddle_product_id: Option<String>,
    feature_ids: Vec<Uuid>,
}

#[derive(FromRow)]
struct PriceRow {
    id: Uuid,
    product_id: Uuid,
    payment_type_name: String,
    unit_amount: i64,
    currency: String,
    checkout_url: Option<String>,
    usage_tiers: Option<Json<Vec<UsageTier>>>,
}

#[derive(FromRow)]
struct VersionRow {
    id: Uuid,
    table_id: Uuid,
    version: i32,
    published_at: DateTime<Utc>,
    data: Json<PublishedData>,
}

impl From<VersionRow> for PublishedVersion {
    fn from(row: VersionRow) -> Self {
        PublishedVersion {
            id: row.id,
            table_id: row.table_id,
            version: row.version,
            published_at: row.published_at,
            data: row.data.0,
        }
    }
}

#[derive(FromRow)]
struct SummaryRow {
    id: Uuid,
    name: String,
    latest_version: Option<i32>,
    updated_at: DateTime<Utc>,
}

pub struct PgStore {
    pool: PgPool,
    schema: String,
}

impl PgStore {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        PgStore {
            pool,
            schema: schema.into(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn t(&self, table: &str) -> String {
        qualified_table(&self.schema, table)
    }

    /// Locks the table row for the rest of the transaction and returns its draft id.
    async fn lock_owned(&self, conn: &mut PgConnection, owner: Uuid, table_id: Uuid) -> Result<Uuid, AppError> {
        let row: Option<(Uuid,)> = sqlx::query_as(&format!(
            "SELECT d.id FROM {} pt JOIN {} d ON d.table_id = pt.id WHERE pt.id = $1 AND pt.owner_id = $2 FOR UPDATE OF pt",
            self.t("price_tables"),
            self.t("drafts")
        ))
        .bind(table_id)
        .bind(owner)
        .fetch_optional(&mut *conn)
        .await?;
        row.map(|r| r.0).ok_or_else(|| table_not_found(table_id))
    }

    async fn touch(&self, conn: &mut PgConnection, table_id: Uuid, draft_id: Uuid) -> Result<(), AppError> {
        sqlx::query(&format!("UPDATE {} SET updated_at = NOW() WHERE id = $1", self.t("drafts")))
            .bind(draft_id)
            .execute(&mut *conn)
            .await?;
        sqlx::query(&format!("UPDATE {} SET updated_at = NOW() WHERE id = $1", self.t("price_tables")))
            .bind(table_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn load_draft(&self, conn: &mut PgConnection, owner: Uuid, table_id: Uuid) -> Result<Draft, AppError> {
        let row: DraftRow = sqlx::query_as(&format!(
            r#"
            SELECT d.id, d.table_id, d.name, d.stripe_public_key, d.paddle_public_key, d.currency_settings,
                   d.payment_types, t.version AS template_version, d.html_template, d.custom_css, d.updated_at
            FROM {} d
            JOIN {} pt ON pt.id = d.table_id
            JOIN {} t ON t.id = pt.template_id
            WHERE pt.id = $1 AND pt.owner_id = $2
            "#,
            self.t("drafts"),
            self.t("price_tables"),
            self.t("templates")
        ))
        .bind(table_id)
        .bind(owner)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| table_not_found(table_id))?;

        let feature_groups = self.load_groups(conn, row.id).await?;
        let products = self.load_products(conn, row.id).await?;
        Ok(Draft {
            id: row.id,
            table_id: row.table_id,
            name: row.name,
            stripe_public_key: row.stripe_public_key,
            paddle_public_key: row.paddle_public_key,
            currency_settings: row.currency_settings.0,
            payment_types: row.payment_types.0,
            template_version: row.template_version,
            html_template: row.html_template,
            custom_css: row.custom_css.0,
            products,
            feature_groups,
            updated_at: row.updated_at,
        })
    }

    async fn load_groups(&self, conn: &mut PgConnection, draft_id: Uuid) -> Result<Vec<FeatureGroup>, AppError> {
        let groups: Vec<GroupRow> = sqlx::query_as(&format!(
            "SELECT id, name, description, image_url FROM {} WHERE draft_id = $1 ORDER BY position",
            self.t("feature_groups")
        ))
        .bind(draft_id)
        .fetch_all(&mut *conn)
        .await?;
        let features: Vec<FeatureRow> = sqlx::query_as(&format!(
            r#"
            SELECT f.id, f.group_id, f.name, f.description, f.image_url,
                   f.available_feature_icon_url, f.unavailable_feature_icon_url
            FROM {} f JOIN {} g ON g.id = f.group_id
            WHERE g.draft_id = $1
            ORDER BY f.position
            "#,
            self.t("features"),
            self.t("feature_groups")
        ))
        .bind(draft_id)
        .fetch_all(&mut *conn)
        .await?;

        let mut by_group: HashMap<Uuid, Vec<Feature>> = HashMap::new();
        for f in features {
            by_group.entry(f.group_id).or_default().push(Feature {
                id: f.id,
                name: f.name,
                description: f.description,
                image_url: f.image_url,
                available_feature_icon_url: f.available_feature_icon_url,
                unavailable_feature_icon_url: f.unavailable_feature_icon_url,
            });
        }
        Ok(groups
            .into_iter()
            .map(|g| FeatureGroup {
                features: by_group.remove(&g.id).unwrap_or_default(),
                id: g.id,
                name: g.name,
                description: g.description,
                image_url: g.image_url,
            })
            .collect())
    }

    async fn load_products(&self, conn: &mut PgConnection, draft_id: Uuid) -> Result<Vec<Product>, AppError> {
        let products: Vec<ProductRow> = sqlx::query_as(&format!(
            r#"
            SELECT id, name, description, is_highlighted, highlight_text, button_text, button_link,
                   stripe_product_id, paddle_product_id, feature_ids
            FROM {} WHERE draft_id = $1 ORDER BY position
            "#,
            self.t("products")
        ))
        .bind(draft_id)
        .fetch_all(&mut *conn)
        .await?;
        let prices: Vec<PriceRow> = sqlx::query_as(&format!(
            r#"
            SELECT p.id, p.product_id, p.payment_type_name, p.unit_amount, p.currency, p.checkout_url, p.usage_tiers
            FROM {} p JOIN {} pr ON pr.id = p.product_id
            WHERE pr.draft_id = $1
            ORDER BY p.position
            "#,
            self.t("prices"),
            self.t("products")
        ))
        .bind(draft_id)
        .fetch_all(&mut *conn)
        .await?;

        let mut by_product: HashMap<Uuid, Vec<Price>> = HashMap::new();
        for p in prices {
            by_product.entry(p.product_id).or_default().push(Price {
                id: p.id,
                payment_type_name: p.payment_type_name,
                unit_amount: p.unit_amount,
                currency: p.currency,
                checkout_url: p.checkout_url,
                usage_tiers: p.usage_tiers.map(|j| j.0),
            });
        }
        Ok(products
            .into_iter()
            .map(|p| Product {
                prices: by_product.remove(&p.id).unwrap_or_default(),
                id: p.id,
                name: p.name,
                description: p.description,
                is_highlighted: p.is_highlighted,
                highlight_text: p.highlight_text,
                button_text: p.button_text,
                button_link: p.button_link,
                stripe_product_id: p.stripe_product_id,
                paddle_product_id: p.paddle_product_id,
                feature_ids: p.feature_ids,
            })
            .collect())
    }

    async fn child_ids(&self, conn: &mut PgConnection, table: &str, parent_col: &str, parent: Uuid) -> Result<Vec<Uuid>, AppError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(&format!(
            "SELECT id FROM {} WHERE {} = $1 ORDER BY position",
            self.t(table),
            parent_col
        ))
        .bind(parent)
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    async fn delete_ids(&self, conn: &mut PgConnection, table: &str, ids: &[Uuid]) -> Result<(), AppError> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query(&format!("DELETE FROM {} WHERE id = ANY($1)", self.t(table)))
            .bind(ids)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn write_fields(&self, conn: &mut PgConnection, draft_id: Uuid, fields: &DraftFields) -> Result<(), AppError> {
        sqlx::query(&format!(
            r#"
            UPDATE {} SET name = $2, stripe_public_key = $3, paddle_public_key = $4, currency_settings = $5,
                payment_types = $6, html_template = $7, custom_css = $8, updated_at = NOW()
            WHERE id = $1
            "#,
            self.t("drafts")
        ))
        .bind(draft_id)
        .bind(&fields.name)
        .bind(&fields.stripe_public_key)
        .bind(&fields.paddle_public_key)
        .bind(Json(&fields.currency_settings))
        .bind(Json(&fields.payment_types))
        .bind(&fields.html_template)
        .bind(Json(&fields.custom_css))
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn reconcile_groups(&self, conn: &mut PgConnection, draft_id: Uuid, inbound: &[FeatureGroupInput]) -> Result<(), AppError> {
        let persisted = self.child_ids(conn, "feature_groups", "draft_id", draft_id).await?;
        let plan = reconcile::plan("feature group", &persisted, inbound)?;
        self.delete_ids(conn, "feature_groups", &plan.delete).await?;
        for step in &plan.steps {
            self.write_group(conn, draft_id, step).await?;
            let existing = match step.action {
                Action::Update => self.child_ids(conn, "features", "group_id", step.id).await?,
                Action::Insert => Vec::new(),
            };
            let features = reconcile::plan("feature", &existing, &step.item.features)?;
            self.delete_ids(conn, "features", &features.delete).await?;
            for feature in &features.steps {
                self.write_feature(conn, step.id, feature).await?;
            }
        }
        tracing::debug!(
            %draft_id,
            updated = plan.updated(),
            inserted = plan.inserted(),
            deleted = plan.delete.len(),
            "reconciled feature groups"
        );
        Ok(())
    }

    async fn write_group(&self, conn: &mut PgConnection, draft_id: Uuid, step: &Step<'_, FeatureGroupInput>) -> Result<(), AppError> {
        let g = step.item;
        let sql = match step.action {
            Action::Update => format!(
                "UPDATE {} SET position = $3, name = $4, description = $5, image_url = $6 WHERE id = $1 AND draft_id = $2",
                self.t("feature_groups")
            ),
            Action::Insert => format!(
                "INSERT INTO {} (id, draft_id, position, name, description, image_url) VALUES ($1, $2, $3, $4, $5, $6)",
                self.t("feature_groups")
            ),
        };
        sqlx::query(&sql)
            .bind(step.id)
            .bind(draft_id)
            .bind(step.position)
            .bind(&g.name)
            .bind(&g.description)
            .bind(&g.image_url)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn write_feature(&self, conn: &mut PgConnection, group_id: Uuid, step: &Step<'_, FeatureInput>) -> Result<(), AppError> {
        let f = step.item;
        let sql = match step.action {
            Action::Update => format!(
                r#"UPDATE {} SET position = $3, name = $4, description = $5, image_url = $6,
                   available_feature_icon_url = $7, unavailable_feature_icon_url = $8
                   WHERE id = $1 AND group_id = $2"#,
                self.t("features")
            ),
            Action::Insert => format!(
                r#"INSERT INTO {} (id, group_id, position, name, description, image_url,
                   available_feature_icon_url, unavailable_feature_icon_url)
                   VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
                self.t("features")
            ),
        };
        sqlx::query(&sql)
            .bind(step.id)
            .bind(group_id)
            .bind(step.position)
            .bind(&f.name)
            .bind(&f.description)
            .bind(&f.image_url)
            .bind(&f.available_feature_icon_url)
            .bind(&f.unavailable_feature_icon_url)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn live_feature_ids(&self, conn: &mut PgConnection, draft_id: Uuid) -> Result<HashSet<Uuid>, AppError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(&format!(
            "SELECT f.id FROM {} f JOIN {} g ON g.id = f.group_id WHERE g.draft_id = $1",
            self.t("features"),
            self.t("feature_groups")
        ))
        .bind(draft_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    async fn reconcile_products(&self, conn: &mut PgConnection, draft_id: Uuid, inbound: &[ProductInput]) -> Result<(), AppError> {
        let persisted = self.child_ids(conn, "products", "draft_id", draft_id).await?;
        let plan = reconcile::plan("product", &persisted, inbound)?;
        self.delete_ids(conn, "products", &plan.delete).await?;
        for step in &plan.steps {
            self.write_product(conn, draft_id, step.id, step.position, step.action, step.item)
                .await?;
        }
        tracing::debug!(
            %draft_id,
            updated = plan.updated(),
            inserted = plan.inserted(),
            deleted = plan.delete.len(),
            "reconciled products"
        );
        Ok(())
    }

    /// Writes one product row and reconciles its prices.
    async fn write_product(
        &self,
        conn: &mut PgConnection,
        draft_id: Uuid,
        id: Uuid,
        position: i32,
        action: Action,
        p: &ProductInput,
    ) -> Result<(), AppError> {
        let sql = match action {
            Action::Update => format!(
                r#"UPDATE {} SET position = $3, name = $4, description = $5, is_highlighted = $6, highlight_text = $7,
                   button_text = $8, button_link = $9, stripe_product_id = $10, paddle_product_id = $11, feature_ids = $12
                   WHERE id = $1 AND draft_id = $2"#,
                self.t("products")
            ),
            Action::Insert => format!(
                r#"INSERT INTO {} (id, draft_id, position, name, description, is_highlighted, highlight_text,
                   button_text, button_link, stripe_product_id, paddle_product_id, feature_ids)
                   VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"#,
                self.t("products")
            ),
        };
        sqlx::query(&sql)
            .bind(id)
            .bind(draft_id)
            .bind(position)
            .bind(&p.name)
            .bind(&p.description)
            .bind(p.is_highlighted)
            .bind(&p.highlight_text)
            .bind(&p.button_text)
            .bind(&p.button_link)
            .bind(&p.stripe_product_id)
            .bind(&p.paddle_product_id)
            .bind(&p.feature_ids)
            .execute(&mut *conn)
            .await?;

        let existing = match action {
            Action::Update => self.child_ids(conn, "prices", "product_id", id).await?,
            Action::Insert => Vec::new(),
        };
        let prices = reconcile::plan("price", &existing, &p.prices)?;
        self.delete_ids(conn, "prices", &prices.delete).await?;
        for step in &prices.steps {
            self.write_price(conn, id, step).await?;
        }
        Ok(())
    }

    async fn write_price(&self, conn: &mut PgConnection, product_id: Uuid, step: &Step<'_, PriceInput>) -> Result<(), AppError> {
        let p = step.item;
        let sql = match step.action {
            Action::Update => format!(
                r#"UPDATE {} SET position = $3, payment_type_name = $4, unit_amount = $5, currency = $6,
                   checkout_url = $7, usage_tiers = $8
                   WHERE id = $1 AND product_id = $2"#,
                self.t("prices")
            ),
            Action::Insert => format!(
                r#"INSERT INTO {} (id, product_id, position, payment_type_name, unit_amount, currency, checkout_url, usage_tiers)
                   VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
                self.t("prices")
            ),
        };
        sqlx::query(&sql)
            .bind(step.id)
            .bind(product_id)
            .bind(step.position)
            .bind(&p.payment_type_name)
            .bind(p.unit_amount)
            .bind(&p.currency)
            .bind(&p.checkout_url)
            .bind(p.usage_tiers.as_ref().map(Json))
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Drops product references to features the draft no longer has, keeping order.
    async fn prune_feature_refs(&self, conn: &mut PgConnection, draft_id: Uuid) -> Result<(), AppError> {
        sqlx::query(&format!(
            r#"
            UPDATE {products} p SET feature_ids = ARRAY(
                SELECT u.fid FROM unnest(p.feature_ids) WITH ORDINALITY AS u(fid, ord)
                WHERE u.fid IN (
                    SELECT f.id FROM {features} f JOIN {groups} g ON g.id = f.group_id WHERE g.draft_id = $1
                )
                ORDER BY u.ord
            )
            WHERE p.draft_id = $1
            "#,
            products = self.t("products"),
            features = self.t("features"),
            groups = self.t("feature_groups")
        ))
        .bind(draft_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PricingStore for PgStore {
    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn upsert_template(&self, upsert: &TemplateUpsert) -> Result<Template, AppError> {
        let row: TemplateRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO {} (id, name, version, is_public, html_template, custom_css)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (version) DO UPDATE SET
                name = EXCLUDED.name,
                is_public = EXCLUDED.is_public,
                html_template = EXCLUDED.html_template,
                custom_css = EXCLUDED.custom_css,
                updated_at = NOW()
            RETURNING {}
            "#,
            self.t("templates"),
            TEMPLATE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&upsert.name)
        .bind(&upsert.version)
        .bind(upsert.is_public)
        .bind(&upsert.html_template)
        .bind(Json(&upsert.custom_css))
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn set_default_template(&self, version: &str) -> Result<Template, AppError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!(
            "UPDATE {} SET is_default = FALSE WHERE is_default AND version <> $1",
            self.t("templates")
        ))
        .bind(version)
        .execute(&mut *tx)
        .await?;
        let row: Option<TemplateRow> = sqlx::query_as(&format!(
            "UPDATE {} SET is_default = TRUE WHERE version = $1 RETURNING {}",
            self.t("templates"),
            TEMPLATE_COLUMNS
        ))
        .bind(version)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::from_unique(e, "another template is already the default"))?;
        let row = row.ok_or_else(|| AppError::NotFound(format!("template version {}", version)))?;
        tx.commit().await?;
        Ok(row.into())
    }

    async fn default_template(&self) -> Result<Option<Template>, AppError> {
        let row: Option<TemplateRow> = sqlx::query_as(&format!(
            "SELECT {} FROM {} WHERE is_default",
            TEMPLATE_COLUMNS,
            self.t("templates")
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Template::from))
    }

    async fn template_by_version(&self, version: &str) -> Result<Option<Template>, AppError> {
        let row: Option<TemplateRow> = sqlx::query_as(&format!(
            "SELECT {} FROM {} WHERE version = $1",
            TEMPLATE_COLUMNS,
            self.t("templates")
        ))
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Template::from))
    }

    async fn list_templates(&self) -> Result<Vec<Template>, AppError> {
        let rows: Vec<TemplateRow> = sqlx::query_as(&format!(
            "SELECT {} FROM {}",
            TEMPLATE_COLUMNS,
            self.t("templates")
        ))
        .fetch_all(&self.pool)
        .await?;
        let mut templates: Vec<Template> = rows.into_iter().map(Template::from).collect();
        templates.sort_by(|a, b| crate::model::compare_versions(&a.version, &b.version));
        Ok(templates)
    }

    async fn create_table(&self, owner: Uuid, fields: &DraftFields) -> Result<Draft, AppError> {
        let mut tx = self.pool.begin().await?;
        let template: (Uuid,) = sqlx::query_as(&format!(
            "SELECT id FROM {} WHERE is_default FOR SHARE",
            self.t("templates")
        ))
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("default template".into()))?;

        let table_id = Uuid::new_v4();
        sqlx::query(&format!(
            "INSERT INTO {} (id, owner_id, template_id) VALUES ($1, $2, $3)",
            self.t("price_tables")
        ))
        .bind(table_id)
        .bind(owner)
        .bind(template.0)
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!(
            r#"
            INSERT INTO {} (id, table_id, name, stripe_public_key, paddle_public_key, currency_settings,
                payment_types, html_template, custom_css)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
            self.t("drafts")
        ))
        .bind(Uuid::new_v4())
        .bind(table_id)
        .bind(&fields.name)
        .bind(&fields.stripe_public_key)
        .bind(&fields.paddle_public_key)
        .bind(Json(&fields.currency_settings))
        .bind(Json(&fields.payment_types))
        .bind(&fields.html_template)
        .bind(Json(&fields.custom_css))
        .execute(&mut *tx)
        .await?;

        let draft = self.load_draft(&mut tx, owner, table_id).await?;
        tx.commit().await?;
        Ok(draft)
    }

    async fn list_tables(&self, owner: Uuid) -> Result<Vec<TableSummary>, AppError> {
        let rows: Vec<SummaryRow> = sqlx::query_as(&format!(
            r#"
            SELECT pt.id, d.name, MAX(v.version) AS latest_version,
                   GREATEST(pt.updated_at, d.updated_at) AS updated_at
            FROM {} pt
            JOIN {} d ON d.table_id = pt.id
            LEFT JOIN {} v ON v.table_id = pt.id
            WHERE pt.owner_id = $1
            GROUP BY pt.id, pt.updated_at, d.name, d.updated_at
            ORDER BY GREATEST(pt.updated_at, d.updated_at) DESC
            "#,
            self.t("price_tables"),
            self.t("drafts"),
            self.t("published_versions")
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| TableSummary {
                id: r.id,
                name: r.name,
                is_published: r.latest_version.is_some(),
                latest_version: r.latest_version,
                updated_at: r.updated_at,
            })
            .collect())
    }

    async fn get_draft(&self, owner: Uuid, table_id: Uuid) -> Result<Draft, AppError> {
        let mut conn = self.pool.acquire().await?;
        self.load_draft(&mut conn, owner, table_id).await
    }

    async fn update_draft(&self, owner: Uuid, table_id: Uuid, update: &DraftUpdate) -> Result<Draft, AppError> {
        let mut tx = self.pool.begin().await?;
        let draft_id = self.lock_owned(&mut tx, owner, table_id).await?;
        let current = self.load_draft(&mut tx, owner, table_id).await?;
        let changes = DraftValidator::changes_for(&current, update)?;
        self.write_fields(&mut tx, draft_id, &changes.fields).await?;
        if let Some(groups) = &changes.feature_groups {
            self.reconcile_groups(&mut tx, draft_id, groups).await?;
        }
        if let Some(products) = &changes.products {
            let live = self.live_feature_ids(&mut tx, draft_id).await?;
            reconcile::check_feature_refs(products, &live)?;
            self.reconcile_products(&mut tx, draft_id, products).await?;
        }
        self.prune_feature_refs(&mut tx, draft_id).await?;
        self.touch(&mut tx, table_id, draft_id).await?;
        let draft = self.load_draft(&mut tx, owner, table_id).await?;
        tx.commit().await.map_err(|e| AppError::from_unique(e, DUPLICATE_PRICE))?;
        Ok(draft)
    }

    async fn upsert_product(&self, owner: Uuid, table_id: Uuid, product: &ProductInput) -> Result<Product, AppError> {
        let mut tx = self.pool.begin().await?;
        let draft_id = self.lock_owned(&mut tx, owner, table_id).await?;
        let (payment_types,): (Json<Vec<PaymentType>>,) =
            sqlx::query_as(&format!("SELECT payment_types FROM {} WHERE id = $1", self.t("drafts")))
                .bind(draft_id)
                .fetch_one(&mut *tx)
                .await?;
        DraftValidator::validate_product(product, &payment_types.0)?;
        let live = self.live_feature_ids(&mut tx, draft_id).await?;
        reconcile::check_product_feature_refs(product, &live)?;

        let (id, action, position) = match product.id {
            Some(id) => {
                let row: Option<(i32,)> = sqlx::query_as(&format!(
                    "SELECT position FROM {} WHERE id = $1 AND draft_id = $2",
                    self.t("products")
                ))
                .bind(id)
                .bind(draft_id)
                .fetch_optional(&mut *tx)
                .await?;
                let position = row.ok_or_else(|| AppError::NotFound(format!("product {}", id)))?.0;
                (id, Action::Update, position)
            }
            None => {
                let next: (i32,) = sqlx::query_as(&format!(
                    "SELECT COALESCE(MAX(position) + 1, 0) FROM {} WHERE draft_id = $1",
                    self.t("products")
                ))
                .bind(draft_id)
                .fetch_one(&mut *tx)
                .await?;
                (Uuid::new_v4(), Action::Insert, next.0)
            }
        };
        self.write_product(&mut tx, draft_id, id, position, action, product).await?;
        self.touch(&mut tx, table_id, draft_id).await?;
        let saved = self
            .load_products(&mut tx, draft_id)
            .await?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| AppError::NotFound(format!("product {}", id)))?;
        tx.commit().await.map_err(|e| AppError::from_unique(e, DUPLICATE_PRICE))?;
        Ok(saved)
    }

    async fn delete_product(&self, owner: Uuid, table_id: Uuid, product_id: Uuid) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        let draft_id = self.lock_owned(&mut tx, owner, table_id).await?;
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE id = $1 AND draft_id = $2",
            self.t("products")
        ))
        .bind(product_id)
        .bind(draft_id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("product {}", product_id)));
        }
        self.touch(&mut tx, table_id, draft_id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn set_table_template(&self, owner: Uuid, table_id: Uuid, template_id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET template_id = $3, updated_at = NOW() WHERE id = $1 AND owner_id = $2",
            self.t("price_tables")
        ))
        .bind(table_id)
        .bind(owner)
        .bind(template_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(table_not_found(table_id));
        }
        Ok(())
    }

    async fn delete_table(&self, owner: Uuid, table_id: Uuid) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        let draft_id = self.lock_owned(&mut tx, owner, table_id).await?;
        let statements = [
            (
                format!(
                    "DELETE FROM {} WHERE product_id IN (SELECT id FROM {} WHERE draft_id = $1)",
                    self.t("prices"),
                    self.t("products")
                ),
                draft_id,
            ),
            (format!("DELETE FROM {} WHERE draft_id = $1", self.t("products")), draft_id),
            (
                format!(
                    "DELETE FROM {} WHERE group_id IN (SELECT id FROM {} WHERE draft_id = $1)",
                    self.t("features"),
                    self.t("feature_groups")
                ),
                draft_id,
            ),
            (format!("DELETE FROM {} WHERE draft_id = $1", self.t("feature_groups")), draft_id),
            (format!("DELETE FROM {} WHERE id = $1", self.t("drafts")), draft_id),
            (format!("DELETE FROM {} WHERE table_id = $1", self.t("published_versions")), table_id),
            (format!("DELETE FROM {} WHERE id = $1", self.t("price_tables")), table_id),
        ];
        for (sql, id) in &statements {
            sqlx::query(sql).bind(id).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn publish(&self, owner: Uuid, table_id: Uuid) -> Result<PublishedVersion, AppError> {
        let mut tx = self.pool.begin().await?;
        self.lock_owned(&mut tx, owner, table_id).await?;
        let draft = self.load_draft(&mut tx, owner, table_id).await?;
        let row: VersionRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO {table} (id, table_id, version, data)
            SELECT $1, $2, COALESCE(MAX(version), 0) + 1, $3 FROM {table} WHERE table_id = $2
            RETURNING id, table_id, version, published_at, data
            "#,
            table = self.t("published_versions")
        ))
        .bind(Uuid::new_v4())
        .bind(table_id)
        .bind(Json(PublishedData::from(&draft)))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::from_unique(e, "concurrent publish"))?;
        tx.commit().await?;
        Ok(row.into())
    }

    async fn list_versions(&self, owner: Uuid, table_id: Uuid) -> Result<Vec<VersionSummary>, AppError> {
        let owned: Option<(Uuid,)> = sqlx::query_as(&format!(
            "SELECT id FROM {} WHERE id = $1 AND owner_id = $2",
            self.t("price_tables")
        ))
        .bind(table_id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;
        if owned.is_none() {
            return Err(table_not_found(table_id));
        }
        let rows: Vec<(i32, DateTime<Utc>)> = sqlx::query_as(&format!(
            "SELECT version, published_at FROM {} WHERE table_id = $1 ORDER BY version DESC",
            self.t("published_versions")
        ))
        .bind(table_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(version, published_at)| VersionSummary { version, published_at })
            .collect())
    }

    async fn published_version(&self, table_id: Uuid, version: Option<i32>) -> Result<Option<PublishedVersion>, AppError> {
        let row: Option<VersionRow> = sqlx::query_as(&format!(
            r#"
            SELECT id, table_id, version, published_at, data FROM {}
            WHERE table_id = $1 AND ($2::INTEGER IS NULL OR version = $2)
            ORDER BY version DESC
            LIMIT 1
            "#,
            self.t("published_versions")
        ))
        .bind(table_id)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(PublishedVersion::from))
    }
}

/// Runs `attempt` until it succeeds or `retries` extra attempts have failed, sleeping `delay` in between.
async fn with_retry<T, F, Fut>(what: &str, retries: u32, delay: Duration, mut attempt: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut tries = 0;
    loop {
        tries += 1;
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if tries <= retries => {
                tracing::warn!(attempt = tries, retries, error = %e, "{} failed, retrying", what);
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(AppError::Db(e)),
        }
    }
}

/// Builds the pool, retrying while the database is still coming up.
pub async fn connect_with_retry(
    database_url: &str,
    max_connections: u32,
    retries: u32,
    delay: Duration,
) -> Result<PgPool, AppError> {
    with_retry("database connect", retries, delay, || {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
    })
    .await
}

/// Ensure the database in `database_url` exists; create it if not. Connects to the
/// `postgres` maintenance database to run CREATE DATABASE, retrying while the server is
/// still coming up. Call before building the main pool.
pub async fn ensure_database_exists(database_url: &str, retries: u32, delay: Duration) -> Result<(), AppError> {
    let (admin_url, db_name) = split_database_name(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = PgConnectOptions::from_str(&admin_url)
        .map_err(|e| AppError::BadRequest(format!("invalid DATABASE_URL: {}", e)))?;
    let opts = &opts;
    let mut conn: PgConnection = with_retry("maintenance connect", retries, delay, move || opts.connect()).await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&db_name)))
            .execute(&mut conn)
            .await?;
        tracing::info!(database = %db_name, "created database");
    }
    Ok(())
}

fn split_database_name(url: &str) -> Result<(String, String), AppError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| AppError::BadRequest("DATABASE_URL: no path".into()))?
        + 1;
    let db_name = url
        .get(path_start..)
        .unwrap_or("")
        .split('?')
        .next()
        .unwrap_or("")
        .trim();
    let base = url.get(..path_start).unwrap_or(url);
    Ok((format!("{}postgres", base), db_name.to_string()))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
