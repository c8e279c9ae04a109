//! Idempotent DDL for the pricing tables. Everything lives in one schema (`PRICETABLE_SCHEMA`, default `pricetable`).
//! Child rows cascade on delete; the per-product price uniqueness is deferred to commit.

use crate::error::AppError;
use sqlx::PgPool;

/// Schema-qualified table name, e.g. `pricetable.products`.
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", schema, table)
}

fn ddl(schema: &str) -> Vec<String> {
    let t = |name: &str| qualified_table(schema, name);
    vec![
        format!("CREATE SCHEMA IF NOT EXISTS {}", schema),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id UUID PRIMARY KEY,
                name TEXT,
                version TEXT NOT NULL UNIQUE,
                is_public BOOLEAN NOT NULL DEFAULT TRUE,
                is_default BOOLEAN NOT NULL DEFAULT FALSE,
                html_template TEXT NOT NULL,
                custom_css JSONB NOT NULL DEFAULT '{{}}',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            t("templates")
        ),
        format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS templates_single_default ON {} (is_default) WHERE is_default",
            t("templates")
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id UUID PRIMARY KEY,
                owner_id UUID NOT NULL,
                template_id UUID NOT NULL REFERENCES {}(id),
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            t("price_tables"),
            t("templates")
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS price_tables_owner ON {} (owner_id)",
            t("price_tables")
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id UUID PRIMARY KEY,
                table_id UUID NOT NULL UNIQUE REFERENCES {}(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                stripe_public_key TEXT,
                paddle_public_key TEXT,
                currency_settings JSONB NOT NULL,
                payment_types JSONB NOT NULL,
                html_template TEXT,
                custom_css JSONB NOT NULL DEFAULT '{{}}',
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            t("drafts"),
            t("price_tables")
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id UUID PRIMARY KEY,
                draft_id UUID NOT NULL REFERENCES {}(id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                image_url TEXT
            )
            "#,
            t("feature_groups"),
            t("drafts")
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id UUID PRIMARY KEY,
                group_id UUID NOT NULL REFERENCES {}(id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                image_url TEXT,
                available_feature_icon_url TEXT,
                unavailable_feature_icon_url TEXT
            )
            "#,
            t("features"),
            t("feature_groups")
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id UUID PRIMARY KEY,
                draft_id UUID NOT NULL REFERENCES {}(id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                is_highlighted BOOLEAN NOT NULL DEFAULT FALSE,
                highlight_text TEXT,
                button_text TEXT,
                button_link TEXT,
                stripe_product_id TEXT,
                paddle_product_id TEXT,
                feature_ids UUID[] NOT NULL DEFAULT '{{}}'
            )
            "#,
            t("products"),
            t("drafts")
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id UUID PRIMARY KEY,
                product_id UUID NOT NULL REFERENCES {}(id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                payment_type_name TEXT NOT NULL,
                unit_amount BIGINT NOT NULL CHECK (unit_amount >= 0),
                currency TEXT NOT NULL,
                checkout_url TEXT,
                usage_tiers JSONB,
                CONSTRAINT prices_unique_per_product UNIQUE (product_id, payment_type_name, currency)
                    DEFERRABLE INITIALLY DEFERRED
            )
            "#,
            t("prices"),
            t("products")
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id UUID PRIMARY KEY,
                table_id UUID NOT NULL REFERENCES {}(id) ON DELETE CASCADE,
                version INTEGER NOT NULL,
                published_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                data JSONB NOT NULL,
                UNIQUE (table_id, version)
            )
            "#,
            t("published_versions"),
            t("price_tables")
        ),
    ]
}

/// Create the schema and all tables if missing. Safe to run on every start.
pub async fn ensure_schema(pool: &PgPool, schema: &str) -> Result<(), AppError> {
    for statement in ddl(schema) {
        sqlx::query(&statement).execute(pool).await?;
    }
    tracing::info!(schema, "pricing schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_table_is_schema_qualified() {
        let statements = ddl("pt_test");
        assert_eq!(statements[0], "CREATE SCHEMA IF NOT EXISTS pt_test");
        for table in ["templates", "price_tables", "drafts", "feature_groups", "features", "products", "prices", "published_versions"] {
            let create = format!("CREATE TABLE IF NOT EXISTS pt_test.{} (", table);
            assert!(statements.iter().any(|s| s.contains(&create)), "{}", table);
        }
        assert!(statements.iter().any(|s| s.contains("DEFERRABLE INITIALLY DEFERRED")));
        assert!(statements.iter().any(|s| s.contains("custom_css JSONB NOT NULL DEFAULT '{}'")));
    }
}
