//! Template catalogue: listing, upgrades, customisation and the admin-managed default.

use crate::error::AppError;
use crate::model::{latest, Draft, DraftUpdate, Template, TemplateSummary, TemplateUpsert};
use crate::render::builtin_templates;
use crate::store::PricingStore;
use serde::Serialize;
use uuid::Uuid;

pub const ALREADY_LATEST: &str = "Already using the latest template version";

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateUpgrade {
    pub upgraded: bool,
    pub version: String,
    pub message: String,
}

pub struct TemplateService;

impl TemplateService {
    /// Public templates in ascending version order.
    pub async fn list(store: &dyn PricingStore) -> Result<Vec<TemplateSummary>, AppError> {
        Ok(store
            .list_templates()
            .await?
            .iter()
            .filter(|t| t.is_public)
            .map(TemplateSummary::from)
            .collect())
    }

    /// Highest public template version.
    pub async fn latest(store: &dyn PricingStore) -> Result<Template, AppError> {
        let templates = store.list_templates().await?;
        latest(templates.iter().filter(|t| t.is_public))
            .cloned()
            .ok_or_else(|| AppError::NotFound("template".into()))
    }

    /// Bind the table to the latest template. A table already on it is left alone.
    pub async fn upgrade(store: &dyn PricingStore, owner: Uuid, table_id: Uuid) -> Result<TemplateUpgrade, AppError> {
        let draft = store.get_draft(owner, table_id).await?;
        let newest = Self::latest(store).await?;
        if draft.template_version == newest.version {
            return Ok(TemplateUpgrade {
                upgraded: false,
                version: newest.version,
                message: ALREADY_LATEST.into(),
            });
        }
        store.set_table_template(owner, table_id, newest.id).await?;
        tracing::info!(%owner, %table_id, from = %draft.template_version, to = %newest.version, "upgraded template");
        Ok(TemplateUpgrade {
            upgraded: true,
            message: format!("Upgraded to template version {}", newest.version),
            version: newest.version,
        })
    }

    /// Copy the bound template's markup and css into the draft overrides.
    pub async fn customize(store: &dyn PricingStore, owner: Uuid, table_id: Uuid) -> Result<Draft, AppError> {
        let draft = store.get_draft(owner, table_id).await?;
        let template = store
            .template_by_version(&draft.template_version)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("template version {}", draft.template_version)))?;
        let overrides = DraftUpdate {
            html_template: Some(Some(template.html_template)),
            custom_css: Some(template.custom_css),
            ..DraftUpdate::default()
        };
        let draft = store.update_draft(owner, table_id, &overrides).await?;
        tracing::info!(%owner, %table_id, version = %template.version, "copied template into draft");
        Ok(draft)
    }

    /// Upsert `input` by version and make it the single default.
    pub async fn update_default(store: &dyn PricingStore, input: &TemplateUpsert) -> Result<Template, AppError> {
        if input.version.trim().is_empty() {
            return Err(AppError::Validation("version must not be empty".into()));
        }
        if input.html_template.trim().is_empty() {
            return Err(AppError::Validation("htmlTemplate must not be empty".into()));
        }
        handlebars::Handlebars::new()
            .register_template_string("check", &input.html_template)
            .map_err(|e| AppError::Validation(format!("htmlTemplate: {}", e)))?;
        store.upsert_template(input).await?;
        let template = store.set_default_template(&input.version).await?;
        tracing::info!(version = %template.version, "default template updated");
        Ok(template)
    }

    /// Upsert the built-in templates and flag `default_version` as default.
    pub async fn seed_builtins(store: &dyn PricingStore, default_version: &str) -> Result<Template, AppError> {
        for upsert in builtin_templates()? {
            store.upsert_template(&upsert).await?;
        }
        let template = store.set_default_template(default_version).await?;
        tracing::info!(version = %template.version, "built-in templates installed");
        Ok(template)
    }
}
