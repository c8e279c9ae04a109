//! Publishing drafts and rendering published versions.

use crate::error::AppError;
use crate::model::{PublishedData, PublishedVersion, VersionSummary};
use crate::render::RenderEngine;
use crate::store::PricingStore;
use uuid::Uuid;

pub struct Publisher;

impl Publisher {
    /// Append a new version holding a copy of the current draft. Every call appends.
    pub async fn publish(store: &dyn PricingStore, owner: Uuid, table_id: Uuid) -> Result<PublishedVersion, AppError> {
        let published = store.publish(owner, table_id).await?;
        tracing::info!(%owner, %table_id, version = published.version, "published price table");
        Ok(published)
    }

    pub async fn list_versions(store: &dyn PricingStore, owner: Uuid, table_id: Uuid) -> Result<Vec<VersionSummary>, AppError> {
        store.list_versions(owner, table_id).await
    }

    /// Embed HTML for the latest published version, or `version` when given. Draft state is never read.
    pub async fn render_published(
        store: &dyn PricingStore,
        engine: &RenderEngine,
        table_id: Uuid,
        version: Option<i32>,
    ) -> Result<String, AppError> {
        let published = store
            .published_version(table_id, version)
            .await?
            .ok_or_else(|| match version {
                Some(n) => AppError::NotFound(format!("version {} of price table {}", n, table_id)),
                None => AppError::NotFound(format!("published price table {}", table_id)),
            })?;
        render_data(store, engine, &published.data).await
    }

    /// Owner-only render of the current draft through the same path as the public embed.
    pub async fn preview(store: &dyn PricingStore, engine: &RenderEngine, owner: Uuid, table_id: Uuid) -> Result<String, AppError> {
        let draft = store.get_draft(owner, table_id).await?;
        render_data(store, engine, &PublishedData::from(&draft)).await
    }
}

async fn render_data(store: &dyn PricingStore, engine: &RenderEngine, data: &PublishedData) -> Result<String, AppError> {
    let template = store
        .template_by_version(&data.template_version)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("template version {}", data.template_version)))?;
    Ok(engine.render(&template, data)?.to_embed())
}
