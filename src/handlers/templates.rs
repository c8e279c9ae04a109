//! Template catalogue, per-table template operations and the admin default.

use crate::error::AppError;
use crate::extractors::{JsonBody, OwnerId, PathParam};
use crate::model::{TemplateSummary, TemplateUpsert};
use crate::response::{success_many, success_one, success_with_message};
use crate::service::TemplateService;
use crate::state::AppState;
use axum::{
    extract::State,
    response::IntoResponse,
};
use uuid::Uuid;

/// GET /api/v1/templates
pub async fn list_templates(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let templates = TemplateService::list(state.store.as_ref()).await?;
    Ok(success_many(templates))
}

/// GET /api/v1/templates/latest
pub async fn latest_template(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let template = TemplateService::latest(state.store.as_ref()).await?;
    Ok(success_one(TemplateSummary::from(&template)))
}

/// POST /api/v1/tables/:id/template/upgrade
pub async fn upgrade_template(
    OwnerId(owner): OwnerId,
    State(state): State<AppState>,
    PathParam(table_id): PathParam<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = TemplateService::upgrade(state.store.as_ref(), owner, table_id).await?;
    let message = outcome.message.clone();
    Ok(success_with_message(outcome, &message))
}

/// POST /api/v1/tables/:id/template/customize
pub async fn customize_template(
    OwnerId(owner): OwnerId,
    State(state): State<AppState>,
    PathParam(table_id): PathParam<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let draft = TemplateService::customize(state.store.as_ref(), owner, table_id).await?;
    Ok(success_one(draft))
}

/// PUT /api/v1/admin/templates/default: callers must be listed in PRICETABLE_ADMIN_IDS.
pub async fn update_default_template(
    OwnerId(caller): OwnerId,
    State(state): State<AppState>,
    JsonBody(input): JsonBody<TemplateUpsert>,
) -> Result<impl IntoResponse, AppError> {
    if !state.config.is_admin(caller) {
        tracing::warn!(%caller, "non-admin attempted to update the default template");
        return Err(AppError::Forbidden("admin privileges required".into()));
    }
    let template = TemplateService::update_default(state.store.as_ref(), &input).await?;
    Ok(success_one(TemplateSummary::from(&template)))
}
