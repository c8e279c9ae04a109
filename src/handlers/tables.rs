//! Table and draft endpoints under /api/v1/tables.

use crate::error::AppError;
use crate::extractors::{JsonBody, OwnerId, PathParam};
use crate::model::{DraftUpdate, NewTable};
use crate::response::{success_created, success_many, success_one};
use crate::service::{DraftEditor, Publisher};
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
};
use uuid::Uuid;

/// POST /api/v1/tables. An empty body creates a table with default settings.
pub async fn create_table(
    OwnerId(owner): OwnerId,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let input: NewTable = if body.iter().all(u8::is_ascii_whitespace) {
        NewTable::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::BadRequest(format!("invalid JSON body: {}", e)))?
    };
    let draft = DraftEditor::create(state.store.as_ref(), owner, &input).await?;
    Ok(success_created(draft))
}

/// GET /api/v1/tables
pub async fn list_tables(OwnerId(owner): OwnerId, State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let tables = DraftEditor::list(state.store.as_ref(), owner).await?;
    Ok(success_many(tables))
}

/// GET /api/v1/tables/:id
pub async fn get_table(
    OwnerId(owner): OwnerId,
    State(state): State<AppState>,
    PathParam(table_id): PathParam<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let draft = DraftEditor::get_draft(state.store.as_ref(), owner, table_id).await?;
    Ok(success_one(draft))
}

/// PATCH /api/v1/tables/:id
pub async fn update_table(
    OwnerId(owner): OwnerId,
    State(state): State<AppState>,
    PathParam(table_id): PathParam<Uuid>,
    JsonBody(update): JsonBody<DraftUpdate>,
) -> Result<impl IntoResponse, AppError> {
    let draft = DraftEditor::update(state.store.as_ref(), owner, table_id, update).await?;
    Ok(success_one(draft))
}

/// DELETE /api/v1/tables/:id
pub async fn delete_table(
    OwnerId(owner): OwnerId,
    State(state): State<AppState>,
    PathParam(table_id): PathParam<Uuid>,
) -> Result<StatusCode, AppError> {
    DraftEditor::delete(state.store.as_ref(), owner, table_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/tables/:id/publish
pub async fn publish_table(
    OwnerId(owner): OwnerId,
    State(state): State<AppState>,
    PathParam(table_id): PathParam<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let published = Publisher::publish(state.store.as_ref(), owner, table_id).await?;
    Ok(success_created(published))
}

/// GET /api/v1/tables/:id/versions
pub async fn list_versions(
    OwnerId(owner): OwnerId,
    State(state): State<AppState>,
    PathParam(table_id): PathParam<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let versions = Publisher::list_versions(state.store.as_ref(), owner, table_id).await?;
    Ok(success_many(versions))
}

/// GET /api/v1/tables/:id/preview renders the draft, not a published version.
pub async fn preview_table(
    OwnerId(owner): OwnerId,
    State(state): State<AppState>,
    PathParam(table_id): PathParam<Uuid>,
) -> Result<Html<String>, AppError> {
    let html = Publisher::preview(state.store.as_ref(), &state.engine, owner, table_id).await?;
    Ok(Html(html))
}
