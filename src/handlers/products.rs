//! Single-product endpoints under /api/v1/tables/:id/products.

use crate::error::AppError;
use crate::extractors::{JsonBody, OwnerId, PathParam};
use crate::model::ProductInput;
use crate::response::{success_created, success_many, success_one};
use crate::service::DraftEditor;
use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

pub async fn list_products(
    OwnerId(owner): OwnerId,
    State(state): State<AppState>,
    PathParam(table_id): PathParam<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let draft = DraftEditor::get_draft(state.store.as_ref(), owner, table_id).await?;
    Ok(success_many(draft.products))
}

/// POST appends a new product; an `id` in the body updates that product instead.
pub async fn create_product(
    OwnerId(owner): OwnerId,
    State(state): State<AppState>,
    PathParam(table_id): PathParam<Uuid>,
    JsonBody(input): JsonBody<ProductInput>,
) -> Result<impl IntoResponse, AppError> {
    let product = DraftEditor::upsert_product(state.store.as_ref(), owner, table_id, &input).await?;
    Ok(success_created(product))
}

pub async fn get_product(
    OwnerId(owner): OwnerId,
    State(state): State<AppState>,
    PathParam((table_id, product_id)): PathParam<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    let product = DraftEditor::get_product(state.store.as_ref(), owner, table_id, product_id).await?;
    Ok(success_one(product))
}

pub async fn update_product(
    OwnerId(owner): OwnerId,
    State(state): State<AppState>,
    PathParam((table_id, product_id)): PathParam<(Uuid, Uuid)>,
    JsonBody(mut input): JsonBody<ProductInput>,
) -> Result<impl IntoResponse, AppError> {
    if input.id.is_some_and(|id| id != product_id) {
        return Err(AppError::BadRequest("body id does not match the product in the path".into()));
    }
    input.id = Some(product_id);
    let product = DraftEditor::upsert_product(state.store.as_ref(), owner, table_id, &input).await?;
    Ok(success_one(product))
}

pub async fn delete_product(
    OwnerId(owner): OwnerId,
    State(state): State<AppState>,
    PathParam((table_id, product_id)): PathParam<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    DraftEditor::delete_product(state.store.as_ref(), owner, table_id, product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
