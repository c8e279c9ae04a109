//! Unauthenticated embed endpoint.

use crate::error::AppError;
use crate::extractors::{PathParam, QueryParams};
use crate::service::Publisher;
use crate::state::AppState;
use axum::{extract::State, response::Html};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct RenderQuery {
    pub version: Option<i32>,
}

/// GET /public/tables/:id/render[?version=N]
pub async fn render_table(
    State(state): State<AppState>,
    PathParam(table_id): PathParam<Uuid>,
    QueryParams(query): QueryParams<RenderQuery>,
) -> Result<Html<String>, AppError> {
    let html = Publisher::render_published(state.store.as_ref(), &state.engine, table_id, query.version).await?;
    Ok(Html(html))
}
