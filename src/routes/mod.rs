//! Router assembly.

mod common;
mod public;
mod tables;
mod templates;

pub use common::common_routes;
pub use public::public_routes;
pub use tables::table_routes;
pub use templates::template_routes;

use crate::state::AppState;
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Every route of the service with request tracing and the configured body limit.
pub fn app(state: AppState) -> Router {
    let body_limit = state.config.body_limit_bytes;
    Router::new()
        .merge(common_routes(state.clone()))
        .merge(table_routes(state.clone()))
        .merge(template_routes(state.clone()))
        .merge(public_routes(state))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
}
