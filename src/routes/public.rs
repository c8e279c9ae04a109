//! Embed route. The only router with permissive CORS.

use crate::handlers::public::render_table;
use crate::state::AppState;
use axum::{http::Method, routing::get, Router};
use tower_http::cors::{Any, CorsLayer};

pub fn public_routes(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/public/tables/:id/render", get(render_table))
        .layer(cors)
        .with_state(state)
}
