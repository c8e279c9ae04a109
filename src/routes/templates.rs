use crate::handlers::templates::{latest_template, list_templates, update_default_template};
use crate::state::AppState;
use axum::{
    routing::{get, put},
    Router,
};

pub fn template_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/templates", get(list_templates))
        .route("/api/v1/templates/latest", get(latest_template))
        .route("/api/v1/admin/templates/default", put(update_default_template))
        .with_state(state)
}
