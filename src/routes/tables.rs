//! Owner-scoped editor routes.

use crate::handlers::products::{create_product, delete_product, get_product, list_products, update_product};
use crate::handlers::tables::{
    create_table, delete_table, get_table, list_tables, list_versions, preview_table, publish_table, update_table,
};
use crate::handlers::templates::{customize_template, upgrade_template};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn table_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/tables", post(create_table).get(list_tables))
        .route(
            "/api/v1/tables/:id",
            get(get_table).patch(update_table).delete(delete_table),
        )
        .route("/api/v1/tables/:id/publish", post(publish_table))
        .route("/api/v1/tables/:id/versions", get(list_versions))
        .route("/api/v1/tables/:id/preview", get(preview_table))
        .route("/api/v1/tables/:id/products", get(list_products).post(create_product))
        .route(
            "/api/v1/tables/:id/products/:product_id",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/api/v1/tables/:id/template/upgrade", post(upgrade_template))
        .route("/api/v1/tables/:id/template/customize", post(customize_template))
        .with_state(state)
}
