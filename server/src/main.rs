//! Pricing table server.
//!
//! Run from repo root: `cargo run -p pricetable-server`
//! Configuration comes from the environment (see `.env.example`).

use pricetable::{
    app, connect_with_retry, ensure_database_exists, ensure_schema, AppState, MemoryStore, PgStore, PricingStore,
    ServerConfig, StoreKind, TemplateService,
};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pricetable=info,pricetable_server=info,tower_http=info")),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let store: Arc<dyn PricingStore> = match config.store {
        StoreKind::Postgres => {
            ensure_database_exists(&config.database_url, config.connect_retries, config.connect_retry_delay).await?;
            let pool = connect_with_retry(
                &config.database_url,
                config.max_connections,
                config.connect_retries,
                config.connect_retry_delay,
            )
            .await?;
            ensure_schema(&pool, &config.schema).await?;
            Arc::new(PgStore::new(pool, config.schema.clone()))
        }
        StoreKind::Memory => {
            tracing::warn!("using the in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };
    TemplateService::seed_builtins(store.as_ref(), &config.default_template_version).await?;

    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(store, config);
    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("pricetable listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app(state)).await?;
    Ok(())
}
