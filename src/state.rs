//! Shared application state for all routes.

use crate::config::ServerConfig;
use crate::render::RenderEngine;
use crate::store::PricingStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PricingStore>,
    /// Compiled templates are cached here across requests.
    pub engine: Arc<RenderEngine>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn PricingStore>, config: ServerConfig) -> Self {
        AppState {
            store,
            engine: Arc::new(RenderEngine::new()),
            config: Arc::new(config),
        }
    }
}
