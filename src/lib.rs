//! Pricing table backend: draft/publish versioning of SaaS price tables and template rendering
//! of published versions into embeddable HTML.

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod migration;
pub mod model;
pub mod render;
pub mod response;
pub mod routes;
pub mod service;
pub mod state;
pub mod store;

pub use config::{ServerConfig, StoreKind};
pub use error::{AppError, ConfigError};
pub use migration::ensure_schema;
pub use render::RenderEngine;
pub use routes::app;
pub use service::{DraftEditor, Publisher, TemplateService};
pub use state::AppState;
pub use store::{connect_with_retry, ensure_database_exists, MemoryStore, PgStore, PricingStore};
