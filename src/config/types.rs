//! Server configuration types.

use std::time::Duration;
use uuid::Uuid;

/// Which `PricingStore` backs the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    /// Process-local store; data is lost on restart.
    Memory,
}

impl std::str::FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreKind::Postgres),
            "memory" => Ok(StoreKind::Memory),
            other => Err(format!("unknown store '{}' (expected postgres or memory)", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub database_url: String,
    /// PostgreSQL schema that holds all pricing tables.
    pub schema: String,
    pub store: StoreKind,
    pub max_connections: u32,
    pub connect_retries: u32,
    pub connect_retry_delay: Duration,
    /// Template version flagged as default at startup.
    pub default_template_version: String,
    pub admin_ids: Vec<Uuid>,
    pub body_limit_bytes: usize,
}

impl ServerConfig {
    pub fn is_admin(&self, owner_id: Uuid) -> bool {
        self.admin_ids.contains(&owner_id)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: "0.0.0.0:3000".into(),
            database_url: "postgres://localhost/pricetable".into(),
            schema: "pricetable".into(),
            store: StoreKind::Postgres,
            max_connections: 5,
            connect_retries: 5,
            connect_retry_delay: Duration::from_millis(5000),
            default_template_version: "0.2".into(),
            admin_ids: Vec::new(),
            body_limit_bytes: 1024 * 1024,
        }
    }
}
