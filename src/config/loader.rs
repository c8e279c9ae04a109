//! Load server configuration from environment variables (and `.env` via dotenvy).

use crate::config::types::{ServerConfig, StoreKind};
use crate::error::ConfigError;
use regex::Regex;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

impl ServerConfig {
    /// Reads `.env` if present, then the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Build config from a variable map; unset keys fall back to defaults.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = ServerConfig::default();
        let get = |key: &str| vars.get(key).map(|s| s.trim()).filter(|s| !s.is_empty());

        let schema = get("PRICETABLE_SCHEMA").map(String::from).unwrap_or(defaults.schema);
        let ident = Regex::new(r"^[a-z_][a-z0-9_]*$").map_err(|e| ConfigError::Invalid {
            key: "PRICETABLE_SCHEMA",
            message: e.to_string(),
        })?;
        if !ident.is_match(&schema) {
            return Err(ConfigError::Invalid {
                key: "PRICETABLE_SCHEMA",
                message: format!("'{}' is not a valid lower-case identifier", schema),
            });
        }

        let store = match get("PRICETABLE_STORE") {
            Some(s) => s
                .parse::<StoreKind>()
                .map_err(|message| ConfigError::Invalid { key: "PRICETABLE_STORE", message })?,
            None => defaults.store,
        };

        let admin_ids = match get("PRICETABLE_ADMIN_IDS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    Uuid::parse_str(s).map_err(|e| ConfigError::Invalid {
                        key: "PRICETABLE_ADMIN_IDS",
                        message: format!("{}: {}", s, e),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        Ok(ServerConfig {
            bind_addr: get("PRICETABLE_BIND").map(String::from).unwrap_or(defaults.bind_addr),
            database_url: get("DATABASE_URL").map(String::from).unwrap_or(defaults.database_url),
            schema,
            store,
            max_connections: parse_num(get("PRICETABLE_MAX_CONNECTIONS"), "PRICETABLE_MAX_CONNECTIONS", defaults.max_connections)?,
            connect_retries: parse_num(get("PRICETABLE_DB_RETRIES"), "PRICETABLE_DB_RETRIES", defaults.connect_retries)?,
            connect_retry_delay: Duration::from_millis(parse_num(
                get("PRICETABLE_DB_RETRY_DELAY_MS"),
                "PRICETABLE_DB_RETRY_DELAY_MS",
                defaults.connect_retry_delay.as_millis() as u64,
            )?),
            default_template_version: get("PRICETABLE_DEFAULT_TEMPLATE")
                .map(String::from)
                .unwrap_or(defaults.default_template_version),
            admin_ids,
            body_limit_bytes: parse_num(get("PRICETABLE_BODY_LIMIT"), "PRICETABLE_BODY_LIMIT", defaults.body_limit_bytes)?,
        })
    }
}

fn parse_num<T: std::str::FromStr>(raw: Option<&str>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match raw {
        Some(s) => s.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}
