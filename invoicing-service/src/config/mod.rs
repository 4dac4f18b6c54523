//! Configuration module for invoicing-service.

use crate::models::{DEFAULT_PER_PAGE, MAX_PER_PAGE};
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct InvoicingConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    /// `None` selects the in-memory store.
    pub database: Option<DatabaseConfig>,
    pub pagination: PaginationConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct PaginationConfig {
    pub default_per_page: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_per_page: DEFAULT_PER_PAGE,
        }
    }
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl InvoicingConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let database = match env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => Some(DatabaseConfig {
                url,
                max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10),
                min_connections: parse_or("DATABASE_MIN_CONNECTIONS", 2),
                run_migrations: parse_or("DATABASE_RUN_MIGRATIONS", true),
            }),
            _ => None,
        };

        let default_per_page = parse_or("DEFAULT_PER_PAGE", DEFAULT_PER_PAGE);
        if default_per_page == 0 || default_per_page > MAX_PER_PAGE {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DEFAULT_PER_PAGE must be between 1 and {}",
                MAX_PER_PAGE
            )));
        }

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "invoicing-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|e| !e.is_empty()),
            database,
            pagination: PaginationConfig { default_per_page },
        })
    }

    /// Configuration for an in-memory instance on `port` (0 picks a free port).
    pub fn in_memory(port: u16) -> Self {
        Self {
            common: core_config::Config {
                port,
                ..Default::default()
            },
            service_name: "invoicing-service".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            otlp_endpoint: None,
            database: None,
            pagination: PaginationConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_config_has_no_database() {
        let config = InvoicingConfig::in_memory(0);
        assert!(config.database.is_none());
        assert_eq!(config.pagination.default_per_page, 15);
        assert_eq!(config.common.port, 0);
    }

    #[test]
    fn unparsable_values_fall_back_to_default() {
        assert_eq!(parse_or("INVOICING_TEST_UNSET_VARIABLE", 7u32), 7);
    }
}
