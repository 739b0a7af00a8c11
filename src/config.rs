//! Configuration management
//!
//! Loads configuration from config.toml with support for:
//! - Server binding settings
//! - Database selection and pool sizing
//! - Which roles may process claims
//!
//! Environment variables (`LEDGER_HOST`, `LEDGER_PORT`, `LEDGER_SQLITE_PATH`)
//! take precedence over the file. `DATABASE_URL` selects PostgreSQL.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::contributor::Role;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

/// Main configuration structure matching config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file used when DATABASE_URL is not set
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: usize,
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Roles allowed to list, inspect and resolve every claim
    #[serde(default = "default_processor_roles")]
    pub processor_roles: Vec<Role>,
}

fn default_sqlite_path() -> String {
    "ledger.db".to_string()
}

fn default_pool_max_size() -> usize {
    20
}

fn default_query_timeout_secs() -> u64 {
    30
}

fn default_processor_roles() -> Vec<Role> {
    vec![Role::Admin, Role::SuperAdmin]
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
            pool_max_size: default_pool_max_size(),
            query_timeout_secs: default_query_timeout_secs(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            processor_roles: default_processor_roles(),
        }
    }
}

impl Config {
    /// Load from config.toml or use defaults, then apply env overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from("config.toml")?;
        config.apply_env()?;
        Ok(config)
    }

    /// Load from specific path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            // Use embedded default config
            toml::from_str(DEFAULT_CONFIG).context("Failed to parse default config")
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = lookup("LEDGER_HOST").filter(|h| !h.is_empty()) {
            self.server.host = host;
        }
        if let Some(port) = lookup("LEDGER_PORT").filter(|p| !p.is_empty()) {
            self.server.port = port
                .parse()
                .with_context(|| format!("LEDGER_PORT is not a valid port: {}", port))?;
        }
        if let Some(path) = lookup("LEDGER_SQLITE_PATH").filter(|p| !p.is_empty()) {
            self.database.sqlite_path = path;
        }
        Ok(())
    }

    /// PostgreSQL connection URL, when one is configured
    pub fn database_url(&self) -> Option<String> {
        std::env::var("DATABASE_URL").ok().filter(|u| !u.is_empty())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|_| Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig::default(),
            ledger: LedgerConfig::default(),
        })
    }
}
