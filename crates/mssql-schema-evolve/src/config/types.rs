//! Configuration type definitions.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::identifier::MAX_IDENTIFIER_LENGTH;
use crate::core::schema::Locale;
use crate::naming::{NameSuffix, NamingEngine};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Target database configuration (SQL Server).
    pub target: TargetConfig,

    /// Schema evolution behavior.
    #[serde(default)]
    pub evolve: EvolveConfig,
}

/// Target database (SQL Server) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 1433).
    #[serde(default = "default_mssql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password. Never written back out.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// Schema holding the stores (default: "dbo").
    #[serde(default = "default_dbo_schema")]
    pub schema: String,

    /// Encrypt the connection (default: true).
    #[serde(default = "default_true")]
    pub encrypt: bool,

    /// Trust the server certificate without validation (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,

    /// Maximum pooled connections (default: 4).
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

/// Schema evolution behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolveConfig {
    /// Longest generated table or constraint name (default: 128).
    #[serde(default = "default_max_identifier_length")]
    pub max_identifier_length: usize,

    /// Suffix strategy for names longer than the limit (default: hash).
    #[serde(default)]
    pub name_suffix: NameSuffix,

    /// Locale whose store is kept when a type toggles localizability.
    #[serde(default)]
    pub default_locale: Option<Locale>,

    /// Type-name aliases, alias to full type name.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

impl Default for EvolveConfig {
    fn default() -> Self {
        Self {
            max_identifier_length: default_max_identifier_length(),
            name_suffix: NameSuffix::default(),
            default_locale: None,
            aliases: BTreeMap::new(),
        }
    }
}

impl EvolveConfig {
    /// Build the naming engine described by this configuration.
    pub fn naming_engine(&self) -> NamingEngine {
        NamingEngine::new(self.max_identifier_length, self.name_suffix)
    }
}

fn default_mssql_port() -> u16 {
    1433
}

fn default_dbo_schema() -> String {
    "dbo".to_string()
}

fn default_true() -> bool {
    true
}

fn default_pool_size() -> u32 {
    4
}

fn default_max_identifier_length() -> usize {
    MAX_IDENTIFIER_LENGTH
}
