//! Configuration types for sqlgate.
//!
//! The whole gateway is configured from one YAML file (`sqlgate.yaml`):
//!
//! ```yaml
//! server:
//!   bind: "0.0.0.0:9090"
//! blobs:
//!   upload_root: data/uploads
//! audit:
//!   enabled: true
//!   stdout: true
//! databases:
//!   - name: sales
//!     url_env: SALES_DATABASE_URL
//!     firewall:
//!       managers:
//!         - name: deny_ddl
//!         - name: csv_rules
//!           options: { file: rules/sales.csv }
//!       triggers:
//!         - name: log
//! ```

pub mod audit;
pub mod blob;
pub mod database;
pub mod server;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use audit::AuditConfig;
pub use blob::BlobConfig;
pub use database::{ComponentSpec, DatabaseBackend, DatabaseConfig, ExtraRuleSpec, FirewallConfig};
pub use server::ServerConfig;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The YAML document is malformed.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The configuration is structurally valid but semantically wrong.
    #[error("invalid config: {0}")]
    Invalid(String),

    /// An environment variable referenced by the configuration is not set.
    #[error("environment variable {0} is not set")]
    MissingEnv(String),
}

/// Complete gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Large-object upload settings.
    #[serde(default)]
    pub blobs: BlobConfig,

    /// Audit logging configuration.
    #[serde(default)]
    pub audit: AuditConfig,

    /// Database bindings, each with its own firewall chain.
    #[serde(default)]
    pub databases: Vec<DatabaseConfig>,
}

impl GatewayConfig {
    /// Load and validate configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: GatewayConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.databases.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one database must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for db in &self.databases {
            if db.name.trim().is_empty() {
                return Err(ConfigError::Invalid("database name cannot be empty".to_string()));
            }
            if !seen.insert(db.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "database '{}' is configured more than once",
                    db.name
                )));
            }
            if db.url.is_none() && db.url_env.is_none() {
                return Err(ConfigError::Invalid(format!(
                    "database '{}' needs either url or url_env",
                    db.name
                )));
            }
            if db.max_connections == 0 {
                return Err(ConfigError::Invalid(format!(
                    "database '{}' max_connections must be at least 1",
                    db.name
                )));
            }
        }

        Ok(())
    }

    /// Look up a database binding by name.
    pub fn database(&self, name: &str) -> Option<&DatabaseConfig> {
        self.databases.iter().find(|db| db.name == name)
    }
}
