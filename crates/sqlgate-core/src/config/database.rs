//! Database binding configuration.
//!
//! Each entry under `databases:` becomes one binding at startup: a pool, a
//! firewall chain and its refusal triggers. Connection URLs can be given
//! inline or through an environment variable:
//! 1. `url_env` - reference an environment variable (highest precedence)
//! 2. `url` - provide the URL directly

use super::ConfigError;
use serde::{Deserialize, Serialize};

/// Configuration for one database binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Name clients use to address this database.
    pub name: String,

    /// Full connection URL (`sqlite://...`, `postgres://...`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Environment variable holding the connection URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_env: Option<String>,

    /// Maximum number of pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// SQL dialect override. Inferred from the URL scheme when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialect: Option<DatabaseBackend>,

    /// Firewall managers and refusal triggers for this binding.
    #[serde(default)]
    pub firewall: FirewallConfig,
}

fn default_max_connections() -> u32 {
    10
}

impl DatabaseConfig {
    /// Create a binding with an inline URL and an empty firewall section.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: Some(url.into()),
            url_env: None,
            max_connections: default_max_connections(),
            dialect: None,
            firewall: FirewallConfig::default(),
        }
    }

    /// Resolve the connection URL, `url_env` first.
    pub fn connection_url(&self) -> Result<String, ConfigError> {
        if let Some(env_var) = &self.url_env {
            match std::env::var(env_var) {
                Ok(url) => return Ok(url),
                Err(_) if self.url.is_none() => {
                    return Err(ConfigError::MissingEnv(env_var.clone()));
                }
                Err(_) => {}
            }
        }

        self.url.clone().ok_or_else(|| {
            ConfigError::Invalid(format!("database '{}' has no connection url", self.name))
        })
    }

    /// Backend driver for this binding.
    pub fn backend(&self) -> Result<DatabaseBackend, ConfigError> {
        if let Some(dialect) = self.dialect {
            return Ok(dialect);
        }
        let url = self.connection_url()?;
        DatabaseBackend::from_url(&url).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "database '{}' uses an unsupported url scheme",
                self.name
            ))
        })
    }
}

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    #[serde(alias = "postgresql")]
    Postgres,
}

impl DatabaseBackend {
    /// Infer the backend from a connection URL scheme.
    pub fn from_url(url: &str) -> Option<Self> {
        let scheme = url.split(':').next()?.to_ascii_lowercase();
        match scheme.as_str() {
            "sqlite" => Some(Self::Sqlite),
            "postgres" | "postgresql" => Some(Self::Postgres),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
        }
    }
}

impl std::fmt::Display for DatabaseBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Firewall section of a database binding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FirewallConfig {
    /// Managers in evaluation order. Empty means allow-all.
    #[serde(default)]
    pub managers: Vec<ComponentSpec>,

    /// Refusal triggers fired once per denial.
    #[serde(default)]
    pub triggers: Vec<ComponentSpec>,
}

/// A named firewall component resolved through the registry at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    /// Registry key, e.g. `deny_ddl` or `csv_rules`.
    pub name: String,

    /// Component-specific options.
    #[serde(default)]
    pub options: serde_json::Value,

    /// Additional predicates layered over the component.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_rules: Vec<ExtraRuleSpec>,
}

impl ComponentSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: serde_json::Value::Null,
            extra_rules: Vec::new(),
        }
    }

    /// Read a string option.
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(|v| v.as_str())
    }
}

/// Extra deny predicates attached to a manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ExtraRuleSpec {
    /// Deny statements touching any of these tables.
    DenyTables { tables: Vec<String> },
    /// Deny these usernames outright.
    DenyUsers { users: Vec<String> },
    /// Deny callers from these IP addresses.
    DenyIp { addresses: Vec<String> },
    /// Deny statements binding more parameters than `max`.
    MaxParameters { max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_from_url() {
        assert_eq!(
            DatabaseBackend::from_url("sqlite://data.db"),
            Some(DatabaseBackend::Sqlite)
        );
        assert_eq!(
            DatabaseBackend::from_url("postgresql://u@h/db"),
            Some(DatabaseBackend::Postgres)
        );
        assert_eq!(DatabaseBackend::from_url("mysql://h/db"), None);
    }

    #[test]
    fn test_dialect_override() {
        let mut db = DatabaseConfig::new("a", "mysql://h/db");
        assert!(db.backend().is_err());
        db.dialect = Some(DatabaseBackend::Postgres);
        assert_eq!(db.backend().unwrap(), DatabaseBackend::Postgres);
    }

    #[test]
    fn test_url_env_falls_back_to_url() {
        let mut db = DatabaseConfig::new("a", "sqlite://fallback.db");
        db.url_env = Some("SQLGATE_TEST_UNSET_URL_VAR".to_string());
        assert_eq!(db.connection_url().unwrap(), "sqlite://fallback.db");

        db.url = None;
        assert!(matches!(
            db.connection_url().unwrap_err(),
            ConfigError::MissingEnv(_)
        ));
    }

    #[test]
    fn test_extra_rules_deserialize() {
        let yaml = r#"
name: deny_ddl
extra_rules:
  - rule: deny_ip
    addresses: ["10.0.0.1"]
  - rule: max_parameters
    max: 3
"#;
        let spec: ComponentSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.options, serde_json::Value::Null);
        assert_eq!(
            spec.extra_rules,
            vec![
                ExtraRuleSpec::DenyIp {
                    addresses: vec!["10.0.0.1".to_string()]
                },
                ExtraRuleSpec::MaxParameters { max: 3 },
            ]
        );
    }
}
