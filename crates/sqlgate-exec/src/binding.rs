//! Per-database binding context.
//!
//! A [`DatabaseBinding`] owns everything one configured database needs to
//! serve requests: its connection provider, its firewall chain and the
//! classifier matching its dialect. Bindings are built once at startup and
//! shared read-only between requests.

use crate::error::ExecError;
use sqlgate_audit::AuditLogger;
use sqlgate_core::{BlobConfig, DatabaseBackend, DatabaseConfig, GatewayConfig};
use sqlgate_db::ConnectionProvider;
use sqlgate_firewall::{BuildContext, FirewallChain, FirewallRegistry};
use sqlgate_sql::{SqlDialect, StatementClassifier};
use std::collections::HashMap;
use std::sync::Arc;

pub struct DatabaseBinding {
    pub(crate) name: String,
    pub(crate) provider: Arc<dyn ConnectionProvider>,
    pub(crate) firewall: FirewallChain,
    pub(crate) classifier: StatementClassifier,
    pub(crate) audit: Arc<AuditLogger>,
    pub(crate) blobs: BlobConfig,
}

impl std::fmt::Debug for DatabaseBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseBinding")
            .field("name", &self.name)
            .field("backend", &self.provider.backend())
            .field("managers", &self.firewall.manager_names())
            .field("blobs", &self.blobs)
            .finish_non_exhaustive()
    }
}

fn dialect_for(backend: DatabaseBackend) -> SqlDialect {
    match backend {
        DatabaseBackend::Sqlite => SqlDialect::Sqlite,
        DatabaseBackend::Postgres => SqlDialect::Postgres,
    }
}

impl DatabaseBinding {
    /// Open the pool and build the firewall chain for `config`.
    pub async fn connect(
        config: &DatabaseConfig,
        blobs: BlobConfig,
        audit: Arc<AuditLogger>,
        registry: &FirewallRegistry,
    ) -> Result<Self, ExecError> {
        let provider = sqlgate_db::connect(config).await?;
        let ctx = BuildContext {
            database: config.name.clone(),
            provider: provider.clone(),
        };
        let firewall = registry.build_chain(&config.firewall, &ctx, audit.clone())?;
        Ok(Self::from_parts(&config.name, provider, firewall, blobs, audit))
    }

    /// Assemble a binding from already built parts.
    pub fn from_parts(
        name: impl Into<String>,
        provider: Arc<dyn ConnectionProvider>,
        firewall: FirewallChain,
        blobs: BlobConfig,
        audit: Arc<AuditLogger>,
    ) -> Self {
        let classifier = StatementClassifier::new(dialect_for(provider.backend()));
        Self {
            name: name.into(),
            provider,
            firewall,
            classifier,
            audit,
            blobs,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.provider.backend()
    }

    pub fn firewall(&self) -> &FirewallChain {
        &self.firewall
    }

    pub fn blobs(&self) -> &BlobConfig {
        &self.blobs
    }
}

/// All database bindings of a running gateway.
#[derive(Debug, Clone, Default)]
pub struct Gateway {
    bindings: HashMap<String, Arc<DatabaseBinding>>,
}

impl Gateway {
    /// Connect every configured database.
    pub async fn from_config(
        config: &GatewayConfig,
        registry: &FirewallRegistry,
    ) -> Result<Self, ExecError> {
        let audit = Arc::new(AuditLogger::new(config.audit.clone())?);

        let mut gateway = Self::default();
        for db in &config.databases {
            let binding =
                DatabaseBinding::connect(db, config.blobs.clone(), audit.clone(), registry).await?;
            tracing::info!(
                database = %db.name,
                backend = %binding.backend(),
                "Database binding ready"
            );
            gateway.insert(binding);
        }
        Ok(gateway)
    }

    pub fn insert(&mut self, binding: DatabaseBinding) {
        self.bindings
            .insert(binding.name.clone(), Arc::new(binding));
    }

    /// Binding named `name`.
    pub fn binding(&self, name: &str) -> Result<Arc<DatabaseBinding>, ExecError> {
        self.bindings
            .get(name)
            .cloned()
            .ok_or_else(|| ExecError::UnknownDatabase(name.to_string()))
    }

    pub fn database_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.bindings.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
