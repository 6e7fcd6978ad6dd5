//! Maps configuration keys to manager and trigger constructors.
//!
//! Every component named in a database's `firewall:` section is resolved
//! here once at startup. Unknown keys fail the startup instead of being
//! skipped.

use crate::ban::BanTable;
use crate::chain::FirewallChain;
use crate::error::FirewallError;
use crate::manager::FirewallManager;
use crate::managers::{
    AllowAll, ComposedManager, CsvRules, CsvRulesManager, DenyBannedUser, DenyComments,
    DenyDatabaseWrite, DenyExceptOnWhitelist, DenyKinds, DenyMetadataQuery,
    DenyMultipleStatements, DenyOnBlacklist, DenySqlInjection, DenySqlInjectionRemote,
    DenyStatementClass, ExtraRule, InspectionMode, StatementList,
};
use crate::trigger::{AuditTrigger, BanUserTrigger, LogTrigger, RefusalTrigger};
use sqlgate_audit::AuditLogger;
use sqlgate_core::{ComponentSpec, FirewallConfig};
use sqlgate_db::ConnectionProvider;
use std::collections::HashMap;
use std::sync::Arc;

/// What a component constructor gets to work with.
#[derive(Clone)]
pub struct BuildContext {
    /// Database binding the component serves.
    pub database: String,
    /// Source of fresh sessions for components that keep their own tables.
    pub provider: Arc<dyn ConnectionProvider>,
}

pub type ManagerFactory =
    fn(&ComponentSpec, &BuildContext) -> Result<Arc<dyn FirewallManager>, FirewallError>;

pub type TriggerFactory =
    fn(&ComponentSpec, &BuildContext) -> Result<Arc<dyn RefusalTrigger>, FirewallError>;

/// Named constructors for managers and triggers.
#[derive(Clone, Default)]
pub struct FirewallRegistry {
    managers: HashMap<String, ManagerFactory>,
    triggers: HashMap<String, TriggerFactory>,
}

impl std::fmt::Debug for FirewallRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut managers: Vec<_> = self.managers.keys().collect();
        managers.sort();
        let mut triggers: Vec<_> = self.triggers.keys().collect();
        triggers.sort();
        f.debug_struct("FirewallRegistry")
            .field("managers", &managers)
            .field("triggers", &triggers)
            .finish()
    }
}

fn required_str<'a>(spec: &'a ComponentSpec, key: &str) -> Result<&'a str, FirewallError> {
    spec.option_str(key)
        .ok_or_else(|| FirewallError::invalid_options(&spec.name, format!("missing '{key}'")))
}

fn shared<M: FirewallManager + 'static>(manager: M) -> Result<Arc<dyn FirewallManager>, FirewallError> {
    Ok(Arc::new(manager))
}

impl FirewallRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in manager and trigger.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        // =====================================================================
        // Shape and flag managers
        // =====================================================================
        registry.register_manager("allow_all", |_, _| shared(AllowAll));
        registry.register_manager("deny_database_write", |_, _| shared(DenyDatabaseWrite));
        registry.register_manager("deny_ddl", |_, _| shared(DenyKinds::ddl()));
        registry.register_manager("deny_dcl", |_, _| shared(DenyKinds::dcl()));
        registry.register_manager("deny_tcl", |_, _| shared(DenyKinds::tcl()));
        registry.register_manager("deny_dml", |_, _| shared(DenyKinds::dml()));
        registry.register_manager("deny_metadata_query", |_, _| shared(DenyMetadataQuery));
        registry.register_manager("deny_statement_class", |_, _| shared(DenyStatementClass));
        registry.register_manager("deny_comments", |_, _| shared(DenyComments));
        registry.register_manager("deny_multiple_statements", |_, _| {
            shared(DenyMultipleStatements)
        });

        // =====================================================================
        // File-backed managers
        // =====================================================================
        registry.register_manager("deny_on_blacklist", |spec, _| {
            let list = StatementList::from_file(required_str(spec, "file")?)?;
            shared(DenyOnBlacklist::new(list))
        });
        registry.register_manager("deny_except_on_whitelist", |spec, _| {
            let list = StatementList::from_file(required_str(spec, "file")?)?;
            shared(DenyExceptOnWhitelist::new(list))
        });
        registry.register_manager("csv_rules", |spec, _| {
            let rules = CsvRules::from_file(required_str(spec, "file")?)?;
            shared(CsvRulesManager::new(rules))
        });

        // =====================================================================
        // Injection detection
        // =====================================================================
        registry.register_manager("deny_sql_injection", |spec, _| {
            shared(DenySqlInjection::new(InspectionMode::from_spec(spec)?))
        });
        registry.register_manager("deny_sql_injection_remote", |spec, _| {
            shared(DenySqlInjectionRemote::from_spec(spec)?)
        });

        // =====================================================================
        // Bans
        // =====================================================================
        registry.register_manager("deny_banned_user", |spec, _| {
            let table = BanTable::new(&spec.name, spec.option_str("table"))?;
            shared(DenyBannedUser::new(table))
        });

        registry.register_trigger("log", |_, _| Ok(Arc::new(LogTrigger)));
        registry.register_trigger("audit", |spec, _| {
            Ok(Arc::new(AuditTrigger::new(required_str(spec, "file")?)?))
        });
        registry.register_trigger("ban_user", |spec, _| {
            let table = BanTable::new(&spec.name, spec.option_str("table"))?;
            Ok(Arc::new(BanUserTrigger::new(table)))
        });

        registry
    }

    pub fn register_manager(&mut self, name: impl Into<String>, factory: ManagerFactory) {
        self.managers.insert(name.into(), factory);
    }

    pub fn register_trigger(&mut self, name: impl Into<String>, factory: TriggerFactory) {
        self.triggers.insert(name.into(), factory);
    }

    /// Build the manager `spec` names, wrapped with its extra rules.
    pub fn build_manager(
        &self,
        spec: &ComponentSpec,
        ctx: &BuildContext,
    ) -> Result<Arc<dyn FirewallManager>, FirewallError> {
        let factory = self
            .managers
            .get(&spec.name)
            .ok_or_else(|| FirewallError::UnknownManager(spec.name.clone()))?;
        let manager = factory(spec, ctx)?;

        if spec.extra_rules.is_empty() {
            return Ok(manager);
        }
        let rules = spec.extra_rules.iter().map(ExtraRule::from).collect();
        Ok(Arc::new(ComposedManager::new(manager, rules)))
    }

    pub fn build_trigger(
        &self,
        spec: &ComponentSpec,
        ctx: &BuildContext,
    ) -> Result<Arc<dyn RefusalTrigger>, FirewallError> {
        let factory = self
            .triggers
            .get(&spec.name)
            .ok_or_else(|| FirewallError::UnknownTrigger(spec.name.clone()))?;
        factory(spec, ctx)
    }

    /// Build the chain configured for one database binding.
    pub fn build_chain(
        &self,
        config: &FirewallConfig,
        ctx: &BuildContext,
        audit: Arc<AuditLogger>,
    ) -> Result<FirewallChain, FirewallError> {
        let managers = config
            .managers
            .iter()
            .map(|spec| self.build_manager(spec, ctx))
            .collect::<Result<Vec<_>, _>>()?;
        let triggers = config
            .triggers
            .iter()
            .map(|spec| self.build_trigger(spec, ctx))
            .collect::<Result<Vec<_>, _>>()?;

        let chain = FirewallChain::new(managers, triggers, ctx.provider.clone(), audit);
        tracing::info!(
            database = %ctx.database,
            managers = ?chain.manager_names(),
            triggers = config.triggers.len(),
            "Firewall chain ready"
        );
        Ok(chain)
    }
}
