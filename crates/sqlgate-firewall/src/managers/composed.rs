//! Extra deny rules layered over any manager.
//!
//! A configured manager can carry `extra_rules`; the wrapped manager runs
//! first and each rule can only narrow what it allows.

use crate::error::FirewallError;
use crate::manager::{DeferredCheck, FirewallManager};
use async_trait::async_trait;
use sqlgate_core::{ExtraRuleSpec, SqlEvent};
use sqlgate_db::DatabaseSession;
use sqlgate_sql::StatementShape;
use std::sync::Arc;

/// A single extra predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtraRule {
    DenyTables(Vec<String>),
    DenyUsers(Vec<String>),
    DenyIp(Vec<String>),
    MaxParameters(usize),
}

impl From<&ExtraRuleSpec> for ExtraRule {
    fn from(spec: &ExtraRuleSpec) -> Self {
        match spec {
            ExtraRuleSpec::DenyTables { tables } => {
                Self::DenyTables(tables.iter().map(|t| t.to_lowercase()).collect())
            }
            ExtraRuleSpec::DenyUsers { users } => Self::DenyUsers(users.clone()),
            ExtraRuleSpec::DenyIp { addresses } => Self::DenyIp(addresses.clone()),
            ExtraRuleSpec::MaxParameters { max } => Self::MaxParameters(*max),
        }
    }
}

impl ExtraRule {
    pub fn allows(&self, event: &SqlEvent, shape: &StatementShape) -> bool {
        match self {
            Self::DenyTables(denied) => !shape.tables().iter().any(|table| {
                let bare = table.rsplit('.').next().unwrap_or(table);
                denied.iter().any(|d| d == table || d == bare)
            }),
            Self::DenyUsers(users) => !users.iter().any(|u| u == event.username()),
            Self::DenyIp(addresses) => !addresses.iter().any(|a| a == event.ip_address()),
            Self::MaxParameters(max) => event.parameter_values().len() <= *max,
        }
    }
}

/// A manager plus extra rules.
pub struct ComposedManager {
    inner: Arc<dyn FirewallManager>,
    rules: Vec<ExtraRule>,
}

impl ComposedManager {
    pub fn new(inner: Arc<dyn FirewallManager>, rules: Vec<ExtraRule>) -> Self {
        Self { inner, rules }
    }
}

#[async_trait]
impl FirewallManager for ComposedManager {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn allow_execute_update(
        &self,
        event: &SqlEvent,
        session: &mut dyn DatabaseSession,
    ) -> Result<bool, FirewallError> {
        self.inner.allow_execute_update(event, session).await
    }

    async fn allow_sql_run_after_analysis(
        &self,
        event: &SqlEvent,
        shape: &StatementShape,
        session: &mut dyn DatabaseSession,
    ) -> Result<bool, FirewallError> {
        if !self
            .inner
            .allow_sql_run_after_analysis(event, shape, session)
            .await?
        {
            return Ok(false);
        }

        match self.rules.iter().find(|rule| !rule.allows(event, shape)) {
            Some(rule) => {
                tracing::debug!(manager = self.name(), rule = ?rule, "Extra rule denied statement");
                Ok(false)
            }
            None => Ok(true),
        }
    }

    fn deferred_check(&self, event: &SqlEvent, shape: &StatementShape) -> Option<DeferredCheck> {
        self.inner.deferred_check(event, shape)
    }
}
