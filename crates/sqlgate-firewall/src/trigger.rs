//! Refusal triggers: side-effecting observers of denied statements.

use crate::ban::BanTable;
use crate::chain::Gate;
use crate::error::FirewallError;
use async_trait::async_trait;
use sqlgate_audit::{AuditLogger, FileStorage};
use sqlgate_core::{AuditConfig, SqlEvent};
use sqlgate_db::ConnectionProvider;
use std::path::PathBuf;
use std::sync::Arc;

/// What a trigger learns about a refused statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refusal {
    pub manager: String,
    pub gate: Gate,
    pub event: SqlEvent,
    /// Explanation from an out-of-band check, if any.
    pub reason: Option<String>,
}

impl Refusal {
    pub fn new(manager: impl Into<String>, gate: Gate, event: SqlEvent) -> Self {
        Self {
            manager: manager.into(),
            gate,
            event,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// A hook run once for every refused statement.
///
/// Errors are logged by the chain and never reach the client.
#[async_trait]
pub trait RefusalTrigger: Send + Sync {
    fn name(&self) -> &str;

    /// React to `refusal`. Database work must use a fresh session from
    /// `provider`, never the refused request's session.
    async fn run_if_statement_refused(
        &self,
        refusal: &Refusal,
        provider: &dyn ConnectionProvider,
    ) -> Result<(), FirewallError>;
}

/// Logs refusals through `tracing`.
#[derive(Debug, Default)]
pub struct LogTrigger;

#[async_trait]
impl RefusalTrigger for LogTrigger {
    fn name(&self) -> &str {
        "log"
    }

    async fn run_if_statement_refused(
        &self,
        refusal: &Refusal,
        _provider: &dyn ConnectionProvider,
    ) -> Result<(), FirewallError> {
        let event = &refusal.event;
        tracing::warn!(
            manager = %refusal.manager,
            gate = %refusal.gate,
            username = event.username(),
            ip_address = event.ip_address(),
            database = event.database(),
            sql = event.sql(),
            parameters = ?event.parameter_values(),
            reason = refusal.reason.as_deref().unwrap_or(""),
            "Statement refused"
        );
        Ok(())
    }
}

/// Writes refusals to a dedicated JSON Lines audit file.
pub struct AuditTrigger {
    logger: AuditLogger,
}

impl AuditTrigger {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, FirewallError> {
        let path = path.into();
        let storage = FileStorage::new(&path)?;
        let config = AuditConfig {
            enabled: true,
            stdout: false,
            file: Some(path),
        };
        Ok(Self {
            logger: AuditLogger::with_storage(config, Arc::new(storage)),
        })
    }
}

#[async_trait]
impl RefusalTrigger for AuditTrigger {
    fn name(&self) -> &str {
        "audit"
    }

    async fn run_if_statement_refused(
        &self,
        refusal: &Refusal,
        _provider: &dyn ConnectionProvider,
    ) -> Result<(), FirewallError> {
        match (refusal.gate, &refusal.reason) {
            (Gate::OutOfBand, reason) => {
                self.logger
                    .log_async_violation(
                        &refusal.event,
                        &refusal.manager,
                        reason.as_deref().unwrap_or("flagged"),
                    )
                    .await?
            }
            _ => {
                self.logger
                    .log_denied(&refusal.event, &refusal.manager, None)
                    .await?
            }
        }
        Ok(())
    }
}

/// Records the refused caller in the ban table, which `deny_banned_user`
/// consults on later requests.
pub struct BanUserTrigger {
    table: BanTable,
}

impl BanUserTrigger {
    pub(crate) fn new(table: BanTable) -> Self {
        Self { table }
    }
}

#[async_trait]
impl RefusalTrigger for BanUserTrigger {
    fn name(&self) -> &str {
        "ban_user"
    }

    async fn run_if_statement_refused(
        &self,
        refusal: &Refusal,
        provider: &dyn ConnectionProvider,
    ) -> Result<(), FirewallError> {
        let caller = refusal.event.caller();
        let mut session = provider.acquire(&caller).await?;
        self.table.ensure(session.as_mut()).await?;
        session
            .execute(&self.table.insert(&refusal.event, &refusal.manager))
            .await?;
        session.commit().await?;

        tracing::warn!(
            username = %caller.username,
            manager = %refusal.manager,
            "Banned user after refused statement"
        );
        Ok(())
    }
}
