//! Ordered evaluation of firewall managers.
//!
//! A chain runs two unanimous-allow passes over its managers:
//!
//! 1. **Write-gate** - every manager's [`allow_execute_update`], for every
//!    statement that may modify the database (unknown statements included)
//!    and for every update request
//! 2. **Content-gate** - every manager's [`allow_sql_run_after_analysis`]
//!
//! The first manager to deny ends evaluation. Refusal triggers run through
//! [`FirewallChain::on_deny`], once per denied statement. Out-of-band checks
//! start only through [`FirewallChain::start_deferred_checks`], once the
//! statements they inspect have run.
//!
//! [`allow_execute_update`]: crate::FirewallManager::allow_execute_update
//! [`allow_sql_run_after_analysis`]: crate::FirewallManager::allow_sql_run_after_analysis

use crate::error::FirewallError;
use crate::manager::{DeferredCheck, FirewallManager};
use crate::managers::AllowAll;
use crate::trigger::{Refusal, RefusalTrigger};
use serde::Serialize;
use sqlgate_audit::AuditLogger;
use sqlgate_core::SqlEvent;
use sqlgate_db::{ConnectionProvider, DatabaseSession};
use sqlgate_sql::StatementShape;
use std::sync::Arc;

/// Which pass refused a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    Write,
    Content,
    /// A background check flagged a statement that had already run.
    OutOfBand,
}

impl Gate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Write => "write",
            Self::Content => "content",
            Self::OutOfBand => "out_of_band",
        }
    }
}

impl std::fmt::Display for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one chain evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallVerdict {
    allowed: bool,
    denying_manager: Option<String>,
    gate: Option<Gate>,
    event: SqlEvent,
}

impl FirewallVerdict {
    pub fn allowed(event: SqlEvent) -> Self {
        Self {
            allowed: true,
            denying_manager: None,
            gate: None,
            event,
        }
    }

    pub fn denied(manager: impl Into<String>, gate: Gate, event: SqlEvent) -> Self {
        Self {
            allowed: false,
            denying_manager: Some(manager.into()),
            gate: Some(gate),
            event,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    pub fn denying_manager(&self) -> Option<&str> {
        self.denying_manager.as_deref()
    }

    pub fn gate(&self) -> Option<Gate> {
        self.gate
    }

    /// The event that was evaluated.
    pub fn event(&self) -> &SqlEvent {
        &self.event
    }
}

/// The managers and refusal triggers of one database binding.
pub struct FirewallChain {
    managers: Vec<Arc<dyn FirewallManager>>,
    triggers: Arc<Vec<Arc<dyn RefusalTrigger>>>,
    provider: Arc<dyn ConnectionProvider>,
    audit: Arc<AuditLogger>,
}

impl std::fmt::Debug for FirewallChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirewallChain")
            .field("managers", &self.manager_names())
            .field(
                "triggers",
                &self.triggers.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl FirewallChain {
    /// Build a chain. An empty manager list allows everything.
    ///
    /// `provider` supplies fresh sessions to refusal triggers started by
    /// out-of-band checks; `audit` records their violations.
    pub fn new(
        managers: Vec<Arc<dyn FirewallManager>>,
        triggers: Vec<Arc<dyn RefusalTrigger>>,
        provider: Arc<dyn ConnectionProvider>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        let managers = if managers.is_empty() {
            vec![Arc::new(AllowAll) as Arc<dyn FirewallManager>]
        } else {
            managers
        };

        Self {
            managers,
            triggers: Arc::new(triggers),
            provider,
            audit,
        }
    }

    pub fn manager_names(&self) -> Vec<&str> {
        self.managers.iter().map(|m| m.name()).collect()
    }

    /// Evaluate `event` against every manager.
    ///
    /// Only `SELECT` skips the write-gate, and only on query requests.
    /// `is_update` marks requests that expect an update count.
    pub async fn evaluate(
        &self,
        shape: &StatementShape,
        event: &SqlEvent,
        session: &mut dyn DatabaseSession,
        is_update: bool,
    ) -> Result<FirewallVerdict, FirewallError> {
        if shape.kind().may_write() || is_update {
            for manager in &self.managers {
                if !manager.allow_execute_update(event, &mut *session).await? {
                    tracing::info!(
                        manager = manager.name(),
                        username = event.username(),
                        kind = %shape.kind(),
                        "Write-gate denied statement"
                    );
                    return Ok(FirewallVerdict::denied(manager.name(), Gate::Write, event.clone()));
                }
            }
        }

        for manager in &self.managers {
            if !manager
                .allow_sql_run_after_analysis(event, shape, &mut *session)
                .await?
            {
                tracing::info!(
                    manager = manager.name(),
                    username = event.username(),
                    kind = %shape.kind(),
                    "Content-gate denied statement"
                );
                return Ok(FirewallVerdict::denied(manager.name(), Gate::Content, event.clone()));
            }
        }

        tracing::debug!(sql = event.sql(), managers = self.managers.len(), "Statement allowed");
        Ok(FirewallVerdict::allowed(event.clone()))
    }

    /// Fire every refusal trigger for a denied verdict.
    ///
    /// Trigger failures are logged and swallowed.
    pub async fn on_deny(&self, verdict: &FirewallVerdict) {
        let (Some(manager), Some(gate)) = (verdict.denying_manager(), verdict.gate()) else {
            tracing::debug!("on_deny called for an allowed verdict");
            return;
        };

        let refusal = Refusal::new(manager, gate, verdict.event().clone());
        fire_triggers(&self.triggers, &refusal, self.provider.as_ref()).await;
    }

    /// Start every manager's out-of-band check for an executed statement.
    pub fn start_deferred_checks(&self, shape: &StatementShape, event: &SqlEvent) {
        for manager in &self.managers {
            if let Some(check) = manager.deferred_check(event, shape) {
                self.dispatch_deferred(manager.name(), event.clone(), check);
            }
        }
    }

    fn dispatch_deferred(&self, manager: &str, event: SqlEvent, check: DeferredCheck) {
        let manager = manager.to_string();
        let triggers = Arc::clone(&self.triggers);
        let provider = Arc::clone(&self.provider);
        let audit = Arc::clone(&self.audit);

        tokio::spawn(async move {
            let reason = match check.await {
                Ok(Some(reason)) => reason,
                Ok(None) => return,
                Err(e) => {
                    tracing::warn!(manager = %manager, error = %e, "Out-of-band check failed");
                    return;
                }
            };

            tracing::warn!(
                manager = %manager,
                username = event.username(),
                reason = %reason,
                "Out-of-band check flagged an allowed statement"
            );
            if let Err(e) = audit.log_async_violation(&event, &manager, &reason).await {
                tracing::warn!(error = %e, "Failed to audit out-of-band violation");
            }

            let refusal = Refusal::new(manager, Gate::OutOfBand, event).with_reason(reason);
            fire_triggers(&triggers, &refusal, provider.as_ref()).await;
        });
    }
}

async fn fire_triggers(
    triggers: &[Arc<dyn RefusalTrigger>],
    refusal: &Refusal,
    provider: &dyn ConnectionProvider,
) {
    for trigger in triggers {
        if let Err(e) = trigger.run_if_statement_refused(refusal, provider).await {
            tracing::warn!(
                trigger = trigger.name(),
                manager = %refusal.manager,
                error = %e,
                "Refusal trigger failed"
            );
        }
    }
}
