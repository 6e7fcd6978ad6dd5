//! The firewall manager seam.

use crate::error::FirewallError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use sqlgate_core::SqlEvent;
use sqlgate_db::DatabaseSession;
use sqlgate_sql::StatementShape;

/// An out-of-band check started after a statement was allowed.
///
/// Resolves to `Some(reason)` when the statement turns out to be a violation.
pub type DeferredCheck = BoxFuture<'static, Result<Option<String>, FirewallError>>;

/// A pluggable policy evaluator.
///
/// Managers are shared read-only across concurrent requests. Any cache a
/// manager keeps is its own synchronization problem.
#[async_trait]
pub trait FirewallManager: Send + Sync {
    /// Registry key, reported as the denying manager.
    fn name(&self) -> &str;

    /// Write-gate, consulted only for statements that modify the database.
    async fn allow_execute_update(
        &self,
        _event: &SqlEvent,
        _session: &mut dyn DatabaseSession,
    ) -> Result<bool, FirewallError> {
        Ok(true)
    }

    /// Content-gate, consulted for every statement.
    async fn allow_sql_run_after_analysis(
        &self,
        event: &SqlEvent,
        shape: &StatementShape,
        session: &mut dyn DatabaseSession,
    ) -> Result<bool, FirewallError>;

    /// Check to run in the background once the allowed statement has run.
    fn deferred_check(&self, _event: &SqlEvent, _shape: &StatementShape) -> Option<DeferredCheck> {
        None
    }
}
