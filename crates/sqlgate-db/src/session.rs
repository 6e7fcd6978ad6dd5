//! The seam between the executor and a concrete database engine.

use crate::error::DbError;
use crate::statement::{PreparedStatement, StatementOutcome};
use async_trait::async_trait;
use sqlgate_core::{Caller, DatabaseBackend};

/// One transactional database session, owned by a single request.
///
/// Work happens inside a transaction that the owner must end with
/// [`commit`](Self::commit) or [`rollback`](Self::rollback). A session that is
/// dropped without either is rolled back by the driver.
#[async_trait]
pub trait DatabaseSession: Send {
    fn backend(&self) -> DatabaseBackend;

    /// Whether BLOB parameters aimed at `tables` must go through the
    /// engine's large-object storage instead of a plain byte bind.
    async fn uses_large_object_storage(&mut self, tables: &[String]) -> Result<bool, DbError>;

    /// Execute one statement inside the session transaction.
    async fn execute(&mut self, statement: &PreparedStatement) -> Result<StatementOutcome, DbError>;

    /// Execute `statements` in order and return their update counts.
    async fn execute_batch(&mut self, statements: &[PreparedStatement]) -> Result<Vec<u64>, DbError> {
        let mut counts = Vec::with_capacity(statements.len());
        for statement in statements {
            counts.push(self.execute(statement).await?.row_count());
        }
        Ok(counts)
    }

    async fn commit(&mut self) -> Result<(), DbError>;

    async fn rollback(&mut self) -> Result<(), DbError>;
}

/// Hands out sessions for one database binding.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    fn backend(&self) -> DatabaseBackend;

    /// Whether callable statements with OUT parameters are supported.
    fn supports_callable(&self) -> bool;

    /// Acquire a fresh session for `caller`.
    async fn acquire(&self, caller: &Caller) -> Result<Box<dyn DatabaseSession>, DbError>;
}
