//! Managers that decide from the statement shape or event flags alone.

use crate::error::FirewallError;
use crate::manager::FirewallManager;
use async_trait::async_trait;
use sqlgate_core::SqlEvent;
use sqlgate_db::DatabaseSession;
use sqlgate_sql::{tokenize, SqlError, StatementKind, StatementShape};

/// Allows every statement.
#[derive(Debug, Default)]
pub struct AllowAll;

#[async_trait]
impl FirewallManager for AllowAll {
    fn name(&self) -> &str {
        "allow_all"
    }

    async fn allow_sql_run_after_analysis(
        &self,
        _event: &SqlEvent,
        _shape: &StatementShape,
        _session: &mut dyn DatabaseSession,
    ) -> Result<bool, FirewallError> {
        Ok(true)
    }
}

/// Read-only access: the write-gate refuses every write.
#[derive(Debug, Default)]
pub struct DenyDatabaseWrite;

#[async_trait]
impl FirewallManager for DenyDatabaseWrite {
    fn name(&self) -> &str {
        "deny_database_write"
    }

    async fn allow_execute_update(
        &self,
        _event: &SqlEvent,
        _session: &mut dyn DatabaseSession,
    ) -> Result<bool, FirewallError> {
        Ok(false)
    }

    async fn allow_sql_run_after_analysis(
        &self,
        _event: &SqlEvent,
        _shape: &StatementShape,
        _session: &mut dyn DatabaseSession,
    ) -> Result<bool, FirewallError> {
        Ok(true)
    }
}

/// Denies statements of the listed kinds.
#[derive(Debug)]
pub struct DenyKinds {
    name: &'static str,
    kinds: Vec<StatementKind>,
}

impl DenyKinds {
    pub fn new(name: &'static str, kinds: Vec<StatementKind>) -> Self {
        Self { name, kinds }
    }

    pub fn ddl() -> Self {
        Self::new("deny_ddl", vec![StatementKind::Ddl])
    }

    pub fn dcl() -> Self {
        Self::new("deny_dcl", vec![StatementKind::Dcl])
    }

    pub fn tcl() -> Self {
        Self::new("deny_tcl", vec![StatementKind::Tcl])
    }

    pub fn dml() -> Self {
        Self::new(
            "deny_dml",
            vec![
                StatementKind::Select,
                StatementKind::Insert,
                StatementKind::Update,
                StatementKind::Delete,
            ],
        )
    }
}

#[async_trait]
impl FirewallManager for DenyKinds {
    fn name(&self) -> &str {
        self.name
    }

    async fn allow_sql_run_after_analysis(
        &self,
        _event: &SqlEvent,
        shape: &StatementShape,
        _session: &mut dyn DatabaseSession,
    ) -> Result<bool, FirewallError> {
        Ok(!self.kinds.contains(&shape.kind()))
    }
}

/// Denies metadata queries.
#[derive(Debug, Default)]
pub struct DenyMetadataQuery;

#[async_trait]
impl FirewallManager for DenyMetadataQuery {
    fn name(&self) -> &str {
        "deny_metadata_query"
    }

    async fn allow_sql_run_after_analysis(
        &self,
        event: &SqlEvent,
        _shape: &StatementShape,
        _session: &mut dyn DatabaseSession,
    ) -> Result<bool, FirewallError> {
        Ok(!event.is_metadata_query())
    }
}

/// Denies plain statements; only prepared statements may run.
#[derive(Debug, Default)]
pub struct DenyStatementClass;

#[async_trait]
impl FirewallManager for DenyStatementClass {
    fn name(&self) -> &str {
        "deny_statement_class"
    }

    async fn allow_sql_run_after_analysis(
        &self,
        event: &SqlEvent,
        _shape: &StatementShape,
        _session: &mut dyn DatabaseSession,
    ) -> Result<bool, FirewallError> {
        Ok(event.is_prepared_statement())
    }
}

/// Denies statements carrying comments of any style.
#[derive(Debug, Default)]
pub struct DenyComments;

#[async_trait]
impl FirewallManager for DenyComments {
    fn name(&self) -> &str {
        "deny_comments"
    }

    async fn allow_sql_run_after_analysis(
        &self,
        event: &SqlEvent,
        shape: &StatementShape,
        _session: &mut dyn DatabaseSession,
    ) -> Result<bool, FirewallError> {
        if shape.has_comments() {
            return Ok(false);
        }
        // Line comments are invisible to the parser-based flag.
        let tokens = tokenize(event.sql());
        Ok(!tokens.iter().any(|t| t == "--" || t == "/*" || t == "#"))
    }
}

/// Denies statement separators, so only a single bare statement runs.
#[derive(Debug, Default)]
pub struct DenyMultipleStatements;

#[async_trait]
impl FirewallManager for DenyMultipleStatements {
    fn name(&self) -> &str {
        "deny_multiple_statements"
    }

    async fn allow_sql_run_after_analysis(
        &self,
        event: &SqlEvent,
        shape: &StatementShape,
        _session: &mut dyn DatabaseSession,
    ) -> Result<bool, FirewallError> {
        // Any separator counts, trailing ones included.
        if shape.has_multiple_statements()
            || matches!(shape.parse_error(), Some(SqlError::StatementCount(_)))
        {
            return Ok(false);
        }
        Ok(!tokenize(event.sql()).iter().any(|t| t == ";"))
    }
}
