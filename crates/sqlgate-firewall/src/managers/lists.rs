//! Statement blacklists and whitelists.
//!
//! List files hold one statement per line. Blank lines and lines starting
//! with `#` are skipped. Statements are compared in canonical form, so
//! spacing and keyword case do not matter.

use crate::error::FirewallError;
use crate::manager::FirewallManager;
use async_trait::async_trait;
use sqlgate_core::SqlEvent;
use sqlgate_db::DatabaseSession;
use sqlgate_sql::{canonical, StatementShape};
use std::collections::HashSet;
use std::path::Path;

/// A set of canonical statements.
#[derive(Debug, Clone, Default)]
pub struct StatementList {
    statements: HashSet<String>,
}

impl StatementList {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FirewallError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| FirewallError::RulesFile {
            path: path.to_path_buf(),
            source,
        })?;
        let list = Self::from_lines(content.lines());
        tracing::debug!(path = %path.display(), statements = list.len(), "Loaded statement list");
        Ok(list)
    }

    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        let statements = lines
            .into_iter()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(canonical)
            .collect();
        Self { statements }
    }

    pub fn contains(&self, sql: &str) -> bool {
        self.statements.contains(&canonical(sql))
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Denies listed statements.
#[derive(Debug)]
pub struct DenyOnBlacklist {
    list: StatementList,
}

impl DenyOnBlacklist {
    pub fn new(list: StatementList) -> Self {
        Self { list }
    }
}

#[async_trait]
impl FirewallManager for DenyOnBlacklist {
    fn name(&self) -> &str {
        "deny_on_blacklist"
    }

    async fn allow_sql_run_after_analysis(
        &self,
        event: &SqlEvent,
        _shape: &StatementShape,
        _session: &mut dyn DatabaseSession,
    ) -> Result<bool, FirewallError> {
        Ok(!self.list.contains(event.sql()))
    }
}

/// Denies every statement that is not listed.
#[derive(Debug)]
pub struct DenyExceptOnWhitelist {
    list: StatementList,
}

impl DenyExceptOnWhitelist {
    pub fn new(list: StatementList) -> Self {
        Self { list }
    }
}

#[async_trait]
impl FirewallManager for DenyExceptOnWhitelist {
    fn name(&self) -> &str {
        "deny_except_on_whitelist"
    }

    async fn allow_sql_run_after_analysis(
        &self,
        event: &SqlEvent,
        _shape: &StatementShape,
        _session: &mut dyn DatabaseSession,
    ) -> Result<bool, FirewallError> {
        Ok(self.list.contains(event.sql()))
    }
}
