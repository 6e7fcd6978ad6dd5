//! Per-user, per-table rules read from a CSV file.
//!
//! The file is `;`-separated with the header
//! `username;table;delete;insert;select;update;optional comments`.
//! `public` as username matches every caller; `all` as table matches every
//! table.
//!
//! ```text
//! username;table;delete;insert;select;update;optional comments
//! public;customer;false;false;true;false;everyone may read customers
//! alice;all;true;true;true;true;alice is the admin
//! ```

use crate::error::FirewallError;
use crate::manager::FirewallManager;
use async_trait::async_trait;
use serde::Deserialize;
use sqlgate_core::SqlEvent;
use sqlgate_db::DatabaseSession;
use sqlgate_sql::{StatementKind, StatementShape};
use std::io::Read;
use std::path::Path;

const ANY_USER: &str = "public";
const ANY_TABLE: &str = "all";

#[derive(Debug, Deserialize)]
struct RuleRow {
    username: String,
    table: String,
    delete: String,
    insert: String,
    select: String,
    update: String,
}

/// One row of the rules file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRule {
    pub username: String,
    /// Lower-cased table name, or `all`.
    pub table: String,
    pub delete: bool,
    pub insert: bool,
    pub select: bool,
    pub update: bool,
}

impl TableRule {
    fn matches_user(&self, username: &str) -> bool {
        self.username == ANY_USER || self.username == username
    }

    fn matches_table(&self, table: &str) -> bool {
        if self.table == ANY_TABLE || self.table == table {
            return true;
        }
        // A schema-qualified name also matches its bare table rule.
        table.rsplit('.').next() == Some(self.table.as_str())
    }

    fn permits(&self, kind: StatementKind) -> bool {
        match kind {
            StatementKind::Select => self.select,
            StatementKind::Insert => self.insert,
            StatementKind::Update => self.update,
            StatementKind::Delete => self.delete,
            _ => false,
        }
    }

    fn grants_everything(&self) -> bool {
        self.table == ANY_TABLE && self.delete && self.insert && self.select && self.update
    }
}

/// Parsed rules.
#[derive(Debug, Clone, Default)]
pub struct CsvRules {
    rules: Vec<TableRule>,
}

impl CsvRules {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FirewallError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|source| FirewallError::RulesFile {
            path: path.to_path_buf(),
            source,
        })?;
        let rules = Self::from_reader(file, path)?;
        tracing::debug!(path = %path.display(), rules = rules.len(), "Loaded CSV rules");
        Ok(rules)
    }

    /// Parse rules from `reader`; `origin` is only used in error messages.
    pub fn from_reader(reader: impl Read, origin: &Path) -> Result<Self, FirewallError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b';')
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut rules = Vec::new();
        for (i, row) in reader.deserialize::<RuleRow>().enumerate() {
            let row = row?;
            let line = i as u64 + 2;
            let flag = |value: &str, column: &str| -> Result<bool, FirewallError> {
                match value.to_ascii_lowercase().as_str() {
                    "true" => Ok(true),
                    "false" => Ok(false),
                    other => Err(FirewallError::InvalidRule {
                        path: origin.to_path_buf(),
                        line,
                        message: format!("{column} must be true or false, got '{other}'"),
                    }),
                }
            };

            rules.push(TableRule {
                delete: flag(&row.delete, "delete")?,
                insert: flag(&row.insert, "insert")?,
                select: flag(&row.select, "select")?,
                update: flag(&row.update, "update")?,
                table: row.table.to_lowercase(),
                username: row.username,
            });
        }

        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether `username` may run a statement of `kind` over `tables`.
    pub fn allows(&self, username: &str, kind: StatementKind, tables: &[String]) -> bool {
        if !kind.is_dml() || tables.is_empty() {
            return self
                .rules
                .iter()
                .any(|r| r.matches_user(username) && r.grants_everything());
        }

        tables.iter().all(|table| {
            self.rules
                .iter()
                .any(|r| r.matches_user(username) && r.matches_table(table) && r.permits(kind))
        })
    }
}

/// Enforces [`CsvRules`] in the content-gate.
#[derive(Debug)]
pub struct CsvRulesManager {
    rules: CsvRules,
}

impl CsvRulesManager {
    pub fn new(rules: CsvRules) -> Self {
        Self { rules }
    }
}

#[async_trait]
impl FirewallManager for CsvRulesManager {
    fn name(&self) -> &str {
        "csv_rules"
    }

    async fn allow_sql_run_after_analysis(
        &self,
        event: &SqlEvent,
        shape: &StatementShape,
        _session: &mut dyn DatabaseSession,
    ) -> Result<bool, FirewallError> {
        let allowed = self
            .rules
            .allows(event.username(), shape.kind(), shape.tables());
        if !allowed {
            tracing::debug!(
                username = event.username(),
                kind = %shape.kind(),
                tables = ?shape.tables(),
                "No CSV rule grants the statement"
            );
        }
        Ok(allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: &str = "\
username;table;delete;insert;select;update;optional comments
public;customer;false;false;true;false;everyone reads customers
bob;orderlog;false;true;true;FALSE
alice;all;true;true;true;true;admin
";

    fn rules() -> CsvRules {
        CsvRules::from_reader(RULES.as_bytes(), Path::new("rules.csv")).unwrap()
    }

    fn tables(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_parse_rows() {
        let rules = rules();
        assert_eq!(rules.len(), 3);
        assert_eq!(rules.rules[1].username, "bob");
        assert!(rules.rules[1].insert);
        assert!(!rules.rules[1].update);
    }

    #[test]
    fn test_public_and_user_rules() {
        let rules = rules();
        assert!(rules.allows("carol", StatementKind::Select, &tables(&["customer"])));
        assert!(!rules.allows("carol", StatementKind::Delete, &tables(&["customer"])));
        assert!(rules.allows("bob", StatementKind::Insert, &tables(&["orderlog"])));
        assert!(!rules.allows("bob", StatementKind::Update, &tables(&["orderlog"])));
        // Every referenced table must be granted.
        assert!(!rules.allows("bob", StatementKind::Select, &tables(&["orderlog", "invoice"])));
        assert!(rules.allows("bob", StatementKind::Select, &tables(&["orderlog", "customer"])));
        assert!(rules.allows("carol", StatementKind::Select, &tables(&["public.customer"])));
    }

    #[test]
    fn test_tableless_and_other_kinds_need_full_grant() {
        let rules = rules();
        assert!(!rules.allows("bob", StatementKind::Select, &[]));
        assert!(!rules.allows("bob", StatementKind::Ddl, &tables(&["orderlog"])));
        assert!(rules.allows("alice", StatementKind::Ddl, &tables(&["orderlog"])));
        assert!(rules.allows("alice", StatementKind::Select, &[]));
    }

    #[test]
    fn test_invalid_flag_reports_line() {
        let bad = "username;table;delete;insert;select;update\nbob;t;yes;false;true;false\n";
        let err = CsvRules::from_reader(bad.as_bytes(), Path::new("rules.csv")).unwrap_err();
        match err {
            FirewallError::InvalidRule { line, message, .. } => {
                assert_eq!(line, 2);
                assert!(message.contains("delete"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
