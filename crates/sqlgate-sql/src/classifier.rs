//! Statement classification.
//!
//! [`StatementClassifier::classify`] turns raw SQL into a [`StatementShape`].
//! GRANT, REVOKE, ROLLBACK and DROP are recognized from tokens alone; every
//! other statement goes through `sqlparser` on a best-effort basis and falls
//! back to [`StatementKind::Unknown`] when parsing fails.

use crate::error::SqlError;
use crate::tokenizer::tokenize;
use regex::Regex;
use serde::Serialize;
use sqlparser::ast::{FromTable, Query, SetExpr, Statement, TableFactor, TableWithJoins};
use sqlparser::dialect::{Dialect, GenericDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;
use std::sync::LazyLock;

static BLOCK_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid comment regex"));

static FULLTEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bfulltext\b").expect("valid fulltext regex"));

const FULLTEXT_FIXUP: &str = "fulltext_";

/// Kind of SQL statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    /// Data definition: CREATE, ALTER, DROP, TRUNCATE.
    Ddl,
    /// Data control: GRANT, REVOKE.
    Dcl,
    /// Transaction control: COMMIT, ROLLBACK, SAVEPOINT.
    Tcl,
    Unknown,
}

impl StatementKind {
    /// Whether statements of this kind modify the database.
    pub fn is_write(&self) -> bool {
        !matches!(self, Self::Select | Self::Unknown)
    }

    /// Whether a statement of this kind can modify the database. Unknown
    /// statements (unparsed text, several statements in one string) count.
    pub fn may_write(&self) -> bool {
        !matches!(self, Self::Select)
    }

    /// Whether this kind is plain data manipulation.
    pub fn is_dml(&self) -> bool {
        matches!(
            self,
            Self::Select | Self::Insert | Self::Update | Self::Delete
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Ddl => "DDL",
            Self::Dcl => "DCL",
            Self::Tcl => "TCL",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for StatementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural summary of one SQL statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementShape {
    kind: StatementKind,
    tables: Vec<String>,
    has_comments: bool,
    has_multiple_statements: bool,
    parse_error: Option<SqlError>,
}

impl StatementShape {
    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// Referenced table names, lower-cased and unquoted, in order of first
    /// appearance.
    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    pub fn has_comments(&self) -> bool {
        self.has_comments
    }

    /// True when trailing semicolons were stripped from the text.
    pub fn has_multiple_statements(&self) -> bool {
        self.has_multiple_statements
    }

    pub fn parse_error(&self) -> Option<&SqlError> {
        self.parse_error.as_ref()
    }
}

/// SQL dialect used for the best-effort parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SqlDialect {
    #[default]
    Generic,
    Postgres,
    Sqlite,
}

impl SqlDialect {
    fn parser_dialect(&self) -> Box<dyn Dialect> {
        match self {
            Self::Generic => Box::new(GenericDialect {}),
            Self::Postgres => Box::new(PostgreSqlDialect {}),
            Self::Sqlite => Box::new(SQLiteDialect {}),
        }
    }
}

/// Classifies SQL statements.
#[derive(Debug, Clone, Default)]
pub struct StatementClassifier {
    dialect: SqlDialect,
}

impl StatementClassifier {
    pub fn new(dialect: SqlDialect) -> Self {
        Self { dialect }
    }

    /// Classify `sql`. Never fails; parse problems land in `parse_error`.
    pub fn classify(&self, sql: &str) -> StatementShape {
        let (text, has_multiple_statements) = strip_trailing_semicolons(sql);
        let has_comments = BLOCK_COMMENT.replace_all(text, "").len() != text.len();

        let tokens = tokenize(text);
        let special = match tokens.first().map(String::as_str) {
            Some("GRANT") | Some("REVOKE") => {
                Some((StatementKind::Dcl, tables_after_on(&tokens)))
            }
            Some("ROLLBACK") => Some((StatementKind::Tcl, Vec::new())),
            Some("DROP") if tokens.get(1).is_some_and(|t| is_principal_keyword(t)) => {
                Some((StatementKind::Dcl, Vec::new()))
            }
            Some("DROP") => Some((StatementKind::Ddl, tables_after_table_keyword(&tokens))),
            _ => None,
        };

        let (kind, tables, parse_error) = match special {
            Some((kind, tables)) => (kind, tables, None),
            None => self.parse(text, &tokens),
        };

        let shape = StatementShape {
            kind,
            tables: dedup(tables),
            has_comments,
            has_multiple_statements,
            parse_error,
        };
        tracing::trace!(
            kind = %shape.kind,
            tables = ?shape.tables,
            has_comments = shape.has_comments,
            has_multiple_statements = shape.has_multiple_statements,
            "Classified statement"
        );
        shape
    }

    fn parse(
        &self,
        text: &str,
        tokens: &[String],
    ) -> (StatementKind, Vec<String>, Option<SqlError>) {
        let fixed = FULLTEXT.replace_all(text, FULLTEXT_FIXUP);
        let dialect = self.dialect.parser_dialect();

        let statements = match Parser::parse_sql(&*dialect, &fixed) {
            Ok(statements) => statements,
            Err(e) => {
                return (
                    StatementKind::Unknown,
                    Vec::new(),
                    Some(SqlError::Parse(e.to_string())),
                );
            }
        };

        if statements.len() != 1 {
            return (
                StatementKind::Unknown,
                Vec::new(),
                Some(SqlError::StatementCount(statements.len())),
            );
        }

        let statement = &statements[0];
        let kind = statement_kind(statement);
        let mut tables = Vec::new();
        collect_statement_tables(statement, &mut tables);
        if tables.is_empty() && kind == StatementKind::Ddl {
            tables = tables_after_table_keyword(tokens);
        }

        let tables = tables
            .into_iter()
            .map(|t| revert_fulltext(&clean_table_name(&t)))
            .collect();
        (kind, tables, None)
    }
}

/// Classify with the generic dialect.
pub fn classify(sql: &str) -> StatementShape {
    StatementClassifier::default().classify(sql)
}

/// `ROLE` or `USER` in any case, as in `DROP ROLE`.
fn is_principal_keyword(token: &str) -> bool {
    token.eq_ignore_ascii_case("ROLE") || token.eq_ignore_ascii_case("USER")
}

fn strip_trailing_semicolons(sql: &str) -> (&str, bool) {
    let mut text = sql.trim();
    let mut stripped = false;
    while let Some(rest) = text.strip_suffix(';') {
        text = rest.trim_end();
        stripped = true;
    }
    (text, stripped)
}

fn statement_kind(statement: &Statement) -> StatementKind {
    match statement {
        Statement::Query(_) => StatementKind::Select,
        Statement::Insert { .. } => StatementKind::Insert,
        Statement::Update { .. } => StatementKind::Update,
        Statement::Delete(_) => StatementKind::Delete,
        Statement::CreateTable { .. }
        | Statement::CreateVirtualTable { .. }
        | Statement::CreateIndex { .. }
        | Statement::CreateView { .. }
        | Statement::CreateSchema { .. }
        | Statement::CreateDatabase { .. }
        | Statement::CreateFunction { .. }
        | Statement::CreateProcedure { .. }
        | Statement::CreateTrigger { .. }
        | Statement::CreateSequence { .. }
        | Statement::CreateType { .. }
        | Statement::CreateDomain { .. }
        | Statement::CreateExtension { .. }
        | Statement::CreateMacro { .. }
        | Statement::CreatePolicy { .. }
        | Statement::AlterTable { .. }
        | Statement::AlterSchema { .. }
        | Statement::AlterIndex { .. }
        | Statement::AlterView { .. }
        | Statement::AlterType { .. }
        | Statement::AlterPolicy { .. }
        | Statement::RenameTable { .. }
        | Statement::Comment { .. }
        | Statement::Drop { .. }
        | Statement::DropFunction { .. }
        | Statement::DropProcedure { .. }
        | Statement::DropTrigger { .. }
        | Statement::DropDomain { .. }
        | Statement::DropExtension { .. }
        | Statement::DropPolicy { .. }
        | Statement::Truncate { .. } => StatementKind::Ddl,
        Statement::Grant { .. }
        | Statement::Revoke { .. }
        | Statement::Deny { .. }
        | Statement::CreateRole { .. }
        | Statement::AlterRole { .. }
        | Statement::CreateUser { .. }
        | Statement::AlterUser { .. } => StatementKind::Dcl,
        Statement::StartTransaction { .. }
        | Statement::Commit { .. }
        | Statement::Rollback { .. }
        | Statement::Savepoint { .. }
        | Statement::ReleaseSavepoint { .. } => StatementKind::Tcl,
        _ => StatementKind::Unknown,
    }
}

fn collect_statement_tables(statement: &Statement, tables: &mut Vec<String>) {
    match statement {
        Statement::Query(query) => collect_query_tables(query, tables),
        Statement::Insert(insert) => {
            tables.push(insert.table.to_string());
            if let Some(source) = &insert.source {
                collect_query_tables(source, tables);
            }
        }
        Statement::Update(update) => collect_table_with_joins(&update.table, tables),
        Statement::Delete(delete) => match &delete.from {
            FromTable::WithFromKeyword(from) | FromTable::WithoutKeyword(from) => {
                for twj in from {
                    collect_table_with_joins(twj, tables);
                }
            }
        },
        _ => {}
    }
}

fn collect_query_tables(query: &Query, tables: &mut Vec<String>) {
    let mut cte_names = Vec::new();
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            cte_names.push(cte.alias.name.value.to_lowercase());
            collect_query_tables(&cte.query, tables);
        }
    }

    let mut body_tables = Vec::new();
    collect_set_expr_tables(&query.body, &mut body_tables);
    tables.extend(
        body_tables
            .into_iter()
            .filter(|t| !cte_names.contains(&clean_table_name(t))),
    );
}

fn collect_set_expr_tables(body: &SetExpr, tables: &mut Vec<String>) {
    match body {
        SetExpr::Select(select) => {
            for twj in &select.from {
                collect_table_with_joins(twj, tables);
            }
        }
        SetExpr::Query(query) => collect_query_tables(query, tables),
        SetExpr::SetOperation { left, right, .. } => {
            collect_set_expr_tables(left, tables);
            collect_set_expr_tables(right, tables);
        }
        _ => {}
    }
}

fn collect_table_with_joins(twj: &TableWithJoins, tables: &mut Vec<String>) {
    collect_table_factor(&twj.relation, tables);
    for join in &twj.joins {
        collect_table_factor(&join.relation, tables);
    }
}

fn collect_table_factor(factor: &TableFactor, tables: &mut Vec<String>) {
    match factor {
        TableFactor::Table { name, .. } => tables.push(name.to_string()),
        TableFactor::Derived { subquery, .. } => collect_query_tables(subquery, tables),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => collect_table_with_joins(table_with_joins, tables),
        _ => {}
    }
}

/// Table names following `ON` in GRANT/REVOKE, up to `TO`/`FROM`.
fn tables_after_on(tokens: &[String]) -> Vec<String> {
    let Some(on) = tokens.iter().position(|t| t == "ON") else {
        return Vec::new();
    };
    let mut rest = &tokens[on + 1..];
    if rest.first().is_some_and(|t| t == "TABLE") {
        rest = &rest[1..];
    }
    name_list(rest, &["TO", "FROM"])
}

/// Table names following `TABLE [IF [NOT] EXISTS]`.
fn tables_after_table_keyword(tokens: &[String]) -> Vec<String> {
    let rest = match tokens.iter().position(|t| t == "TABLE") {
        Some(pos) => &tokens[pos + 1..],
        // TRUNCATE may omit the TABLE keyword.
        None if tokens.first().is_some_and(|t| t == "TRUNCATE") => &tokens[1..],
        None => return Vec::new(),
    };

    let mut rest = rest;
    if rest.first().is_some_and(|t| t == "IF") {
        let skip = rest
            .iter()
            .position(|t| t == "EXISTS")
            .map_or(rest.len(), |p| p + 1);
        rest = &rest[skip..];
    }

    if tokens.first().is_some_and(|t| t == "DROP") {
        name_list(rest, &["CASCADE", "RESTRICT"])
    } else {
        rest.first()
            .filter(|t| *t != "(")
            .map(|t| vec![clean_table_name(t)])
            .unwrap_or_default()
    }
}

/// Comma-separated names up to the first stop keyword.
fn name_list(tokens: &[String], stop: &[&str]) -> Vec<String> {
    tokens
        .iter()
        .take_while(|t| {
            !stop.contains(&t.as_str()) && !matches!(t.as_str(), "(" | ";" | "/*" | "--" | "#")
        })
        .filter(|t| *t != ",")
        .map(|t| clean_table_name(t))
        .collect()
}

fn clean_table_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '"' | '`' | '[' | ']'))
        .collect::<String>()
        .to_lowercase()
}

fn revert_fulltext(name: &str) -> String {
    name.split('.')
        .map(|part| if part == FULLTEXT_FIXUP { "fulltext" } else { part })
        .collect::<Vec<_>>()
        .join(".")
}

fn dedup(tables: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tables.len());
    for table in tables {
        if !out.contains(&table) {
            out.push(table);
        }
    }
    out
}
