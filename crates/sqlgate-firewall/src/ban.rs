//! The ban table shared by `ban_user` and `deny_banned_user`.

use crate::error::FirewallError;
use chrono::Utc;
use regex::Regex;
use sqlgate_core::SqlEvent;
use sqlgate_db::{BindValue, DatabaseSession, PreparedStatement};
use std::sync::LazyLock;

pub const DEFAULT_BAN_TABLE: &str = "sqlgate_banned_users";

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Statements over the ban table of one database binding.
///
/// Every statement is run through a session its caller already holds, so
/// the table needs no connection of its own.
pub(crate) struct BanTable {
    name: String,
}

impl BanTable {
    pub(crate) fn new(component: &str, name: Option<&str>) -> Result<Self, FirewallError> {
        let name = name.unwrap_or(DEFAULT_BAN_TABLE);
        if !IDENTIFIER.is_match(name) {
            return Err(FirewallError::invalid_options(
                component,
                format!("'{name}' is not a plain table name"),
            ));
        }

        Ok(Self {
            name: name.to_string(),
        })
    }

    /// Create the table in the session's transaction if it is missing.
    pub(crate) async fn ensure(
        &self,
        session: &mut dyn DatabaseSession,
    ) -> Result<(), FirewallError> {
        session
            .execute(&PreparedStatement::update(
                format!(
                    "CREATE TABLE IF NOT EXISTS {} (\
                     username VARCHAR(255) NOT NULL, \
                     ip_address VARCHAR(64), \
                     database_name VARCHAR(255), \
                     manager VARCHAR(255), \
                     sql_text TEXT, \
                     banned_at TIMESTAMP)",
                    self.name
                ),
                vec![],
            ))
            .await?;
        Ok(())
    }

    pub(crate) fn lookup(&self, username: &str) -> PreparedStatement {
        PreparedStatement::query(
            format!("SELECT username FROM {} WHERE username = ?", self.name),
            vec![BindValue::Text(username.to_string())],
        )
    }

    pub(crate) fn insert(&self, event: &SqlEvent, manager: &str) -> PreparedStatement {
        PreparedStatement::update(
            format!(
                "INSERT INTO {} (username, ip_address, database_name, manager, sql_text, banned_at) \
                 VALUES (?, ?, ?, ?, ?, ?)",
                self.name
            ),
            vec![
                BindValue::Text(event.username().to_string()),
                BindValue::Text(event.ip_address().to_string()),
                BindValue::Text(event.database().to_string()),
                BindValue::Text(manager.to_string()),
                BindValue::Text(event.sql().to_string()),
                BindValue::Timestamp(Utc::now().naive_utc()),
            ],
        )
    }
}
