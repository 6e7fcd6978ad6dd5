//! Audit event types.
//!
//! Core fields follow the format: [user - database - ip - sql].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlgate_core::SqlEvent;
use uuid::Uuid;

/// Type of audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// Statement executed and committed.
    StatementExecuted,
    /// Statement failed in the database.
    StatementFailed,
    /// Statement refused by the firewall chain.
    StatementDenied,
    /// Out-of-band inspection flagged a statement after it was allowed.
    AsyncViolation,
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StatementExecuted => write!(f, "STATEMENT_EXECUTED"),
            Self::StatementFailed => write!(f, "STATEMENT_FAILED"),
            Self::StatementDenied => write!(f, "STATEMENT_DENIED"),
            Self::AsyncViolation => write!(f, "ASYNC_VIOLATION"),
        }
    }
}

/// An audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID.
    pub event_id: Uuid,

    /// When the event occurred.
    pub occurred_at: DateTime<Utc>,

    /// Event type.
    pub event_type: AuditEventType,

    // ===== Core fields: [user - database - ip - sql] =====
    pub username: String,

    pub database: String,

    pub client_ip: String,

    pub sql: String,

    // ===== Statement details =====
    pub is_prepared_statement: bool,

    /// Parameter values in index order, wire form.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameter_values: Vec<String>,

    pub is_metadata_query: bool,

    /// Statement kind as classified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Tables referenced by the statement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables: Option<Vec<String>>,

    // ===== Outcome =====
    /// Rows returned or affected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,

    /// Duration in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Error message (for failures and violations).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Manager that refused the statement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denying_manager: Option<String>,

    /// Batch line number (1-based) for batch requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_line: Option<usize>,

    /// Additional metadata.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub meta: serde_json::Value,
}

impl AuditEvent {
    /// Create an event of `event_type` carrying the facts of `event`.
    pub fn new(event_type: AuditEventType, event: &SqlEvent) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            event_type,
            username: event.username().to_string(),
            database: event.database().to_string(),
            client_ip: event.ip_address().to_string(),
            sql: event.sql().to_string(),
            is_prepared_statement: event.is_prepared_statement(),
            parameter_values: event.parameter_values().to_vec(),
            is_metadata_query: event.is_metadata_query(),
            kind: None,
            tables: None,
            row_count: None,
            duration_ms: None,
            error: None,
            denying_manager: None,
            batch_line: None,
            meta: serde_json::Value::Null,
        }
    }

    /// Create a builder for an audit event.
    pub fn builder(event_type: AuditEventType, event: &SqlEvent) -> AuditEventBuilder {
        AuditEventBuilder {
            event: Self::new(event_type, event),
        }
    }

    /// Format the event as a human-readable log line.
    ///
    /// Format: `[timestamp] EVENT_TYPE user=... db=... ip=... sql="..."`
    pub fn to_log_line(&self) -> String {
        // Truncate long SQL for console output
        let sql_preview = match self.sql.char_indices().nth(100) {
            Some((cut, _)) => format!("{}...", &self.sql[..cut]),
            None => self.sql.clone(),
        };

        let mut line = format!(
            "[{}] {} user={} db={} ip={} sql=\"{}\"",
            self.occurred_at.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            self.event_type,
            self.username,
            self.database,
            self.client_ip,
            sql_preview.replace('\n', " "),
        );

        if !self.parameter_values.is_empty() {
            line.push_str(&format!(" params=[{}]", self.parameter_values.join(",")));
        }

        if let Some(ref kind) = self.kind {
            line.push_str(&format!(" kind={}", kind));
        }

        if let Some(ref manager) = self.denying_manager {
            line.push_str(&format!(" manager={}", manager));
        }

        if let Some(line_no) = self.batch_line {
            line.push_str(&format!(" batch_line={}", line_no));
        }

        if let Some(rows) = self.row_count {
            line.push_str(&format!(" rows={}", rows));
        }

        if let Some(duration) = self.duration_ms {
            line.push_str(&format!(" duration_ms={}", duration));
        }

        if let Some(ref error) = self.error {
            line.push_str(&format!(" error=\"{}\"", error.replace('"', "'")));
        }

        line
    }
}

/// Builder for creating audit events.
#[derive(Debug)]
pub struct AuditEventBuilder {
    event: AuditEvent,
}

impl AuditEventBuilder {
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.event.kind = Some(kind.into());
        self
    }

    pub fn tables(mut self, tables: Vec<String>) -> Self {
        self.event.tables = Some(tables);
        self
    }

    pub fn row_count(mut self, count: u64) -> Self {
        self.event.row_count = Some(count);
        self
    }

    pub fn duration_ms(mut self, duration: u64) -> Self {
        self.event.duration_ms = Some(duration);
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.event.error = Some(error.into());
        self
    }

    pub fn denying_manager(mut self, manager: impl Into<String>) -> Self {
        self.event.denying_manager = Some(manager.into());
        self
    }

    pub fn batch_line(mut self, line: usize) -> Self {
        self.event.batch_line = Some(line);
        self
    }

    pub fn meta(mut self, meta: serde_json::Value) -> Self {
        self.event.meta = meta;
        self
    }

    /// Build the audit event.
    pub fn build(self) -> AuditEvent {
        self.event
    }
}
