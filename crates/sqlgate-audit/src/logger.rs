//! Audit logger implementation.
//!
//! Provides the main `AuditLogger` type with helper methods for logging
//! executed, failed, denied and out-of-band flagged statements.

use sqlgate_core::{AuditConfig, SqlEvent};
use std::sync::Arc;

use crate::error::AuditError;
use crate::event::{AuditEvent, AuditEventType};
use crate::storage::{AuditStorage, ConsoleStorage, DualStorage, FileStorage, NullStorage};

/// The main audit logger.
pub struct AuditLogger {
    config: AuditConfig,
    storage: Arc<dyn AuditStorage>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AuditLogger {
    /// Create a new audit logger with the given configuration.
    pub fn new(config: AuditConfig) -> Result<Self, AuditError> {
        let storage: Arc<dyn AuditStorage> = match (&config.file, config.stdout) {
            _ if !config.enabled => Arc::new(NullStorage::new()),
            (Some(path), true) => Arc::new(DualStorage::new(path)?),
            (Some(path), false) => Arc::new(FileStorage::new(path)?),
            (None, true) => Arc::new(ConsoleStorage::new()),
            (None, false) => Arc::new(NullStorage::new()),
        };

        Ok(Self { config, storage })
    }

    /// Create a logger with a custom storage backend.
    pub fn with_storage(config: AuditConfig, storage: Arc<dyn AuditStorage>) -> Self {
        Self { config, storage }
    }

    /// Create a disabled (no-op) logger.
    pub fn disabled() -> Self {
        Self {
            config: AuditConfig {
                enabled: false,
                ..Default::default()
            },
            storage: Arc::new(NullStorage::new()),
        }
    }

    /// Create a console-only logger (useful for development).
    pub fn console_only() -> Self {
        Self {
            config: AuditConfig {
                enabled: true,
                stdout: true,
                file: None,
            },
            storage: Arc::new(ConsoleStorage::new()),
        }
    }

    /// Check if logging is enabled.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Log an audit event.
    pub async fn log(&self, event: AuditEvent) -> Result<(), AuditError> {
        if !self.config.enabled {
            return Ok(());
        }

        // Also log to tracing for structured logging integration
        tracing::debug!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            username = %event.username,
            database = %event.database,
            "Audit event"
        );

        self.storage.store(event).await
    }

    /// Log a statement that executed and committed.
    pub async fn log_executed(
        &self,
        event: &SqlEvent,
        kind: &str,
        row_count: u64,
        duration_ms: u64,
    ) -> Result<(), AuditError> {
        let event = AuditEvent::builder(AuditEventType::StatementExecuted, event)
            .kind(kind)
            .row_count(row_count)
            .duration_ms(duration_ms)
            .build();

        self.log(event).await
    }

    /// Log a statement the database rejected.
    pub async fn log_failed(&self, event: &SqlEvent, error: &str) -> Result<(), AuditError> {
        let event = AuditEvent::builder(AuditEventType::StatementFailed, event)
            .error(error)
            .build();

        self.log(event).await
    }

    /// Log a firewall denial.
    pub async fn log_denied(
        &self,
        event: &SqlEvent,
        manager: &str,
        batch_line: Option<usize>,
    ) -> Result<(), AuditError> {
        let mut builder =
            AuditEvent::builder(AuditEventType::StatementDenied, event).denying_manager(manager);

        if let Some(line) = batch_line {
            builder = builder.batch_line(line);
        }

        self.log(builder.build()).await
    }

    /// Log a violation reported by an out-of-band check.
    pub async fn log_async_violation(
        &self,
        event: &SqlEvent,
        manager: &str,
        reason: &str,
    ) -> Result<(), AuditError> {
        let event = AuditEvent::builder(AuditEventType::AsyncViolation, event)
            .denying_manager(manager)
            .error(reason)
            .build();

        self.log(event).await
    }

    /// Query audit events with filters.
    pub async fn query(&self, filter: AuditFilter) -> Result<Vec<AuditEvent>, AuditError> {
        self.storage.query(filter).await
    }
}

/// Filter for querying audit events.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    /// Filter by username.
    pub username: Option<String>,
    /// Filter by database name.
    pub database: Option<String>,
    /// Filter by event type.
    pub event_type: Option<AuditEventType>,
    /// Maximum number of results.
    pub limit: Option<usize>,
}

impl AuditFilter {
    pub fn matches(&self, event: &AuditEvent) -> bool {
        if let Some(ref username) = self.username
            && &event.username != username
        {
            return false;
        }
        if let Some(ref database) = self.database
            && &event.database != database
        {
            return false;
        }
        if let Some(event_type) = self.event_type
            && event.event_type != event_type
        {
            return false;
        }
        true
    }

    pub(crate) fn apply<'a>(&self, events: impl Iterator<Item = &'a AuditEvent>) -> Vec<AuditEvent> {
        events
            .filter(|e| self.matches(e))
            .take(self.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use sqlgate_core::Caller;

    fn sql_event() -> SqlEvent {
        SqlEvent::builder(&Caller::new("alice", "127.0.0.1"), "sales")
            .sql("UPDATE customer SET name = ? WHERE id = ?")
            .prepared_statement(true)
            .parameter_values(vec!["Ann".to_string(), "7".to_string()])
            .build()
    }

    #[tokio::test]
    async fn test_disabled_logger() {
        let logger = AuditLogger::disabled();
        assert!(!logger.is_enabled());

        // Should not error even when logging
        logger.log_failed(&sql_event(), "boom").await.unwrap();
    }

    #[tokio::test]
    async fn test_console_only_logger() {
        let logger = AuditLogger::console_only();
        assert!(logger.is_enabled());
        logger
            .log_executed(&sql_event(), "UPDATE", 1, 3)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_helpers_record_outcomes() {
        let storage = Arc::new(MemoryStorage::new());
        let logger = AuditLogger::with_storage(AuditConfig::default(), storage.clone());

        logger.log_executed(&sql_event(), "UPDATE", 1, 3).await.unwrap();
        logger.log_denied(&sql_event(), "deny_dml", Some(4)).await.unwrap();
        logger
            .log_async_violation(&sql_event(), "deny_sql_injection", "tautology")
            .await
            .unwrap();

        let denied = logger
            .query(AuditFilter {
                event_type: Some(AuditEventType::StatementDenied),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(denied.len(), 1);
        assert_eq!(denied[0].denying_manager.as_deref(), Some("deny_dml"));
        assert_eq!(denied[0].batch_line, Some(4));
        assert_eq!(denied[0].parameter_values, vec!["Ann", "7"]);

        let all = logger.query(AuditFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_new_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = AuditConfig {
            enabled: true,
            stdout: false,
            file: Some(dir.path().join("audit.log")),
        };
        let logger = AuditLogger::new(config).unwrap();
        logger.log_failed(&sql_event(), "constraint").await.unwrap();

        let events = logger.query(AuditFilter::default()).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].error.as_deref(), Some("constraint"));
    }
}
