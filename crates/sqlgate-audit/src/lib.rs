//! # sqlgate-audit
//!
//! Audit logging for sqlgate.
//!
//! Every statement attempt that reaches the executor produces one audit
//! event carrying the [`SqlEvent`](sqlgate_core::SqlEvent) facts: who,
//! which database, from where, which statement and which parameters.
//!
//! ## Event Types
//!
//! | Event Type | Description |
//! |------------|-------------|
//! | `StatementExecuted` | Statement ran and committed |
//! | `StatementFailed` | The database rejected the statement |
//! | `StatementDenied` | A firewall manager refused the statement |
//! | `AsyncViolation` | An out-of-band check flagged an already-allowed statement |
//!
//! File output is JSON Lines; console output is one human-readable line
//! per event.

pub mod error;
pub mod event;
pub mod logger;
pub mod storage;

pub use error::AuditError;
pub use event::{AuditEvent, AuditEventBuilder, AuditEventType};
pub use logger::{AuditFilter, AuditLogger};
pub use storage::{
    AuditStorage, ConsoleStorage, DualStorage, FileStorage, MemoryStorage, NullStorage,
};
