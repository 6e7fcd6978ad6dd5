//! Error types for the SQL crate.

use thiserror::Error;

/// Errors recorded while classifying a statement.
///
/// Classification itself never fails; these end up in
/// [`StatementShape::parse_error`](crate::StatementShape::parse_error).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SqlError {
    /// The statement could not be parsed.
    #[error("failed to parse SQL: {0}")]
    Parse(String),

    /// The text held zero or several statements.
    #[error("expected a single statement, found {0}")]
    StatementCount(usize),
}
