//! Error types for the database crate.

use sqlgate_core::ConfigError;
use thiserror::Error;

/// Errors raised by database sessions and providers.
#[derive(Debug, Error)]
pub enum DbError {
    /// The driver or the database rejected the operation.
    #[error("{0}")]
    Driver(#[from] sqlx::Error),

    /// A value could not be encoded for the driver.
    #[error("failed to bind parameter {index}: {message}")]
    Bind { index: usize, message: String },

    /// An OUT or INOUT parameter was attached to a non-callable statement.
    #[error("parameter {index} is registered as {direction} but the statement is not callable")]
    OutParameterNotSupported { index: usize, direction: String },

    /// The backend does not implement the requested feature.
    #[error("{0} is not supported by {1}")]
    Unsupported(String, &'static str),

    /// The session was already committed or rolled back.
    #[error("database session is already closed")]
    SessionClosed,

    /// Connection configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl DbError {
    /// Whether this error came from the database itself.
    pub fn is_driver_error(&self) -> bool {
        matches!(self, Self::Driver(_))
    }
}
