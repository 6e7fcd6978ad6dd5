//! Error types for parameter building and statement execution.

use crate::envelope::{Denial, ErrorType};
use sqlgate_audit::AuditError;
use sqlgate_core::ConfigError;
use sqlgate_db::{DbError, SqlType};
use sqlgate_firewall::FirewallError;
use std::path::PathBuf;
use thiserror::Error;

/// A parameter could not be built from its wire form.
///
/// Always raised before any database work starts.
#[derive(Debug, Error)]
pub enum ParameterError {
    // =========================================================================
    // Wire format errors
    // =========================================================================
    #[error("parameter {index}: unknown type '{tag}'")]
    UnknownType { index: usize, tag: String },

    #[error("parameter {index}: unknown direction '{tag}'")]
    UnknownDirection { index: usize, tag: String },

    #[error("parameter {index}: missing value for an input parameter")]
    MissingValue { index: usize },

    #[error("parameter {index}: '{value}' is not a valid {sql_type} value: {message}")]
    InvalidValue {
        index: usize,
        sql_type: SqlType,
        value: String,
        message: String,
    },

    // =========================================================================
    // Direction errors
    // =========================================================================
    #[error("parameter {index}: {sql_type} parameters cannot be OUT or INOUT")]
    IllegalOutDirection { index: usize, sql_type: SqlType },

    #[error("parameter {index} is registered as {direction} but {reason}")]
    OutNotSupported {
        index: usize,
        direction: String,
        reason: &'static str,
    },

    #[error("callable statements are not supported by this database")]
    CallableNotSupported,

    #[error("plain statements take no parameters, got {count}")]
    PlainWithParameters { count: usize },

    // =========================================================================
    // Upload errors
    // =========================================================================
    #[error("invalid upload handle '{handle}'")]
    InvalidHandle { handle: String },

    #[error("upload '{handle}' not found")]
    HandleNotFound { handle: String },

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a statement request did not succeed.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error("batch line {line}: {source}")]
    BatchParameter {
        line: usize,
        #[source]
        source: ParameterError,
    },

    #[error("batch line {line}: {message}")]
    BatchLine { line: usize, message: String },

    #[error("{0}")]
    Denied(Box<Denial>),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    Firewall(#[from] FirewallError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error("unknown database '{0}'")]
    UnknownDatabase(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ExecError {
    /// Envelope category for this error.
    pub fn error_type(&self) -> ErrorType {
        match self {
            Self::Parameter(_)
            | Self::BatchParameter { .. }
            | Self::BatchLine { .. }
            | Self::UnknownDatabase(_)
            | Self::InvalidRequest(_) => ErrorType::ApplicationError,
            Self::Denied(_) => ErrorType::Unauthorized,
            Self::Database(e) if e.is_driver_error() => ErrorType::DriverError,
            Self::Database(DbError::Unsupported(..))
            | Self::Database(DbError::OutParameterNotSupported { .. })
            | Self::Database(DbError::Bind { .. }) => ErrorType::ApplicationError,
            Self::Database(_) | Self::Firewall(_) | Self::Config(_) | Self::Audit(_) => {
                ErrorType::InternalFailure
            }
        }
    }
}
