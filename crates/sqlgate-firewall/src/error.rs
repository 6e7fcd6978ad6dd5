//! Error types for the firewall crate.

use sqlgate_audit::AuditError;
use sqlgate_db::DbError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building or evaluating a firewall chain.
///
/// An error is never a verdict: a manager that fails aborts evaluation and
/// the request is reported as an internal failure.
#[derive(Debug, Error)]
pub enum FirewallError {
    // =========================================================================
    // Registry errors
    // =========================================================================
    /// No manager is registered under this key.
    #[error("unknown firewall manager '{0}'")]
    UnknownManager(String),

    /// No refusal trigger is registered under this key.
    #[error("unknown refusal trigger '{0}'")]
    UnknownTrigger(String),

    /// A component's options are missing or malformed.
    #[error("invalid options for '{component}': {message}")]
    InvalidOptions { component: String, message: String },

    // =========================================================================
    // Rule file errors
    // =========================================================================
    /// A rules file could not be read.
    #[error("failed to read rules file {path}: {source}")]
    RulesFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A rules file contains an unusable row.
    #[error("invalid rule at {path}:{line}: {message}")]
    InvalidRule {
        path: PathBuf,
        line: u64,
        message: String,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    // =========================================================================
    // Runtime errors
    // =========================================================================
    #[error(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    Audit(#[from] AuditError),

    /// The remote inspection service could not be reached or answered badly.
    #[error("remote inspection failed: {0}")]
    Remote(#[from] reqwest::Error),
}

impl FirewallError {
    pub(crate) fn invalid_options(component: &str, message: impl Into<String>) -> Self {
        Self::InvalidOptions {
            component: component.to_string(),
            message: message.into(),
        }
    }
}
