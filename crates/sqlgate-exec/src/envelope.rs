//! Response envelopes returned for every statement request.
//!
//! Every outcome, including parameter errors and firewall denials, ends up
//! as an [`Envelope`]; nothing escapes to the transport as a raw error.

use crate::error::ExecError;
use serde::{Deserialize, Serialize};
use sqlgate_db::{ColumnInfo, OutValue, StatementOutcome};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Ok,
    Fail,
}

/// Failure category reported to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// The database rejected the statement.
    DriverError,
    /// The request itself was malformed.
    ApplicationError,
    /// A firewall manager refused the statement.
    Unauthorized,
    InternalFailure,
}

impl ErrorType {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::DriverError | Self::ApplicationError => 400,
            Self::Unauthorized => 403,
            Self::InternalFailure => 500,
        }
    }
}

/// What was refused, reported back verbatim so the caller can audit it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Denial {
    pub sql: String,
    pub parameter_types: Vec<String>,
    pub parameter_values: Vec<String>,
    pub manager: String,
    /// `write`, `content` or `out_of_band`.
    pub gate: String,
    /// 1-based line of the batch file that was refused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_line: Option<usize>,
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "statement refused by firewall manager '{}'", self.manager)?;
        if let Some(line) = self.batch_line {
            write!(f, " at batch line {line}")?;
        }
        write!(
            f,
            ": sql=[{}] parameter_types={:?} parameter_values={:?}",
            self.sql, self.parameter_types, self.parameter_values
        )
    }
}

/// Payload of a successful request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResultPayload {
    Rows {
        columns: Vec<ColumnInfo>,
        rows: Vec<Vec<serde_json::Value>>,
        row_count: usize,
    },
    UpdateCount {
        update_count: u64,
    },
    Call {
        out_parameters: Vec<OutValue>,
    },
    Batch {
        update_counts: Vec<u64>,
    },
}

impl From<StatementOutcome> for ResultPayload {
    fn from(outcome: StatementOutcome) -> Self {
        match outcome {
            StatementOutcome::Rows(result) => Self::Rows {
                row_count: result.row_count(),
                columns: result.columns,
                rows: result.rows,
            },
            StatementOutcome::UpdateCount { count } => Self::UpdateCount {
                update_count: count,
            },
            StatementOutcome::Call { out_parameters } => Self::Call { out_parameters },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuccessEnvelope {
    pub status: Status,
    pub result: ResultPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureEnvelope {
    pub status: Status,
    pub error_type: ErrorType,
    pub error_message: String,
    /// Error source chain, only for internal failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<Vec<String>>,
    pub http_status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denial: Option<Denial>,
}

impl FailureEnvelope {
    pub fn from_error(error: &ExecError) -> Self {
        let error_type = error.error_type();

        let stack_trace = (error_type == ErrorType::InternalFailure).then(|| {
            let mut trace = Vec::new();
            let mut source = std::error::Error::source(error);
            while let Some(cause) = source {
                trace.push(cause.to_string());
                source = cause.source();
            }
            trace
        });

        let denial = match error {
            ExecError::Denied(denial) => Some(denial.as_ref().clone()),
            _ => None,
        };

        Self {
            status: Status::Fail,
            error_type,
            error_message: error.to_string(),
            stack_trace,
            http_status: error_type.http_status(),
            denial,
        }
    }
}

/// The response to one statement or batch request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Envelope {
    Success(SuccessEnvelope),
    Failure(FailureEnvelope),
}

impl Envelope {
    pub fn ok(result: ResultPayload) -> Self {
        Self::Success(SuccessEnvelope {
            status: Status::Ok,
            result,
        })
    }

    pub fn from_error(error: &ExecError) -> Self {
        Self::Failure(FailureEnvelope::from_error(error))
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::Success(_) => 200,
            Self::Failure(failure) => failure.http_status,
        }
    }

    pub fn error_type(&self) -> Option<ErrorType> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure.error_type),
        }
    }

    pub fn result(&self) -> Option<&ResultPayload> {
        match self {
            Self::Success(success) => Some(&success.result),
            Self::Failure(_) => None,
        }
    }

    pub fn denial(&self) -> Option<&Denial> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => failure.denial.as_ref(),
        }
    }
}

impl From<Result<ResultPayload, ExecError>> for Envelope {
    fn from(result: Result<ResultPayload, ExecError>) -> Self {
        match result {
            Ok(payload) => Self::ok(payload),
            Err(error) => Self::from_error(&error),
        }
    }
}
