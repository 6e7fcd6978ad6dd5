//! Request handlers.
//!
//! Handlers only translate between form fields and executor requests; every
//! outcome is an [`Envelope`] whose `http_status` becomes the response
//! status.

use crate::{AppState, USER_HEADER};
use axum::extract::{ConnectInfo, FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use serde_json::json;
use sqlgate_core::Caller;
use sqlgate_db::{StatementAction, StatementMode};
use sqlgate_exec::{
    scan_fields, BatchRequest, Envelope, ErrorType, ExecError, FailureEnvelope, StatementRequest,
    Status,
};
use std::collections::HashMap;
use std::net::SocketAddr;

/// The caller of the current request.
#[derive(Debug, Clone)]
pub struct RequestCaller(pub Caller);

impl<S: Send + Sync> FromRequestParts<S> for RequestCaller {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let username = parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|name| !name.is_empty());

        let Some(username) = username else {
            let failure = FailureEnvelope {
                status: Status::Fail,
                error_type: ErrorType::Unauthorized,
                error_message: format!("missing {USER_HEADER} header"),
                stack_trace: None,
                http_status: StatusCode::UNAUTHORIZED.as_u16(),
                denial: None,
            };
            return Err((StatusCode::UNAUTHORIZED, Json(failure)).into_response());
        };

        let ip_address = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        Ok(Self(Caller::new(username, ip_address)))
    }
}

fn respond(envelope: Envelope) -> Response {
    let status =
        StatusCode::from_u16(envelope.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(envelope)).into_response()
}

fn reject(error: ExecError) -> Response {
    respond(Envelope::from_error(&error))
}

pub async fn healthz() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "sqlgate",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

fn parse_mode(value: Option<&String>) -> Result<StatementMode, ExecError> {
    match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("prepared") => Ok(StatementMode::Prepared),
        Some("plain") => Ok(StatementMode::Plain),
        Some("callable") => Ok(StatementMode::Callable),
        Some(other) => Err(ExecError::InvalidRequest(format!("unknown mode '{other}'"))),
    }
}

fn parse_action(value: Option<&String>) -> Result<StatementAction, ExecError> {
    match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("query") | Some("execute_query") => Ok(StatementAction::Query),
        Some("update") | Some("execute_update") => Ok(StatementAction::Update),
        Some(other) => Err(ExecError::InvalidRequest(format!("unknown action '{other}'"))),
    }
}

fn statement_request(fields: &HashMap<String, String>) -> Result<StatementRequest, ExecError> {
    let sql = fields
        .get("sql")
        .filter(|sql| !sql.trim().is_empty())
        .ok_or_else(|| ExecError::InvalidRequest("missing field 'sql'".to_string()))?;

    Ok(StatementRequest {
        sql: sql.clone(),
        mode: parse_mode(fields.get("mode"))?,
        action: parse_action(fields.get("action"))?,
        parameters: scan_fields(fields),
        metadata_query: fields
            .get("metadata_query")
            .is_some_and(|v| v.eq_ignore_ascii_case("true")),
    })
}

pub async fn execute(
    State(state): State<AppState>,
    Path(db): Path<String>,
    RequestCaller(caller): RequestCaller,
    Form(fields): Form<HashMap<String, String>>,
) -> Response {
    let binding = match state.gateway.binding(&db) {
        Ok(binding) => binding,
        Err(e) => return reject(e),
    };
    let request = match statement_request(&fields) {
        Ok(request) => request,
        Err(e) => return reject(e),
    };

    respond(binding.execute(&caller, &request).await)
}

pub async fn execute_batch(
    State(state): State<AppState>,
    Path(db): Path<String>,
    RequestCaller(caller): RequestCaller,
    Form(fields): Form<HashMap<String, String>>,
) -> Response {
    let binding = match state.gateway.binding(&db) {
        Ok(binding) => binding,
        Err(e) => return reject(e),
    };
    let Some(batch_file) = fields.get("batch_file").filter(|f| !f.trim().is_empty()) else {
        return reject(ExecError::InvalidRequest(
            "missing field 'batch_file'".to_string(),
        ));
    };

    let request = BatchRequest {
        sql: fields.get("sql").filter(|sql| !sql.trim().is_empty()).cloned(),
        batch_file: batch_file.clone(),
    };
    respond(binding.execute_batch(&caller, &request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_statement_request_defaults() {
        let request = statement_request(&fields(&[
            ("sql", "SELECT * FROM customer WHERE customer_id = ?"),
            ("param_type_1", "INTEGER"),
            ("param_value_1", "42"),
        ]))
        .unwrap();
        assert_eq!(request.mode, StatementMode::Prepared);
        assert_eq!(request.action, StatementAction::Query);
        assert_eq!(request.parameters.len(), 1);
        assert!(!request.metadata_query);
    }

    #[test]
    fn test_statement_request_rejects_bad_fields() {
        assert!(matches!(
            statement_request(&fields(&[])),
            Err(ExecError::InvalidRequest(_))
        ));
        assert!(matches!(
            statement_request(&fields(&[("sql", "SELECT 1"), ("mode", "turbo")])),
            Err(ExecError::InvalidRequest(_))
        ));

        let request = statement_request(&fields(&[
            ("sql", "DELETE FROM t"),
            ("mode", "Plain"),
            ("action", "execute_update"),
            ("metadata_query", "TRUE"),
        ]))
        .unwrap();
        assert_eq!(request.mode, StatementMode::Plain);
        assert_eq!(request.action, StatementAction::Update);
        assert!(request.metadata_query);
    }
}
