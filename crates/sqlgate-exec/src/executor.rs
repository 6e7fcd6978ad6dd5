//! Statement execution, single and batch.
//!
//! Each request moves through
//! `Received -> ParametersBuilt -> Classified -> FirewallEvaluated` and then
//! either to `Denied`, or through `Executing` to `Succeeded` or `Failed`.
//! The request's database session is committed only on success; every
//! other exit rolls it back before anything else happens. Files owned by
//! the parameter builder are released on every path. Out-of-band firewall
//! checks start only after a successful commit.

use crate::binding::DatabaseBinding;
use crate::envelope::{Denial, Envelope, ResultPayload};
use crate::error::{ExecError, ParameterError};
use crate::params::{self, BoundParameter, ParameterBuilder};
use crate::wire::{self, ParamSpec};
use sqlgate_audit::AuditError;
use sqlgate_core::{Caller, SqlEvent};
use sqlgate_db::{DatabaseSession, PreparedStatement, StatementAction, StatementMode};
use sqlgate_firewall::FirewallVerdict;
use sqlgate_sql::StatementShape;
use std::time::Instant;

/// One statement request.
#[derive(Debug, Clone, Default)]
pub struct StatementRequest {
    pub sql: String,
    pub mode: StatementMode,
    pub action: StatementAction,
    pub parameters: Vec<ParamSpec>,
    /// Set for database-introspection calls.
    pub metadata_query: bool,
}

impl StatementRequest {
    /// A prepared query.
    pub fn query(sql: impl Into<String>, parameters: Vec<ParamSpec>) -> Self {
        Self {
            sql: sql.into(),
            parameters,
            ..Default::default()
        }
    }

    /// A prepared update.
    pub fn update(sql: impl Into<String>, parameters: Vec<ParamSpec>) -> Self {
        Self {
            sql: sql.into(),
            action: StatementAction::Update,
            parameters,
            ..Default::default()
        }
    }
}

/// One batch request.
///
/// With `sql` set, every line of the batch file is a JSON parameter set
/// for that statement. Without it, every line is a statement of its own.
/// Blank lines are skipped but still counted.
#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    pub sql: Option<String>,
    /// Upload handle of the batch file.
    pub batch_file: String,
}

/// Where a request currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    Received,
    ParametersBuilt,
    Classified,
    FirewallEvaluated,
    Executing,
    Succeeded,
    Failed,
    Denied,
}

/// Logs state transitions of one request.
struct Progress<'a> {
    database: &'a str,
    state: ExecState,
}

impl<'a> Progress<'a> {
    fn start(database: &'a str) -> Self {
        tracing::trace!(database, state = ?ExecState::Received, "Request received");
        Self {
            database,
            state: ExecState::Received,
        }
    }

    fn advance(&mut self, next: ExecState) {
        tracing::trace!(
            database = self.database,
            from = ?self.state,
            to = ?next,
            "Request state changed"
        );
        self.state = next;
    }

    fn finish<T>(&mut self, result: &Result<T, ExecError>) {
        let next = match result {
            Ok(_) => ExecState::Succeeded,
            Err(ExecError::Denied(_)) => ExecState::Denied,
            Err(_) => ExecState::Failed,
        };
        self.advance(next);
    }
}

/// A statement on its way to the firewall.
struct Draft {
    sql: String,
    mode: StatementMode,
    action: StatementAction,
    shape: StatementShape,
    event: SqlEvent,
    parameters: Vec<BoundParameter>,
}

/// A statement that passed the firewall and waits for execution.
struct Gated {
    statement: PreparedStatement,
    shape: StatementShape,
    event: SqlEvent,
}

enum Screened {
    Allowed(Gated),
    Refused {
        verdict: FirewallVerdict,
        parameter_types: Vec<String>,
    },
}

fn warn_on_audit_error(result: Result<(), AuditError>) {
    if let Err(e) = result {
        tracing::warn!(error = %e, "Failed to write audit event");
    }
}

async fn rollback(session: &mut dyn DatabaseSession) {
    if let Err(e) = session.rollback().await {
        tracing::warn!(error = %e, "Rollback failed");
    }
}

impl DatabaseBinding {
    fn event_for(
        &self,
        caller: &Caller,
        sql: &str,
        mode: StatementMode,
        parameters: &[BoundParameter],
        metadata_query: bool,
    ) -> SqlEvent {
        SqlEvent::builder(caller, &self.name)
            .sql(sql)
            .prepared_statement(mode != StatementMode::Plain)
            .parameter_values(params::parameter_values(parameters))
            .metadata_query(metadata_query)
            .build()
    }

    /// Execute one statement and wrap the outcome in an envelope.
    pub async fn execute(&self, caller: &Caller, request: &StatementRequest) -> Envelope {
        let mut progress = Progress::start(&self.name);
        let mut builder = ParameterBuilder::new(&self.blobs, caller)
            .with_callable_support(self.provider.supports_callable());

        let result = self
            .run_statement(caller, request, &mut builder, &mut progress)
            .await;
        builder.close().await;
        progress.finish(&result);

        if let Err(e) = &result {
            tracing::info!(
                database = %self.name,
                username = %caller.username,
                error_type = ?e.error_type(),
                error = %e,
                "Statement did not succeed"
            );
        }
        Envelope::from(result)
    }

    async fn run_statement(
        &self,
        caller: &Caller,
        request: &StatementRequest,
        builder: &mut ParameterBuilder,
        progress: &mut Progress<'_>,
    ) -> Result<ResultPayload, ExecError> {
        let parameters = builder
            .build_parameters(&request.parameters, request.mode)
            .await?;
        progress.advance(ExecState::ParametersBuilt);

        let shape = self.classifier.classify(&request.sql);
        let event = self.event_for(
            caller,
            &request.sql,
            request.mode,
            &parameters,
            request.metadata_query,
        );
        progress.advance(ExecState::Classified);

        tracing::debug!(
            database = %self.name,
            username = %caller.username,
            kind = shape.kind().as_str(),
            tables = ?shape.tables(),
            parameters = parameters.len(),
            "Statement classified"
        );

        let draft = Draft {
            sql: request.sql.clone(),
            mode: request.mode,
            action: request.action,
            shape,
            event,
            parameters,
        };
        let is_update = request.action == StatementAction::Update;

        let mut session = self.provider.acquire(caller).await?;
        let screened = self.screen(session.as_mut(), draft, is_update).await;
        progress.advance(ExecState::FirewallEvaluated);

        let gated = match screened {
            Ok(Screened::Allowed(gated)) => gated,
            Ok(Screened::Refused {
                verdict,
                parameter_types,
            }) => {
                rollback(session.as_mut()).await;
                return Err(self.refuse(&verdict, parameter_types, None).await);
            }
            Err(e) => {
                rollback(session.as_mut()).await;
                return Err(e);
            }
        };

        progress.advance(ExecState::Executing);
        let started = Instant::now();
        let outcome = match session.execute(&gated.statement).await {
            Ok(outcome) => outcome,
            Err(e) => {
                rollback(session.as_mut()).await;
                warn_on_audit_error(self.audit.log_failed(&gated.event, &e.to_string()).await);
                return Err(e.into());
            }
        };
        if let Err(e) = session.commit().await {
            rollback(session.as_mut()).await;
            warn_on_audit_error(self.audit.log_failed(&gated.event, &e.to_string()).await);
            return Err(e.into());
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        warn_on_audit_error(
            self.audit
                .log_executed(
                    &gated.event,
                    gated.shape.kind().as_str(),
                    outcome.row_count(),
                    duration_ms,
                )
                .await,
        );
        self.firewall.start_deferred_checks(&gated.shape, &gated.event);
        Ok(ResultPayload::from(outcome))
    }

    /// Run the firewall for one statement and, if it passes, bind it.
    async fn screen(
        &self,
        session: &mut dyn DatabaseSession,
        draft: Draft,
        is_update: bool,
    ) -> Result<Screened, ExecError> {
        let verdict = self
            .firewall
            .evaluate(&draft.shape, &draft.event, session, is_update)
            .await?;
        if !verdict.is_allowed() {
            return Ok(Screened::Refused {
                verdict,
                parameter_types: params::parameter_types(&draft.parameters),
            });
        }

        let large_objects = if draft.parameters.iter().any(|p| p.sql_type.is_binary_lob()) {
            session.uses_large_object_storage(draft.shape.tables()).await?
        } else {
            false
        };

        let mut statement = PreparedStatement::new(draft.sql, draft.mode, draft.action);
        params::bind(&mut statement, draft.parameters, large_objects)?;
        Ok(Screened::Allowed(Gated {
            statement,
            shape: draft.shape,
            event: draft.event,
        }))
    }

    /// Record a denial and fire the refusal triggers once.
    ///
    /// The request session must already be rolled back: triggers may write
    /// through fresh sessions of the same database.
    async fn refuse(
        &self,
        verdict: &FirewallVerdict,
        parameter_types: Vec<String>,
        batch_line: Option<usize>,
    ) -> ExecError {
        let event = verdict.event();
        let manager = verdict.denying_manager().unwrap_or_default();

        warn_on_audit_error(self.audit.log_denied(event, manager, batch_line).await);
        self.firewall.on_deny(verdict).await;

        ExecError::Denied(Box::new(Denial {
            sql: event.sql().to_string(),
            parameter_types,
            parameter_values: event.parameter_values().to_vec(),
            manager: manager.to_string(),
            gate: verdict
                .gate()
                .map(|gate| gate.as_str().to_string())
                .unwrap_or_default(),
            batch_line,
        }))
    }

    /// Execute a batch and wrap the outcome in an envelope.
    pub async fn execute_batch(&self, caller: &Caller, request: &BatchRequest) -> Envelope {
        let mut progress = Progress::start(&self.name);
        let mut builder = ParameterBuilder::new(&self.blobs, caller)
            .with_callable_support(self.provider.supports_callable());

        let result = self
            .run_batch(caller, request, &mut builder, &mut progress)
            .await;
        builder.close().await;
        progress.finish(&result);

        if let Err(e) = &result {
            tracing::info!(
                database = %self.name,
                username = %caller.username,
                error_type = ?e.error_type(),
                error = %e,
                "Batch did not succeed"
            );
        }
        Envelope::from(result)
    }

    async fn run_batch(
        &self,
        caller: &Caller,
        request: &BatchRequest,
        builder: &mut ParameterBuilder,
        progress: &mut Progress<'_>,
    ) -> Result<ResultPayload, ExecError> {
        let path = builder.open_upload(&request.batch_file).await?;
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| ParameterError::Io {
                path: path.clone(),
                source,
            })?;

        let mut pending = Vec::new();
        for (i, text) in content.lines().enumerate() {
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            let line = i + 1;
            let (sql, mode, parameters) = match &request.sql {
                Some(sql) => {
                    let specs = line_parameters(line, text)?;
                    let parameters = builder
                        .build_parameters(&specs, StatementMode::Prepared)
                        .await
                        .map_err(|source| ExecError::BatchParameter { line, source })?;
                    (sql.clone(), StatementMode::Prepared, parameters)
                }
                None => (text.to_string(), StatementMode::Plain, Vec::new()),
            };
            let shape = self.classifier.classify(&sql);
            let event = self.event_for(caller, &sql, mode, &parameters, false);
            let draft = Draft {
                sql,
                mode,
                action: StatementAction::Update,
                shape,
                event,
                parameters,
            };
            pending.push((line, draft));
        }
        if pending.is_empty() {
            return Err(ExecError::BatchLine {
                line: 0,
                message: "batch file contains no statements".to_string(),
            });
        }
        progress.advance(ExecState::ParametersBuilt);
        progress.advance(ExecState::Classified);

        tracing::debug!(
            database = %self.name,
            username = %caller.username,
            lines = pending.len(),
            prepared = request.sql.is_some(),
            "Batch parsed"
        );

        let mut session = self.provider.acquire(caller).await?;
        let mut statements = Vec::with_capacity(pending.len());
        let mut executed = Vec::with_capacity(pending.len());
        for (line, draft) in pending {
            match self.screen(session.as_mut(), draft, true).await {
                Ok(Screened::Allowed(gated)) => {
                    statements.push(gated.statement);
                    executed.push((gated.event, gated.shape));
                }
                Ok(Screened::Refused {
                    verdict,
                    parameter_types,
                }) => {
                    rollback(session.as_mut()).await;
                    progress.advance(ExecState::FirewallEvaluated);
                    return Err(self.refuse(&verdict, parameter_types, Some(line)).await);
                }
                Err(e) => {
                    rollback(session.as_mut()).await;
                    return Err(e);
                }
            }
        }
        progress.advance(ExecState::FirewallEvaluated);

        progress.advance(ExecState::Executing);
        let started = Instant::now();
        let counts = match session.execute_batch(&statements).await {
            Ok(counts) => counts,
            Err(e) => {
                rollback(session.as_mut()).await;
                let message = e.to_string();
                for (event, _) in &executed {
                    warn_on_audit_error(self.audit.log_failed(event, &message).await);
                }
                return Err(e.into());
            }
        };
        if let Err(e) = session.commit().await {
            rollback(session.as_mut()).await;
            return Err(e.into());
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        for ((event, shape), count) in executed.iter().zip(&counts) {
            warn_on_audit_error(
                self.audit
                    .log_executed(event, shape.kind().as_str(), *count, duration_ms)
                    .await,
            );
        }
        for (event, shape) in &executed {
            self.firewall.start_deferred_checks(shape, event);
        }
        tracing::info!(
            database = %self.name,
            username = %caller.username,
            statements = counts.len(),
            duration_ms,
            "Batch executed"
        );
        Ok(ResultPayload::Batch {
            update_counts: counts,
        })
    }
}

fn line_parameters(line: usize, text: &str) -> Result<Vec<ParamSpec>, ExecError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ExecError::BatchLine {
            line,
            message: format!("invalid JSON parameter set: {e}"),
        })?;
    let fields = wire::fields_from_json(&value).ok_or_else(|| ExecError::BatchLine {
        line,
        message: "parameter set must be a JSON object".to_string(),
    })?;
    Ok(wire::scan_fields(&fields))
}
