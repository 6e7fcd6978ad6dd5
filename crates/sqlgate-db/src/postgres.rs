//! PostgreSQL driver.
//!
//! Clients write `?` markers; they are rewritten to `$n` before preparing.
//! BLOB values aimed at tables with `oid` columns are stored with
//! `lo_from_bytea` and bound as the returned object identifier.

use crate::error::DbError;
use crate::session::{ConnectionProvider, DatabaseSession};
use crate::statement::{
    ColumnInfo, OutValue, PreparedStatement, ResultSet, StatementAction, StatementMode,
    StatementOutcome,
};
use crate::types::{BindValue, SqlType};
use async_trait::async_trait;
use base64::Engine;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use sqlgate_core::{Caller, DatabaseBackend};
use sqlgate_sql::placeholders::to_numbered;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::{Arguments, Column, Postgres, Row, Transaction, TypeInfo};

fn args_add<T>(args: &mut PgArguments, index: usize, v: T) -> Result<(), DbError>
where
    T: Send + Sync + 'static,
    for<'q> T: sqlx::Encode<'q, Postgres> + sqlx::Type<Postgres>,
{
    args.add(v).map_err(|e| DbError::Bind {
        index,
        message: e.to_string(),
    })
}

fn add_typed_null(args: &mut PgArguments, index: usize, sql_type: SqlType) -> Result<(), DbError> {
    match sql_type {
        SqlType::Char
        | SqlType::Varchar
        | SqlType::LongVarchar
        | SqlType::Clob
        | SqlType::Url => args_add(args, index, Option::<String>::None),
        SqlType::Numeric | SqlType::Decimal => args_add(args, index, Option::<BigDecimal>::None),
        SqlType::Bit => args_add(args, index, Option::<bool>::None),
        SqlType::TinyInt | SqlType::SmallInt | SqlType::Integer => {
            args_add(args, index, Option::<i32>::None)
        }
        SqlType::BigInt => args_add(args, index, Option::<i64>::None),
        SqlType::Real => args_add(args, index, Option::<f32>::None),
        SqlType::Float | SqlType::Double => args_add(args, index, Option::<f64>::None),
        SqlType::Date => args_add(args, index, Option::<NaiveDate>::None),
        SqlType::Time => args_add(args, index, Option::<NaiveTime>::None),
        SqlType::Timestamp => args_add(args, index, Option::<NaiveDateTime>::None),
        SqlType::Binary | SqlType::VarBinary | SqlType::LongVarBinary | SqlType::Blob => {
            args_add(args, index, Option::<Vec<u8>>::None)
        }
    }
}

async fn bind_arguments(
    tx: &mut Transaction<'static, Postgres>,
    statement: &PreparedStatement,
) -> Result<PgArguments, DbError> {
    let mut args = PgArguments::default();
    for p in statement.placeholder_parameters() {
        let idx = p.index;
        match &p.value {
            BindValue::Null(sql_type) => add_typed_null(&mut args, idx, *sql_type)?,
            BindValue::Text(s) => args_add(&mut args, idx, s.clone())?,
            BindValue::Decimal(d) => args_add(&mut args, idx, d.clone())?,
            BindValue::Bool(b) => args_add(&mut args, idx, *b)?,
            BindValue::Int(n) => args_add(&mut args, idx, *n)?,
            BindValue::BigInt(n) => args_add(&mut args, idx, *n)?,
            BindValue::Real(f) => args_add(&mut args, idx, *f)?,
            BindValue::Double(f) => args_add(&mut args, idx, *f)?,
            BindValue::Date(d) => args_add(&mut args, idx, *d)?,
            BindValue::Time(t) => args_add(&mut args, idx, *t)?,
            BindValue::Timestamp(ts) => args_add(&mut args, idx, *ts)?,
            BindValue::Bytes(b) => args_add(&mut args, idx, b.clone())?,
            BindValue::LargeObject(b) => {
                let oid: Oid = sqlx::query_scalar("SELECT lo_from_bytea(0, $1)")
                    .bind(b.clone())
                    .fetch_one(&mut **tx)
                    .await?;
                tracing::debug!(index = idx, oid = oid.0, size = b.len(), "Stored large object");
                args_add(&mut args, idx, oid)?;
            }
        }
    }
    Ok(args)
}

fn row_value(row: &PgRow, i: usize) -> Value {
    fn json<T: Into<Value>>(v: Option<T>) -> Value {
        v.map_or(Value::Null, Into::into)
    }

    if let Ok(v) = row.try_get::<Option<bool>, _>(i) {
        return json(v);
    }
    if let Ok(v) = row.try_get::<Option<i16>, _>(i) {
        return json(v);
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(i) {
        return json(v);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
        return json(v);
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(i) {
        return json(v);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(i) {
        return json(v);
    }
    if let Ok(v) = row.try_get::<Option<BigDecimal>, _>(i) {
        return json(v.map(|d| d.to_string()));
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(i) {
        return json(v);
    }
    if let Ok(v) = row.try_get::<Option<NaiveDate>, _>(i) {
        return json(v.map(|d| d.to_string()));
    }
    if let Ok(v) = row.try_get::<Option<NaiveTime>, _>(i) {
        return json(v.map(|t| t.to_string()));
    }
    if let Ok(v) = row.try_get::<Option<NaiveDateTime>, _>(i) {
        return json(v.map(|ts| ts.to_string()));
    }
    if let Ok(v) = row.try_get::<Option<DateTime<Utc>>, _>(i) {
        return json(v.map(|ts| ts.to_rfc3339()));
    }
    if let Ok(v) = row.try_get::<Option<uuid::Uuid>, _>(i) {
        return json(v.map(|u| u.to_string()));
    }
    if let Ok(v) = row.try_get::<Option<Value>, _>(i) {
        return v.unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(i) {
        return json(v.map(|b| base64::engine::general_purpose::STANDARD.encode(b)));
    }
    if let Ok(v) = row.try_get::<Option<Oid>, _>(i) {
        return json(v.map(|oid| oid.0));
    }
    Value::Null
}

fn to_result_set(rows: &[PgRow]) -> ResultSet {
    let columns = rows
        .first()
        .map(|row| {
            row.columns()
                .iter()
                .map(|c| ColumnInfo {
                    name: c.name().to_string(),
                    type_name: c.type_info().name().to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    let rows = rows
        .iter()
        .map(|row| (0..row.len()).map(|i| row_value(row, i)).collect())
        .collect();

    ResultSet { columns, rows }
}

/// Pool-backed PostgreSQL connection provider.
#[derive(Debug, Clone)]
pub struct PgProvider {
    pool: PgPool,
}

impl PgProvider {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConnectionProvider for PgProvider {
    fn supports_callable(&self) -> bool {
        true
    }

    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Postgres
    }

    async fn acquire(&self, caller: &Caller) -> Result<Box<dyn DatabaseSession>, DbError> {
        let tx = self.pool.begin().await?;
        tracing::trace!(username = %caller.username, "Acquired postgres session");
        Ok(Box::new(PgSession { tx: Some(tx) }))
    }
}

/// A transaction on a pooled PostgreSQL connection.
pub struct PgSession {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgSession {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, DbError> {
        self.tx.as_mut().ok_or(DbError::SessionClosed)
    }
}

#[async_trait]
impl DatabaseSession for PgSession {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Postgres
    }

    async fn uses_large_object_storage(&mut self, tables: &[String]) -> Result<bool, DbError> {
        let names: Vec<String> = tables
            .iter()
            .map(|t| t.rsplit('.').next().unwrap_or(t).to_string())
            .collect();
        if names.is_empty() {
            return Ok(false);
        }

        let tx = self.tx()?;
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM information_schema.columns \
             WHERE lower(table_name) = ANY($1) AND data_type = 'oid')",
        )
        .bind(names)
        .fetch_one(&mut **tx)
        .await?;
        Ok(exists)
    }

    async fn execute(&mut self, statement: &PreparedStatement) -> Result<StatementOutcome, DbError> {
        let sql = to_numbered(statement.sql());
        let tx = self.tx()?;
        let args = bind_arguments(tx, statement).await?;

        if statement.mode() == StatementMode::Callable {
            let row = sqlx::query_with(&sql, args)
                .fetch_optional(&mut **tx)
                .await?;
            let out_parameters = statement
                .output_parameters()
                .enumerate()
                .map(|(col, p)| OutValue {
                    index: p.index,
                    name: p.out_name.clone(),
                    value: row
                        .as_ref()
                        .filter(|r| col < r.len())
                        .map_or(Value::Null, |r| row_value(r, col)),
                })
                .collect();
            return Ok(StatementOutcome::Call { out_parameters });
        }

        match statement.action() {
            StatementAction::Query => {
                let rows = sqlx::query_with(&sql, args).fetch_all(&mut **tx).await?;
                Ok(StatementOutcome::Rows(to_result_set(&rows)))
            }
            StatementAction::Update => {
                let result = sqlx::query_with(&sql, args).execute(&mut **tx).await?;
                Ok(StatementOutcome::UpdateCount {
                    count: result.rows_affected(),
                })
            }
        }
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        let tx = self.tx.take().ok_or(DbError::SessionClosed)?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        let tx = self.tx.take().ok_or(DbError::SessionClosed)?;
        tx.rollback().await?;
        Ok(())
    }
}
