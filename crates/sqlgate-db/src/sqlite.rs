//! SQLite driver.

use crate::error::DbError;
use crate::session::{ConnectionProvider, DatabaseSession};
use crate::statement::{
    ColumnInfo, PreparedStatement, ResultSet, StatementAction, StatementMode, StatementOutcome,
};
use crate::types::BindValue;
use async_trait::async_trait;
use base64::Engine;
use serde_json::Value;
use sqlgate_core::{Caller, DatabaseBackend};
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Arguments, Column, Row, Sqlite, Transaction, TypeInfo};
use std::str::FromStr;

fn args_add<'q, T>(args: &mut SqliteArguments<'q>, index: usize, v: T) -> Result<(), DbError>
where
    T: 'q + sqlx::Encode<'q, Sqlite> + sqlx::Type<Sqlite>,
{
    args.add(v).map_err(|e| DbError::Bind {
        index,
        message: e.to_string(),
    })
}

fn bind_arguments(statement: &PreparedStatement) -> Result<SqliteArguments<'_>, DbError> {
    let mut args = SqliteArguments::default();
    for p in statement.placeholder_parameters() {
        let idx = p.index;
        match &p.value {
            // SQLite nulls are untyped.
            BindValue::Null(_) => args_add(&mut args, idx, Option::<String>::None)?,
            BindValue::Text(s) => args_add(&mut args, idx, s.as_str())?,
            // No decimal storage class; numeric affinity converts the text.
            BindValue::Decimal(d) => args_add(&mut args, idx, d.to_string())?,
            BindValue::Bool(b) => args_add(&mut args, idx, *b)?,
            BindValue::Int(n) => args_add(&mut args, idx, *n)?,
            BindValue::BigInt(n) => args_add(&mut args, idx, *n)?,
            BindValue::Real(f) => args_add(&mut args, idx, *f)?,
            BindValue::Double(f) => args_add(&mut args, idx, *f)?,
            BindValue::Date(d) => args_add(&mut args, idx, *d)?,
            BindValue::Time(t) => args_add(&mut args, idx, *t)?,
            BindValue::Timestamp(ts) => args_add(&mut args, idx, *ts)?,
            BindValue::Bytes(b) | BindValue::LargeObject(b) => {
                args_add(&mut args, idx, b.as_slice())?
            }
        }
    }
    Ok(args)
}

fn row_value(row: &SqliteRow, i: usize) -> Value {
    row.try_get::<Option<i64>, _>(i)
        .map(|v| v.map(Value::from))
        .or_else(|_| row.try_get::<Option<f64>, _>(i).map(|v| v.map(Value::from)))
        .or_else(|_| row.try_get::<Option<String>, _>(i).map(|v| v.map(Value::from)))
        .or_else(|_| {
            row.try_get::<Option<Vec<u8>>, _>(i).map(|v| {
                v.map(|bytes| Value::from(base64::engine::general_purpose::STANDARD.encode(bytes)))
            })
        })
        .ok()
        .flatten()
        .unwrap_or(Value::Null)
}

fn to_result_set(rows: &[SqliteRow]) -> ResultSet {
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

/// Pool-backed SQLite connection provider.
#[derive(Debug, Clone)]
pub struct SqliteProvider {
    pool: SqlitePool,
}

impl SqliteProvider {
    /// Connect to `url`, creating the database file if missing.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ConnectionProvider for SqliteProvider {
    fn supports_callable(&self) -> bool {
        false
    }

    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    async fn acquire(&self, caller: &Caller) -> Result<Box<dyn DatabaseSession>, DbError> {
        let tx = self.pool.begin().await?;
        tracing::trace!(username = %caller.username, "Acquired sqlite session");
        Ok(Box::new(SqliteSession { tx: Some(tx) }))
    }
}

/// A transaction on a pooled SQLite connection.
pub struct SqliteSession {
    tx: Option<Transaction<'static, Sqlite>>,
}

impl SqliteSession {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Sqlite>, DbError> {
        self.tx.as_mut().ok_or(DbError::SessionClosed)
    }
}

#[async_trait]
impl DatabaseSession for SqliteSession {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    async fn uses_large_object_storage(&mut self, _tables: &[String]) -> Result<bool, DbError> {
        Ok(false)
    }

    async fn execute(&mut self, statement: &PreparedStatement) -> Result<StatementOutcome, DbError> {
        if statement.mode() == StatementMode::Callable {
            return Err(DbError::Unsupported("callable statements".to_string(), "sqlite"));
        }

        let args = bind_arguments(statement)?;
        let tx = self.tx()?;
        match statement.action() {
            StatementAction::Query => {
                let rows = sqlx::query_with(statement.sql(), args)
                    .fetch_all(&mut **tx)
                    .await?;
                Ok(StatementOutcome::Rows(to_result_set(&rows)))
            }
            StatementAction::Update => {
                let result = sqlx::query_with(statement.sql(), args)
                    .execute(&mut **tx)
                    .await?;
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
