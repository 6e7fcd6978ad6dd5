//! Statements handed to a [`DatabaseSession`](crate::DatabaseSession) and
//! the outcomes they produce.

use crate::error::DbError;
use crate::types::{BindValue, ParameterDirection, SqlType};
use serde::{Deserialize, Serialize};
use sqlgate_sql::placeholders::unescape_call;

/// How the client asked for the statement to be prepared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementMode {
    /// No parameters.
    Plain,
    #[default]
    Prepared,
    /// Stored procedure call; the only mode with OUT parameters.
    Callable,
}

/// What the client expects back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementAction {
    /// Rows.
    #[default]
    Query,
    /// An update count.
    Update,
}

/// One positional parameter bound to a statement.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementParameter {
    /// 1-based position.
    pub index: usize,
    pub sql_type: SqlType,
    pub direction: ParameterDirection,
    /// Input value. OUT parameters carry a typed null.
    pub value: BindValue,
    /// Name reported back for OUT values.
    pub out_name: Option<String>,
}

/// A statement with its bound parameters, ready for execution.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    sql: String,
    mode: StatementMode,
    action: StatementAction,
    parameters: Vec<StatementParameter>,
    has_return_value: bool,
}

impl PreparedStatement {
    /// Create a statement. Callable escapes (`{call p(?)}`) are unwrapped.
    pub fn new(sql: impl Into<String>, mode: StatementMode, action: StatementAction) -> Self {
        let sql = sql.into();
        let (sql, has_return_value) = if mode == StatementMode::Callable {
            let callable = unescape_call(&sql);
            (callable.sql, callable.has_return_value)
        } else {
            (sql, false)
        };

        Self {
            sql,
            mode,
            action,
            parameters: Vec::new(),
            has_return_value,
        }
    }

    /// Shorthand for a prepared query with IN values.
    pub fn query(sql: impl Into<String>, values: Vec<BindValue>) -> Self {
        let mut statement = Self::new(sql, StatementMode::Prepared, StatementAction::Query);
        for value in values {
            statement.push_input(value);
        }
        statement
    }

    /// Shorthand for a prepared update with IN values.
    pub fn update(sql: impl Into<String>, values: Vec<BindValue>) -> Self {
        let mut statement = Self::new(sql, StatementMode::Prepared, StatementAction::Update);
        for value in values {
            statement.push_input(value);
        }
        statement
    }

    fn push_input(&mut self, value: BindValue) {
        let sql_type = match &value {
            BindValue::Null(t) => *t,
            BindValue::Text(_) => SqlType::Varchar,
            BindValue::Decimal(_) => SqlType::Decimal,
            BindValue::Bool(_) => SqlType::Bit,
            BindValue::Int(_) => SqlType::Integer,
            BindValue::BigInt(_) => SqlType::BigInt,
            BindValue::Real(_) => SqlType::Real,
            BindValue::Double(_) => SqlType::Double,
            BindValue::Date(_) => SqlType::Date,
            BindValue::Time(_) => SqlType::Time,
            BindValue::Timestamp(_) => SqlType::Timestamp,
            BindValue::Bytes(_) | BindValue::LargeObject(_) => SqlType::Blob,
        };
        let index = self.parameters.len() + 1;
        self.parameters.push(StatementParameter {
            index,
            sql_type,
            direction: ParameterDirection::In,
            value,
            out_name: None,
        });
    }

    /// Attach a parameter. OUT and INOUT require a callable statement.
    pub fn bind(&mut self, parameter: StatementParameter) -> Result<(), DbError> {
        if parameter.direction.is_output() && !self.supports_output_parameters() {
            return Err(DbError::OutParameterNotSupported {
                index: parameter.index,
                direction: parameter.direction.to_string(),
            });
        }
        self.parameters.push(parameter);
        self.parameters.sort_by_key(|p| p.index);
        Ok(())
    }

    pub fn supports_output_parameters(&self) -> bool {
        self.mode == StatementMode::Callable
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn mode(&self) -> StatementMode {
        self.mode
    }

    pub fn action(&self) -> StatementAction {
        self.action
    }

    pub fn parameters(&self) -> &[StatementParameter] {
        &self.parameters
    }

    /// True for `{? = call f(...)}`: parameter 1 is the function result and
    /// has no marker in [`sql`](Self::sql).
    pub fn has_return_value(&self) -> bool {
        self.has_return_value
    }

    /// Parameters that have a `?` marker in the SQL text, in order.
    pub fn placeholder_parameters(&self) -> impl Iterator<Item = &StatementParameter> {
        let return_value = self.has_return_value;
        self.parameters
            .iter()
            .filter(move |p| !(return_value && p.index == 1))
    }

    /// Parameters read back after a call, in result-column order.
    pub fn output_parameters(&self) -> impl Iterator<Item = &StatementParameter> {
        self.parameters.iter().filter(|p| p.direction.is_output())
    }
}

/// Column metadata of a result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Driver type name, e.g. `INT4` or `TEXT`.
    pub type_name: String,
}

/// Rows returned by a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl ResultSet {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Value of `column` in row `row`.
    pub fn get(&self, row: usize, column: &str) -> Option<&serde_json::Value> {
        let idx = self.columns.iter().position(|c| c.name == column)?;
        self.rows.get(row)?.get(idx)
    }
}

/// An OUT value read back from a callable statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutValue {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub value: serde_json::Value,
}

/// Result of executing one statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatementOutcome {
    Rows(ResultSet),
    UpdateCount { count: u64 },
    Call { out_parameters: Vec<OutValue> },
}

impl StatementOutcome {
    /// Rows returned or affected.
    pub fn row_count(&self) -> u64 {
        match self {
            Self::Rows(rows) => rows.row_count() as u64,
            Self::UpdateCount { count } => *count,
            Self::Call { .. } => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn out_param(index: usize) -> StatementParameter {
        StatementParameter {
            index,
            sql_type: SqlType::Integer,
            direction: ParameterDirection::Out,
            value: BindValue::Null(SqlType::Integer),
            out_name: Some("total".to_string()),
        }
    }

    #[test]
    fn test_out_parameter_requires_callable() {
        let mut stmt = PreparedStatement::new(
            "SELECT * FROM t WHERE id = ?",
            StatementMode::Prepared,
            StatementAction::Query,
        );
        let err = stmt.bind(out_param(2)).unwrap_err();
        assert!(matches!(err, DbError::OutParameterNotSupported { index: 2, .. }));
        assert!(err.to_string().contains("parameter 2"));
    }

    #[test]
    fn test_callable_escape_and_return_value() {
        let mut stmt = PreparedStatement::new(
            "{? = call order_total(?)}",
            StatementMode::Callable,
            StatementAction::Query,
        );
        assert_eq!(stmt.sql(), "SELECT order_total(?)");
        assert!(stmt.has_return_value());

        stmt.bind(out_param(1)).unwrap();
        stmt.bind(StatementParameter {
            index: 2,
            sql_type: SqlType::Integer,
            direction: ParameterDirection::In,
            value: BindValue::Int(7),
            out_name: None,
        })
        .unwrap();

        let placeholders: Vec<usize> = stmt.placeholder_parameters().map(|p| p.index).collect();
        assert_eq!(placeholders, vec![2]);
        let outputs: Vec<usize> = stmt.output_parameters().map(|p| p.index).collect();
        assert_eq!(outputs, vec![1]);
    }

    #[test]
    fn test_shorthand_constructors_number_parameters() {
        let stmt = PreparedStatement::update(
            "UPDATE t SET a = ? WHERE b = ?",
            vec![BindValue::Text("x".into()), BindValue::Int(1)],
        );
        assert_eq!(stmt.action(), StatementAction::Update);
        assert_eq!(stmt.parameters()[1].index, 2);
        assert_eq!(stmt.parameters()[1].sql_type, SqlType::Integer);
    }
}
