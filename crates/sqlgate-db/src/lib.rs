//! # sqlgate-db
//!
//! Database sessions for sqlgate.
//!
//! The executor talks to databases only through two traits:
//! - [`ConnectionProvider`] hands out one session per request
//! - [`DatabaseSession`] executes [`PreparedStatement`]s inside a
//!   transaction and is committed or rolled back by its owner
//!
//! Both SQLite and PostgreSQL are implemented on top of `sqlx`.

pub mod error;
pub mod pool;
pub mod postgres;
pub mod session;
pub mod sqlite;
pub mod statement;
pub mod types;

pub use error::DbError;
pub use pool::connect;
pub use postgres::{PgProvider, PgSession};
pub use session::{ConnectionProvider, DatabaseSession};
pub use sqlite::{SqliteProvider, SqliteSession};
pub use statement::{
    ColumnInfo, OutValue, PreparedStatement, ResultSet, StatementAction, StatementMode,
    StatementOutcome, StatementParameter,
};
pub use types::{BindValue, ParameterDirection, SqlType};
