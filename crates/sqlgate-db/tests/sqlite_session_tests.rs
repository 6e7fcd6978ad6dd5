//! SQLite session tests against a file-backed database.

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use serde_json::json;
use sqlgate_core::Caller;
use sqlgate_db::{
    BindValue, ConnectionProvider, DbError, PreparedStatement, SqliteProvider, SqlType,
    StatementAction, StatementMode, StatementOutcome,
};

async fn provider(dir: &tempfile::TempDir) -> SqliteProvider {
    let url = format!("sqlite://{}", dir.path().join("test.db").display());
    let provider = SqliteProvider::connect(&url, 2).await.unwrap();

    let mut session = provider.acquire(&caller()).await.unwrap();
    session
        .execute(&PreparedStatement::update(
            "CREATE TABLE customer (customer_id INTEGER PRIMARY KEY, name TEXT, \
             balance REAL, active BOOLEAN, joined DATE, photo BLOB)",
            vec![],
        ))
        .await
        .unwrap();
    session.commit().await.unwrap();
    provider
}

fn caller() -> Caller {
    Caller::new("alice", "127.0.0.1")
}

fn rows(outcome: StatementOutcome) -> sqlgate_db::ResultSet {
    match outcome {
        StatementOutcome::Rows(rows) => rows,
        other => panic!("expected rows, got {other:?}"),
    }
}

/// Typed values bind and read back.
#[tokio::test]
async fn test_insert_and_select_typed_values() {
    let dir = tempfile::tempdir().unwrap();
    let provider = provider(&dir).await;

    let mut session = provider.acquire(&caller()).await.unwrap();
    let outcome = session
        .execute(&PreparedStatement::update(
            "INSERT INTO customer VALUES (?, ?, ?, ?, ?, ?)",
            vec![
                BindValue::Int(42),
                BindValue::Text("Ann".to_string()),
                BindValue::Double(12.5),
                BindValue::Bool(true),
                BindValue::Date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()),
                BindValue::Bytes(vec![1, 2, 3]),
            ],
        ))
        .await
        .unwrap();
    assert_eq!(outcome, StatementOutcome::UpdateCount { count: 1 });
    session.commit().await.unwrap();

    let mut session = provider.acquire(&caller()).await.unwrap();
    let result = rows(
        session
            .execute(&PreparedStatement::query(
                "SELECT * FROM customer WHERE customer_id = ?",
                vec![BindValue::Int(42)],
            ))
            .await
            .unwrap(),
    );
    session.commit().await.unwrap();

    assert_eq!(result.row_count(), 1);
    assert_eq!(result.get(0, "customer_id"), Some(&json!(42)));
    assert_eq!(result.get(0, "name"), Some(&json!("Ann")));
    assert_eq!(result.get(0, "balance"), Some(&json!(12.5)));
    assert_eq!(result.get(0, "active"), Some(&json!(1)));
    assert_eq!(result.get(0, "joined"), Some(&json!("2024-01-02")));
    assert_eq!(result.get(0, "photo"), Some(&json!("AQID")));
}

/// Typed nulls bind as SQL NULL.
#[tokio::test]
async fn test_typed_null() {
    let dir = tempfile::tempdir().unwrap();
    let provider = provider(&dir).await;

    let mut session = provider.acquire(&caller()).await.unwrap();
    session
        .execute(&PreparedStatement::update(
            "INSERT INTO customer (customer_id, name) VALUES (?, ?)",
            vec![BindValue::Int(1), BindValue::Null(SqlType::Varchar)],
        ))
        .await
        .unwrap();
    let result = rows(
        session
            .execute(&PreparedStatement::query(
                "SELECT name FROM customer WHERE customer_id = 1",
                vec![],
            ))
            .await
            .unwrap(),
    );
    assert_eq!(result.get(0, "name"), Some(&json!(null)));
}

/// Rolled-back work is not visible to later sessions.
#[tokio::test]
async fn test_rollback_discards_changes() {
    let dir = tempfile::tempdir().unwrap();
    let provider = provider(&dir).await;

    let mut session = provider.acquire(&caller()).await.unwrap();
    session
        .execute(&PreparedStatement::update(
            "INSERT INTO customer (customer_id, name) VALUES (?, ?)",
            vec![BindValue::Int(7), BindValue::Text("Bo".to_string())],
        ))
        .await
        .unwrap();
    session.rollback().await.unwrap();

    let mut session = provider.acquire(&caller()).await.unwrap();
    let result = rows(
        session
            .execute(&PreparedStatement::query("SELECT * FROM customer", vec![]))
            .await
            .unwrap(),
    );
    assert_eq!(result.row_count(), 0);
}

/// Batch execution returns one update count per statement.
#[tokio::test]
async fn test_execute_batch_counts() {
    let dir = tempfile::tempdir().unwrap();
    let provider = provider(&dir).await;

    let mut session = provider.acquire(&caller()).await.unwrap();
    let statements: Vec<_> = (1..=3)
        .map(|id| {
            PreparedStatement::update(
                "INSERT INTO customer (customer_id) VALUES (?)",
                vec![BindValue::Int(id)],
            )
        })
        .chain(std::iter::once(PreparedStatement::update(
            "UPDATE customer SET name = 'x' WHERE customer_id > ?",
            vec![BindValue::Int(1)],
        )))
        .collect();

    let counts = session.execute_batch(&statements).await.unwrap();
    assert_eq!(counts, vec![1, 1, 1, 2]);
}

/// Callable statements are reported as unsupported.
#[tokio::test]
async fn test_callable_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let provider = provider(&dir).await;

    assert!(!provider.supports_callable());
    let mut session = provider.acquire(&caller()).await.unwrap();
    let stmt = PreparedStatement::new("{call p()}", StatementMode::Callable, StatementAction::Query);
    let err = session.execute(&stmt).await.unwrap_err();
    assert!(matches!(err, DbError::Unsupported(_, "sqlite")));
}

/// A finished session refuses further work.
#[tokio::test]
async fn test_closed_session() {
    let dir = tempfile::tempdir().unwrap();
    let provider = provider(&dir).await;

    let mut session = provider.acquire(&caller()).await.unwrap();
    session.commit().await.unwrap();
    let err = session
        .execute(&PreparedStatement::query("SELECT 1", vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::SessionClosed));
    assert!(matches!(session.rollback().await, Err(DbError::SessionClosed)));
}

/// Driver errors are flagged as such.
#[tokio::test]
async fn test_driver_error() {
    let dir = tempfile::tempdir().unwrap();
    let provider = provider(&dir).await;

    let mut session = provider.acquire(&caller()).await.unwrap();
    let err = session
        .execute(&PreparedStatement::query("SELECT * FROM missing_table", vec![]))
        .await
        .unwrap_err();
    assert!(err.is_driver_error());
}
