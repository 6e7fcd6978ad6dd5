//! Remote injection inspection against a local stand-in service.

use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use sqlgate_core::{Caller, ComponentSpec, SqlEvent};
use sqlgate_db::{ConnectionProvider, SqliteProvider};
use sqlgate_firewall::managers::DenySqlInjectionRemote;
use sqlgate_firewall::{FirewallError, FirewallManager};
use sqlgate_sql::classify;

/// Flags any request whose parameters mention `DROP`.
async fn inspect(Json(body): Json<Value>) -> Json<Value> {
    let flagged = body["parameters"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .any(|p| p.to_uppercase().contains("DROP"));
    if flagged {
        Json(json!({ "injection": true, "reason": "drop in parameter" }))
    } else {
        Json(json!({ "injection": false }))
    }
}

async fn spawn_service() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().route("/inspect", post(inspect));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/inspect")
}

fn manager(url: &str, mode: &str) -> DenySqlInjectionRemote {
    let mut spec = ComponentSpec::named("deny_sql_injection_remote");
    spec.options = json!({ "url": url, "mode": mode });
    DenySqlInjectionRemote::from_spec(&spec).unwrap()
}

fn event(param: &str) -> SqlEvent {
    SqlEvent::builder(&Caller::new("alice", "10.0.0.1"), "sales")
        .sql("SELECT * FROM customer WHERE name = ?")
        .parameter_values(vec![param.to_string()])
        .build()
}

#[tokio::test]
async fn test_sync_remote_inspection() {
    let url = spawn_service().await;
    let dir = tempfile::tempdir().unwrap();
    let provider =
        SqliteProvider::connect(&format!("sqlite://{}", dir.path().join("r.db").display()), 1)
            .await
            .unwrap();
    let manager = manager(&url, "sync");
    let shape = classify("SELECT * FROM customer WHERE name = ?");

    let mut session = provider
        .acquire(&Caller::new("alice", "10.0.0.1"))
        .await
        .unwrap();
    assert!(
        manager
            .allow_sql_run_after_analysis(&event("Ann"), &shape, session.as_mut())
            .await
            .unwrap()
    );
    assert!(
        !manager
            .allow_sql_run_after_analysis(&event("x'; drop table t"), &shape, session.as_mut())
            .await
            .unwrap()
    );
    assert!(manager.deferred_check(&event("Ann"), &shape).is_none());
}

#[tokio::test]
async fn test_async_remote_inspection() {
    let url = spawn_service().await;
    let manager = manager(&url, "async");
    let shape = classify("SELECT * FROM customer WHERE name = ?");

    let check = manager.deferred_check(&event("DROP it"), &shape).unwrap();
    assert_eq!(check.await.unwrap().as_deref(), Some("drop in parameter"));

    let check = manager.deferred_check(&event("Ann"), &shape).unwrap();
    assert_eq!(check.await.unwrap(), None);
}

#[tokio::test]
async fn test_unreachable_service_is_an_error() {
    // Bind then drop to get a port nothing listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let manager = manager(&format!("http://{addr}/inspect"), "async");
    let check = manager
        .deferred_check(&event("Ann"), &classify("SELECT 1"))
        .unwrap();
    assert!(matches!(check.await, Err(FirewallError::Remote(_))));
}
