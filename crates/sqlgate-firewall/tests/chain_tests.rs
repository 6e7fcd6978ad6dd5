//! Firewall chain tests against a file-backed SQLite database.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use sqlgate_audit::{AuditEventType, AuditFilter, AuditLogger, MemoryStorage};
use sqlgate_core::{AuditConfig, Caller, ComponentSpec, ExtraRuleSpec, FirewallConfig, SqlEvent};
use sqlgate_db::{ConnectionProvider, DatabaseSession, SqliteProvider};
use sqlgate_firewall::managers::{DenySqlInjection, InspectionMode};
use sqlgate_firewall::{
    BuildContext, FirewallChain, FirewallError, FirewallManager, FirewallRegistry, Gate, Refusal,
    RefusalTrigger,
};
use sqlgate_sql::{classify, StatementShape};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

// =============================================================================
// Test doubles
// =============================================================================

/// Counts calls to both gates and denies the configured one.
struct Counting {
    name: String,
    deny_write: bool,
    deny_content: bool,
    write_calls: AtomicUsize,
    content_calls: AtomicUsize,
}

impl Counting {
    fn new(name: &str, deny_write: bool, deny_content: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            deny_write,
            deny_content,
            write_calls: AtomicUsize::new(0),
            content_calls: AtomicUsize::new(0),
        })
    }

    fn writes(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    fn contents(&self) -> usize {
        self.content_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FirewallManager for Counting {
    fn name(&self) -> &str {
        &self.name
    }

    async fn allow_execute_update(
        &self,
        _event: &SqlEvent,
        _session: &mut dyn DatabaseSession,
    ) -> Result<bool, FirewallError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        Ok(!self.deny_write)
    }

    async fn allow_sql_run_after_analysis(
        &self,
        _event: &SqlEvent,
        _shape: &StatementShape,
        _session: &mut dyn DatabaseSession,
    ) -> Result<bool, FirewallError> {
        self.content_calls.fetch_add(1, Ordering::SeqCst);
        Ok(!self.deny_content)
    }
}

#[derive(Default)]
struct CountingTrigger {
    calls: AtomicUsize,
}

#[async_trait]
impl RefusalTrigger for CountingTrigger {
    fn name(&self) -> &str {
        "counting"
    }

    async fn run_if_statement_refused(
        &self,
        _refusal: &Refusal,
        _provider: &dyn ConnectionProvider,
    ) -> Result<(), FirewallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FailingTrigger;

#[async_trait]
impl RefusalTrigger for FailingTrigger {
    fn name(&self) -> &str {
        "failing"
    }

    async fn run_if_statement_refused(
        &self,
        refusal: &Refusal,
        _provider: &dyn ConnectionProvider,
    ) -> Result<(), FirewallError> {
        Err(FirewallError::UnknownTrigger(refusal.manager.clone()))
    }
}

struct ChannelTrigger {
    tx: mpsc::UnboundedSender<Refusal>,
}

#[async_trait]
impl RefusalTrigger for ChannelTrigger {
    fn name(&self) -> &str {
        "channel"
    }

    async fn run_if_statement_refused(
        &self,
        refusal: &Refusal,
        _provider: &dyn ConnectionProvider,
    ) -> Result<(), FirewallError> {
        let _ = self.tx.send(refusal.clone());
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn provider(dir: &tempfile::TempDir) -> Arc<dyn ConnectionProvider> {
    let url = format!("sqlite://{}", dir.path().join("fw.db").display());
    Arc::new(SqliteProvider::connect(&url, 4).await.unwrap())
}

fn caller() -> Caller {
    Caller::new("alice", "10.0.0.1")
}

fn event(sql: &str, params: &[&str]) -> SqlEvent {
    SqlEvent::builder(&caller(), "sales")
        .sql(sql)
        .prepared_statement(true)
        .parameter_values(params.iter().map(|p| p.to_string()).collect())
        .build()
}

fn memory_audit() -> Arc<AuditLogger> {
    Arc::new(AuditLogger::with_storage(
        AuditConfig::default(),
        Arc::new(MemoryStorage::new()),
    ))
}

fn chain_of(
    managers: &[Arc<Counting>],
    triggers: Vec<Arc<dyn RefusalTrigger>>,
    provider: Arc<dyn ConnectionProvider>,
) -> FirewallChain {
    let managers = managers
        .iter()
        .map(|m| m.clone() as Arc<dyn FirewallManager>)
        .collect();
    FirewallChain::new(managers, triggers, provider, memory_audit())
}

// =============================================================================
// Chain ordering
// =============================================================================

/// For every position k, the k-th denying manager wins and later managers
/// are never consulted.
#[tokio::test]
async fn test_first_denial_wins() {
    let dir = tempfile::tempdir().unwrap();
    let provider = provider(&dir).await;
    let sql = "SELECT * FROM customer WHERE customer_id = ?";
    let shape = classify(sql);

    for k in 0..4 {
        let managers: Vec<_> = (0..4)
            .map(|i| Counting::new(&format!("m{i}"), false, i == k))
            .collect();
        let chain = chain_of(&managers, vec![], provider.clone());

        let mut session = provider.acquire(&caller()).await.unwrap();
        let verdict = chain
            .evaluate(&shape, &event(sql, &["42"]), session.as_mut(), false)
            .await
            .unwrap();
        session.rollback().await.unwrap();

        assert!(!verdict.is_allowed());
        assert_eq!(verdict.denying_manager(), Some(format!("m{k}").as_str()));
        assert_eq!(verdict.gate(), Some(Gate::Content));
        assert_eq!(verdict.event().parameter_values(), ["42"]);
        for (i, manager) in managers.iter().enumerate() {
            assert_eq!(manager.contents(), usize::from(i <= k), "manager m{i} with k={k}");
            assert_eq!(manager.writes(), 0, "SELECT must skip the write-gate");
        }
    }
}

/// The write-gate pass completes before any content-gate runs.
#[tokio::test]
async fn test_write_gate_pass_runs_first() {
    let dir = tempfile::tempdir().unwrap();
    let provider = provider(&dir).await;
    let sql = "INSERT INTO orderlog VALUES (?, ?)";

    let first = Counting::new("content_denier", false, true);
    let second = Counting::new("write_denier", true, false);
    let third = Counting::new("bystander", false, false);
    let chain = chain_of(
        &[first.clone(), second.clone(), third.clone()],
        vec![],
        provider.clone(),
    );

    let mut session = provider.acquire(&caller()).await.unwrap();
    let verdict = chain
        .evaluate(&classify(sql), &event(sql, &["1", "2"]), session.as_mut(), true)
        .await
        .unwrap();

    assert_eq!(verdict.denying_manager(), Some("write_denier"));
    assert_eq!(verdict.gate(), Some(Gate::Write));
    assert_eq!((first.writes(), second.writes(), third.writes()), (1, 1, 0));
    assert_eq!((first.contents(), second.contents(), third.contents()), (0, 0, 0));
}

/// Unknown statements pass through the write-gate on query requests too.
#[tokio::test]
async fn test_unknown_statements_reach_write_gate() {
    let dir = tempfile::tempdir().unwrap();
    let provider = provider(&dir).await;

    let manager = Counting::new("m", true, false);
    let chain = chain_of(&[manager.clone()], vec![], provider.clone());
    let mut session = provider.acquire(&caller()).await.unwrap();

    for (sql, is_update) in [
        ("FROBNICATE the widgets", false),
        ("FROBNICATE the widgets", true),
        ("SELECT 1; DELETE FROM customer", false),
    ] {
        let verdict = chain
            .evaluate(&classify(sql), &event(sql, &[]), session.as_mut(), is_update)
            .await
            .unwrap();
        assert!(!verdict.is_allowed(), "{sql} with is_update={is_update}");
        assert_eq!(verdict.gate(), Some(Gate::Write));
    }
    assert_eq!(manager.writes(), 3);
    assert_eq!(manager.contents(), 0);
}

// =============================================================================
// Refusal triggers
// =============================================================================

/// One denial fires the trigger path once, however many managers ran, and
/// a failing trigger does not stop the others.
#[tokio::test]
async fn test_on_deny_fires_each_trigger_once() {
    let dir = tempfile::tempdir().unwrap();
    let provider = provider(&dir).await;
    let sql = "DELETE FROM orderlog";

    let counting = Arc::new(CountingTrigger::default());
    let managers: Vec<_> = (0..3)
        .map(|i| Counting::new(&format!("m{i}"), false, i == 2))
        .collect();
    let chain = chain_of(
        &managers,
        vec![Arc::new(FailingTrigger) as Arc<dyn RefusalTrigger>, counting.clone()],
        provider.clone(),
    );

    let mut session = provider.acquire(&caller()).await.unwrap();
    let verdict = chain
        .evaluate(&classify(sql), &event(sql, &[]), session.as_mut(), true)
        .await
        .unwrap();
    session.rollback().await.unwrap();
    chain.on_deny(&verdict).await;

    assert_eq!(verdict.denying_manager(), Some("m2"));
    assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
}

/// `on_deny` ignores allowed verdicts.
#[tokio::test]
async fn test_on_deny_ignores_allowed_verdict() {
    let dir = tempfile::tempdir().unwrap();
    let provider = provider(&dir).await;
    let counting = Arc::new(CountingTrigger::default());
    let chain = FirewallChain::new(
        vec![],
        vec![counting.clone() as Arc<dyn RefusalTrigger>],
        provider.clone(),
        memory_audit(),
    );

    let sql = "SELECT 1";
    let mut session = provider.acquire(&caller()).await.unwrap();
    let verdict = chain
        .evaluate(&classify(sql), &event(sql, &[]), session.as_mut(), false)
        .await
        .unwrap();
    chain.on_deny(&verdict).await;

    assert!(verdict.is_allowed());
    assert_eq!(chain.manager_names(), ["allow_all"]);
    assert_eq!(counting.calls.load(Ordering::SeqCst), 0);
}

/// Evaluation alone never starts out-of-band checks.
#[tokio::test]
async fn test_evaluate_does_not_start_deferred_checks() {
    let dir = tempfile::tempdir().unwrap();
    let provider = provider(&dir).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let chain = FirewallChain::new(
        vec![Arc::new(DenySqlInjection::new(InspectionMode::Async)) as Arc<dyn FirewallManager>],
        vec![Arc::new(ChannelTrigger { tx }) as Arc<dyn RefusalTrigger>],
        provider.clone(),
        memory_audit(),
    );

    let sql = "SELECT * FROM users WHERE name = ?";
    let mut session = provider.acquire(&caller()).await.unwrap();
    let verdict = chain
        .evaluate(&classify(sql), &event(sql, &["x' OR 'a'='a"]), session.as_mut(), false)
        .await
        .unwrap();
    session.rollback().await.unwrap();
    assert!(verdict.is_allowed());

    let waited = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(waited.is_err(), "no refusal without start_deferred_checks");
}

/// Async inspection allows at once and reports the violation later.
#[tokio::test]
async fn test_async_violation_fires_triggers() {
    let dir = tempfile::tempdir().unwrap();
    let provider = provider(&dir).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let audit = memory_audit();
    let chain = FirewallChain::new(
        vec![Arc::new(DenySqlInjection::new(InspectionMode::Async)) as Arc<dyn FirewallManager>],
        vec![Arc::new(ChannelTrigger { tx }) as Arc<dyn RefusalTrigger>],
        provider.clone(),
        audit.clone(),
    );

    let sql = "SELECT * FROM users WHERE name = ?";
    let mut session = provider.acquire(&caller()).await.unwrap();
    let verdict = chain
        .evaluate(&classify(sql), &event(sql, &["x' OR 'a'='a"]), session.as_mut(), false)
        .await
        .unwrap();
    assert!(verdict.is_allowed());
    session.commit().await.unwrap();
    chain.start_deferred_checks(&classify(sql), verdict.event());

    let refusal = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(refusal.manager, "deny_sql_injection");
    assert_eq!(refusal.gate, Gate::OutOfBand);
    assert_eq!(refusal.reason.as_deref(), Some("quote breakout in parameter 1"));

    let recorded = audit
        .query(AuditFilter {
            event_type: Some(AuditEventType::AsyncViolation),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(recorded.len(), 1);
}

// =============================================================================
// Registry
// =============================================================================

fn context(provider: Arc<dyn ConnectionProvider>) -> BuildContext {
    BuildContext {
        database: "sales".to_string(),
        provider,
    }
}

#[tokio::test]
async fn test_registry_builds_configured_chain() {
    let dir = tempfile::tempdir().unwrap();
    let provider = provider(&dir).await;
    let rules = dir.path().join("rules.csv");
    std::fs::write(
        &rules,
        "username;table;delete;insert;select;update;optional comments\n\
         public;customer;false;false;true;false;\n",
    )
    .unwrap();

    let mut csv = ComponentSpec::named("csv_rules");
    csv.options = serde_json::json!({ "file": rules });
    let mut ddl = ComponentSpec::named("deny_ddl");
    ddl.extra_rules = vec![ExtraRuleSpec::DenyUsers {
        users: vec!["mallory".to_string()],
    }];
    let config = FirewallConfig {
        managers: vec![ddl, csv],
        triggers: vec![ComponentSpec::named("log")],
    };

    let chain = FirewallRegistry::with_builtins()
        .build_chain(&config, &context(provider.clone()), memory_audit())
        .unwrap();
    assert_eq!(chain.manager_names(), ["deny_ddl", "csv_rules"]);

    let mut session = provider.acquire(&caller()).await.unwrap();
    let select = "SELECT * FROM customer";
    let verdict = chain
        .evaluate(&classify(select), &event(select, &[]), session.as_mut(), false)
        .await
        .unwrap();
    assert!(verdict.is_allowed());

    let delete = "DELETE FROM customer";
    let verdict = chain
        .evaluate(&classify(delete), &event(delete, &[]), session.as_mut(), true)
        .await
        .unwrap();
    assert_eq!(verdict.denying_manager(), Some("csv_rules"));

    let mallory = SqlEvent::builder(&Caller::new("mallory", "10.0.0.2"), "sales")
        .sql(select)
        .build();
    let verdict = chain
        .evaluate(&classify(select), &mallory, session.as_mut(), false)
        .await
        .unwrap();
    assert_eq!(verdict.denying_manager(), Some("deny_ddl"));
}

#[tokio::test]
async fn test_registry_rejects_unknown_and_incomplete_components() {
    let dir = tempfile::tempdir().unwrap();
    let provider = provider(&dir).await;
    let registry = FirewallRegistry::with_builtins();
    let ctx = context(provider);

    let err = registry
        .build_manager(&ComponentSpec::named("deny_everything"), &ctx)
        .err().unwrap();
    assert!(matches!(err, FirewallError::UnknownManager(name) if name == "deny_everything"));

    let err = registry
        .build_manager(&ComponentSpec::named("csv_rules"), &ctx)
        .err().unwrap();
    assert!(matches!(err, FirewallError::InvalidOptions { .. }));

    let err = registry
        .build_trigger(&ComponentSpec::named("page_oncall"), &ctx)
        .err().unwrap();
    assert!(matches!(err, FirewallError::UnknownTrigger(_)));
}

// =============================================================================
// Bans
// =============================================================================

/// A refusal bans the caller; the next request of that caller is denied.
#[tokio::test]
async fn test_ban_user_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let provider = provider(&dir).await;
    let config = FirewallConfig {
        managers: vec![
            ComponentSpec::named("deny_banned_user"),
            ComponentSpec::named("deny_ddl"),
        ],
        triggers: vec![ComponentSpec::named("ban_user")],
    };
    let chain = FirewallRegistry::with_builtins()
        .build_chain(&config, &context(provider.clone()), memory_audit())
        .unwrap();

    let drop = "DROP TABLE customer";
    let mut session = provider.acquire(&caller()).await.unwrap();
    let verdict = chain
        .evaluate(&classify(drop), &event(drop, &[]), session.as_mut(), true)
        .await
        .unwrap();
    session.rollback().await.unwrap();
    assert_eq!(verdict.denying_manager(), Some("deny_ddl"));
    chain.on_deny(&verdict).await;

    let select = "SELECT 1";
    let mut session = provider.acquire(&caller()).await.unwrap();
    let verdict = chain
        .evaluate(&classify(select), &event(select, &[]), session.as_mut(), false)
        .await
        .unwrap();
    session.rollback().await.unwrap();
    assert_eq!(verdict.denying_manager(), Some("deny_banned_user"));

    let mut session = provider.acquire(&Caller::new("bob", "10.0.0.3")).await.unwrap();
    let bob = SqlEvent::builder(&Caller::new("bob", "10.0.0.3"), "sales")
        .sql(select)
        .build();
    let verdict = chain
        .evaluate(&classify(select), &bob, session.as_mut(), false)
        .await
        .unwrap();
    assert!(verdict.is_allowed());
}

/// Bans work when the pool holds a single connection: the lookup runs in the
/// request's session and the trigger only acquires after the rollback.
#[tokio::test]
async fn test_bans_on_single_connection_pool() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("single.db").display());
    let provider: Arc<dyn ConnectionProvider> =
        Arc::new(SqliteProvider::connect(&url, 1).await.unwrap());
    let config = FirewallConfig {
        managers: vec![
            ComponentSpec::named("deny_banned_user"),
            ComponentSpec::named("deny_ddl"),
        ],
        triggers: vec![ComponentSpec::named("ban_user")],
    };
    let chain = FirewallRegistry::with_builtins()
        .build_chain(&config, &context(provider.clone()), memory_audit())
        .unwrap();
    let limit = Duration::from_secs(5);

    let select = "SELECT 1";
    let mut session = provider.acquire(&caller()).await.unwrap();
    let verdict = tokio::time::timeout(
        limit,
        chain.evaluate(&classify(select), &event(select, &[]), session.as_mut(), false),
    )
    .await
    .expect("evaluation finished")
    .unwrap();
    session.rollback().await.unwrap();
    assert!(verdict.is_allowed());

    let drop = "DROP TABLE customer";
    let mut session = provider.acquire(&caller()).await.unwrap();
    let verdict = tokio::time::timeout(
        limit,
        chain.evaluate(&classify(drop), &event(drop, &[]), session.as_mut(), true),
    )
    .await
    .expect("evaluation finished")
    .unwrap();
    session.rollback().await.unwrap();
    assert_eq!(verdict.denying_manager(), Some("deny_ddl"));
    tokio::time::timeout(limit, chain.on_deny(&verdict))
        .await
        .expect("triggers finished");

    let mut session = provider.acquire(&caller()).await.unwrap();
    let verdict = tokio::time::timeout(
        limit,
        chain.evaluate(&classify(select), &event(select, &[]), session.as_mut(), false),
    )
    .await
    .expect("evaluation finished")
    .unwrap();
    session.rollback().await.unwrap();
    assert_eq!(verdict.denying_manager(), Some("deny_banned_user"));
}
