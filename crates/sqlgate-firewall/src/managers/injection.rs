//! Heuristic SQL injection detection.
//!
//! Statement text is checked for payloads that never belong in
//! application SQL (tautologies, stacked statements, time delays, file and
//! command access). Parameter values additionally get the checks for
//! payloads that only make sense when smuggled in as data.

use crate::error::FirewallError;
use crate::manager::{DeferredCheck, FirewallManager};
use async_trait::async_trait;
use regex::Regex;
use sqlgate_core::{ComponentSpec, SqlEvent};
use sqlgate_db::DatabaseSession;
use sqlgate_sql::StatementShape;
use std::sync::LazyLock;

/// Whether a detector gates the request or runs after it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InspectionMode {
    /// Deny in the content-gate.
    #[default]
    Sync,
    /// Allow, then inspect out of band and fire refusal triggers on a hit.
    Async,
}

impl InspectionMode {
    pub(crate) fn from_spec(spec: &ComponentSpec) -> Result<Self, FirewallError> {
        match spec.option_str("mode") {
            None | Some("sync") => Ok(Self::Sync),
            Some("async") => Ok(Self::Async),
            Some(other) => Err(FirewallError::invalid_options(
                &spec.name,
                format!("mode must be 'sync' or 'async', got '{other}'"),
            )),
        }
    }
}

fn patterns(list: &[(&'static str, &str)]) -> Vec<(&'static str, Regex)> {
    list.iter()
        .map(|(name, re)| (*name, Regex::new(re).expect("valid injection pattern")))
        .collect()
}

static STATEMENT_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    patterns(&[
        ("tautology", r"(?i)\bor\s+(?:1\s*=\s*1\b|'1'\s*=\s*'1'|true\b)"),
        (
            "stacked statement",
            r"(?i);\s*(?:select|insert|update|delete|drop|create|alter|truncate)\b",
        ),
        ("time delay", r"(?i)\b(?:sleep|pg_sleep|benchmark)\s*\("),
        ("time delay", r"(?i)\bwaitfor\s+delay\s+'"),
        ("file access", r"(?i)\binto\s+(?:outfile|dumpfile)\b"),
        ("file access", r"(?i)\bload_file\s*\("),
        ("command execution", r"(?i)\b(?:xp_cmdshell|sp_oacreate)\b"),
    ])
});

static PARAMETER_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    patterns(&[
        ("quote breakout", r"(?i)'\s*(?:or|and)\s"),
        ("comment sequence", r"(?:'|\))\s*(?:--|#|/\*)"),
        ("union select", r"(?i)\bunion\s+(?:all\s+)?select\b"),
        ("encoded quote", r"(?i)%27|\\x27|\bchr\s*\(\s*39\s*\)"),
    ])
});

/// Local, regex-based detector.
#[derive(Debug, Clone, Copy, Default)]
pub struct InjectionDetector;

impl InjectionDetector {
    /// Describe the first suspicious pattern found, if any.
    pub fn inspect(&self, sql: &str, parameters: &[String]) -> Option<String> {
        if let Some((name, _)) = STATEMENT_PATTERNS.iter().find(|(_, re)| re.is_match(sql)) {
            return Some(format!("{name} in statement"));
        }

        for (i, value) in parameters.iter().enumerate() {
            let hit = STATEMENT_PATTERNS
                .iter()
                .chain(PARAMETER_PATTERNS.iter())
                .find(|(_, re)| re.is_match(value));
            if let Some((name, _)) = hit {
                return Some(format!("{name} in parameter {}", i + 1));
            }
        }

        None
    }
}

/// Denies statements the local detector flags.
#[derive(Debug, Default)]
pub struct DenySqlInjection {
    detector: InjectionDetector,
    mode: InspectionMode,
}

impl DenySqlInjection {
    pub fn new(mode: InspectionMode) -> Self {
        Self {
            detector: InjectionDetector,
            mode,
        }
    }
}

#[async_trait]
impl FirewallManager for DenySqlInjection {
    fn name(&self) -> &str {
        "deny_sql_injection"
    }

    async fn allow_sql_run_after_analysis(
        &self,
        event: &SqlEvent,
        _shape: &StatementShape,
        _session: &mut dyn DatabaseSession,
    ) -> Result<bool, FirewallError> {
        if self.mode == InspectionMode::Async {
            return Ok(true);
        }

        match self.detector.inspect(event.sql(), event.parameter_values()) {
            Some(reason) => {
                tracing::warn!(username = event.username(), reason = %reason, "SQL injection detected");
                Ok(false)
            }
            None => Ok(true),
        }
    }

    fn deferred_check(&self, event: &SqlEvent, _shape: &StatementShape) -> Option<DeferredCheck> {
        if self.mode != InspectionMode::Async {
            return None;
        }

        let detector = self.detector;
        let sql = event.sql().to_string();
        let parameters = event.parameter_values().to_vec();
        Some(Box::pin(async move { Ok(detector.inspect(&sql, &parameters)) }))
    }
}
