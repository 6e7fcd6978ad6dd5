//! SQL injection detection delegated to a remote HTTP inspection service.
//!
//! The service receives `{"sql": ..., "parameters": [...]}` as a JSON POST
//! and answers `{"injection": bool, "reason": optional string}`.

use crate::error::FirewallError;
use crate::manager::{DeferredCheck, FirewallManager};
use crate::managers::injection::InspectionMode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlgate_core::{ComponentSpec, SqlEvent};
use sqlgate_db::DatabaseSession;
use sqlgate_sql::StatementShape;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use url::Url;

const DEFAULT_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Serialize)]
struct InspectionRequest<'a> {
    sql: &'a str,
    parameters: &'a [String],
}

#[derive(Debug, Deserialize)]
struct InspectionResponse {
    injection: bool,
    #[serde(default)]
    reason: Option<String>,
}

/// Settings of one inspection endpoint.
#[derive(Debug, Clone)]
struct Endpoint {
    url: Url,
    api_key: Option<String>,
}

impl Endpoint {
    async fn inspect(
        &self,
        client: &reqwest::Client,
        sql: &str,
        parameters: &[String],
    ) -> Result<Option<String>, FirewallError> {
        let mut request = client
            .post(self.url.clone())
            .json(&InspectionRequest { sql, parameters });
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response: InspectionResponse = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.injection.then(|| {
            response
                .reason
                .unwrap_or_else(|| "flagged by remote inspection".to_string())
        }))
    }
}

/// Denies statements a remote service flags.
///
/// The HTTP client is built on first use and shared by all requests.
#[derive(Debug)]
pub struct DenySqlInjectionRemote {
    endpoint: Endpoint,
    timeout: Duration,
    mode: InspectionMode,
    client: RwLock<Option<reqwest::Client>>,
}

impl DenySqlInjectionRemote {
    pub fn new(url: Url, api_key: Option<String>, mode: InspectionMode) -> Self {
        Self {
            endpoint: Endpoint { url, api_key },
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            mode,
            client: RwLock::new(None),
        }
    }

    /// Build from `{ url, api_key?, mode?, timeout_ms? }` options.
    pub fn from_spec(spec: &ComponentSpec) -> Result<Self, FirewallError> {
        let raw = spec
            .option_str("url")
            .ok_or_else(|| FirewallError::invalid_options(&spec.name, "missing 'url'"))?;
        let url = Url::parse(raw)
            .map_err(|e| FirewallError::invalid_options(&spec.name, format!("bad url: {e}")))?;
        let api_key = spec.option_str("api_key").map(str::to_string);
        let mut manager = Self::new(url, api_key, InspectionMode::from_spec(spec)?);

        if let Some(ms) = spec.options.get("timeout_ms").and_then(|v| v.as_u64()) {
            manager.timeout = Duration::from_millis(ms);
        }
        Ok(manager)
    }

    fn client(&self) -> Result<reqwest::Client, FirewallError> {
        if let Some(client) = self
            .client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return Ok(client.clone());
        }

        let mut slot = self.client.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let client = reqwest::Client::builder().timeout(self.timeout).build()?;
        tracing::debug!(url = %self.endpoint.url, "Created inspection client");
        *slot = Some(client.clone());
        Ok(client)
    }
}

#[async_trait]
impl FirewallManager for DenySqlInjectionRemote {
    fn name(&self) -> &str {
        "deny_sql_injection_remote"
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

        let client = self.client()?;
        match self
            .endpoint
            .inspect(&client, event.sql(), event.parameter_values())
            .await?
        {
            Some(reason) => {
                tracing::warn!(username = event.username(), reason = %reason, "Remote inspection flagged statement");
                Ok(false)
            }
            None => Ok(true),
        }
    }

    fn deferred_check(&self, event: &SqlEvent, _shape: &StatementShape) -> Option<DeferredCheck> {
        if self.mode != InspectionMode::Async {
            return None;
        }

        let client = self.client();
        let endpoint = self.endpoint.clone();
        let sql = event.sql().to_string();
        let parameters = event.parameter_values().to_vec();
        Some(Box::pin(async move {
            endpoint.inspect(&client?, &sql, &parameters).await
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_spec() {
        let mut spec = ComponentSpec::named("deny_sql_injection_remote");
        assert!(DenySqlInjectionRemote::from_spec(&spec).is_err());

        spec.options = serde_json::json!({
            "url": "http://127.0.0.1:8099/inspect",
            "mode": "async",
            "timeout_ms": 250,
        });
        let manager = DenySqlInjectionRemote::from_spec(&spec).unwrap();
        assert_eq!(manager.mode, InspectionMode::Async);
        assert_eq!(manager.timeout, Duration::from_millis(250));
        assert_eq!(manager.endpoint.url.path(), "/inspect");
    }

    #[test]
    fn test_client_is_cached() {
        let manager = DenySqlInjectionRemote::new(
            Url::parse("http://127.0.0.1:8099/").unwrap(),
            None,
            InspectionMode::Sync,
        );
        manager.client().unwrap();
        assert!(manager.client.read().unwrap().is_some());
    }
}
