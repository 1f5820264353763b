//! Remediation executors
//!
//! The core never calls cloud APIs itself. It hands an [`ActionCommand`] to an
//! executor registered for the target's resource kind and expects
//! `{succeeded, error?}` back.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::ExecutorError;
use crate::models::{ActionCommand, ActionResult, ResourceKind};

/// Applies one remediation command against real infrastructure
#[async_trait]
pub trait RemediationExecutor: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Apply the command; must be idempotent for the same desired state
    async fn execute(&self, command: &ActionCommand) -> Result<(), ExecutorError>;
}

/// Executors keyed by the resource kind they control
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<ResourceKind, Arc<dyn RemediationExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, kind: ResourceKind, executor: Arc<dyn RemediationExecutor>) -> Self {
        self.executors.insert(kind, executor);
        self
    }

    pub fn get(&self, kind: ResourceKind) -> Option<Arc<dyn RemediationExecutor>> {
        self.executors.get(&kind).cloned()
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

/// Retry schedule for transient executor failures
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based), doubling each time
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        std::cmp::min(self.initial_backoff.saturating_mul(factor), self.max_backoff)
    }
}

/// Run a command, retrying transient failures with exponential backoff
///
/// An executor that still refuses connections once retries run out is
/// reported as [`ExecutorError::Unreachable`]. `attempts` is bumped before every executor call so an interrupted caller
/// can still tell whether anything was sent.
pub async fn execute_with_retry(
    executor: &dyn RemediationExecutor,
    command: &ActionCommand,
    policy: &RetryPolicy,
    attempts: &AtomicU32,
) -> Result<(), ExecutorError> {
    let mut retry = 0;

    loop {
        attempts.fetch_add(1, Ordering::SeqCst);

        match executor.execute(command).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_retryable() && retry < policy.max_retries => {
                retry += 1;
                let delay = policy.backoff(retry);
                warn!(
                    executor = executor.name(),
                    action = %command.action,
                    target = %command.target,
                    retry = retry,
                    backoff_ms = delay.as_millis() as u64,
                    error = %e,
                    "Executor call failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Posts commands as JSON to a remote controller
pub struct HttpExecutor {
    name: String,
    client: Client,
    endpoint: String,
}

impl HttpExecutor {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            name: name.into(),
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl RemediationExecutor for HttpExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, command: &ActionCommand) -> Result<(), ExecutorError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(command)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ExecutorError::Unreachable(format!("{} ({})", self.endpoint, e))
                } else {
                    ExecutorError::Transient(format!("{}: {}", self.endpoint, e))
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(ExecutorError::Transient(format!("{} returned {}", self.endpoint, status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExecutorError::Permanent(format!("{} returned {}: {}", self.endpoint, status, body)));
        }

        let result: ActionResult = response
            .json()
            .await
            .map_err(|e| ExecutorError::Permanent(format!("malformed executor response: {}", e)))?;

        if result.succeeded {
            debug!(executor = %self.name, target = %command.target, "Command applied");
            Ok(())
        } else {
            Err(ExecutorError::Permanent(
                result.error.unwrap_or_else(|| "executor reported failure".to_string()),
            ))
        }
    }
}

/// Logs commands without applying them
#[derive(Debug, Default)]
pub struct DryRunExecutor;

#[async_trait]
impl RemediationExecutor for DryRunExecutor {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn execute(&self, command: &ActionCommand) -> Result<(), ExecutorError> {
        info!(
            action = %command.action,
            target = %command.target,
            parameters = %serde_json::to_string(&command.parameters).unwrap_or_default(),
            "Dry run: command not applied"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActionKind;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Fails with the queued errors, then succeeds
    struct ScriptedExecutor {
        errors: Mutex<Vec<ExecutorError>>,
    }

    impl ScriptedExecutor {
        fn new(mut errors: Vec<ExecutorError>) -> Self {
            errors.reverse();
            Self {
                errors: Mutex::new(errors),
            }
        }
    }

    #[async_trait]
    impl RemediationExecutor for ScriptedExecutor {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn execute(&self, _command: &ActionCommand) -> Result<(), ExecutorError> {
            match self.errors.lock().unwrap().pop() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
    }

    fn command() -> ActionCommand {
        ActionCommand {
            action: ActionKind::ReduceMemory,
            target: "api-handler".to_string(),
            parameters: BTreeMap::from([("memory_mb".to_string(), serde_json::json!(768))]),
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(10), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let executor = ScriptedExecutor::new(vec![
            ExecutorError::Transient("throttled".into()),
            ExecutorError::Transient("throttled".into()),
        ]);
        let attempts = AtomicU32::new(0);

        let result = execute_with_retry(&executor, &command(), &fast_policy(), &attempts).await;

        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let executor = ScriptedExecutor::new(vec![ExecutorError::Transient("throttled".into()); 3]);
        let attempts = AtomicU32::new(0);

        let result = execute_with_retry(&executor, &command(), &fast_policy(), &attempts).await;

        assert!(matches!(result, Err(ExecutorError::Transient(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let executor = ScriptedExecutor::new(vec![ExecutorError::Permanent("denied".into())]);
        let attempts = AtomicU32::new(0);

        let result = execute_with_retry(&executor, &command(), &fast_policy(), &attempts).await;

        assert!(matches!(result, Err(ExecutorError::Permanent(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ExecutorRegistry::new().register(ResourceKind::Function, Arc::new(DryRunExecutor));
        assert!(registry.get(ResourceKind::Function).is_some());
        assert!(registry.get(ResourceKind::Bucket).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_http_executor_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/apply")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "action": "reduce-memory",
                "target": "api-handler"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"succeeded": true}"#)
            .create_async()
            .await;

        let executor = HttpExecutor::new("compute", format!("{}/apply", server.url()), Duration::from_secs(5)).unwrap();
        assert!(executor.execute(&command()).await.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_executor_throttling_is_transient() {
        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/apply").with_status(429).create_async().await;

        let executor = HttpExecutor::new("compute", format!("{}/apply", server.url()), Duration::from_secs(5)).unwrap();
        let err = executor.execute(&command()).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_refused_connections_exhaust_to_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let executor =
            HttpExecutor::new("compute", format!("http://127.0.0.1:{}/apply", port), Duration::from_secs(5)).unwrap();
        let attempts = AtomicU32::new(0);

        let result = execute_with_retry(&executor, &command(), &fast_policy(), &attempts).await;

        assert!(matches!(result, Err(ExecutorError::Unreachable(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unreachable_recovers_on_retry() {
        let executor = ScriptedExecutor::new(vec![ExecutorError::Unreachable("connection refused".into())]);
        let attempts = AtomicU32::new(0);

        let result = execute_with_retry(&executor, &command(), &fast_policy(), &attempts).await;

        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_http_executor_reported_failure_is_permanent() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/apply")
            .with_status(200)
            .with_body(r#"{"succeeded": false, "error": "function is locked"}"#)
            .create_async()
            .await;

        let executor = HttpExecutor::new("compute", format!("{}/apply", server.url()), Duration::from_secs(5)).unwrap();
        let err = executor.execute(&command()).await.unwrap_err();
        assert_eq!(err, ExecutorError::Permanent("function is locked".to_string()));
    }
}
