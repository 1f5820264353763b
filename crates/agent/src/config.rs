//! Agent configuration

use agent_lib::advisor::AdvisorConfig;
use agent_lib::anomaly::ThresholdConfig;
use agent_lib::workflow::{DryRunExecutor, ExecutorRegistry, HttpExecutor, RemediationExecutor, WorkflowConfig};
use agent_lib::ResourceKind;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Environment variable naming an optional configuration file
pub const CONFIG_FILE_ENV: &str = "COST_AGENT_CONFIG";

/// Timeout for outbound executor and webhook calls
const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(30);

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Name reported in structured logs
    pub node_name: String,

    /// Operator API port
    pub api_port: u16,

    /// Detection interval in seconds
    pub evaluation_interval_secs: u64,

    /// Right-sizing interval in seconds
    pub advisor_interval_secs: u64,

    /// JSON inventory of remediable resources
    pub inventory_path: Option<PathBuf>,

    /// JSON-lines archive of finished executions
    pub history_path: Option<PathBuf>,

    pub thresholds: ThresholdConfig,
    pub workflow: WorkflowConfig,
    pub advisor: AdvisorConfig,

    /// Stakeholder webhook; alerts are only logged when unset
    pub notification_webhook: Option<String>,

    /// Executor URL per resource kind; kinds without one run dry
    pub executor_endpoints: HashMap<String, String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            api_port: 8080,
            evaluation_interval_secs: 300,
            advisor_interval_secs: 24 * 60 * 60,
            inventory_path: None,
            history_path: None,
            thresholds: ThresholdConfig::default(),
            workflow: WorkflowConfig::default(),
            advisor: AdvisorConfig::default(),
            notification_webhook: None,
            executor_endpoints: HashMap::new(),
        }
    }
}

fn default_node_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

impl AgentConfig {
    /// Load from `COST_AGENT_*` variables over the optional file in `COST_AGENT_CONFIG`
    pub fn load() -> Result<Self> {
        let file = std::env::var_os(CONFIG_FILE_ENV).map(PathBuf::from);
        Self::from_sources(file.as_deref())
    }

    pub fn from_sources(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("COST_AGENT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Invalid agent configuration")
    }

    pub fn evaluation_interval(&self) -> Duration {
        Duration::from_secs(self.evaluation_interval_secs)
    }

    pub fn advisor_interval(&self) -> Duration {
        Duration::from_secs(self.advisor_interval_secs)
    }

    /// Route every resource kind to its configured executor
    pub fn executor_registry(&self) -> Result<ExecutorRegistry> {
        let mut endpoints = HashMap::new();
        for (kind, url) in &self.executor_endpoints {
            let kind: ResourceKind = kind
                .parse()
                .with_context(|| format!("Invalid executor endpoint key {:?}", kind))?;
            endpoints.insert(kind, url.clone());
        }

        let dry_run: Arc<dyn RemediationExecutor> = Arc::new(DryRunExecutor);
        let mut registry = ExecutorRegistry::new();

        for kind in [
            ResourceKind::Function,
            ResourceKind::Bucket,
            ResourceKind::Table,
            ResourceKind::Distribution,
        ] {
            let executor: Arc<dyn RemediationExecutor> = match endpoints.get(&kind) {
                Some(url) => Arc::new(HttpExecutor::new(
                    format!("{}-executor", kind),
                    url.clone(),
                    OUTBOUND_TIMEOUT,
                )?),
                None => dry_run.clone(),
            };
            registry = registry.register(kind, executor);
        }

        Ok(registry)
    }

    pub fn outbound_timeout(&self) -> Duration {
        OUTBOUND_TIMEOUT
    }
}
