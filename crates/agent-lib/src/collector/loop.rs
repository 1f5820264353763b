//! Periodic detection loop
//!
//! Fetches the current metric feed, runs the detector, drops repeat signals,
//! proposes actions and launches one emergency workflow per new signal.

use crate::anomaly::{AnomalyDetector, SignalDeduplicator, ThresholdConfig};
use crate::health::{components, HealthRegistry};
use crate::models::ResourceInventory;
use crate::observability::{AgentMetrics, StructuredLogger};
use crate::remediation::RuleEngine;
use crate::workflow::{EmergencyWorkflow, WorkflowExecution};

use super::MetricSource;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Configuration for the detection loop
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Evaluation interval (default: 5 minutes)
    pub interval: Duration,
    pub thresholds: ThresholdConfig,
    /// Window in which a repeat of the same breach is ignored
    pub dedup_window: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            thresholds: ThresholdConfig::default(),
            dedup_window: Duration::from_secs(3600),
        }
    }
}

/// Detection loop feeding the emergency workflow
pub struct MonitorLoop {
    source: Arc<dyn MetricSource>,
    inventory: Arc<ResourceInventory>,
    workflow: Arc<EmergencyWorkflow>,
    config: MonitorConfig,
    detector: AnomalyDetector,
    engine: RuleEngine,
    dedup: SignalDeduplicator,
    health: HealthRegistry,
    metrics: AgentMetrics,
    logger: StructuredLogger,
}

impl MonitorLoop {
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Run until shutdown; in-flight executions are cancelled on exit
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Starting anomaly monitor loop"
        );

        let mut ticker = interval(self.config.interval);
        let mut workflows = JoinSet::new();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.evaluate_once(&mut workflows).await {
                        Ok(launched) => {
                            debug!(launched = launched, running = workflows.len(), "Evaluation cycle complete");
                            self.health.set_healthy(components::DETECTOR).await;
                        }
                        Err(e) => {
                            warn!(error = %e, "Evaluation cycle failed");
                            self.health.set_degraded(components::DETECTOR, e.to_string()).await;
                        }
                    }
                }
                Some(joined) = workflows.join_next(), if !workflows.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "Workflow task failed");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down anomaly monitor loop");
                    break;
                }
            }
        }

        let cancelled = self.workflow.history().cancel_all();
        if cancelled > 0 {
            info!(cancelled = cancelled, "Cancelling in-flight workflows");
        }
        while workflows.join_next().await.is_some() {}
    }

    /// One detection pass; returns the number of workflows launched
    pub async fn evaluate_once(&self, workflows: &mut JoinSet<WorkflowExecution>) -> Result<usize> {
        let samples = self
            .source
            .fetch()
            .await
            .context("Failed to fetch metric samples")?;

        let signals = self.detector.detect(&samples, &self.config.thresholds);
        let mut launched = 0;

        for signal in signals {
            let approval_pending = self.workflow.history().has_pending_approval(&signal);
            if !self.dedup.admit(&signal) && !approval_pending {
                debug!(
                    kind = %signal.kind,
                    resource_id = %signal.resource_id,
                    "Suppressing repeat anomaly signal"
                );
                continue;
            }

            if approval_pending {
                info!(
                    kind = %signal.kind,
                    resource_id = %signal.resource_id,
                    "Re-running approved breach"
                );
            }
            self.metrics.inc_anomalies_detected(&signal.kind.to_string());
            self.logger.log_anomaly(&signal);

            let actions = self.engine.propose_actions(&signal, &self.inventory);
            self.logger.log_actions_proposed(&signal, &actions);

            let workflow = self.workflow.clone();
            workflows.spawn(async move { workflow.run(signal, actions).await });
            launched += 1;
        }

        Ok(launched)
    }
}

/// Builder for the detection loop
pub struct MonitorLoopBuilder {
    source: Option<Arc<dyn MetricSource>>,
    workflow: Option<Arc<EmergencyWorkflow>>,
    inventory: Arc<ResourceInventory>,
    config: MonitorConfig,
    health: HealthRegistry,
    logger: StructuredLogger,
}

impl MonitorLoopBuilder {
    pub fn new() -> Self {
        Self {
            source: None,
            workflow: None,
            inventory: Arc::new(ResourceInventory::default()),
            config: MonitorConfig::default(),
            health: HealthRegistry::new(),
            logger: StructuredLogger::new("local"),
        }
    }

    pub fn source(mut self, source: Arc<dyn MetricSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn workflow(mut self, workflow: Arc<EmergencyWorkflow>) -> Self {
        self.workflow = Some(workflow);
        self
    }

    pub fn inventory(mut self, inventory: Arc<ResourceInventory>) -> Self {
        self.inventory = inventory;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn thresholds(mut self, thresholds: ThresholdConfig) -> Self {
        self.config.thresholds = thresholds;
        self
    }

    pub fn dedup_window(mut self, window: Duration) -> Self {
        self.config.dedup_window = window;
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn build(self) -> Result<MonitorLoop> {
        let source = self
            .source
            .ok_or_else(|| anyhow::anyhow!("Metric source is required"))?;
        let workflow = self
            .workflow
            .ok_or_else(|| anyhow::anyhow!("Workflow is required"))?;

        Ok(MonitorLoop {
            source,
            inventory: self.inventory,
            workflow,
            detector: AnomalyDetector::new(),
            engine: RuleEngine::new(),
            dedup: SignalDeduplicator::new().with_window(self.config.dedup_window),
            config: self.config,
            health: self.health,
            metrics: AgentMetrics::new(),
            logger: self.logger,
        })
    }
}

impl Default for MonitorLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
