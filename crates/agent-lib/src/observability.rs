//! Observability infrastructure for the cost agent
//!
//! Provides:
//! - Prometheus metrics (ingestion, anomalies, workflow outcomes, notification alarms)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{AnomalySignal, RemediationAction, Severity};

/// Histogram buckets for workflow durations (in seconds)
const DURATION_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0, 1800.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AgentMetricsInner> = OnceLock::new();

struct AgentMetricsInner {
    samples_ingested: IntCounter,
    samples_rejected: IntCounter,
    anomalies_detected: IntCounterVec,
    workflows: IntCounterVec,
    branch_outcomes: IntCounterVec,
    notification_failures: IntCounter,
    workflow_duration_seconds: Histogram,
    active_workflows: IntGauge,
}

impl AgentMetricsInner {
    fn new() -> Self {
        Self {
            samples_ingested: register_int_counter!(
                "cost_agent_samples_ingested_total",
                "Metric samples accepted from the cost feed"
            )
            .expect("Failed to register samples_ingested"),

            samples_rejected: register_int_counter!(
                "cost_agent_samples_rejected_total",
                "Malformed metric samples dropped at ingestion"
            )
            .expect("Failed to register samples_rejected"),

            anomalies_detected: register_int_counter_vec!(
                "cost_agent_anomalies_detected_total",
                "Anomaly signals raised by the detector",
                &["kind"]
            )
            .expect("Failed to register anomalies_detected"),

            workflows: register_int_counter_vec!(
                "cost_agent_workflows_total",
                "Emergency workflows by terminal status",
                &["status"]
            )
            .expect("Failed to register workflows"),

            branch_outcomes: register_int_counter_vec!(
                "cost_agent_branch_outcomes_total",
                "Remediation branch outcomes",
                &["status"]
            )
            .expect("Failed to register branch_outcomes"),

            notification_failures: register_int_counter!(
                "cost_agent_notification_failures_total",
                "Stakeholder notifications that could not be delivered"
            )
            .expect("Failed to register notification_failures"),

            workflow_duration_seconds: register_histogram!(
                "cost_agent_workflow_duration_seconds",
                "Wall-clock duration of emergency workflows",
                DURATION_BUCKETS.to_vec()
            )
            .expect("Failed to register workflow_duration_seconds"),

            active_workflows: register_int_gauge!(
                "cost_agent_active_workflows",
                "Emergency workflows currently running"
            )
            .expect("Failed to register active_workflows"),
        }
    }
}

/// Agent metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share it.
#[derive(Clone)]
pub struct AgentMetrics {
    _private: (),
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AgentMetricsInner {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new)
    }

    pub fn record_ingest(&self, accepted: usize, rejected: usize) {
        self.inner().samples_ingested.inc_by(accepted as u64);
        self.inner().samples_rejected.inc_by(rejected as u64);
    }

    pub fn inc_anomalies_detected(&self, kind: &str) {
        self.inner().anomalies_detected.with_label_values(&[kind]).inc();
    }

    pub fn inc_workflows(&self, status: &str) {
        self.inner().workflows.with_label_values(&[status]).inc();
    }

    pub fn inc_branch_outcome(&self, status: &str) {
        self.inner().branch_outcomes.with_label_values(&[status]).inc();
    }

    /// Distinct alarm for notification delivery failures
    pub fn inc_notification_failures(&self) {
        self.inner().notification_failures.inc();
    }

    pub fn observe_workflow_duration(&self, duration_secs: f64) {
        self.inner().workflow_duration_seconds.observe(duration_secs);
    }

    pub fn workflow_started(&self) {
        self.inner().active_workflows.inc();
    }

    pub fn workflow_finished(&self) {
        self.inner().active_workflows.dec();
    }
}

/// Structured logger for agent events
///
/// One JSON event per domain occurrence, keyed by the `event` field.
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn log_anomaly(&self, signal: &AnomalySignal) {
        if signal.severity == Severity::Critical {
            warn!(
                event = "anomaly_detected",
                node = %self.node_name,
                signal_id = %signal.id,
                resource_id = %signal.resource_id,
                kind = %signal.kind,
                severity = %signal.severity,
                observed = signal.observed_value,
                threshold = signal.threshold,
                "Critical cost anomaly detected"
            );
        } else {
            info!(
                event = "anomaly_detected",
                node = %self.node_name,
                signal_id = %signal.id,
                resource_id = %signal.resource_id,
                kind = %signal.kind,
                severity = %signal.severity,
                observed = signal.observed_value,
                threshold = signal.threshold,
                "Cost anomaly detected"
            );
        }
    }

    pub fn log_actions_proposed(&self, signal: &AnomalySignal, actions: &[RemediationAction]) {
        let total_savings: f64 = actions.iter().map(|a| a.estimated_savings).sum();
        info!(
            event = "actions_proposed",
            node = %self.node_name,
            signal_id = %signal.id,
            count = actions.len(),
            estimated_savings = total_savings,
            "Remediation actions proposed"
        );
    }

    pub fn log_workflow_started(&self, execution_id: Uuid, signal: &AnomalySignal) {
        info!(
            event = "workflow_started",
            node = %self.node_name,
            execution_id = %execution_id,
            signal_id = %signal.id,
            severity = %signal.severity,
            "Emergency workflow started"
        );
    }

    pub fn log_transition(&self, execution_id: Uuid, from: &str, to: &str) {
        info!(
            event = "workflow_transition",
            node = %self.node_name,
            execution_id = %execution_id,
            from = %from,
            to = %to,
            "Workflow state changed"
        );
    }

    pub fn log_workflow_finished(
        &self,
        execution_id: Uuid,
        status: &str,
        succeeded: usize,
        failed: usize,
        duration_secs: f64,
    ) {
        info!(
            event = "workflow_finished",
            node = %self.node_name,
            execution_id = %execution_id,
            status = %status,
            succeeded = succeeded,
            failed = failed,
            duration_secs = duration_secs,
            "Emergency workflow finished"
        );
    }

    pub fn log_notification_failed(&self, execution_id: Uuid, error: &str) {
        warn!(
            event = "notification_failed",
            node = %self.node_name,
            execution_id = %execution_id,
            error = %error,
            "Stakeholder notification failed, continuing with remediation"
        );
    }

    pub fn log_startup(&self, version: &str) {
        info!(
            event = "agent_started",
            node = %self.node_name,
            agent_version = %version,
            "Cost agent started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Cost agent shutting down"
        );
    }
}
