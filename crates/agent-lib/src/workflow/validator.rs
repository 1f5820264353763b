//! Emergency re-validation against fresh metrics

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::anomaly::{AnomalyDetector, ThresholdConfig};
use crate::collector::MetricSource;
use crate::models::AnomalySignal;

/// Decides whether a signal still describes a live emergency
#[async_trait]
pub trait EmergencyValidator: Send + Sync {
    async fn confirm(&self, signal: &AnomalySignal) -> Result<bool>;
}

/// Re-runs detection on the freshest samples
///
/// The emergency is confirmed when the same rule still fires for the same
/// resource. A resolved breach, or one that no longer has data behind it,
/// is stale.
pub struct MetricRevalidator {
    source: Arc<dyn MetricSource>,
    thresholds: ThresholdConfig,
    detector: AnomalyDetector,
}

impl MetricRevalidator {
    pub fn new(source: Arc<dyn MetricSource>, thresholds: ThresholdConfig) -> Self {
        Self {
            source,
            thresholds,
            detector: AnomalyDetector::new(),
        }
    }
}

#[async_trait]
impl EmergencyValidator for MetricRevalidator {
    async fn confirm(&self, signal: &AnomalySignal) -> Result<bool> {
        let samples = self
            .source
            .fetch()
            .await
            .context("Failed to fetch metrics for re-validation")?;

        let still_breaching = self
            .detector
            .detect(&samples, &self.thresholds)
            .iter()
            .any(|s| s.kind == signal.kind && s.resource_id == signal.resource_id);

        debug!(
            signal_id = %signal.id,
            samples = samples.len(),
            still_breaching = still_breaching,
            "Re-validated anomaly"
        );
        Ok(still_breaching)
    }
}
