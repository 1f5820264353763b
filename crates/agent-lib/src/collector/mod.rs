//! Metric ingestion from the external cost feed
//!
//! This module validates incoming samples, keeps a rolling window of
//! recent observations and drives the periodic detection loop.

mod r#loop;
mod window;

pub use r#loop::{MonitorConfig, MonitorLoop, MonitorLoopBuilder};
pub use window::{MetricWindow, WindowConfig};

use crate::error::ValidationError;
use crate::models::MetricSample;
use anyhow::Result;
use tracing::warn;

pub use async_trait::async_trait;

/// Trait for anything that can supply the current metric feed
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Fetch the freshest samples available
    async fn fetch(&self) -> Result<Vec<MetricSample>>;
}

/// Result of validating a batch of samples
#[derive(Debug, Default)]
pub struct IngestOutcome {
    pub accepted: Vec<MetricSample>,
    pub rejected: Vec<(MetricSample, ValidationError)>,
}

/// Validate a batch, dropping malformed samples
///
/// Rejections are logged and returned for accounting; they never fail the batch.
pub fn ingest(samples: Vec<MetricSample>) -> IngestOutcome {
    let mut outcome = IngestOutcome::default();

    for sample in samples {
        match sample.validate() {
            Ok(()) => outcome.accepted.push(sample),
            Err(e) => {
                warn!(
                    event = "sample_rejected",
                    resource_id = %sample.resource_id,
                    metric = %sample.metric_name,
                    error = %e,
                    "Dropping malformed metric sample"
                );
                outcome.rejected.push((sample, e));
            }
        }
    }

    outcome
}
