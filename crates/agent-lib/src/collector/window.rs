//! Rolling window of recent metric samples
//!
//! Retention is measured against sample timestamps rather than wall-clock
//! time, so replayed or delayed feeds expire consistently. Samples stamped
//! beyond the tolerated clock skew never enter the window, so one bad
//! timestamp cannot push the retention cutoff past real data.

use super::{async_trait, MetricSource};
use crate::models::MetricSample;
use anyhow::Result;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::warn;

/// Default retention (2 days covers the daily rule plus one day of history)
const DEFAULT_RETENTION_SECS: u64 = 2 * 24 * 60 * 60;

/// Default maximum number of retained samples
const DEFAULT_MAX_SAMPLES: usize = 100_000;

#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub retention: Duration,
    pub max_samples: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(DEFAULT_RETENTION_SECS),
            max_samples: DEFAULT_MAX_SAMPLES,
        }
    }
}

#[derive(Debug, Default)]
struct WindowState {
    samples: VecDeque<MetricSample>,
    newest_timestamp: i64,
}

/// Shared rolling window; clones share the same samples
#[derive(Debug, Clone)]
pub struct MetricWindow {
    state: Arc<RwLock<WindowState>>,
    config: WindowConfig,
}

impl Default for MetricWindow {
    fn default() -> Self {
        Self::new(WindowConfig::default())
    }
}

impl MetricWindow {
    pub fn new(config: WindowConfig) -> Self {
        Self {
            state: Arc::new(RwLock::new(WindowState::default())),
            config,
        }
    }

    /// Append validated samples, expiring anything outside the window
    pub async fn extend(&self, samples: impl IntoIterator<Item = MetricSample>) {
        let now = chrono::Utc::now().timestamp();
        let mut state = self.state.write().await;

        for sample in samples {
            if sample.is_ahead_of(now) {
                warn!(
                    event = "sample_rejected",
                    resource_id = %sample.resource_id,
                    metric = %sample.metric_name,
                    timestamp = sample.timestamp,
                    "Dropping metric sample stamped in the future"
                );
                continue;
            }
            state.newest_timestamp = state.newest_timestamp.max(sample.timestamp);
            state.samples.push_back(sample);
        }

        let cutoff = state.newest_timestamp - self.config.retention.as_secs() as i64;
        state.samples.retain(|s| s.timestamp >= cutoff);

        // FIFO eviction once over capacity
        while state.samples.len() > self.config.max_samples {
            state.samples.pop_front();
        }
    }

    /// Copy of the current window contents
    pub async fn snapshot(&self) -> Vec<MetricSample> {
        self.state.read().await.samples.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.samples.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl MetricSource for MetricWindow {
    async fn fetch(&self) -> Result<Vec<MetricSample>> {
        Ok(self.snapshot().await)
    }
}
