//! Periodic right-sizing loop
//!
//! Keeps the latest utilization statistics per function and recomputes
//! recommendations on a fixed interval. Recommendations are never cached
//! across usage updates; each run starts from the current statistics.

use super::{FunctionUsage, RightSizingAdvisor};
use crate::health::{components, HealthRegistry};
use crate::models::RightSizingRecommendation;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Default right-sizing interval (daily)
pub const DEFAULT_ADVISOR_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Default)]
struct FunctionState {
    usage: Option<FunctionUsage>,
    latest: Option<RightSizingRecommendation>,
}

/// Periodic task producing right-sizing recommendations
pub struct AdvisorScheduler {
    advisor: RightSizingAdvisor,
    interval: Duration,
    functions: RwLock<HashMap<String, FunctionState>>,
    recommendation_tx: mpsc::Sender<RightSizingRecommendation>,
    health: Option<HealthRegistry>,
}

/// Statistics about the advisor scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvisorStats {
    pub tracked_functions: usize,
    pub with_recommendation: usize,
}

impl AdvisorScheduler {
    pub fn new(
        advisor: RightSizingAdvisor,
        interval: Duration,
    ) -> (Self, mpsc::Receiver<RightSizingRecommendation>) {
        let (tx, rx) = mpsc::channel(100);
        let scheduler = Self {
            advisor,
            interval,
            functions: RwLock::new(HashMap::new()),
            recommendation_tx: tx,
            health: None,
        };
        (scheduler, rx)
    }

    /// Report advisor health to a registry after every cycle
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Replace the utilization statistics of a function
    pub async fn record_usage(&self, usage: FunctionUsage) {
        let resource_id = usage.resource_id.clone();
        let mut functions = self.functions.write().await;
        functions.entry(resource_id).or_default().usage = Some(usage);
    }

    /// Run the right-sizing loop until shutdown
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting right-sizing scheduler"
        );

        let mut ticker = interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let produced = self.run_once().await;
                    debug!(recommendations = produced, "Right-sizing cycle complete");
                }
                _ = shutdown.recv() => {
                    info!("Shutting down right-sizing scheduler");
                    break;
                }
            }
        }
    }

    /// Recompute every recommendation from current statistics
    pub async fn run_once(&self) -> usize {
        let recommendations: Vec<RightSizingRecommendation> = {
            let mut functions = self.functions.write().await;
            functions
                .values_mut()
                .filter_map(|state| {
                    let usage = state.usage.as_ref()?;
                    let recommendation = self.advisor.recommend(usage);
                    state.latest = Some(recommendation.clone());
                    Some(recommendation)
                })
                .collect()
        };

        let produced = recommendations.len();
        let mut dropped = 0;
        for recommendation in recommendations {
            match self.recommendation_tx.try_send(recommendation) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => dropped += 1,
                // Receiver is gone during shutdown
                Err(TrySendError::Closed(_)) => {}
            }
        }

        if dropped > 0 {
            warn!(dropped = dropped, "Recommendation consumer is lagging");
        }
        if let Some(health) = &self.health {
            if dropped > 0 {
                health
                    .set_degraded(
                        components::ADVISOR,
                        format!("{} recommendations dropped by a lagging consumer", dropped),
                    )
                    .await;
            } else {
                health.set_healthy(components::ADVISOR).await;
            }
        }
        produced
    }

    pub async fn latest(&self, resource_id: &str) -> Option<RightSizingRecommendation> {
        let functions = self.functions.read().await;
        functions.get(resource_id).and_then(|s| s.latest.clone())
    }

    /// Latest recommendations ordered by savings
    pub async fn all_latest(&self) -> Vec<RightSizingRecommendation> {
        let functions = self.functions.read().await;
        let mut all: Vec<_> = functions.values().filter_map(|s| s.latest.clone()).collect();
        all.sort_by(|a, b| {
            b.estimated_monthly_savings
                .total_cmp(&a.estimated_monthly_savings)
                .then_with(|| a.resource_id.cmp(&b.resource_id))
        });
        all
    }

    pub async fn stats(&self) -> AdvisorStats {
        let functions = self.functions.read().await;
        AdvisorStats {
            tracked_functions: functions.len(),
            with_recommendation: functions.values().filter(|s| s.latest.is_some()).count(),
        }
    }
}
