//! Threshold configuration for the cost anomaly rules

use serde::{Deserialize, Serialize};

use crate::models::{AnomalyKind, Severity};

/// Evaluation period of the daily-cost rule
pub const DAILY_PERIOD_SECS: i64 = 24 * 60 * 60;

/// Evaluation period of the projected-budget and growth-rate rules
pub const HOURLY_PERIOD_SECS: i64 = 60 * 60;

/// Thresholds and debounce counts for anomaly detection
///
/// The daily threshold spreads half the monthly budget over a flat
/// 30-day month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Monthly budget in account currency
    pub budget_threshold: f64,
    /// Fraction of the monthly budget allowed per day
    pub daily_fraction: f64,
    /// Fraction of the monthly budget the projection may reach
    pub projected_fraction: f64,
    /// Growth rate (percent) considered a spike
    pub growth_rate_threshold_pct: f64,
    /// Consecutive hourly periods the projection must breach
    pub projected_periods: usize,
    /// Consecutive hourly periods the growth rate must breach
    pub growth_periods: usize,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            budget_threshold: 1000.0,
            daily_fraction: 0.5 / 30.0,
            projected_fraction: 0.8,
            growth_rate_threshold_pct: 100.0,
            projected_periods: 2,
            growth_periods: 3,
        }
    }
}

impl ThresholdConfig {
    pub fn with_budget(budget_threshold: f64) -> Self {
        Self {
            budget_threshold,
            ..Default::default()
        }
    }

    pub fn daily_threshold(&self) -> f64 {
        self.budget_threshold * self.daily_fraction
    }

    pub fn projected_threshold(&self) -> f64 {
        self.budget_threshold * self.projected_fraction
    }

    /// Grade a breach
    ///
    /// Projected spend is graded against the whole budget; the other rules
    /// are graded by how far the observation overshoots its threshold.
    pub fn severity_for(&self, kind: AnomalyKind, observed: f64, threshold: f64) -> Severity {
        match kind {
            AnomalyKind::ProjectedBudgetBreach => {
                let utilization = if self.budget_threshold > 0.0 {
                    observed / self.budget_threshold
                } else {
                    f64::INFINITY
                };
                if utilization < 0.9 {
                    Severity::Medium
                } else if utilization < 1.0 {
                    Severity::High
                } else {
                    Severity::Critical
                }
            }
            AnomalyKind::DailyCostBreach | AnomalyKind::GrowthRateSpike => {
                let ratio = if threshold > 0.0 {
                    observed / threshold
                } else {
                    f64::INFINITY
                };
                if ratio < 1.5 {
                    Severity::Low
                } else if ratio < 2.0 {
                    Severity::Medium
                } else if ratio < 3.0 {
                    Severity::High
                } else {
                    Severity::Critical
                }
            }
        }
    }
}
