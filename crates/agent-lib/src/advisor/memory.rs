//! Memory and timeout right-sizing for functions
//!
//! Decision rules are evaluated in order and the first match wins:
//! 1. Long-running and memory-bound: double memory (capped)
//! 2. Short-running and mostly idle: reduce memory by 25%
//! 3. Under half the memory used: reduce by the utilization factor
//! 4. Otherwise no change
//!
//! The short-and-idle rule is checked before the general under-utilization
//! rule because its condition is a narrower case of it.

use serde::{Deserialize, Serialize};

use crate::models::RightSizingRecommendation;

/// Default price per GB-second of compute
pub const DEFAULT_UNIT_PRICE_PER_GB_SECOND: f64 = 0.0000166667;

/// Cost model and memory bounds for the advisor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    pub unit_price_per_gb_second: f64,
    pub min_memory_mb: u32,
    pub max_memory_mb: u32,
    pub memory_step_mb: u32,
    pub min_timeout_secs: u32,
    pub max_timeout_secs: u32,
    /// Timeout as a multiple of the average duration
    pub timeout_headroom: f64,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            unit_price_per_gb_second: DEFAULT_UNIT_PRICE_PER_GB_SECOND,
            min_memory_mb: 128,
            max_memory_mb: 10240,
            memory_step_mb: 64,
            min_timeout_secs: 3,
            max_timeout_secs: 900,
            timeout_headroom: 3.0,
        }
    }
}

/// Observed utilization of one function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionUsage {
    pub resource_id: String,
    pub avg_duration_ms: f64,
    pub memory_utilization_pct: f64,
    pub current_memory_mb: u32,
    pub invocations_per_month: f64,
    #[serde(default)]
    pub current_timeout_secs: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemoryRule {
    UnderProvisioned,
    ShortAndIdle,
    OverProvisioned,
    Unchanged,
}

/// Stateless right-sizing calculator
#[derive(Debug, Clone, Default)]
pub struct RightSizingAdvisor {
    config: AdvisorConfig,
}

impl RightSizingAdvisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: AdvisorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    /// Monthly compute cost at a given memory size
    pub fn monthly_cost(&self, memory_mb: u32, avg_duration_ms: f64, invocations_per_month: f64) -> f64 {
        (memory_mb as f64 / 1024.0)
            * (avg_duration_ms / 1000.0)
            * invocations_per_month
            * self.config.unit_price_per_gb_second
    }

    /// Recommend a memory size from utilization statistics
    ///
    /// A negative `estimated_monthly_savings` means the recommendation
    /// costs more than the current allocation.
    pub fn recommend_memory(
        &self,
        avg_duration_ms: f64,
        memory_utilization_pct: f64,
        current_memory_mb: u32,
        invocations_per_month: f64,
    ) -> RightSizingRecommendation {
        let rule = self.select_rule(avg_duration_ms, memory_utilization_pct, current_memory_mb);
        let recommended = self.apply_rule(rule, memory_utilization_pct, current_memory_mb);

        let mut reasoning = Vec::new();
        match rule {
            MemoryRule::UnderProvisioned => reasoning.push(format!(
                "Average duration {:.0}ms exceeds 5000ms while memory utilization is {:.0}% (above 80%); \
                 increasing memory from {} MB to {} MB",
                avg_duration_ms, memory_utilization_pct, current_memory_mb, recommended
            )),
            MemoryRule::ShortAndIdle => reasoning.push(format!(
                "Average duration {:.0}ms is under 1000ms and memory utilization is {:.0}% (below 30%); \
                 reducing memory by 25% from {} MB to {} MB",
                avg_duration_ms, memory_utilization_pct, current_memory_mb, recommended
            )),
            MemoryRule::OverProvisioned => reasoning.push(format!(
                "Memory utilization {:.0}% is below 50%; reducing memory from {} MB to {} MB",
                memory_utilization_pct, current_memory_mb, recommended
            )),
            MemoryRule::Unchanged => {}
        }

        if recommended == current_memory_mb {
            reasoning.push(format!(
                "Memory allocation of {} MB fits observed utilization ({:.0}%); no change",
                current_memory_mb, memory_utilization_pct
            ));
        }

        let current_cost = self.monthly_cost(current_memory_mb, avg_duration_ms, invocations_per_month);
        let recommended_cost = self.monthly_cost(recommended, avg_duration_ms, invocations_per_month);
        let savings = current_cost - recommended_cost;

        if savings > 0.0 {
            reasoning.push(format!("Estimated monthly savings: ${:.2}", savings));
        } else if savings < 0.0 {
            reasoning.push(format!("Estimated monthly cost increase: ${:.2}", -savings));
        }

        RightSizingRecommendation {
            resource_id: String::new(),
            current_memory_mb,
            recommended_memory_mb: recommended,
            current_timeout_secs: None,
            recommended_timeout_secs: None,
            estimated_monthly_savings: savings,
            reasoning,
        }
    }

    /// Full recommendation including timeout advice
    pub fn recommend(&self, usage: &FunctionUsage) -> RightSizingRecommendation {
        let mut recommendation = self.recommend_memory(
            usage.avg_duration_ms,
            usage.memory_utilization_pct,
            usage.current_memory_mb,
            usage.invocations_per_month,
        );
        recommendation.resource_id = usage.resource_id.clone();

        if let Some(current_timeout) = usage.current_timeout_secs {
            let recommended_timeout = self.recommend_timeout(usage.avg_duration_ms);
            if recommended_timeout != current_timeout {
                recommendation.reasoning.push(format!(
                    "Timeout of {}s is out of line with average duration {:.0}ms; {}s leaves {:.0}x headroom",
                    current_timeout, usage.avg_duration_ms, recommended_timeout, self.config.timeout_headroom
                ));
            }
            recommendation.current_timeout_secs = Some(current_timeout);
            recommendation.recommended_timeout_secs = Some(recommended_timeout);
        }

        recommendation
    }

    /// Timeout with headroom over the average duration, in whole seconds
    pub fn recommend_timeout(&self, avg_duration_ms: f64) -> u32 {
        let secs = (avg_duration_ms.max(0.0) * self.config.timeout_headroom / 1000.0).ceil() as u32;
        secs.clamp(self.config.min_timeout_secs, self.config.max_timeout_secs)
    }

    fn select_rule(&self, avg_duration_ms: f64, utilization: f64, current_memory_mb: u32) -> MemoryRule {
        if avg_duration_ms > 5000.0 && utilization > 80.0 {
            MemoryRule::UnderProvisioned
        } else if avg_duration_ms < 1000.0 && utilization < 30.0 {
            MemoryRule::ShortAndIdle
        } else if utilization < 50.0 && current_memory_mb > self.config.min_memory_mb {
            MemoryRule::OverProvisioned
        } else {
            MemoryRule::Unchanged
        }
    }

    fn apply_rule(&self, rule: MemoryRule, utilization: f64, current_memory_mb: u32) -> u32 {
        match rule {
            MemoryRule::UnderProvisioned => current_memory_mb
                .saturating_mul(2)
                .min(self.config.max_memory_mb)
                .max(current_memory_mb),
            MemoryRule::ShortAndIdle => self.floor_memory(current_memory_mb as f64 * 0.75).min(current_memory_mb),
            MemoryRule::OverProvisioned => {
                let factor = (utilization / 100.0).max(0.5);
                self.floor_memory(current_memory_mb as f64 * factor).min(current_memory_mb)
            }
            MemoryRule::Unchanged => current_memory_mb,
        }
    }

    /// Round down to the memory step, never below the minimum
    fn floor_memory(&self, memory_mb: f64) -> u32 {
        let step = self.config.memory_step_mb.max(1);
        let floored = (memory_mb.max(0.0) as u32 / step) * step;
        floored.max(self.config.min_memory_mb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVOCATIONS: f64 = 1_000_000.0;

    #[test]
    fn test_cost_model() {
        let advisor = RightSizingAdvisor::new();
        // 1 GB for 1 second, one million times
        let cost = advisor.monthly_cost(1024, 1000.0, INVOCATIONS);
        assert!((cost - 16.6667).abs() < 1e-3);
    }

    #[test]
    fn test_long_running_memory_bound_doubles() {
        let advisor = RightSizingAdvisor::new();
        let rec = advisor.recommend_memory(6000.0, 85.0, 512, INVOCATIONS);

        assert_eq!(rec.recommended_memory_mb, 1024);
        assert!(rec.estimated_monthly_savings < 0.0);
        let first = &rec.reasoning[0];
        assert!(first.contains("duration"));
        assert!(first.contains("utilization"));
    }

    #[test]
    fn test_doubling_is_capped() {
        let advisor = RightSizingAdvisor::new();
        let rec = advisor.recommend_memory(6000.0, 95.0, 8192, INVOCATIONS);
        assert_eq!(rec.recommended_memory_mb, 10240);

        let at_cap = advisor.recommend_memory(6000.0, 95.0, 10240, INVOCATIONS);
        assert_eq!(at_cap.recommended_memory_mb, 10240);
        assert_eq!(at_cap.estimated_monthly_savings, 0.0);
    }

    #[test]
    fn test_short_idle_function_reduced_by_quarter() {
        let advisor = RightSizingAdvisor::new();
        let rec = advisor.recommend_memory(500.0, 20.0, 1024, INVOCATIONS);

        assert_eq!(rec.recommended_memory_mb, 768);
        assert!(rec.estimated_monthly_savings > 0.0);
    }

    #[test]
    fn test_under_half_utilized_reduced() {
        let advisor = RightSizingAdvisor::new();
        let rec = advisor.recommend_memory(2000.0, 40.0, 1024, INVOCATIONS);

        // max(0.5, 0.4) = 0.5
        assert_eq!(rec.recommended_memory_mb, 512);
        assert!(rec.reasoning[0].contains("below 50%"));
    }

    #[test]
    fn test_reduction_floors_to_step_and_minimum() {
        let advisor = RightSizingAdvisor::new();

        let rec = advisor.recommend_memory(2000.0, 10.0, 200, INVOCATIONS);
        assert_eq!(rec.recommended_memory_mb, 128);

        let rec = advisor.recommend_memory(500.0, 10.0, 128, INVOCATIONS);
        assert_eq!(rec.recommended_memory_mb, 128);
        assert!(rec.reasoning.iter().any(|r| r.contains("no change")));
    }

    #[test]
    fn test_well_sized_function_unchanged() {
        let advisor = RightSizingAdvisor::new();
        let rec = advisor.recommend_memory(3000.0, 65.0, 1024, INVOCATIONS);

        assert_eq!(rec.recommended_memory_mb, 1024);
        assert_eq!(rec.estimated_monthly_savings, 0.0);
        assert!(!rec.changes_memory());
    }

    #[test]
    fn test_full_recommendation_includes_timeout() {
        let advisor = RightSizingAdvisor::new();
        let usage = FunctionUsage {
            resource_id: "api-handler".to_string(),
            avg_duration_ms: 1200.0,
            memory_utilization_pct: 60.0,
            current_memory_mb: 512,
            invocations_per_month: INVOCATIONS,
            current_timeout_secs: Some(300),
        };

        let rec = advisor.recommend(&usage);

        assert_eq!(rec.resource_id, "api-handler");
        assert_eq!(rec.current_timeout_secs, Some(300));
        assert_eq!(rec.recommended_timeout_secs, Some(4));
        assert!(rec.reasoning.iter().any(|r| r.contains("Timeout")));
    }

    #[test]
    fn test_timeout_bounds() {
        let advisor = RightSizingAdvisor::new();
        assert_eq!(advisor.recommend_timeout(100.0), 3);
        assert_eq!(advisor.recommend_timeout(600_000.0), 900);
    }
}
