//! Threshold and rate-of-change detection over the metric feed
//!
//! Samples are bucketed into aligned evaluation periods. A rule fires only
//! when the most recent `required_periods` buckets all breach; a period with
//! no samples counts as not breaching.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use uuid::Uuid;

use super::thresholds::{ThresholdConfig, DAILY_PERIOD_SECS, HOURLY_PERIOD_SECS};
use crate::models::{AnomalyKind, AnomalySignal, MetricSample};

/// How samples inside one evaluation period are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Aggregation {
    Maximum,
    Average,
}

impl Aggregation {
    fn apply(&self, values: &[f64]) -> f64 {
        match self {
            Aggregation::Maximum => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Aggregation::Average => values.iter().sum::<f64>() / values.len() as f64,
        }
    }
}

/// One detection rule, resolved against a threshold config
#[derive(Debug, Clone)]
struct Rule {
    kind: AnomalyKind,
    period_secs: i64,
    aggregation: Aggregation,
    required_periods: usize,
    threshold: f64,
}

impl Rule {
    fn all(config: &ThresholdConfig) -> [Rule; 3] {
        [
            Rule {
                kind: AnomalyKind::DailyCostBreach,
                period_secs: DAILY_PERIOD_SECS,
                aggregation: Aggregation::Maximum,
                required_periods: 1,
                threshold: config.daily_threshold(),
            },
            Rule {
                kind: AnomalyKind::ProjectedBudgetBreach,
                period_secs: HOURLY_PERIOD_SECS,
                aggregation: Aggregation::Maximum,
                required_periods: config.projected_periods.max(1),
                threshold: config.projected_threshold(),
            },
            Rule {
                kind: AnomalyKind::GrowthRateSpike,
                period_secs: HOURLY_PERIOD_SECS,
                aggregation: Aggregation::Average,
                required_periods: config.growth_periods.max(1),
                threshold: config.growth_rate_threshold_pct,
            },
        ]
    }
}

/// Aggregated value of one evaluation period
struct Period {
    value: f64,
    last_timestamp: i64,
}

/// Stateless anomaly detector
#[derive(Debug, Clone, Copy, Default)]
pub struct AnomalyDetector;

impl AnomalyDetector {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate the feed against every rule
    ///
    /// Signals come back ordered by severity, then by how far the
    /// observation overshoots its threshold.
    pub fn detect(&self, samples: &[MetricSample], thresholds: &ThresholdConfig) -> Vec<AnomalySignal> {
        let mut signals = Vec::new();

        for rule in Rule::all(thresholds) {
            for (resource_id, periods) in bucket(samples, &rule) {
                if let Some(signal) = evaluate(&rule, &resource_id, &periods, thresholds) {
                    signals.push(signal);
                }
            }
        }

        sort_signals(&mut signals);
        signals
    }
}

/// Convenience wrapper around [`AnomalyDetector::detect`]
pub fn detect(samples: &[MetricSample], thresholds: &ThresholdConfig) -> Vec<AnomalySignal> {
    AnomalyDetector::new().detect(samples, thresholds)
}

/// Group a rule's samples by resource, then by aligned period
fn bucket(samples: &[MetricSample], rule: &Rule) -> BTreeMap<String, BTreeMap<i64, Period>> {
    let mut raw: BTreeMap<String, BTreeMap<i64, (Vec<f64>, i64)>> = BTreeMap::new();

    for sample in samples
        .iter()
        .filter(|s| s.metric_name == rule.kind.metric_name() && s.value.is_finite())
    {
        let index = sample.timestamp.div_euclid(rule.period_secs);
        let entry = raw
            .entry(sample.resource_id.clone())
            .or_default()
            .entry(index)
            .or_insert_with(|| (Vec::new(), sample.timestamp));
        entry.0.push(sample.value);
        entry.1 = entry.1.max(sample.timestamp);
    }

    raw.into_iter()
        .map(|(resource, periods)| {
            let periods = periods
                .into_iter()
                .map(|(index, (values, last_timestamp))| {
                    (
                        index,
                        Period {
                            value: rule.aggregation.apply(&values),
                            last_timestamp,
                        },
                    )
                })
                .collect();
            (resource, periods)
        })
        .collect()
}

fn evaluate(
    rule: &Rule,
    resource_id: &str,
    periods: &BTreeMap<i64, Period>,
    thresholds: &ThresholdConfig,
) -> Option<AnomalySignal> {
    let (&latest_index, latest) = periods.iter().next_back()?;

    let window_start = latest_index - (rule.required_periods as i64 - 1);
    let all_breaching = (window_start..=latest_index).all(|index| {
        periods
            .get(&index)
            .map(|p| p.value > rule.threshold)
            .unwrap_or(false)
    });

    if !all_breaching {
        return None;
    }

    Some(AnomalySignal {
        id: Uuid::new_v4(),
        resource_id: resource_id.to_string(),
        kind: rule.kind,
        triggered_at: latest.last_timestamp,
        observed_value: latest.value,
        threshold: rule.threshold,
        severity: thresholds.severity_for(rule.kind, latest.value, rule.threshold),
    })
}

fn sort_signals(signals: &mut [AnomalySignal]) {
    signals.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| b.ratio().partial_cmp(&a.ratio()).unwrap_or(Ordering::Equal))
            .then_with(|| a.resource_id.cmp(&b.resource_id))
    });
}
