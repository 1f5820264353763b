//! Reserved-concurrency recommendation

use serde::{Deserialize, Serialize};

/// Concurrency statistics of one function over the observation period
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConcurrencyStats {
    pub peak: f64,
    pub average: f64,
    /// Share of intervals spent bursting, in percent
    pub burst_frequency_pct: f64,
}

/// Reserved-concurrency advice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcurrencyRecommendation {
    /// `None` means no reservation
    pub reserved_concurrency: Option<u32>,
    /// Suggestion only; applying it is not expected to matter much
    pub optional: bool,
    pub reasoning: String,
}

/// Recommend reserved concurrency from burst behaviour
pub fn recommend_concurrency(stats: &ConcurrencyStats) -> ConcurrencyRecommendation {
    let average = stats.average.max(0.0);

    if stats.peak > 3.0 * average && stats.burst_frequency_pct > 10.0 {
        let reserved = (average * 1.5).ceil().max(1.0) as u32;
        return ConcurrencyRecommendation {
            reserved_concurrency: Some(reserved),
            optional: false,
            reasoning: format!(
                "Peak concurrency {:.0} is over 3x the average {:.1} with bursts {:.0}% of the time; \
                 reserving {} to contain bursts",
                stats.peak, average, stats.burst_frequency_pct, reserved
            ),
        };
    }

    if stats.peak < 10.0 && average < 5.0 {
        return ConcurrencyRecommendation {
            reserved_concurrency: None,
            optional: false,
            reasoning: format!(
                "Low traffic (peak {:.0}, average {:.1}); no reservation needed",
                stats.peak, average
            ),
        };
    }

    let reserved = average.ceil().max(1.0) as u32;
    ConcurrencyRecommendation {
        reserved_concurrency: Some(reserved),
        optional: true,
        reasoning: format!(
            "Steady traffic (peak {:.0}, average {:.1}); optionally reserve {}",
            stats.peak, average, reserved
        ),
    }
}
