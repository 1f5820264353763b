//! Anomaly detection for cost and usage signals
//!
//! This module provides detection for:
//! - Daily spend above the per-day share of the budget
//! - Projected monthly spend approaching the budget (debounced)
//! - Sustained cost growth rate spikes (debounced)
//! - De-duplication and alert formatting for stakeholders

mod alerter;
mod detector;
mod thresholds;

pub use alerter::{NotificationMessage, SignalDeduplicator};
pub use detector::{detect, AnomalyDetector};
pub use thresholds::{ThresholdConfig, DAILY_PERIOD_SECS, HOURLY_PERIOD_SECS};
