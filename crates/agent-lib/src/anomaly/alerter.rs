//! Signal de-duplication and stakeholder alert formatting
//!
//! Handles:
//! - Suppressing repeat signals for the same breach within a window
//! - Building the structured notification sent before any remediation

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::{AnomalyKind, AnomalySignal, Severity};

/// Default de-duplication window (60 minutes)
const DEFAULT_DEDUP_WINDOW_SECS: u64 = 60 * 60;

/// Structured alert delivered to the notification sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub subject: String,
    pub body: String,
    pub severity: Severity,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl NotificationMessage {
    /// Emergency alert announcing an imminent automated response
    pub fn from_signal(signal: &AnomalySignal, planned_actions: usize) -> Self {
        let subject = format!(
            "[{}] Cost emergency: {} on {}",
            signal.severity.to_string().to_uppercase(),
            signal.kind,
            signal.resource_id
        );

        let body = format!(
            "{} observed {:.2} against threshold {:.2} ({:.0}% of threshold) at timestamp {}. \
             Automated remediation will attempt {} action(s). Signal id: {}.",
            describe(signal.kind),
            signal.observed_value,
            signal.threshold,
            signal.ratio() * 100.0,
            signal.triggered_at,
            planned_actions,
            signal.id
        );

        let mut labels = HashMap::new();
        labels.insert("alertname".to_string(), signal.kind.to_string());
        labels.insert("severity".to_string(), signal.severity.to_string());
        labels.insert("resource".to_string(), signal.resource_id.clone());
        labels.insert("signal_id".to_string(), signal.id.to_string());

        Self {
            subject,
            body,
            severity: signal.severity,
            labels,
        }
    }
}

fn describe(kind: AnomalyKind) -> &'static str {
    match kind {
        AnomalyKind::DailyCostBreach => "Daily spend",
        AnomalyKind::ProjectedBudgetBreach => "Projected monthly spend",
        AnomalyKind::GrowthRateSpike => "Cost growth rate",
    }
}

/// Key for de-duplication
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DedupKey {
    kind: AnomalyKind,
    resource_id: String,
}

impl DedupKey {
    fn of(signal: &AnomalySignal) -> Self {
        Self {
            kind: signal.kind,
            resource_id: signal.resource_id.clone(),
        }
    }
}

/// Suppresses repeat signals so a persistent breach starts one workflow
///
/// The window is measured on signal timestamps.
pub struct SignalDeduplicator {
    window_secs: i64,
    /// Key -> triggered_at of the last admitted signal
    recent: RwLock<HashMap<DedupKey, i64>>,
}

impl Default for SignalDeduplicator {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalDeduplicator {
    pub fn new() -> Self {
        Self {
            window_secs: DEFAULT_DEDUP_WINDOW_SECS as i64,
            recent: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window_secs = window.as_secs() as i64;
        self
    }

    /// Check if a signal repeats one admitted within the window
    pub fn should_suppress(&self, signal: &AnomalySignal) -> bool {
        let recent = self.recent.read().unwrap_or_else(|e| e.into_inner());
        match recent.get(&DedupKey::of(signal)) {
            Some(last) => signal.triggered_at - last < self.window_secs,
            None => false,
        }
    }

    /// Admit a signal unless suppressed, recording it when admitted
    pub fn admit(&self, signal: &AnomalySignal) -> bool {
        if self.should_suppress(signal) {
            return false;
        }

        let mut recent = self.recent.write().unwrap_or_else(|e| e.into_inner());
        recent.insert(DedupKey::of(signal), signal.triggered_at);

        // Clean up old entries
        let horizon = signal.triggered_at - self.window_secs;
        recent.retain(|_, last| *last >= horizon);
        true
    }
}
