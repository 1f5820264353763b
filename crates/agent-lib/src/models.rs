//! Core data models for the cost anomaly response agent

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Metric names understood by the anomaly detector
pub mod metric_names {
    pub const TOTAL_COST: &str = "TotalCost";
    pub const PROJECTED_MONTHLY_COST: &str = "ProjectedMonthlyCost";
    pub const COST_GROWTH_RATE: &str = "CostGrowthRate";
}

/// How far ahead of wall-clock time a sample timestamp may be
pub const MAX_CLOCK_SKEW_SECS: i64 = 300;

/// A single cost or usage observation from the metric feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub resource_id: String,
    pub metric_name: String,
    pub value: f64,
    pub unit: String,
    /// Unix timestamp in seconds
    pub timestamp: i64,
}

impl MetricSample {
    pub fn new(
        resource_id: impl Into<String>,
        metric_name: impl Into<String>,
        value: f64,
        unit: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            metric_name: metric_name.into(),
            value,
            unit: unit.into(),
            timestamp,
        }
    }

    /// Check that every field is present and usable
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.validate_at(chrono::Utc::now().timestamp())
    }

    /// Validate against an explicit current time (Unix seconds)
    pub fn validate_at(&self, now: i64) -> Result<(), ValidationError> {
        if self.resource_id.trim().is_empty() {
            return Err(ValidationError::MissingField("resource_id"));
        }
        if self.metric_name.trim().is_empty() {
            return Err(ValidationError::MissingField("metric_name"));
        }
        if self.unit.trim().is_empty() {
            return Err(ValidationError::MissingField("unit"));
        }
        if !self.value.is_finite() {
            return Err(ValidationError::NonFiniteValue {
                metric: self.metric_name.clone(),
            });
        }
        if self.timestamp <= 0 || self.is_ahead_of(now) {
            return Err(ValidationError::InvalidTimestamp(self.timestamp));
        }
        let is_cost = matches!(
            self.metric_name.as_str(),
            metric_names::TOTAL_COST | metric_names::PROJECTED_MONTHLY_COST
        );
        if is_cost && self.value < 0.0 {
            return Err(ValidationError::NegativeCost {
                metric: self.metric_name.clone(),
                value: self.value,
            });
        }
        Ok(())
    }

    /// Timestamp lies beyond the tolerated clock skew
    pub fn is_ahead_of(&self, now: i64) -> bool {
        self.timestamp > now.saturating_add(MAX_CLOCK_SKEW_SECS)
    }
}

/// Severity of an anomaly signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Which detection rule raised a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnomalyKind {
    DailyCostBreach,
    ProjectedBudgetBreach,
    GrowthRateSpike,
}

impl AnomalyKind {
    /// Metric the rule evaluates
    pub fn metric_name(&self) -> &'static str {
        match self {
            AnomalyKind::DailyCostBreach => metric_names::TOTAL_COST,
            AnomalyKind::ProjectedBudgetBreach => metric_names::PROJECTED_MONTHLY_COST,
            AnomalyKind::GrowthRateSpike => metric_names::COST_GROWTH_RATE,
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnomalyKind::DailyCostBreach => write!(f, "DailyCostBreach"),
            AnomalyKind::ProjectedBudgetBreach => write!(f, "ProjectedBudgetBreach"),
            AnomalyKind::GrowthRateSpike => write!(f, "GrowthRateSpike"),
        }
    }
}

/// A threshold breach raised by the anomaly detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalySignal {
    pub id: Uuid,
    /// Resource (or account scope) the breaching metric belongs to
    pub resource_id: String,
    pub kind: AnomalyKind,
    /// Timestamp of the last sample in the breaching window
    pub triggered_at: i64,
    pub observed_value: f64,
    pub threshold: f64,
    pub severity: Severity,
}

impl AnomalySignal {
    /// How far past the threshold the observation is
    pub fn ratio(&self) -> f64 {
        if self.threshold.abs() < f64::EPSILON {
            return f64::INFINITY;
        }
        self.observed_value / self.threshold
    }
}

/// Operational risk of applying a remediation action
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

/// Catalog of remediation actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    ReduceMemory,
    EnableConcurrencyLimit,
    SwitchBillingMode,
    AccelerateStorageLifecycle,
    DisableNonEssentialFeature,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::ReduceMemory => "reduce-memory",
            ActionKind::EnableConcurrencyLimit => "enable-concurrency-limit",
            ActionKind::SwitchBillingMode => "switch-billing-mode",
            ActionKind::AccelerateStorageLifecycle => "accelerate-storage-lifecycle",
            ActionKind::DisableNonEssentialFeature => "disable-non-essential-feature",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reduce-memory" => Ok(ActionKind::ReduceMemory),
            "enable-concurrency-limit" => Ok(ActionKind::EnableConcurrencyLimit),
            "switch-billing-mode" => Ok(ActionKind::SwitchBillingMode),
            "accelerate-storage-lifecycle" => Ok(ActionKind::AccelerateStorageLifecycle),
            "disable-non-essential-feature" => Ok(ActionKind::DisableNonEssentialFeature),
            other => Err(ValidationError::UnknownAction(other.to_string())),
        }
    }
}

/// Candidate remediation proposed by the rule engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationAction {
    pub action: ActionKind,
    pub target: String,
    /// Kind of the target, used to route the command to an executor
    pub target_kind: ResourceKind,
    /// Desired end state, so re-applying the action is idempotent
    pub parameters: BTreeMap<String, serde_json::Value>,
    /// Estimated monthly savings in account currency
    pub estimated_savings: f64,
    pub risk: RiskLevel,
    pub reversible: bool,
}

impl RemediationAction {
    /// Command object handed to an external executor
    pub fn to_command(&self) -> ActionCommand {
        ActionCommand {
            action: self.action,
            target: self.target.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

/// Wire form of an action sent to an executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCommand {
    pub action: ActionKind,
    pub target: String,
    pub parameters: BTreeMap<String, serde_json::Value>,
}

/// Result reported back by an executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Type of a monitored resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Function,
    Bucket,
    Table,
    Distribution,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Function => write!(f, "function"),
            ResourceKind::Bucket => write!(f, "bucket"),
            ResourceKind::Table => write!(f, "table"),
            ResourceKind::Distribution => write!(f, "distribution"),
        }
    }
}

impl FromStr for ResourceKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "function" => Ok(ResourceKind::Function),
            "bucket" => Ok(ResourceKind::Bucket),
            "table" => Ok(ResourceKind::Table),
            "distribution" => Ok(ResourceKind::Distribution),
            other => Err(ValidationError::UnknownResourceKind(other.to_string())),
        }
    }
}

/// Table capacity billing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingMode {
    OnDemand,
    Provisioned,
}

/// Current configuration of a monitored resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedResource {
    pub id: String,
    pub kind: ResourceKind,
    /// Current monthly cost attributed to the resource
    pub monthly_cost: f64,
    #[serde(default)]
    pub memory_mb: Option<u32>,
    #[serde(default)]
    pub reserved_concurrency: Option<u32>,
    #[serde(default)]
    pub average_concurrency: Option<f64>,
    #[serde(default)]
    pub billing_mode: Option<BillingMode>,
    #[serde(default)]
    pub lifecycle_transition_days: Option<u32>,
    #[serde(default)]
    pub non_essential_features: Vec<String>,
}

impl ManagedResource {
    pub fn new(id: impl Into<String>, kind: ResourceKind, monthly_cost: f64) -> Self {
        Self {
            id: id.into(),
            kind,
            monthly_cost,
            memory_mb: None,
            reserved_concurrency: None,
            average_concurrency: None,
            billing_mode: None,
            lifecycle_transition_days: None,
            non_essential_features: Vec::new(),
        }
    }
}

/// Snapshot of the resources the agent may remediate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceInventory {
    pub resources: Vec<ManagedResource>,
}

impl ResourceInventory {
    pub fn new(resources: Vec<ManagedResource>) -> Self {
        Self { resources }
    }

    /// Load an inventory from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read inventory from {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse inventory at {:?}", path))
    }

    pub fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &ManagedResource> {
        self.resources.iter().filter(move |r| r.kind == kind)
    }

    pub fn has_kind(&self, kind: ResourceKind) -> bool {
        self.of_kind(kind).next().is_some()
    }

    pub fn get(&self, id: &str) -> Option<&ManagedResource> {
        self.resources.iter().find(|r| r.id == id)
    }
}

/// Right-sizing advice for a single function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RightSizingRecommendation {
    pub resource_id: String,
    pub current_memory_mb: u32,
    pub recommended_memory_mb: u32,
    #[serde(default)]
    pub current_timeout_secs: Option<u32>,
    #[serde(default)]
    pub recommended_timeout_secs: Option<u32>,
    /// Negative when the recommendation costs more than the current setting
    pub estimated_monthly_savings: f64,
    pub reasoning: Vec<String>,
}

impl RightSizingRecommendation {
    pub fn changes_memory(&self) -> bool {
        self.current_memory_mb != self.recommended_memory_mb
    }
}
