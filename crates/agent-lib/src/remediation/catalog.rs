//! Static catalog of remediation action templates

use std::collections::BTreeMap;

use serde_json::json;

use crate::models::{ActionKind, BillingMode, ManagedResource, RemediationAction, ResourceKind, RiskLevel};

/// Smallest memory setting a reduction may produce
const MIN_MEMORY_MB: u32 = 128;

/// Memory settings are rounded down to this step
const MEMORY_STEP_MB: u32 = 64;

/// Share of memory kept by the emergency reduction
const EMERGENCY_MEMORY_FACTOR: f64 = 0.75;

/// Reserved concurrency used when no average is known
const DEFAULT_CONCURRENCY_LIMIT: u32 = 10;

/// Lifecycle transition age used when the bucket has no rule yet
const DEFAULT_ACCELERATED_TRANSITION_DAYS: u32 = 7;

/// Template for one kind of remediation
#[derive(Debug, Clone, Copy)]
pub struct ActionTemplate {
    pub action: ActionKind,
    /// Resource kinds the template applies to; empty means any kind
    pub applies_to: &'static [ResourceKind],
    /// Fraction of the resource's monthly cost the action is expected to save
    pub savings_fraction: f64,
    pub risk: RiskLevel,
    pub reversible: bool,
}

pub const CATALOG: [ActionTemplate; 5] = [
    ActionTemplate {
        action: ActionKind::ReduceMemory,
        applies_to: &[ResourceKind::Function],
        savings_fraction: 1.0 - EMERGENCY_MEMORY_FACTOR,
        risk: RiskLevel::Low,
        reversible: true,
    },
    ActionTemplate {
        action: ActionKind::EnableConcurrencyLimit,
        applies_to: &[ResourceKind::Function],
        savings_fraction: 0.30,
        risk: RiskLevel::Medium,
        reversible: true,
    },
    ActionTemplate {
        action: ActionKind::SwitchBillingMode,
        applies_to: &[ResourceKind::Table],
        savings_fraction: 0.20,
        risk: RiskLevel::Medium,
        reversible: true,
    },
    ActionTemplate {
        action: ActionKind::AccelerateStorageLifecycle,
        applies_to: &[ResourceKind::Bucket],
        savings_fraction: 0.40,
        risk: RiskLevel::High,
        reversible: false,
    },
    ActionTemplate {
        action: ActionKind::DisableNonEssentialFeature,
        applies_to: &[],
        savings_fraction: 0.10,
        risk: RiskLevel::Low,
        reversible: true,
    },
];

impl ActionTemplate {
    pub fn applies_to_kind(&self, kind: ResourceKind) -> bool {
        self.applies_to.is_empty() || self.applies_to.contains(&kind)
    }

    /// Instantiate the template for a resource, if it has anything to change
    pub fn instantiate(&self, resource: &ManagedResource) -> Option<RemediationAction> {
        if !self.applies_to_kind(resource.kind) {
            return None;
        }

        let mut parameters = BTreeMap::new();
        let mut savings = resource.monthly_cost * self.savings_fraction;

        match self.action {
            ActionKind::ReduceMemory => {
                let current = resource.memory_mb?;
                let target = floor_memory((current as f64 * EMERGENCY_MEMORY_FACTOR) as u32);
                if target >= current {
                    return None;
                }
                // Cost scales with memory at a fixed duration
                savings = resource.monthly_cost * (1.0 - target as f64 / current as f64);
                parameters.insert("memory_mb".to_string(), json!(target));
            }
            ActionKind::EnableConcurrencyLimit => {
                if resource.reserved_concurrency.is_some() {
                    return None;
                }
                let limit = resource
                    .average_concurrency
                    .map(|avg| (avg * 1.5).ceil().max(1.0) as u32)
                    .unwrap_or(DEFAULT_CONCURRENCY_LIMIT);
                parameters.insert("reserved_concurrency".to_string(), json!(limit));
            }
            ActionKind::SwitchBillingMode => {
                if resource.billing_mode != Some(BillingMode::OnDemand) {
                    return None;
                }
                parameters.insert("billing_mode".to_string(), json!(BillingMode::Provisioned));
            }
            ActionKind::AccelerateStorageLifecycle => {
                let target = match resource.lifecycle_transition_days {
                    Some(days) if days <= 1 => return None,
                    Some(days) => (days / 2).max(1),
                    None => DEFAULT_ACCELERATED_TRANSITION_DAYS,
                };
                parameters.insert("transition_days".to_string(), json!(target));
            }
            ActionKind::DisableNonEssentialFeature => {
                if resource.non_essential_features.is_empty() {
                    return None;
                }
                let mut features = resource.non_essential_features.clone();
                features.sort();
                features.dedup();
                parameters.insert("disabled_features".to_string(), json!(features));
            }
        }

        Some(RemediationAction {
            action: self.action,
            target: resource.id.clone(),
            target_kind: resource.kind,
            parameters,
            estimated_savings: savings,
            risk: self.risk,
            reversible: self.reversible,
        })
    }
}

/// Round down to the memory step, never below the floor
fn floor_memory(memory_mb: u32) -> u32 {
    ((memory_mb / MEMORY_STEP_MB) * MEMORY_STEP_MB).max(MIN_MEMORY_MB)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(action: ActionKind) -> ActionTemplate {
        CATALOG.iter().copied().find(|t| t.action == action).unwrap()
    }

    #[test]
    fn test_catalog_has_one_irreversible_template() {
        let irreversible: Vec<_> = CATALOG.iter().filter(|t| !t.reversible).collect();
        assert_eq!(irreversible.len(), 1);
        assert_eq!(irreversible[0].action, ActionKind::AccelerateStorageLifecycle);
    }

    #[test]
    fn test_reduce_memory_requires_memory_setting() {
        let mut function = ManagedResource::new("fn-a", ResourceKind::Function, 100.0);
        assert!(template(ActionKind::ReduceMemory).instantiate(&function).is_none());

        function.memory_mb = Some(1024);
        let action = template(ActionKind::ReduceMemory).instantiate(&function).unwrap();
        assert_eq!(action.parameters["memory_mb"], json!(768));
        assert!((action.estimated_savings - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_reduce_memory_skips_minimum_size() {
        let mut function = ManagedResource::new("fn-a", ResourceKind::Function, 100.0);
        function.memory_mb = Some(128);
        assert!(template(ActionKind::ReduceMemory).instantiate(&function).is_none());
    }

    #[test]
    fn test_billing_switch_only_for_on_demand_tables() {
        let mut table = ManagedResource::new("orders", ResourceKind::Table, 50.0);
        table.billing_mode = Some(BillingMode::Provisioned);
        assert!(template(ActionKind::SwitchBillingMode).instantiate(&table).is_none());

        table.billing_mode = Some(BillingMode::OnDemand);
        let action = template(ActionKind::SwitchBillingMode).instantiate(&table).unwrap();
        assert_eq!(action.parameters["billing_mode"], json!("provisioned"));
    }

    #[test]
    fn test_template_kind_filter() {
        let bucket = ManagedResource::new("assets", ResourceKind::Bucket, 50.0);
        assert!(template(ActionKind::EnableConcurrencyLimit).instantiate(&bucket).is_none());
        assert!(template(ActionKind::AccelerateStorageLifecycle).instantiate(&bucket).is_some());
    }

    #[test]
    fn test_floor_memory() {
        assert_eq!(floor_memory(768), 768);
        assert_eq!(floor_memory(700), 640);
        assert_eq!(floor_memory(96), 128);
    }
}
