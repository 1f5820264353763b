//! Remediation rule engine
//!
//! Maps an anomaly signal and the current inventory to a ranked list of
//! candidate actions. Proposal is pure: the engine never executes anything.

use std::cmp::Ordering;

use super::catalog::{ActionTemplate, CATALOG};
use crate::error::PolicyViolation;
use crate::models::{AnomalySignal, RemediationAction, ResourceInventory, Severity};

/// Rule engine over a static template catalog
#[derive(Debug, Clone, Copy)]
pub struct RuleEngine {
    catalog: &'static [ActionTemplate],
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleEngine {
    pub fn new() -> Self {
        Self { catalog: &CATALOG }
    }

    /// Propose ranked candidate actions for a signal
    ///
    /// A signal raised on a resource present in the inventory scopes the
    /// candidates to that resource; account-level signals consider every
    /// resource. Below critical severity only reversible actions are kept.
    pub fn propose_actions(
        &self,
        signal: &AnomalySignal,
        inventory: &ResourceInventory,
    ) -> Vec<RemediationAction> {
        let scoped = inventory.get(&signal.resource_id).is_some();

        let mut actions: Vec<RemediationAction> = inventory
            .resources
            .iter()
            .filter(|r| !scoped || r.id == signal.resource_id)
            .flat_map(|resource| self.catalog.iter().filter_map(move |t| t.instantiate(resource)))
            .filter(|action| is_permitted(action, signal.severity))
            .collect();

        rank(&mut actions);
        actions
    }
}

/// Convenience wrapper using the default catalog
pub fn propose_actions(signal: &AnomalySignal, inventory: &ResourceInventory) -> Vec<RemediationAction> {
    RuleEngine::new().propose_actions(signal, inventory)
}

/// Irreversible actions are only allowed for critical signals
pub fn is_permitted(action: &RemediationAction, severity: Severity) -> bool {
    action.reversible || severity == Severity::Critical
}

/// Gate an action immediately before execution
///
/// Irreversible actions need both a critical signal and an explicit
/// operator confirmation.
pub fn check_policy(
    action: &RemediationAction,
    severity: Severity,
    confirmed: bool,
) -> Result<(), PolicyViolation> {
    if action.reversible {
        return Ok(());
    }
    if severity != Severity::Critical {
        return Err(PolicyViolation::IrreversibleBelowCritical {
            action: action.action,
            target: action.target.clone(),
            severity,
        });
    }
    if !confirmed {
        return Err(PolicyViolation::AwaitingConfirmation {
            action: action.action,
            target: action.target.clone(),
        });
    }
    Ok(())
}

/// Sort by savings descending, then lower risk, then reversible first
pub fn rank(actions: &mut [RemediationAction]) {
    actions.sort_by(compare);
}

fn compare(a: &RemediationAction, b: &RemediationAction) -> Ordering {
    b.estimated_savings
        .total_cmp(&a.estimated_savings)
        .then_with(|| a.risk.cmp(&b.risk))
        .then_with(|| b.reversible.cmp(&a.reversible))
        .then_with(|| a.action.cmp(&b.action))
        .then_with(|| a.target.cmp(&b.target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ActionKind, AnomalyKind, BillingMode, ManagedResource, ResourceKind, RiskLevel,
    };
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn signal(severity: Severity) -> AnomalySignal {
        AnomalySignal {
            id: Uuid::nil(),
            resource_id: "account".to_string(),
            kind: AnomalyKind::ProjectedBudgetBreach,
            triggered_at: 1_700_000_000,
            observed_value: 850.0,
            threshold: 800.0,
            severity,
        }
    }

    fn inventory() -> ResourceInventory {
        let mut api = ManagedResource::new("api-handler", ResourceKind::Function, 200.0);
        api.memory_mb = Some(1024);
        api.average_concurrency = Some(4.0);
        api.non_essential_features = vec!["xray-tracing".to_string()];

        let mut worker = ManagedResource::new("worker", ResourceKind::Function, 120.0);
        worker.memory_mb = Some(512);

        let mut table = ManagedResource::new("orders", ResourceKind::Table, 150.0);
        table.billing_mode = Some(BillingMode::OnDemand);

        let bucket = ManagedResource::new("media", ResourceKind::Bucket, 300.0);

        ResourceInventory::new(vec![api, worker, table, bucket])
    }

    fn action(savings: f64, risk: RiskLevel, reversible: bool, target: &str) -> RemediationAction {
        RemediationAction {
            action: ActionKind::DisableNonEssentialFeature,
            target: target.to_string(),
            target_kind: ResourceKind::Function,
            parameters: BTreeMap::new(),
            estimated_savings: savings,
            risk,
            reversible,
        }
    }

    #[test]
    fn test_proposals_sorted_by_savings() {
        let actions = propose_actions(&signal(Severity::Critical), &inventory());

        assert!(!actions.is_empty());
        for pair in actions.windows(2) {
            assert!(pair[0].estimated_savings >= pair[1].estimated_savings);
        }
        // The bucket lifecycle action saves the most
        assert_eq!(actions[0].action, ActionKind::AccelerateStorageLifecycle);
    }

    #[test]
    fn test_no_irreversible_below_critical() {
        for severity in [Severity::Low, Severity::Medium, Severity::High] {
            let actions = propose_actions(&signal(severity), &inventory());
            assert!(!actions.is_empty());
            assert!(actions.iter().all(|a| a.reversible), "severity {}", severity);
        }

        let critical = propose_actions(&signal(Severity::Critical), &inventory());
        assert!(critical.iter().any(|a| !a.reversible));
    }

    #[test]
    fn test_proposals_are_deterministic() {
        let s = signal(Severity::Critical);
        let inv = inventory();
        let first = propose_actions(&s, &inv);
        for _ in 0..20 {
            assert_eq!(propose_actions(&s, &inv), first);
        }
    }

    #[test]
    fn test_applicability_follows_inventory() {
        let buckets_only = ResourceInventory::new(vec![ManagedResource::new(
            "media",
            ResourceKind::Bucket,
            100.0,
        )]);
        let actions = propose_actions(&signal(Severity::Critical), &buckets_only);
        assert!(actions.iter().all(|a| a.action != ActionKind::ReduceMemory));
        assert!(actions
            .iter()
            .all(|a| a.action != ActionKind::EnableConcurrencyLimit));

        assert!(propose_actions(&signal(Severity::Critical), &ResourceInventory::default()).is_empty());
    }

    #[test]
    fn test_resource_scoped_signal() {
        let mut s = signal(Severity::Critical);
        s.resource_id = "worker".to_string();

        let actions = propose_actions(&s, &inventory());
        assert!(!actions.is_empty());
        assert!(actions.iter().all(|a| a.target == "worker"));
    }

    #[test]
    fn test_tie_breaks_prefer_low_risk_then_reversible() {
        let mut actions = vec![
            action(10.0, RiskLevel::High, true, "a"),
            action(10.0, RiskLevel::Low, false, "b"),
            action(10.0, RiskLevel::Low, true, "c"),
            action(20.0, RiskLevel::High, true, "d"),
        ];
        rank(&mut actions);

        let order: Vec<_> = actions.iter().map(|a| a.target.as_str()).collect();
        assert_eq!(order, vec!["d", "c", "b", "a"]);
    }

    #[test]
    fn test_policy_gate() {
        let irreversible = action(10.0, RiskLevel::High, false, "media");
        assert!(matches!(
            check_policy(&irreversible, Severity::High, true),
            Err(PolicyViolation::IrreversibleBelowCritical { .. })
        ));
        assert!(matches!(
            check_policy(&irreversible, Severity::Critical, false),
            Err(PolicyViolation::AwaitingConfirmation { .. })
        ));
        assert!(check_policy(&irreversible, Severity::Critical, true).is_ok());

        let reversible = action(10.0, RiskLevel::Low, true, "api");
        assert!(check_policy(&reversible, Severity::Low, false).is_ok());
    }
}
