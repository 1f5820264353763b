//! Detection through remediation over a shared metric window

use super::*;
use crate::anomaly::{detect, NotificationMessage, ThresholdConfig};
use crate::collector::MetricWindow;
use crate::error::NotificationError;
use crate::models::{
    metric_names, ActionKind, AnomalyKind, BillingMode, ManagedResource, MetricSample, ResourceInventory, ResourceKind,
    Severity,
};
use crate::remediation::propose_actions;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

const BASE: i64 = 1_700_006_400;

#[derive(Default)]
struct CapturingNotifier {
    messages: Mutex<Vec<NotificationMessage>>,
}

#[async_trait]
impl NotificationSink for CapturingNotifier {
    async fn send(&self, message: &NotificationMessage) -> Result<(), NotificationError> {
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }
}

fn inventory() -> ResourceInventory {
    let mut api = ManagedResource::new("api-handler", ResourceKind::Function, 320.0);
    api.memory_mb = Some(1024);
    api.average_concurrency = Some(6.0);

    let mut orders = ManagedResource::new("orders", ResourceKind::Table, 180.0);
    orders.billing_mode = Some(BillingMode::OnDemand);

    let media = ManagedResource::new("media", ResourceKind::Bucket, 250.0);

    ResourceInventory::new(vec![api, orders, media])
}

fn dry_run_registry() -> ExecutorRegistry {
    let dry_run: Arc<dyn RemediationExecutor> = Arc::new(DryRunExecutor);
    ExecutorRegistry::new()
        .register(ResourceKind::Function, dry_run.clone())
        .register(ResourceKind::Table, dry_run.clone())
        .register(ResourceKind::Bucket, dry_run)
}

#[tokio::test]
async fn test_projected_breach_end_to_end() {
    let window = MetricWindow::default();
    window
        .extend(vec![
            MetricSample::new("account", metric_names::PROJECTED_MONTHLY_COST, 850.0, "USD", BASE),
            MetricSample::new("account", metric_names::PROJECTED_MONTHLY_COST, 850.0, "USD", BASE + 3600),
        ])
        .await;

    let thresholds = ThresholdConfig::with_budget(1000.0);
    let signals = detect(&window.snapshot().await, &thresholds);

    assert_eq!(signals.len(), 1);
    let signal = signals[0].clone();
    assert_eq!(signal.kind, AnomalyKind::ProjectedBudgetBreach);
    assert_eq!(signal.severity, Severity::Medium);

    let actions = propose_actions(&signal, &inventory());
    assert!(!actions.is_empty());
    assert!(actions.iter().all(|a| a.reversible));

    let notifier = Arc::new(CapturingNotifier::default());
    let workflow = EmergencyWorkflow::new(
        WorkflowConfig::default(),
        Arc::new(MetricRevalidator::new(Arc::new(window), thresholds)),
        notifier.clone(),
        dry_run_registry(),
        Arc::new(ExecutionHistory::new()),
    );

    let execution = workflow.run(signal.clone(), actions).await;

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.anomaly_signal_id, signal.id);
    assert!(!execution.actions_attempted.is_empty());
    assert!(execution.actions_attempted.iter().all(|a| a.reversible));
    assert!(execution.actions_failed.is_empty());

    let messages = notifier.messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].severity, Severity::Medium);
    assert!(messages[0].subject.contains("ProjectedBudgetBreach"));

    let report = execution.report.unwrap();
    assert!(report.realized_savings > 0.0);
    assert_eq!(report.notification_delivered, Some(true));
}

#[tokio::test]
async fn test_breach_resolved_before_validation() {
    let window = MetricWindow::default();
    window
        .extend(vec![
            MetricSample::new("account", metric_names::PROJECTED_MONTHLY_COST, 900.0, "USD", BASE),
            MetricSample::new("account", metric_names::PROJECTED_MONTHLY_COST, 920.0, "USD", BASE + 3600),
        ])
        .await;

    let thresholds = ThresholdConfig::with_budget(1000.0);
    let signal = detect(&window.snapshot().await, &thresholds).remove(0);
    let actions = propose_actions(&signal, &inventory());

    // Fresh data arrives before the workflow re-validates
    window
        .extend(vec![MetricSample::new(
            "account",
            metric_names::PROJECTED_MONTHLY_COST,
            610.0,
            "USD",
            BASE + 7200,
        )])
        .await;

    let notifier = Arc::new(CapturingNotifier::default());
    let workflow = EmergencyWorkflow::new(
        WorkflowConfig::default(),
        Arc::new(MetricRevalidator::new(Arc::new(window), thresholds)),
        notifier.clone(),
        dry_run_registry(),
        Arc::new(ExecutionHistory::new()),
    );

    let execution = workflow.run(signal, actions).await;

    assert_eq!(execution.status, ExecutionStatus::NoActionRequired);
    assert!(execution.actions_attempted.is_empty());
    assert!(notifier.messages.lock().unwrap().is_empty());
    assert!(execution.report.unwrap().render().contains("No remediation actions were attempted."));
}

#[tokio::test]
async fn test_operator_approval_applies_to_redetected_breach() {
    let window = MetricWindow::default();
    window
        .extend(vec![
            MetricSample::new("account", metric_names::TOTAL_COST, 10.0, "USD", BASE),
            MetricSample::new("account", metric_names::TOTAL_COST, 60.0, "USD", BASE + 3600),
        ])
        .await;

    let thresholds = ThresholdConfig::with_budget(1000.0);
    let inventory = ResourceInventory::new(vec![ManagedResource::new("media", ResourceKind::Bucket, 250.0)]);
    let workflow = EmergencyWorkflow::new(
        WorkflowConfig::default(),
        Arc::new(MetricRevalidator::new(Arc::new(window.clone()), thresholds.clone())),
        Arc::new(CapturingNotifier::default()),
        dry_run_registry(),
        Arc::new(ExecutionHistory::new()),
    );

    let first = detect(&window.snapshot().await, &thresholds).remove(0);
    assert_eq!(first.severity, Severity::Critical);
    let execution = workflow.run(first.clone(), propose_actions(&first, &inventory)).await;
    let report = execution.report.unwrap();
    assert_eq!(report.branches.len(), 1);
    assert_eq!(report.branches[0].status, BranchStatus::Skipped);

    // The operator approves the signal they saw in the report
    assert!(workflow.history().approve_signal(execution.anomaly_signal_id).is_some());

    let second = detect(&window.snapshot().await, &thresholds).remove(0);
    assert_ne!(second.id, first.id);
    assert!(workflow.history().has_pending_approval(&second));

    let execution = workflow.run(second.clone(), propose_actions(&second, &inventory)).await;
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.actions_succeeded.len(), 1);
    assert_eq!(execution.actions_succeeded[0].action, ActionKind::AccelerateStorageLifecycle);

    // The breach approval was used up by the second execution
    let third = detect(&window.snapshot().await, &thresholds).remove(0);
    assert!(!workflow.history().has_pending_approval(&third));
    let execution = workflow.run(third.clone(), propose_actions(&third, &inventory)).await;
    assert_eq!(execution.report.unwrap().branches[0].status, BranchStatus::Skipped);
}
