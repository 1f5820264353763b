//! Workflow execution records and reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Write as _;
use uuid::Uuid;

use super::state::WorkflowState;
use crate::models::{AnomalyKind, AnomalySignal, RemediationAction, Severity};

/// Terminal (or running) status of an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    NoActionRequired,
    TimedOut,
    Cancelled,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::NoActionRequired => "no_action_required",
            ExecutionStatus::TimedOut => "timed_out",
            ExecutionStatus::Cancelled => "cancelled",
            ExecutionStatus::Failed => "failed",
        }
    }

    pub fn is_finished(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Outcome of a single remediation branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchStatus {
    Succeeded,
    Failed,
    /// Never attempted (policy gate, resource claimed by another execution)
    Skipped,
    /// Stopped by timeout or cancellation before finishing
    Interrupted,
}

impl BranchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BranchStatus::Succeeded => "succeeded",
            BranchStatus::Failed => "failed",
            BranchStatus::Skipped => "skipped",
            BranchStatus::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for BranchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchOutcome {
    pub action: RemediationAction,
    pub status: BranchStatus,
    /// Executor calls made, retries included
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl BranchOutcome {
    pub fn new(action: RemediationAction, status: BranchStatus, attempts: u32, detail: Option<String>) -> Self {
        Self {
            action,
            status,
            attempts,
            detail,
        }
    }

    pub fn skipped(action: RemediationAction, reason: impl Into<String>) -> Self {
        Self::new(action, BranchStatus::Skipped, 0, Some(reason.into()))
    }

    pub fn interrupted(action: RemediationAction, reason: impl Into<String>) -> Self {
        Self::new(action, BranchStatus::Interrupted, 0, Some(reason.into()))
    }
}

/// Per-status branch totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchCounts {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub interrupted: usize,
}

impl BranchCounts {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped + self.interrupted
    }
}

/// Human-auditable record of what an execution attempted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub execution_id: Uuid,
    pub signal_id: Uuid,
    pub resource_id: String,
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub status: ExecutionStatus,
    /// `None` when no notification was due
    pub notification_delivered: Option<bool>,
    pub branches: Vec<BranchOutcome>,
    /// Savings of the actions that succeeded
    pub realized_savings: f64,
    /// Savings of every planned action
    pub planned_savings: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl ExecutionReport {
    pub fn counts(&self) -> BranchCounts {
        let mut counts = BranchCounts::default();
        for branch in &self.branches {
            match branch.status {
                BranchStatus::Succeeded => counts.succeeded += 1,
                BranchStatus::Failed => counts.failed += 1,
                BranchStatus::Skipped => counts.skipped += 1,
                BranchStatus::Interrupted => counts.interrupted += 1,
            }
        }
        counts
    }

    /// Plain-text rendering for operators
    pub fn render(&self) -> String {
        let counts = self.counts();
        let mut out = String::new();

        let _ = writeln!(out, "Emergency response report {}", self.execution_id);
        let _ = writeln!(out, "Status:        {}", self.status);
        let _ = writeln!(
            out,
            "Signal:        {} {} on {} ({})",
            self.severity, self.kind, self.resource_id, self.signal_id
        );
        let _ = writeln!(
            out,
            "Window:        {} -> {} ({}s)",
            self.started_at.to_rfc3339(),
            self.completed_at.to_rfc3339(),
            (self.completed_at - self.started_at).num_seconds()
        );
        let notification = match self.notification_delivered {
            Some(true) => "delivered",
            Some(false) => "FAILED",
            None => "not sent",
        };
        let _ = writeln!(out, "Notification:  {}", notification);
        let _ = writeln!(
            out,
            "Branches:      {} succeeded, {} failed, {} skipped, {} interrupted",
            counts.succeeded, counts.failed, counts.skipped, counts.interrupted
        );
        let _ = writeln!(
            out,
            "Savings:       {:.2} realized of {:.2} planned",
            self.realized_savings, self.planned_savings
        );

        if let Some(note) = &self.note {
            let _ = writeln!(out, "Note:          {}", note);
        }

        if self.branches.is_empty() {
            let _ = writeln!(out, "No remediation actions were attempted.");
        } else {
            let _ = writeln!(out);
            for branch in &self.branches {
                let _ = write!(
                    out,
                    "  [{:<11}] {} on {} (est. {:.2}, {} risk, attempts {})",
                    branch.status,
                    branch.action.action,
                    branch.action.target,
                    branch.action.estimated_savings,
                    branch.action.risk,
                    branch.attempts
                );
                if let Some(detail) = &branch.detail {
                    let _ = write!(out, ": {}", detail);
                }
                let _ = writeln!(out);
            }
        }

        out
    }
}

/// One run of the emergency workflow for one anomaly signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub anomaly_signal_id: Uuid,
    pub signal: AnomalySignal,
    pub state: WorkflowState,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Actions handed to an executor at least once
    pub actions_attempted: Vec<RemediationAction>,
    pub actions_succeeded: Vec<RemediationAction>,
    pub actions_failed: Vec<RemediationAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<ExecutionReport>,
}

impl WorkflowExecution {
    pub fn new(signal: AnomalySignal) -> Self {
        Self {
            id: Uuid::new_v4(),
            anomaly_signal_id: signal.id,
            signal,
            state: WorkflowState::ValidateEmergency,
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            actions_attempted: Vec::new(),
            actions_succeeded: Vec::new(),
            actions_failed: Vec::new(),
            report: None,
        }
    }

    /// Fold branch outcomes into the action lists
    pub fn record_branches(&mut self, branches: &[BranchOutcome]) {
        for branch in branches {
            if branch.attempts > 0 {
                self.actions_attempted.push(branch.action.clone());
            }
            match branch.status {
                BranchStatus::Succeeded => self.actions_succeeded.push(branch.action.clone()),
                BranchStatus::Failed => self.actions_failed.push(branch.action.clone()),
                BranchStatus::Skipped | BranchStatus::Interrupted => {}
            }
        }
    }

    /// Compile the report and close the execution
    pub fn finish(
        &mut self,
        status: ExecutionStatus,
        branches: Vec<BranchOutcome>,
        notification_delivered: Option<bool>,
        note: Option<String>,
    ) -> &ExecutionReport {
        let completed_at = Utc::now();
        let realized_savings = branches
            .iter()
            .filter(|b| b.status == BranchStatus::Succeeded)
            .map(|b| b.action.estimated_savings)
            .sum();
        let planned_savings = branches.iter().map(|b| b.action.estimated_savings).sum();

        self.status = status;
        self.completed_at = Some(completed_at);
        self.report.insert(ExecutionReport {
            execution_id: self.id,
            signal_id: self.anomaly_signal_id,
            resource_id: self.signal.resource_id.clone(),
            kind: self.signal.kind,
            severity: self.signal.severity,
            status,
            notification_delivered,
            branches,
            realized_savings,
            planned_savings,
            note,
            started_at: self.started_at,
            completed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActionKind, ResourceKind, RiskLevel};
    use std::collections::BTreeMap;

    fn signal() -> AnomalySignal {
        AnomalySignal {
            id: Uuid::new_v4(),
            resource_id: "account".to_string(),
            kind: AnomalyKind::ProjectedBudgetBreach,
            triggered_at: 1_700_000_000,
            observed_value: 850.0,
            threshold: 800.0,
            severity: Severity::Medium,
        }
    }

    fn action(target: &str, savings: f64) -> RemediationAction {
        RemediationAction {
            action: ActionKind::ReduceMemory,
            target: target.to_string(),
            target_kind: ResourceKind::Function,
            parameters: BTreeMap::new(),
            estimated_savings: savings,
            risk: RiskLevel::Low,
            reversible: true,
        }
    }

    fn branches() -> Vec<BranchOutcome> {
        vec![
            BranchOutcome::new(action("a", 50.0), BranchStatus::Succeeded, 1, None),
            BranchOutcome::new(action("b", 30.0), BranchStatus::Failed, 3, Some("throttled".into())),
            BranchOutcome::skipped(action("c", 20.0), "claimed"),
            BranchOutcome::interrupted(action("d", 10.0), "timeout"),
            BranchOutcome::new(action("e", 5.0), BranchStatus::Succeeded, 2, None),
        ]
    }

    #[test]
    fn test_finish_records_counts_and_savings() {
        let mut execution = WorkflowExecution::new(signal());
        let branches = branches();
        execution.record_branches(&branches);
        let report = execution.finish(ExecutionStatus::Completed, branches, Some(true), None).clone();

        assert_eq!(execution.actions_attempted.len(), 3);
        assert_eq!(execution.actions_succeeded.len(), 2);
        assert_eq!(execution.actions_failed.len(), 1);
        assert!(execution.completed_at.is_some());

        let counts = report.counts();
        assert_eq!(counts.succeeded, 2);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.interrupted, 1);
        assert!((report.realized_savings - 55.0).abs() < 1e-9);
        assert!((report.planned_savings - 115.0).abs() < 1e-9);
    }

    #[test]
    fn test_report_json_preserves_branch_counts() {
        let mut execution = WorkflowExecution::new(signal());
        let report = execution
            .finish(ExecutionStatus::TimedOut, branches(), Some(false), Some("timed out".into()))
            .clone();

        let json = serde_json::to_string(&report).unwrap();
        let restored: ExecutionReport = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.counts(), report.counts());
        assert_eq!(restored.status, ExecutionStatus::TimedOut);
    }

    #[test]
    fn test_render_empty_report() {
        let mut execution = WorkflowExecution::new(signal());
        let text = execution
            .finish(ExecutionStatus::NoActionRequired, Vec::new(), None, Some("resolved".into()))
            .render();

        assert!(text.contains("no_action_required"));
        assert!(text.contains("No remediation actions were attempted."));
        assert!(text.contains("not sent"));
    }

    #[test]
    fn test_render_lists_branches() {
        let mut execution = WorkflowExecution::new(signal());
        let text = execution
            .finish(ExecutionStatus::Completed, branches(), Some(false), None)
            .render();

        assert!(text.contains("2 succeeded, 1 failed, 1 skipped, 1 interrupted"));
        assert!(text.contains("reduce-memory on b"));
        assert!(text.contains("throttled"));
        assert!(text.contains("FAILED"));
    }
}
