//! Execution history and operator overrides
//!
//! Finished executions are archived (never deleted) in memory and, when a
//! path is configured, appended to a JSON-lines file that is reloaded on
//! start. Running executions keep a cancel handle so operators can abort them.
//!
//! Approving a signal also approves its breach (rule plus resource), since a
//! re-detection of the same breach carries a fresh signal id. A breach
//! approval is consumed by the next execution that reaches remediation.

use anyhow::{Context, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use super::execution::WorkflowExecution;
use crate::models::{AnomalyKind, AnomalySignal};

/// Detection rule and resource a signal was raised for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BreachKey {
    pub kind: AnomalyKind,
    pub resource_id: String,
}

impl BreachKey {
    pub fn of(signal: &AnomalySignal) -> Self {
        Self {
            kind: signal.kind,
            resource_id: signal.resource_id.clone(),
        }
    }
}

/// Operator decisions keyed by anomaly signal id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Overrides {
    /// Signals forced to `emergencyConfirmed = false`
    pub aborted: Vec<Uuid>,
    /// Signals whose irreversible actions are pre-approved
    pub approved: Vec<Uuid>,
    /// Breaches whose next execution may run irreversible actions
    #[serde(default)]
    pub approved_breaches: Vec<BreachKey>,
}

#[derive(Debug, Default)]
struct OverrideState {
    aborted: HashSet<Uuid>,
    approved: HashSet<Uuid>,
    approved_breaches: HashSet<BreachKey>,
}

struct RunningExecution {
    snapshot: WorkflowExecution,
    cancel: watch::Sender<bool>,
}

/// Audit trail of workflow executions
pub struct ExecutionHistory {
    archive: RwLock<Vec<WorkflowExecution>>,
    running: DashMap<Uuid, RunningExecution>,
    overrides: RwLock<OverrideState>,
    archive_path: Option<PathBuf>,
}

impl Default for ExecutionHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionHistory {
    /// In-memory history only
    pub fn new() -> Self {
        Self {
            archive: RwLock::new(Vec::new()),
            running: DashMap::new(),
            overrides: RwLock::new(OverrideState::default()),
            archive_path: None,
        }
    }

    /// History backed by a JSON-lines archive file
    pub fn with_archive(path: PathBuf) -> Result<Self> {
        let mut history = Self::new();

        if path.exists() {
            let loaded = load_archive(&path)?;
            info!(path = %path.display(), entries = loaded.len(), "Loaded execution archive");
            history.archive = RwLock::new(loaded);
        } else if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        history.archive_path = Some(path);
        Ok(history)
    }

    /// Track a starting execution; the receiver flips to `true` on cancel
    pub fn register_running(&self, execution: &WorkflowExecution) -> watch::Receiver<bool> {
        let (cancel, cancelled) = watch::channel(false);
        self.running.insert(
            execution.id,
            RunningExecution {
                snapshot: execution.clone(),
                cancel,
            },
        );
        cancelled
    }

    /// Refresh the visible state of a running execution
    pub fn update_running(&self, execution: &WorkflowExecution) {
        if let Some(mut entry) = self.running.get_mut(&execution.id) {
            entry.snapshot = execution.clone();
        }
    }

    /// Move a finished execution into the archive
    ///
    /// The in-memory archive is always updated; a failure to append to the
    /// archive file is returned to the caller.
    pub fn archive(&self, execution: WorkflowExecution) -> Result<()> {
        self.running.remove(&execution.id);

        let line = serde_json::to_string(&execution).context("Failed to serialize execution")?;
        self.archive
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(execution);

        if let Some(path) = &self.archive_path {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open archive {:?}", path))?;
            writeln!(file, "{}", line).context("Failed to append to archive")?;
        }
        Ok(())
    }

    /// Request cancellation of a running execution
    pub fn cancel(&self, execution_id: Uuid) -> bool {
        match self.running.get(&execution_id) {
            Some(entry) => entry.cancel.send(true).is_ok(),
            None => false,
        }
    }

    /// Cancel every running execution, returning how many were signalled
    pub fn cancel_all(&self) -> usize {
        self.running
            .iter()
            .filter(|entry| entry.cancel.send(true).is_ok())
            .count()
    }

    pub fn get(&self, execution_id: Uuid) -> Option<WorkflowExecution> {
        if let Some(entry) = self.running.get(&execution_id) {
            return Some(entry.snapshot.clone());
        }
        self.archive
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|e| e.id == execution_id)
            .cloned()
    }

    /// Running executions first, then the archive newest first
    pub fn list(&self) -> Vec<WorkflowExecution> {
        let mut running: Vec<_> = self.running.iter().map(|e| e.snapshot.clone()).collect();
        running.sort_by(|a, b| b.started_at.cmp(&a.started_at));

        let archive = self.archive.read().unwrap_or_else(|e| e.into_inner());
        running.extend(archive.iter().rev().cloned());
        running
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    /// Force `emergencyConfirmed = false` for a signal
    ///
    /// Executions already past validation for that signal are cancelled.
    /// Returns the number of running executions cancelled.
    pub fn abort_signal(&self, signal_id: Uuid) -> usize {
        self.overrides
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .aborted
            .insert(signal_id);

        let mut cancelled = 0;
        for entry in self.running.iter() {
            if entry.snapshot.anomaly_signal_id == signal_id && entry.cancel.send(true).is_ok() {
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Pre-approve irreversible actions for a signal
    ///
    /// When the signal belongs to a known execution its breach is approved
    /// too and returned.
    pub fn approve_signal(&self, signal_id: Uuid) -> Option<BreachKey> {
        let breach = self.find_signal(signal_id).map(|signal| BreachKey::of(&signal));

        let mut overrides = self.overrides.write().unwrap_or_else(|e| e.into_inner());
        overrides.approved.insert(signal_id);
        if let Some(breach) = &breach {
            overrides.approved_breaches.insert(breach.clone());
        }
        breach
    }

    fn find_signal(&self, signal_id: Uuid) -> Option<AnomalySignal> {
        if let Some(entry) = self
            .running
            .iter()
            .find(|e| e.snapshot.anomaly_signal_id == signal_id)
        {
            return Some(entry.snapshot.signal.clone());
        }
        self.archive
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .rev()
            .find(|e| e.anomaly_signal_id == signal_id)
            .map(|e| e.signal.clone())
    }

    pub fn is_aborted(&self, signal_id: Uuid) -> bool {
        self.overrides
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .aborted
            .contains(&signal_id)
    }

    pub fn is_approved(&self, signal: &AnomalySignal) -> bool {
        let overrides = self.overrides.read().unwrap_or_else(|e| e.into_inner());
        overrides.approved.contains(&signal.id)
            || overrides.approved_breaches.contains(&BreachKey::of(signal))
    }

    /// Check approval for an execution about to fan out
    ///
    /// A breach approval is used up; a signal approval is kept.
    pub fn take_approval(&self, signal: &AnomalySignal) -> bool {
        let mut overrides = self.overrides.write().unwrap_or_else(|e| e.into_inner());
        if overrides.approved.contains(&signal.id) {
            return true;
        }
        overrides.approved_breaches.remove(&BreachKey::of(signal))
    }

    /// Approved breach with no execution currently responding to it
    pub fn has_pending_approval(&self, signal: &AnomalySignal) -> bool {
        let breach = BreachKey::of(signal);
        let pending = self
            .overrides
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .approved_breaches
            .contains(&breach);

        pending
            && !self
                .running
                .iter()
                .any(|e| BreachKey::of(&e.snapshot.signal) == breach)
    }

    pub fn overrides(&self) -> Overrides {
        let state = self.overrides.read().unwrap_or_else(|e| e.into_inner());
        let mut aborted: Vec<_> = state.aborted.iter().copied().collect();
        let mut approved: Vec<_> = state.approved.iter().copied().collect();
        let mut approved_breaches: Vec<_> = state.approved_breaches.iter().cloned().collect();
        aborted.sort();
        approved.sort();
        approved_breaches.sort_by(|a, b| {
            (a.kind.to_string(), &a.resource_id).cmp(&(b.kind.to_string(), &b.resource_id))
        });
        Overrides {
            aborted,
            approved,
            approved_breaches,
        }
    }
}

fn load_archive(path: &Path) -> Result<Vec<WorkflowExecution>> {
    let file = File::open(path).with_context(|| format!("Failed to open archive {:?}", path))?;
    let mut executions = Vec::new();

    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.context("Failed to read archive")?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<WorkflowExecution>(&line) {
            Ok(execution) => executions.push(execution),
            Err(e) => warn!(line = number + 1, error = %e, "Skipping unreadable archive entry"),
        }
    }

    Ok(executions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;
    use crate::workflow::ExecutionStatus;
    use tempfile::tempdir;

    fn execution() -> WorkflowExecution {
        WorkflowExecution::new(AnomalySignal {
            id: Uuid::new_v4(),
            resource_id: "account".to_string(),
            kind: AnomalyKind::DailyCostBreach,
            triggered_at: 1_700_000_000,
            observed_value: 60.0,
            threshold: 16.67,
            severity: Severity::Critical,
        })
    }

    #[test]
    fn test_running_then_archived() {
        let history = ExecutionHistory::new();
        let mut exec = execution();
        let _cancel = history.register_running(&exec);

        assert_eq!(history.running_count(), 1);
        assert_eq!(history.get(exec.id).unwrap().status, ExecutionStatus::Running);

        exec.finish(ExecutionStatus::Completed, Vec::new(), Some(true), None);
        history.archive(exec.clone()).unwrap();

        assert_eq!(history.running_count(), 0);
        assert_eq!(history.get(exec.id).unwrap().status, ExecutionStatus::Completed);
        assert_eq!(history.list().len(), 1);
    }

    #[test]
    fn test_cancel_signals_receiver() {
        let history = ExecutionHistory::new();
        let exec = execution();
        let cancelled = history.register_running(&exec);

        assert!(history.cancel(exec.id));
        assert!(*cancelled.borrow());
        assert!(!history.cancel(Uuid::new_v4()));
    }

    #[test]
    fn test_abort_override_cancels_running() {
        let history = ExecutionHistory::new();
        let exec = execution();
        let cancelled = history.register_running(&exec);

        assert_eq!(history.abort_signal(exec.anomaly_signal_id), 1);
        assert!(history.is_aborted(exec.anomaly_signal_id));
        assert!(*cancelled.borrow());
        assert!(!history.is_approved(&exec.signal));

        history.approve_signal(exec.anomaly_signal_id);
        let overrides = history.overrides();
        assert_eq!(overrides.aborted, vec![exec.anomaly_signal_id]);
        assert_eq!(overrides.approved, vec![exec.anomaly_signal_id]);
        assert_eq!(overrides.approved_breaches, vec![BreachKey::of(&exec.signal)]);
    }

    #[test]
    fn test_breach_approval_carries_to_redetection() {
        let history = ExecutionHistory::new();
        let mut exec = execution();
        exec.finish(ExecutionStatus::Completed, Vec::new(), Some(true), None);
        history.archive(exec.clone()).unwrap();

        let breach = history.approve_signal(exec.anomaly_signal_id);
        assert_eq!(breach, Some(BreachKey::of(&exec.signal)));

        // Same breach detected again under a new id
        let redetected = AnomalySignal {
            id: Uuid::new_v4(),
            ..exec.signal.clone()
        };
        assert!(history.is_approved(&redetected));
        assert!(history.has_pending_approval(&redetected));

        assert!(history.take_approval(&redetected));
        assert!(!history.take_approval(&redetected));
        assert!(!history.has_pending_approval(&redetected));

        // The originally approved signal keeps its approval
        assert!(history.take_approval(&exec.signal));
    }

    #[test]
    fn test_unknown_signal_approval_is_id_only() {
        let history = ExecutionHistory::new();
        let exec = execution();

        assert_eq!(history.approve_signal(exec.anomaly_signal_id), None);
        assert!(history.is_approved(&exec.signal));

        let other = AnomalySignal {
            id: Uuid::new_v4(),
            ..exec.signal.clone()
        };
        assert!(!history.is_approved(&other));
    }

    #[test]
    fn test_pending_approval_waits_for_running_execution() {
        let history = ExecutionHistory::new();
        let exec = execution();
        let _cancel = history.register_running(&exec);

        history.approve_signal(exec.anomaly_signal_id);
        let redetected = AnomalySignal {
            id: Uuid::new_v4(),
            ..exec.signal.clone()
        };
        assert!(!history.has_pending_approval(&redetected));
    }

    #[test]
    fn test_archive_survives_restart() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history").join("executions.jsonl");

        let mut exec = execution();
        {
            let history = ExecutionHistory::with_archive(path.clone()).unwrap();
            exec.finish(ExecutionStatus::NoActionRequired, Vec::new(), None, None);
            history.archive(exec.clone()).unwrap();
        }

        let reloaded = ExecutionHistory::with_archive(path).unwrap();
        let restored = reloaded.get(exec.id).unwrap();
        assert_eq!(restored.status, ExecutionStatus::NoActionRequired);
        assert!(restored.report.is_some());
    }

    #[test]
    fn test_corrupt_archive_lines_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("executions.jsonl");
        std::fs::write(&path, "not json\n\n").unwrap();

        let history = ExecutionHistory::with_archive(path).unwrap();
        assert!(history.list().is_empty());
    }
}
