//! Emergency response workflow driver
//!
//! Runs one [`WorkflowExecution`] per confirmed anomaly: re-validate,
//! notify, fan out remediation branches, join and report. Every path ends in
//! an archived execution carrying a report.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::warn;
use uuid::Uuid;

use super::execution::{BranchOutcome, BranchStatus, ExecutionStatus, WorkflowExecution};
use super::executor::{execute_with_retry, ExecutorRegistry, RetryPolicy};
use super::history::ExecutionHistory;
use super::notifier::NotificationSink;
use super::state::{transition, WorkflowEvent};
use super::validator::EmergencyValidator;
use crate::anomaly::NotificationMessage;
use crate::error::{ExecutorError, TransitionError};
use crate::health::{components, HealthRegistry};
use crate::models::{AnomalySignal, RemediationAction, Severity};
use crate::observability::{AgentMetrics, StructuredLogger};
use crate::remediation::{check_policy, RemediationClaims};

/// Workflow limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Overall deadline for one execution
    pub timeout_secs: u64,
    /// Top-N proposed actions executed concurrently
    pub max_parallel_actions: usize,
    /// Retries per branch for transient failures
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30 * 60,
            max_parallel_actions: 3,
            max_retries: 2,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
        }
    }
}

impl WorkflowConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

/// Why an execution stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Halt {
    TimedOut,
    Cancelled,
}

impl Halt {
    fn status(self) -> ExecutionStatus {
        match self {
            Halt::TimedOut => ExecutionStatus::TimedOut,
            Halt::Cancelled => ExecutionStatus::Cancelled,
        }
    }

    fn note(self) -> &'static str {
        match self {
            Halt::TimedOut => "workflow timeout exceeded",
            Halt::Cancelled => "cancelled by operator",
        }
    }
}

/// Everything a remediation branch needs, owned so it can be spawned
#[derive(Clone)]
struct BranchContext {
    execution_id: Uuid,
    severity: Severity,
    approved: bool,
    claims: RemediationClaims,
    executors: ExecutorRegistry,
    retry: RetryPolicy,
}

struct BranchResult {
    index: usize,
    outcome: BranchOutcome,
    unreachable: bool,
}

struct RemediationRound {
    branches: Vec<BranchOutcome>,
    halt: Option<Halt>,
    unreachable: Vec<String>,
}

/// Drives emergency workflow executions
pub struct EmergencyWorkflow {
    config: WorkflowConfig,
    validator: Arc<dyn EmergencyValidator>,
    notifier: Arc<dyn NotificationSink>,
    executors: ExecutorRegistry,
    claims: RemediationClaims,
    history: Arc<ExecutionHistory>,
    metrics: AgentMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl EmergencyWorkflow {
    pub fn new(
        config: WorkflowConfig,
        validator: Arc<dyn EmergencyValidator>,
        notifier: Arc<dyn NotificationSink>,
        executors: ExecutorRegistry,
        history: Arc<ExecutionHistory>,
    ) -> Self {
        Self {
            config,
            validator,
            notifier,
            executors,
            claims: RemediationClaims::new(),
            history,
            metrics: AgentMetrics::new(),
            logger: StructuredLogger::new("local"),
            health: None,
        }
    }

    /// Share a claim registry with other workflow instances
    pub fn with_claims(mut self, claims: RemediationClaims) -> Self {
        self.claims = claims;
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Report workflow and notifier health to a registry
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn history(&self) -> &Arc<ExecutionHistory> {
        &self.history
    }

    pub fn claims(&self) -> &RemediationClaims {
        &self.claims
    }

    /// Run one execution to completion and archive it
    ///
    /// `proposed` must already be ranked; only the top
    /// `max_parallel_actions` are executed.
    pub async fn run(&self, signal: AnomalySignal, proposed: Vec<RemediationAction>) -> WorkflowExecution {
        let started = std::time::Instant::now();
        let mut execution = WorkflowExecution::new(signal);
        let mut cancel = self.history.register_running(&execution);

        self.metrics.workflow_started();
        self.logger.log_workflow_started(execution.id, &execution.signal);

        if let Err(e) = self.drive(&mut execution, proposed, &mut cancel).await {
            warn!(execution_id = %execution.id, error = %e, "Workflow reached an illegal transition");
            let branches = execution.report.take().map(|r| r.branches).unwrap_or_default();
            execution.finish(ExecutionStatus::Failed, branches, None, Some(e.to_string()));
        }

        let duration = started.elapsed().as_secs_f64();
        self.metrics.workflow_finished();
        self.metrics.inc_workflows(execution.status.as_str());
        self.metrics.observe_workflow_duration(duration);
        if let Some(report) = &execution.report {
            for branch in &report.branches {
                self.metrics.inc_branch_outcome(branch.status.as_str());
            }
        }
        self.logger.log_workflow_finished(
            execution.id,
            execution.status.as_str(),
            execution.actions_succeeded.len(),
            execution.actions_failed.len(),
            duration,
        );

        let archived = self.history.archive(execution.clone());
        if let Err(e) = &archived {
            warn!(execution_id = %execution.id, error = %e, "Failed to persist execution archive");
        }

        if let Some(health) = &self.health {
            let note = execution.report.as_ref().and_then(|r| r.note.clone());
            match (&archived, execution.status) {
                (Err(e), _) => {
                    health
                        .set_degraded(components::WORKFLOW, format!("execution archive not writable: {:#}", e))
                        .await
                }
                (Ok(()), ExecutionStatus::Failed) => {
                    let reason = note.unwrap_or_else(|| "no detail".to_string());
                    health
                        .set_degraded(
                            components::WORKFLOW,
                            format!("execution {} failed: {}", execution.id, reason),
                        )
                        .await
                }
                (Ok(()), _) => health.set_healthy(components::WORKFLOW).await,
            }
        }

        execution
    }

    async fn drive(
        &self,
        execution: &mut WorkflowExecution,
        proposed: Vec<RemediationAction>,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<(), TransitionError> {
        let deadline = Instant::now() + self.config.timeout();
        let signal = execution.signal.clone();

        // ValidateEmergency
        let aborted = self.history.is_aborted(signal.id);
        let validation = if aborted {
            Ok(Ok(false))
        } else {
            guard(self.validator.confirm(&signal), deadline, cancel).await
        };

        let confirmed = match validation {
            Ok(Ok(confirmed)) => confirmed,
            Ok(Err(e)) => {
                return self.halt(
                    execution,
                    ExecutionStatus::Failed,
                    Vec::new(),
                    None,
                    format!("validation failed: {:#}", e),
                );
            }
            Err(halt) => {
                return self.halt(execution, halt.status(), Vec::new(), None, halt.note().to_string());
            }
        };

        if !confirmed {
            self.advance(execution, WorkflowEvent::Validated { confirmed: false })?;
            let note = if aborted {
                "aborted by operator override"
            } else {
                "anomaly no longer present in fresh metrics"
            };
            execution.finish(ExecutionStatus::NoActionRequired, Vec::new(), None, Some(note.to_string()));
            return self.advance(execution, WorkflowEvent::Reported);
        }
        self.advance(execution, WorkflowEvent::Validated { confirmed: true })?;

        // NotifyStakeholders, always before any remediation
        let selected: Vec<RemediationAction> = proposed
            .into_iter()
            .take(self.config.max_parallel_actions)
            .collect();
        let message = NotificationMessage::from_signal(&signal, selected.len());

        let delivered = match guard(self.notifier.send(&message), deadline, cancel).await {
            Ok(Ok(())) => {
                if let Some(health) = &self.health {
                    health.set_healthy(components::NOTIFIER).await;
                }
                true
            }
            Ok(Err(e)) => {
                self.metrics.inc_notification_failures();
                self.logger.log_notification_failed(execution.id, &e.to_string());
                if let Some(health) = &self.health {
                    health.set_degraded(components::NOTIFIER, e.to_string()).await;
                }
                false
            }
            Err(halt) => {
                let branches = selected
                    .into_iter()
                    .map(|a| BranchOutcome::interrupted(a, halt.note()))
                    .collect();
                return self.halt(execution, halt.status(), branches, None, halt.note().to_string());
            }
        };
        self.advance(execution, WorkflowEvent::Notified)?;

        // ParallelRemediation
        let round = self.remediate(execution.id, &signal, selected, deadline, cancel).await;

        if let Some(halt) = round.halt {
            return self.halt(
                execution,
                halt.status(),
                round.branches,
                Some(delivered),
                halt.note().to_string(),
            );
        }
        self.advance(execution, WorkflowEvent::BranchesJoined)?;

        // GenerateReport
        let (status, note) = if round.unreachable.is_empty() {
            (ExecutionStatus::Completed, None)
        } else {
            (
                ExecutionStatus::Failed,
                Some(format!("no executor reachable for: {}", round.unreachable.join(", "))),
            )
        };
        execution.record_branches(&round.branches);
        execution.finish(status, round.branches, Some(delivered), note);
        self.advance(execution, WorkflowEvent::Reported)
    }

    /// Fork one task per action and join them under the deadline
    async fn remediate(
        &self,
        execution_id: Uuid,
        signal: &AnomalySignal,
        actions: Vec<RemediationAction>,
        deadline: Instant,
        cancel: &mut watch::Receiver<bool>,
    ) -> RemediationRound {
        // Taken at fan-out so approvals given during validation still apply
        let ctx = BranchContext {
            execution_id,
            severity: signal.severity,
            approved: self.history.take_approval(signal),
            claims: self.claims.clone(),
            executors: self.executors.clone(),
            retry: self.config.retry_policy(),
        };

        let attempts: Vec<Arc<AtomicU32>> = actions.iter().map(|_| Arc::new(AtomicU32::new(0))).collect();
        let mut set = JoinSet::new();
        for (index, action) in actions.iter().cloned().enumerate() {
            set.spawn(run_branch(ctx.clone(), index, action, attempts[index].clone()));
        }

        let mut results: Vec<Option<BranchResult>> = actions.iter().map(|_| None).collect();
        let halt = loop {
            tokio::select! {
                biased;
                _ = wait_cancelled(cancel) => break Some(Halt::Cancelled),
                _ = tokio::time::sleep_until(deadline) => break Some(Halt::TimedOut),
                joined = set.join_next() => match joined {
                    Some(Ok(result)) => {
                        let index = result.index;
                        results[index] = Some(result);
                    }
                    Some(Err(e)) => warn!(execution_id = %execution_id, error = %e, "Remediation branch task failed"),
                    None => break None,
                },
            }
        };

        if halt.is_some() {
            set.abort_all();
            // Drain so aborted branches release their claims
            while set.join_next().await.is_some() {}
        }

        let mut unreachable = Vec::new();
        let branches = actions
            .into_iter()
            .zip(results)
            .zip(attempts)
            .map(|((action, result), attempts)| match (result, halt) {
                (Some(result), _) => {
                    if result.unreachable {
                        unreachable.push(result.outcome.action.target.clone());
                    }
                    result.outcome
                }
                (None, Some(halt)) => {
                    let mut outcome = BranchOutcome::interrupted(action, halt.note());
                    outcome.attempts = attempts.load(Ordering::SeqCst);
                    outcome
                }
                (None, None) => BranchOutcome::new(
                    action,
                    BranchStatus::Failed,
                    attempts.load(Ordering::SeqCst),
                    Some("branch task ended unexpectedly".to_string()),
                ),
            })
            .collect();

        RemediationRound {
            branches,
            halt,
            unreachable,
        }
    }

    fn advance(&self, execution: &mut WorkflowExecution, event: WorkflowEvent) -> Result<(), TransitionError> {
        let next = transition(execution.state, event)?;
        self.logger
            .log_transition(execution.id, execution.state.as_str(), next.as_str());
        execution.state = next;
        self.history.update_running(execution);
        Ok(())
    }

    /// Jump to GenerateReport and close the execution early
    fn halt(
        &self,
        execution: &mut WorkflowExecution,
        status: ExecutionStatus,
        branches: Vec<BranchOutcome>,
        notification_delivered: Option<bool>,
        note: String,
    ) -> Result<(), TransitionError> {
        self.advance(execution, WorkflowEvent::Halted)?;
        execution.record_branches(&branches);
        execution.finish(status, branches, notification_delivered, Some(note));
        self.advance(execution, WorkflowEvent::Reported)
    }
}

/// One independent remediation branch
async fn run_branch(
    ctx: BranchContext,
    index: usize,
    action: RemediationAction,
    attempts: Arc<AtomicU32>,
) -> BranchResult {
    let skipped = |action: RemediationAction, reason: String| BranchResult {
        index,
        outcome: BranchOutcome::skipped(action, reason),
        unreachable: false,
    };

    if let Err(violation) = check_policy(&action, ctx.severity, ctx.approved) {
        return skipped(action, violation.to_string());
    }

    let _claim = match ctx.claims.try_claim(&action.target, ctx.execution_id) {
        Ok(guard) => guard,
        Err(owner) => {
            let reason = format!("{} is under remediation by execution {}", action.target, owner);
            return skipped(action, reason);
        }
    };

    let Some(executor) = ctx.executors.get(action.target_kind) else {
        let error = ExecutorError::Unreachable(format!("{} resources", action.target_kind));
        return BranchResult {
            index,
            outcome: BranchOutcome::new(action, BranchStatus::Failed, 0, Some(error.to_string())),
            unreachable: true,
        };
    };

    let result = execute_with_retry(executor.as_ref(), &action.to_command(), &ctx.retry, &attempts).await;
    let attempts = attempts.load(Ordering::SeqCst);

    match result {
        Ok(()) => BranchResult {
            index,
            outcome: BranchOutcome::new(action, BranchStatus::Succeeded, attempts, None),
            unreachable: false,
        },
        Err(e) => BranchResult {
            index,
            unreachable: matches!(e, ExecutorError::Unreachable(_)),
            outcome: BranchOutcome::new(action, BranchStatus::Failed, attempts, Some(e.to_string())),
        },
    }
}

/// Await `fut` unless the deadline passes or the execution is cancelled
async fn guard<F: Future>(
    fut: F,
    deadline: Instant,
    cancel: &mut watch::Receiver<bool>,
) -> Result<F::Output, Halt> {
    tokio::select! {
        biased;
        _ = wait_cancelled(cancel) => Err(Halt::Cancelled),
        result = tokio::time::timeout_at(deadline, fut) => result.map_err(|_| Halt::TimedOut),
    }
}

/// Resolves once cancellation is requested; never if the handle is gone
async fn wait_cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
