//! Emergency response workflow
//!
//! This module provides:
//! - The explicit state machine and its transition function
//! - Execution records and human-readable reports
//! - Executor and notification adapters behind async traits
//! - Fork-join remediation with retries, timeout and cancellation
//! - Execution history and operator overrides

mod execution;
mod executor;
mod history;
mod notifier;
mod runner;
mod state;
mod validator;

#[cfg(test)]
mod tests;

pub use execution::{
    BranchCounts, BranchOutcome, BranchStatus, ExecutionReport, ExecutionStatus, WorkflowExecution,
};
pub use executor::{
    execute_with_retry, DryRunExecutor, ExecutorRegistry, HttpExecutor, RemediationExecutor, RetryPolicy,
};
pub use history::{BreachKey, ExecutionHistory, Overrides};
pub use notifier::{LogNotifier, NotificationSink, WebhookNotifier};
pub use runner::{EmergencyWorkflow, WorkflowConfig};
pub use state::{transition, WorkflowEvent, WorkflowState};
pub use validator::{EmergencyValidator, MetricRevalidator};
