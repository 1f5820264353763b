//! Error taxonomy for the anomaly response core

use thiserror::Error;

use crate::models::{ActionKind, Severity};

/// Malformed input rejected at ingestion
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("non-finite value for metric {metric}")]
    NonFiniteValue { metric: String },
    #[error("negative cost {value} for metric {metric}")]
    NegativeCost { metric: String, value: f64 },
    #[error("invalid timestamp {0}")]
    InvalidTimestamp(i64),
    #[error("unknown action type `{0}`")]
    UnknownAction(String),
    #[error("unknown resource kind `{0}`")]
    UnknownResourceKind(String),
}

/// An action was refused before execution
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyViolation {
    #[error("irreversible action {action} on {target} requires critical severity, signal is {severity}")]
    IrreversibleBelowCritical {
        action: ActionKind,
        target: String,
        severity: Severity,
    },
    #[error("irreversible action {action} on {target} awaiting operator confirmation")]
    AwaitingConfirmation { action: ActionKind, target: String },
}

/// Failure reported by a remediation executor
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutorError {
    /// Throttling or network trouble; worth retrying
    #[error("transient executor failure: {0}")]
    Transient(String),
    #[error("executor rejected command: {0}")]
    Permanent(String),
    #[error("no executor reachable for {0}")]
    Unreachable(String),
}

impl ExecutorError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ExecutorError::Transient(_))
    }

    /// Transient failures and refused connections are both retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecutorError::Transient(_) | ExecutorError::Unreachable(_))
    }
}

/// Delivery failure of a stakeholder notification
#[derive(Debug, Clone, PartialEq, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotificationError(pub String);

/// Illegal event for the current workflow state
#[derive(Debug, Clone, PartialEq, Error)]
#[error("event {event} is not valid in state {state}")]
pub struct TransitionError {
    pub state: String,
    pub event: String,
}
