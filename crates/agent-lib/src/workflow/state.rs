//! Emergency workflow state machine
//!
//! ValidateEmergency -> NoActionRequired -> Done
//! ValidateEmergency -> NotifyStakeholders -> ParallelRemediation -> GenerateReport -> Done
//!
//! A halt (timeout, cancellation, fatal executor failure) from any running
//! state jumps straight to GenerateReport so a report is always produced.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TransitionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowState {
    ValidateEmergency,
    NoActionRequired,
    NotifyStakeholders,
    ParallelRemediation,
    GenerateReport,
    Done,
}

impl WorkflowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::ValidateEmergency => "ValidateEmergency",
            WorkflowState::NoActionRequired => "NoActionRequired",
            WorkflowState::NotifyStakeholders => "NotifyStakeholders",
            WorkflowState::ParallelRemediation => "ParallelRemediation",
            WorkflowState::GenerateReport => "GenerateReport",
            WorkflowState::Done => "Done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Done)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events driving the workflow forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowEvent {
    /// Re-validation finished
    Validated { confirmed: bool },
    /// Stakeholder notification attempted, delivered or not
    Notified,
    /// Every remediation branch has joined
    BranchesJoined,
    /// Timeout, cancellation or a fatal failure
    Halted,
    /// Report compiled
    Reported,
}

impl fmt::Display for WorkflowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowEvent::Validated { confirmed } => write!(f, "Validated(confirmed={})", confirmed),
            WorkflowEvent::Notified => write!(f, "Notified"),
            WorkflowEvent::BranchesJoined => write!(f, "BranchesJoined"),
            WorkflowEvent::Halted => write!(f, "Halted"),
            WorkflowEvent::Reported => write!(f, "Reported"),
        }
    }
}

/// Compute the next state, rejecting events that are illegal in `state`
pub fn transition(state: WorkflowState, event: WorkflowEvent) -> Result<WorkflowState, TransitionError> {
    use WorkflowEvent as E;
    use WorkflowState as S;

    let next = match (state, event) {
        (S::ValidateEmergency, E::Validated { confirmed: false }) => S::NoActionRequired,
        (S::ValidateEmergency, E::Validated { confirmed: true }) => S::NotifyStakeholders,
        (S::NotifyStakeholders, E::Notified) => S::ParallelRemediation,
        (S::ParallelRemediation, E::BranchesJoined) => S::GenerateReport,
        (S::ValidateEmergency | S::NotifyStakeholders | S::ParallelRemediation, E::Halted) => {
            S::GenerateReport
        }
        (S::NoActionRequired | S::GenerateReport, E::Reported) => S::Done,
        (state, event) => {
            return Err(TransitionError {
                state: state.to_string(),
                event: event.to_string(),
            })
        }
    };

    Ok(next)
}
