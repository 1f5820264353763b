//! Remediation rule engine
//!
//! This module provides:
//! - The static catalog of action templates
//! - Pure, deterministic proposal and ranking of candidate actions
//! - The irreversible-action policy gate
//! - Claims that keep two executions off the same resource

mod catalog;
mod claims;
mod engine;

pub use catalog::{ActionTemplate, CATALOG};
pub use claims::{ClaimGuard, RemediationClaims};
pub use engine::{check_policy, is_permitted, propose_actions, rank, RuleEngine};
