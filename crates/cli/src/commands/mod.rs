//! Subcommand implementations

pub mod advise;
pub mod executions;
pub mod health;
pub mod overrides;
pub mod recommendations;
