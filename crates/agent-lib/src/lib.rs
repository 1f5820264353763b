//! Cost anomaly response library
//!
//! This crate provides the core functionality for:
//! - Ingesting cost and usage metrics from an external feed
//! - Budget and spike anomaly detection
//! - Remediation rule evaluation
//! - The emergency response workflow
//! - Right-sizing advice for serverless functions
//! - Health checks and observability

pub mod advisor;
pub mod anomaly;
pub mod collector;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod remediation;
pub mod workflow;

pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AgentMetrics, StructuredLogger};
