//! Cost agent daemon
//!
//! Configuration and the operator HTTP API, shared by the binary and its
//! integration tests.

pub mod api;
pub mod config;
