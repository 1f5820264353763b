//! Right-sizing advisor
//!
//! Stateless memory, timeout and concurrency recommendations from
//! utilization statistics, plus the periodic task that refreshes them.

mod concurrency;
mod memory;
mod scheduler;

pub use concurrency::{recommend_concurrency, ConcurrencyRecommendation, ConcurrencyStats};
pub use memory::{AdvisorConfig, FunctionUsage, RightSizingAdvisor, DEFAULT_UNIT_PRICE_PER_GB_SECOND};
pub use scheduler::{AdvisorScheduler, AdvisorStats, DEFAULT_ADVISOR_INTERVAL};
