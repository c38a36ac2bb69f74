//! Airdrop execution engine
//!
//! This module provides the session runtime: configuration, the
//! sequential batch loop, progress and event channels, and metrics.

pub mod config;
pub mod events;
pub mod executor;
pub mod metrics;
pub mod session;

pub use config::{ConfigError, EngineConfig};
pub use events::{ExecutionEvent, SessionProgress, SessionStatus};
pub use executor::{ExecutionEngine, ExecutionError};
pub use metrics::{gather_metrics, MetricsCollector};
pub use session::{AirdropSummary, ExecutionSession, SessionReport};
