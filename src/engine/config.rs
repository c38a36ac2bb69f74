//! Engine configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::batch::{BatchPlanner, PlanError, DEFAULT_BATCH_SIZE};
use crate::ledger::Cluster;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse engine config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Plan(#[from] PlanError),
}

/// Configuration for an execution engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Recipients packed into one transaction
    pub batch_size: usize,

    /// Pause between batches in milliseconds
    pub batch_delay_ms: u64,

    /// Upper bound on waiting for confirmation; 0 waits indefinitely
    pub confirmation_timeout_ms: u64,

    /// Re-query the ledger before failing a batch whose confirmation failed
    pub reconcile_unconfirmed: bool,

    /// Cluster used for explorer links
    pub cluster: Cluster,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay_ms: 2_000,
            confirmation_timeout_ms: 60_000,
            reconcile_unconfirmed: false,
            cluster: Cluster::Mainnet,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON config document; missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject a zero batch size
    pub fn validate(&self) -> Result<(), ConfigError> {
        BatchPlanner::new(self.batch_size)?;
        Ok(())
    }

    /// Pause between consecutive batches
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    /// Confirmation bound; zero disables it
    pub fn confirmation_timeout(&self) -> Option<Duration> {
        (self.confirmation_timeout_ms > 0).then(|| Duration::from_millis(self.confirmation_timeout_ms))
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_confirmation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.confirmation_timeout_ms = timeout.map(|t| t.as_millis() as u64).unwrap_or(0);
        self
    }

    pub fn with_reconciliation(mut self, enabled: bool) -> Self {
        self.reconcile_unconfirmed = enabled;
        self
    }

    pub fn with_cluster(mut self, cluster: Cluster) -> Self {
        self.cluster = cluster;
        self
    }
}
