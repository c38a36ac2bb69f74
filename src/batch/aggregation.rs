//! Per-recipient outcome recording

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::{Cluster, TxReference};
use crate::recipient::Recipient;

/// Outcome tag of one transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    /// Label used in metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }
}

/// Result of one attempted transfer; never revised once recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    pub recipient: Recipient,
    pub outcome: Outcome,
    /// Transaction reference, set on success
    pub reference: Option<TxReference>,
    /// Human-readable failure detail, set on failure
    pub error: Option<String>,
    /// Batch the recipient belonged to
    pub batch_index: usize,
    pub recorded_at: DateTime<Utc>,
}

impl TransferResult {
    /// Transfer settled in the referenced transaction
    pub fn success(recipient: Recipient, reference: TxReference, batch_index: usize) -> Self {
        Self {
            recipient,
            outcome: Outcome::Success,
            reference: Some(reference),
            error: None,
            batch_index,
            recorded_at: Utc::now(),
        }
    }

    /// Transfer that did not settle
    pub fn failure(recipient: Recipient, error: impl Into<String>, batch_index: usize) -> Self {
        Self {
            recipient,
            outcome: Outcome::Failure,
            reference: None,
            error: Some(error.into()),
            batch_index,
            recorded_at: Utc::now(),
        }
    }

    /// Whether the transfer settled
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    /// Explorer page of the settling transaction
    pub fn explorer_url(&self, cluster: Cluster) -> Option<String> {
        self.reference
            .as_ref()
            .map(|reference| cluster.explorer_tx_url(reference))
    }
}

/// Success/failure counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl ResultSummary {
    /// Recount from a result list
    pub fn from_results(results: &[TransferResult]) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
        }
    }

    /// Recipients without a result yet
    pub fn pending(&self) -> usize {
        self.total - self.succeeded - self.failed
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregationError {
    #[error("position {position} is outside the {expected} expected results")]
    OutOfRange { position: usize, expected: usize },

    #[error("result for position {0} already recorded")]
    AlreadyRecorded(usize),

    #[error("{missing} results were never recorded")]
    Incomplete { missing: usize },
}

/// Records one result per recipient position.
///
/// Counts update as soon as a result is recorded; the final list is
/// ordered by position regardless of recording order.
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    slots: Vec<Option<TransferResult>>,
    succeeded: usize,
    failed: usize,
}

impl ResultAggregator {
    /// Create an aggregator with `expected` empty slots
    pub fn new(expected: usize) -> Self {
        Self {
            slots: vec![None; expected],
            succeeded: 0,
            failed: 0,
        }
    }

    /// Record the result for `position`; each slot is written once
    pub fn record(&mut self, position: usize, result: TransferResult) -> Result<(), AggregationError> {
        let expected = self.slots.len();
        let slot = self
            .slots
            .get_mut(position)
            .ok_or(AggregationError::OutOfRange { position, expected })?;
        if slot.is_some() {
            return Err(AggregationError::AlreadyRecorded(position));
        }

        match result.outcome {
            Outcome::Success => self.succeeded += 1,
            Outcome::Failure => self.failed += 1,
        }
        *slot = Some(result);
        Ok(())
    }

    /// Whether `position` already has a result
    pub fn is_recorded(&self, position: usize) -> bool {
        matches!(self.slots.get(position), Some(Some(_)))
    }

    /// Successful transfers so far
    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    /// Failed transfers so far
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Whether every position has a result
    pub fn is_complete(&self) -> bool {
        self.succeeded + self.failed == self.slots.len()
    }

    /// Current counts
    pub fn summary(&self) -> ResultSummary {
        ResultSummary {
            total: self.slots.len(),
            succeeded: self.succeeded,
            failed: self.failed,
        }
    }

    /// Positions that have no result yet, ascending
    pub fn unresolved(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(position, slot)| slot.is_none().then_some(position))
            .collect()
    }

    /// Recorded results in position order
    pub fn iter(&self) -> impl Iterator<Item = &TransferResult> {
        self.slots.iter().flatten()
    }

    /// Final ordered list; fails unless every position was recorded
    pub fn into_results(self) -> Result<Vec<TransferResult>, AggregationError> {
        let missing = self.slots.iter().filter(|s| s.is_none()).count();
        if missing > 0 {
            return Err(AggregationError::Incomplete { missing });
        }
        Ok(self.slots.into_iter().flatten().collect())
    }
}
