//! Partitioning of recipients into per-transaction batches

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

use crate::recipient::Recipient;

/// Recipients packed into one transaction unless configured otherwise
pub const DEFAULT_BATCH_SIZE: usize = 5;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("Batch size must be at least 1, got {0}")]
    InvalidBatchSize(usize),
}

/// An ordered, non-empty slice of the recipient list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferBatch {
    /// Zero-based sequence index
    pub index: usize,

    /// Recipients in input order
    pub recipients: SmallVec<[Recipient; DEFAULT_BATCH_SIZE]>,
}

impl TransferBatch {
    /// Number of recipients in the batch
    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    /// Whether the batch holds no recipients
    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }
}

/// Splits recipients into fixed-size chunks, preserving order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlanner {
    batch_size: usize,
}

impl BatchPlanner {
    /// Create a planner, rejecting a zero batch size
    pub fn new(batch_size: usize) -> Result<Self, PlanError> {
        if batch_size == 0 {
            return Err(PlanError::InvalidBatchSize(batch_size));
        }
        Ok(Self { batch_size })
    }

    /// Recipients per batch
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches `plan` produces for `recipient_count` recipients
    pub fn batch_count(&self, recipient_count: usize) -> usize {
        recipient_count.div_ceil(self.batch_size)
    }

    /// The last batch may be shorter than the batch size
    pub fn plan(&self, recipients: &[Recipient]) -> Vec<TransferBatch> {
        recipients
            .chunks(self.batch_size)
            .enumerate()
            .map(|(index, chunk)| TransferBatch {
                index,
                recipients: chunk.iter().cloned().collect(),
            })
            .collect()
    }
}

impl Default for BatchPlanner {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}
