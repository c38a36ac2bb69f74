//! Session status and progress notifications

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::batch::ResultSummary;
use crate::ledger::TxReference;

/// Lifecycle of an execution session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionStatus {
    /// No session has started, or the last one was rejected during validation
    #[default]
    Idle,
    /// Balance check and planning in progress
    Validating,
    /// Batches are being submitted
    Running,
    /// Every recipient has a result
    Finished,
    /// Stopped by a cancellation request; every recipient still has a result
    Cancelled,
}

impl SessionStatus {
    /// A new session may not start while this is true
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Validating | SessionStatus::Running)
    }

    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Validating => "validating",
            SessionStatus::Running => "running",
            SessionStatus::Finished => "finished",
            SessionStatus::Cancelled => "cancelled",
        }
    }
}

/// Snapshot published through the engine's watch channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProgress {
    pub session_id: Option<Uuid>,
    pub status: SessionStatus,
    pub total_recipients: usize,
    pub total_batches: usize,
    /// Zero-based index of the batch in flight
    pub current_batch: Option<usize>,
    pub succeeded: usize,
    pub failed: usize,
}

impl SessionProgress {
    /// Recipients with a recorded result
    pub fn completed(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Human-readable description of the current step
    pub fn step(&self) -> Option<String> {
        match (self.status, self.current_batch) {
            (SessionStatus::Running, Some(index)) => Some(format!(
                "Processing batch {} of {}",
                index + 1,
                self.total_batches
            )),
            _ => None,
        }
    }
}

/// Events broadcast while a session runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
    SessionStarted {
        session_id: Uuid,
        recipients: usize,
        batches: usize,
    },
    BatchStarted {
        session_id: Uuid,
        index: usize,
        total: usize,
        size: usize,
    },
    RecipientRejected {
        session_id: Uuid,
        position: usize,
        code: String,
        reason: String,
    },
    BatchSettled {
        session_id: Uuid,
        index: usize,
        reference: Option<TxReference>,
        succeeded: usize,
        failed: usize,
        error: Option<String>,
    },
    SessionFinished {
        session_id: Uuid,
        status: SessionStatus,
        summary: ResultSummary,
    },
}
