//! Execution session state and final report

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::asset::{AssetDescriptor, UiAmount};
use crate::batch::{AggregationError, ResultAggregator, ResultSummary, TransferResult};
use crate::ledger::TxReference;
use crate::recipient::Recipient;

use super::events::SessionStatus;

/// One run of the engine over a recipient list.
///
/// Owned exclusively by the engine's execution path; results are only
/// written through the aggregator. Lifecycle status lives in the engine's
/// progress channel and is stamped onto the report by `finish`.
#[derive(Debug)]
pub struct ExecutionSession {
    pub(crate) id: Uuid,
    pub(crate) asset: AssetDescriptor,
    pub(crate) recipients: Vec<Recipient>,
    pub(crate) results: ResultAggregator,
    pub(crate) batch_size: usize,
    pub(crate) started_at: DateTime<Utc>,
}

impl ExecutionSession {
    /// Open a session with one empty result slot per recipient
    pub fn new(asset: AssetDescriptor, recipients: Vec<Recipient>, batch_size: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            results: ResultAggregator::new(recipients.len()),
            asset,
            recipients,
            batch_size: batch_size.max(1),
            started_at: Utc::now(),
        }
    }

    /// Session identifier
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn asset(&self) -> &AssetDescriptor {
        &self.asset
    }

    pub fn recipients(&self) -> &[Recipient] {
        &self.recipients
    }

    pub fn results(&self) -> &ResultAggregator {
        &self.results
    }

    /// Record a failure for every position that has no result yet.
    /// Returns how many were filled.
    pub(crate) fn fail_unresolved(&mut self, message: &str) -> Result<usize, AggregationError> {
        let unresolved = self.results.unresolved();
        for &position in &unresolved {
            let recipient = self.recipients[position].clone();
            let batch_index = position / self.batch_size;
            self.results
                .record(position, TransferResult::failure(recipient, message, batch_index))?;
        }
        Ok(unresolved.len())
    }

    /// Close the session; every position must have a result
    pub(crate) fn finish(
        self,
        status: SessionStatus,
        fault: Option<String>,
    ) -> Result<SessionReport, AggregationError> {
        let summary = self.results.summary();
        let results = self.results.into_results()?;
        Ok(SessionReport {
            session_id: self.id,
            asset: self.asset,
            status,
            results,
            summary,
            fault,
            started_at: self.started_at,
            finished_at: Utc::now(),
        })
    }
}

/// Outcome of a completed session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub asset: AssetDescriptor,
    /// `Finished` or `Cancelled`
    pub status: SessionStatus,
    /// One result per recipient, in input order
    pub results: Vec<TransferResult>,
    pub summary: ResultSummary,
    /// Engine-level fault that ended the batch loop early
    pub fault: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SessionReport {
    /// Number of successful transfers
    pub fn succeeded(&self) -> usize {
        self.summary.succeeded
    }

    /// Number of failed transfers
    pub fn failed(&self) -> usize {
        self.summary.failed
    }

    /// Distinct transaction references in the order they settled
    pub fn references(&self) -> Vec<&TxReference> {
        let mut references: Vec<&TxReference> = Vec::new();
        for reference in self.results.iter().filter_map(|r| r.reference.as_ref()) {
            if !references.contains(&reference) {
                references.push(reference);
            }
        }
        references
    }

    /// Wall-clock time from start to finish
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Pre-flight view of an airdrop; computed without network calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AirdropSummary {
    pub symbol: String,
    pub recipient_count: usize,
    pub total_amount: UiAmount,
    pub available_balance: UiAmount,
    pub batch_count: usize,
    /// Whether the balance covers the requested total
    pub sufficient: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn session(count: usize, batch_size: usize) -> ExecutionSession {
        let recipients = (0..count)
            .map(|i| Recipient::new(format!("addr-{i}"), UiAmount::from(1), i))
            .collect();
        ExecutionSession::new(AssetDescriptor::native(UiAmount::from(100)), recipients, batch_size)
    }

    #[test]
    fn test_fail_unresolved_fills_remaining_positions() {
        let mut session = session(7, 5);
        let reference = TxReference("sig-1".to_string());
        for position in 0..5 {
            let recipient = session.recipients[position].clone();
            session
                .results
                .record(position, TransferResult::success(recipient, reference.clone(), 0))
                .unwrap();
        }

        assert_eq!(session.fail_unresolved("cancelled").unwrap(), 2);
        let report = session.finish(SessionStatus::Cancelled, None).unwrap();

        assert_eq!(report.status, SessionStatus::Cancelled);
        assert_eq!(report.summary.succeeded, 5);
        assert_eq!(report.summary.failed, 2);
        assert_eq!(report.results[6].batch_index, 1);
        assert_eq!(report.results[6].error.as_deref(), Some("cancelled"));
        assert_eq!(report.references(), vec![&reference]);
    }

    #[test]
    fn test_finish_requires_every_result() {
        let session = session(2, 5);
        assert_eq!(
            session.finish(SessionStatus::Finished, None).unwrap_err(),
            AggregationError::Incomplete { missing: 2 }
        );
    }
}
