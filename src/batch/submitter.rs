//! Single-transaction submission of a batch

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::ledger::{
    LedgerClient, LedgerError, SignerError, Transaction, TransactionSigner, TransactionStatus,
    TransferInstruction, TxReference,
};

/// Failure anywhere between checkpoint fetch and confirmation.
///
/// The whole batch shares the failure; its `Display` text becomes the
/// error detail of every included recipient.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("failed to fetch checkpoint: {0}")]
    Checkpoint(LedgerError),

    #[error("{0}")]
    Signing(SignerError),

    #[error("broadcast failed: {0}")]
    Broadcast(LedgerError),

    #[error("confirmation of {reference} failed: {source}")]
    Confirmation {
        reference: TxReference,
        source: LedgerError,
    },

    #[error("confirmation of {reference} timed out after {timeout_ms}ms")]
    ConfirmationTimeout { reference: TxReference, timeout_ms: u64 },

    #[error("cancelled")]
    Cancelled,
}

impl SubmissionError {
    /// Whether the transaction was broadcast and only its confirmation is in doubt
    pub fn is_unconfirmed(&self) -> bool {
        matches!(
            self,
            SubmissionError::Confirmation { .. } | SubmissionError::ConfirmationTimeout { .. }
        )
    }
}

/// Packs a batch's instructions into one transaction and sees it through
/// to confirmation
#[derive(Clone)]
pub struct Submitter {
    ledger: Arc<dyn LedgerClient>,
    signer: Arc<dyn TransactionSigner>,
    confirmation_timeout: Option<Duration>,
    reconcile_unconfirmed: bool,
}

impl Submitter {
    pub fn new(ledger: Arc<dyn LedgerClient>, signer: Arc<dyn TransactionSigner>) -> Self {
        Self {
            ledger,
            signer,
            confirmation_timeout: None,
            reconcile_unconfirmed: false,
        }
    }

    /// Bound the wait for confirmation
    pub fn with_confirmation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// Re-query the ledger once before reporting an unconfirmed batch as failed
    pub fn with_reconciliation(mut self, enabled: bool) -> Self {
        self.reconcile_unconfirmed = enabled;
        self
    }

    /// Submit one batch. Cancellation is honoured up to the broadcast;
    /// a broadcast transaction is always followed to confirmation.
    #[instrument(skip(self, instructions, cancel), fields(transfers = instructions.len()))]
    pub async fn submit(
        &self,
        batch_index: usize,
        instructions: Vec<TransferInstruction>,
        cancel: &CancellationToken,
    ) -> Result<TxReference, SubmissionError> {
        if cancel.is_cancelled() {
            return Err(SubmissionError::Cancelled);
        }

        let checkpoint = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SubmissionError::Cancelled),
            checkpoint = self.ledger.latest_checkpoint() => {
                checkpoint.map_err(SubmissionError::Checkpoint)?
            }
        };

        let transaction = Transaction::new(instructions, self.signer.address(), checkpoint);
        let signed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SubmissionError::Cancelled),
            signed = self.signer.sign(transaction) => signed.map_err(SubmissionError::Signing)?,
        };

        if cancel.is_cancelled() {
            return Err(SubmissionError::Cancelled);
        }
        let reference = self
            .ledger
            .broadcast(&signed)
            .await
            .map_err(SubmissionError::Broadcast)?;
        debug!(reference = %reference, "Transaction broadcast");

        match self.confirm(&reference).await {
            Ok(()) => {
                info!(reference = %reference, "Batch confirmed");
                Ok(reference)
            }
            Err(error) if self.reconcile_unconfirmed && error.is_unconfirmed() => {
                self.reconcile(reference, error).await
            }
            Err(error) => Err(error),
        }
    }

    async fn confirm(&self, reference: &TxReference) -> Result<(), SubmissionError> {
        let confirmation = self.ledger.await_confirmation(reference);
        let outcome = match self.confirmation_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, confirmation).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(SubmissionError::ConfirmationTimeout {
                        reference: reference.clone(),
                        timeout_ms: timeout.as_millis() as u64,
                    })
                }
            },
            None => confirmation.await,
        };
        outcome.map_err(|source| SubmissionError::Confirmation {
            reference: reference.clone(),
            source,
        })
    }

    async fn reconcile(
        &self,
        reference: TxReference,
        error: SubmissionError,
    ) -> Result<TxReference, SubmissionError> {
        match self.ledger.transaction_status(&reference).await {
            Ok(Some(TransactionStatus::Confirmed)) => {
                warn!(
                    reference = %reference,
                    error = %error,
                    "Confirmation failed but ledger reports transaction confirmed"
                );
                Ok(reference)
            }
            Ok(status) => {
                debug!(reference = %reference, status = ?status, "Reconciliation did not confirm batch");
                Err(error)
            }
            Err(lookup) => {
                warn!(reference = %reference, error = %lookup, "Reconciliation lookup failed");
                Err(error)
            }
        }
    }
}
