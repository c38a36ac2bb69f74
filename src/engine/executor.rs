//! Airdrop execution engine
//!
//! Drives one session at a time through balance validation, batch
//! planning and the sequential batch loop. Every recipient of a session
//! that passes validation ends with exactly one recorded result, even
//! when the loop is cancelled or hits an engine fault.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::RwLock;
use smallvec::SmallVec;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::asset::AssetDescriptor;
use crate::batch::{
    AggregationError, BalanceValidator, BatchPlanner, Outcome, PlanError, ResultAggregator,
    ResultSummary, SubmissionError, Submitter, TransferBatch, TransferBuilder, TransferResult,
    ValidationError, DEFAULT_BATCH_SIZE,
};
use crate::ledger::{Cluster, LedgerClient, TransactionSigner};
use crate::recipient::Recipient;

use super::config::EngineConfig;
use super::events::{ExecutionEvent, SessionProgress, SessionStatus};
use super::metrics::{MetricsCollector, Timer};
use super::session::{AirdropSummary, ExecutionSession, SessionReport};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Session-level rejections. A rejected session records no results.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("An airdrop session is already running")]
    AlreadyRunning,

    #[error("No recipients to process")]
    NoRecipients,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("Result aggregation failed: {0}")]
    Aggregation(#[from] AggregationError),
}

/// How the batch loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    Completed,
    Cancelled,
}

/// Per-session collaborators shared by every batch
struct RunContext<'a> {
    session_id: Uuid,
    total_batches: usize,
    submitter: Submitter,
    metrics: MetricsCollector,
    cancel: &'a CancellationToken,
}

/// Closes out the session if the execute future is dropped mid-run.
///
/// The status becomes `Cancelled` and, once the batch loop has started,
/// the active-session gauge is released and `SessionFinished` is emitted
/// with the counts recorded so far. No report reaches the history since
/// the unresolved recipients never get a result.
struct ActiveSessionGuard<'a> {
    progress: &'a watch::Sender<SessionProgress>,
    events: &'a broadcast::Sender<ExecutionEvent>,
    running: Option<(Uuid, MetricsCollector)>,
    armed: bool,
}

impl<'a> ActiveSessionGuard<'a> {
    fn new(
        progress: &'a watch::Sender<SessionProgress>,
        events: &'a broadcast::Sender<ExecutionEvent>,
    ) -> Self {
        Self {
            progress,
            events,
            running: None,
            armed: true,
        }
    }

    fn running(&mut self, session_id: Uuid, metrics: MetricsCollector) {
        self.running = Some((session_id, metrics));
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ActiveSessionGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.progress.send_modify(|progress| {
            progress.status = SessionStatus::Cancelled;
            progress.current_batch = None;
        });

        if let Some((session_id, metrics)) = self.running.take() {
            let summary = {
                let progress = self.progress.borrow();
                ResultSummary {
                    total: progress.total_recipients,
                    succeeded: progress.succeeded,
                    failed: progress.failed,
                }
            };
            warn!(session = %session_id, pending = summary.pending(), "Airdrop dropped mid-run");
            metrics.record_session_end(SessionStatus::Cancelled.as_str());
            let _ = self.events.send(ExecutionEvent::SessionFinished {
                session_id,
                status: SessionStatus::Cancelled,
                summary,
            });
        }
    }
}

/// Batched transfer engine.
///
/// Clones share the session guard, progress channel, event channel and
/// history, so at most one session runs across all clones.
#[derive(Clone)]
pub struct ExecutionEngine {
    ledger: Arc<dyn LedgerClient>,
    signer: Arc<dyn TransactionSigner>,
    config: EngineConfig,
    progress: Arc<watch::Sender<SessionProgress>>,
    events: broadcast::Sender<ExecutionEvent>,
    history: Arc<RwLock<Vec<SessionReport>>>,
}

impl ExecutionEngine {
    /// Create an engine with the default configuration
    pub fn new(ledger: Arc<dyn LedgerClient>, signer: Arc<dyn TransactionSigner>) -> Self {
        let (progress, _) = watch::channel(SessionProgress::default());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            ledger,
            signer,
            config: EngineConfig::default(),
            progress: Arc::new(progress),
            events,
            history: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set recipients per transaction
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    /// Set the pause between batches
    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.config = self.config.with_batch_delay(delay);
        self
    }

    /// Bound the confirmation wait; `None` waits indefinitely
    pub fn with_confirmation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config = self.config.with_confirmation_timeout(timeout);
        self
    }

    /// Re-query unconfirmed batches before failing them
    pub fn with_reconciliation(mut self, enabled: bool) -> Self {
        self.config.reconcile_unconfirmed = enabled;
        self
    }

    /// Set the cluster used for explorer links
    pub fn with_cluster(mut self, cluster: Cluster) -> Self {
        self.config.cluster = cluster;
        self
    }

    /// Current configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current session status
    pub fn status(&self) -> SessionStatus {
        self.progress.borrow().status
    }

    /// Latest progress snapshot
    pub fn progress(&self) -> SessionProgress {
        self.progress.borrow().clone()
    }

    /// Watch progress snapshots
    pub fn subscribe_progress(&self) -> watch::Receiver<SessionProgress> {
        self.progress.subscribe()
    }

    /// Subscribe to execution events
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.events.subscribe()
    }

    /// Reports of every session that reached a terminal status
    pub fn history(&self) -> Vec<SessionReport> {
        self.history.read().clone()
    }

    /// Totals and batch count for a prospective airdrop
    pub fn preview(
        &self,
        asset: &AssetDescriptor,
        recipients: &[Recipient],
    ) -> Result<AirdropSummary, ExecutionError> {
        let planner = BatchPlanner::new(self.config.batch_size)?;
        let total_amount = BalanceValidator::total_requested(recipients)?;
        Ok(AirdropSummary {
            symbol: asset.symbol.clone(),
            recipient_count: recipients.len(),
            total_amount,
            available_balance: asset.balance,
            batch_count: planner.batch_count(recipients.len()),
            sufficient: total_amount <= asset.balance,
        })
    }

    /// Run an airdrop to completion
    pub async fn execute(
        &self,
        asset: AssetDescriptor,
        recipients: Vec<Recipient>,
    ) -> Result<SessionReport, ExecutionError> {
        self.execute_with_cancellation(asset, recipients, CancellationToken::new())
            .await
    }

    /// Run an airdrop that stops early once `cancel` fires.
    ///
    /// A broadcast transaction is still followed to confirmation; every
    /// recipient left without a result is recorded as cancelled.
    #[instrument(skip_all, fields(asset = %asset.symbol, recipients = recipients.len()))]
    pub async fn execute_with_cancellation(
        &self,
        asset: AssetDescriptor,
        recipients: Vec<Recipient>,
        cancel: CancellationToken,
    ) -> Result<SessionReport, ExecutionError> {
        self.begin()?;
        let mut guard = ActiveSessionGuard::new(&self.progress, &self.events);
        let metrics = MetricsCollector::new(asset.symbol.clone());

        let batches = match self.prepare(&asset, &recipients) {
            Ok(batches) => batches,
            Err(error) => {
                warn!(error = %error, "Airdrop rejected before any transfer");
                metrics.record_session_rejected();
                self.progress.send_modify(|progress| {
                    progress.status = SessionStatus::Idle;
                });
                guard.disarm();
                return Err(error);
            }
        };

        let mut session = ExecutionSession::new(asset, recipients, self.config.batch_size);
        let session_id = session.id();
        let total_recipients = session.recipients().len();
        let total_batches = batches.len();

        self.progress.send_modify(|progress| {
            progress.session_id = Some(session_id);
            progress.status = SessionStatus::Running;
            progress.total_recipients = total_recipients;
            progress.total_batches = total_batches;
        });
        self.emit(ExecutionEvent::SessionStarted {
            session_id,
            recipients: total_recipients,
            batches: total_batches,
        });
        metrics.record_session_start();
        guard.running(session_id, metrics.clone());
        info!(
            session = %session_id,
            recipients = total_recipients,
            batches = total_batches,
            "Starting airdrop"
        );

        let ctx = RunContext {
            session_id,
            total_batches,
            submitter: Submitter::new(self.ledger.clone(), self.signer.clone())
                .with_confirmation_timeout(self.config.confirmation_timeout())
                .with_reconciliation(self.config.reconcile_unconfirmed),
            metrics,
            cancel: &cancel,
        };

        let run = AssertUnwindSafe(self.run_batches(&mut session, &batches, &ctx))
            .catch_unwind()
            .await;
        let (status, fault) = match run {
            Ok(Ok(LoopExit::Completed)) => (SessionStatus::Finished, None),
            Ok(Ok(LoopExit::Cancelled)) => (SessionStatus::Cancelled, None),
            Ok(Err(error)) => (SessionStatus::Finished, Some(error.to_string())),
            Err(payload) => (SessionStatus::Finished, Some(panic_message(payload))),
        };

        if let Some(fault) = &fault {
            error!(session = %session_id, fault = %fault, "Batch loop terminated by engine fault");
        }
        let unresolved_detail = match (&fault, status) {
            (Some(fault), _) => fault.as_str(),
            (None, SessionStatus::Cancelled) => "cancelled",
            (None, _) => "transfer was never attempted",
        };
        let filled = session.fail_unresolved(unresolved_detail)?;
        for _ in 0..filled {
            ctx.metrics.record_transfer(Outcome::Failure);
        }

        let report = session.finish(status, fault)?;
        let summary = report.summary;

        self.history.write().push(report.clone());
        ctx.metrics.record_session_end(status.as_str());
        self.progress.send_modify(|progress| {
            progress.status = status;
            progress.current_batch = None;
            progress.succeeded = summary.succeeded;
            progress.failed = summary.failed;
        });
        guard.disarm();
        self.emit(ExecutionEvent::SessionFinished {
            session_id,
            status,
            summary,
        });
        info!(
            session = %session_id,
            status = status.as_str(),
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Airdrop finished"
        );

        Ok(report)
    }

    /// Claim the engine for a new session
    fn begin(&self) -> Result<(), ExecutionError> {
        let claimed = self.progress.send_if_modified(|progress| {
            if progress.status.is_active() {
                return false;
            }
            *progress = SessionProgress {
                status: SessionStatus::Validating,
                ..SessionProgress::default()
            };
            true
        });

        if claimed {
            Ok(())
        } else {
            warn!("Rejected start while a session is active");
            Err(ExecutionError::AlreadyRunning)
        }
    }

    fn prepare(
        &self,
        asset: &AssetDescriptor,
        recipients: &[Recipient],
    ) -> Result<Vec<TransferBatch>, ExecutionError> {
        if recipients.is_empty() {
            return Err(ExecutionError::NoRecipients);
        }
        let planner = BatchPlanner::new(self.config.batch_size)?;
        let total = BalanceValidator::validate(asset, recipients)?;
        debug!(total = %total, available = %asset.balance, "Balance check passed");
        Ok(planner.plan(recipients))
    }

    async fn run_batches(
        &self,
        session: &mut ExecutionSession,
        batches: &[TransferBatch],
        ctx: &RunContext<'_>,
    ) -> Result<LoopExit, AggregationError> {
        let delay = self.config.batch_delay();
        let mut position = 0;

        for batch in batches {
            if ctx.cancel.is_cancelled() {
                info!(batch = batch.index + 1, "Cancellation requested before batch");
                return Ok(LoopExit::Cancelled);
            }

            let cancelled = self.process_batch(session, batch, position, ctx).await?;
            position += batch.len();
            if cancelled {
                return Ok(LoopExit::Cancelled);
            }

            if batch.index + 1 < batches.len() && !delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => {
                        info!("Cancellation requested during inter-batch pause");
                        return Ok(LoopExit::Cancelled);
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        Ok(LoopExit::Completed)
    }

    /// Build, submit and record one batch. Returns whether the submission
    /// was cancelled.
    #[instrument(skip_all, fields(session = %ctx.session_id, batch = batch.index + 1))]
    async fn process_batch(
        &self,
        session: &mut ExecutionSession,
        batch: &TransferBatch,
        first_position: usize,
        ctx: &RunContext<'_>,
    ) -> Result<bool, AggregationError> {
        info!(
            batch = batch.index + 1,
            size = batch.len(),
            "Processing batch {} of {}",
            batch.index + 1,
            ctx.total_batches
        );
        self.progress.send_modify(|progress| {
            progress.current_batch = Some(batch.index);
        });
        self.emit(ExecutionEvent::BatchStarted {
            session_id: ctx.session_id,
            index: batch.index,
            total: ctx.total_batches,
            size: batch.len(),
        });

        let builder = TransferBuilder::new(&session.asset, self.signer.address(), self.ledger.as_ref());
        let mut included: SmallVec<[(usize, &Recipient); DEFAULT_BATCH_SIZE]> = SmallVec::new();
        let mut instructions = Vec::with_capacity(batch.len());

        for (offset, recipient) in batch.recipients.iter().enumerate() {
            let position = first_position + offset;
            match builder.build(recipient) {
                Ok(instruction) => {
                    included.push((position, recipient));
                    instructions.push(instruction);
                }
                Err(error) => {
                    warn!(
                        position,
                        address = %recipient.address,
                        code = error.code(),
                        error = %error,
                        "Recipient excluded from batch"
                    );
                    let result = TransferResult::failure(recipient.clone(), error.to_string(), batch.index);
                    ctx.metrics.record_transfer(result.outcome);
                    session.results.record(position, result)?;
                    self.publish_counts(&session.results);
                    self.emit(ExecutionEvent::RecipientRejected {
                        session_id: ctx.session_id,
                        position,
                        code: error.code().to_string(),
                        reason: error.to_string(),
                    });
                }
            }
        }

        if instructions.is_empty() {
            debug!(batch = batch.index + 1, "No transfers left to submit");
            self.emit(ExecutionEvent::BatchSettled {
                session_id: ctx.session_id,
                index: batch.index,
                reference: None,
                succeeded: 0,
                failed: batch.len(),
                error: None,
            });
            return Ok(false);
        }

        let timer = Timer::start();
        let outcome = ctx.submitter.submit(batch.index, instructions, ctx.cancel).await;
        let cancelled = matches!(outcome, Err(SubmissionError::Cancelled));

        let (reference, detail) = match outcome {
            Ok(reference) => {
                ctx.metrics.record_batch("confirmed", timer.elapsed_secs());
                (Some(reference), None)
            }
            Err(error) => {
                let label = if cancelled { "cancelled" } else { "failed" };
                ctx.metrics.record_batch(label, timer.elapsed_secs());
                error!(batch = batch.index + 1, error = %error, "Batch submission failed");
                (None, Some(error.to_string()))
            }
        };

        for (position, recipient) in &included {
            let recipient = (*recipient).clone();
            let result = match (&reference, &detail) {
                (Some(reference), _) => TransferResult::success(recipient, reference.clone(), batch.index),
                (None, detail) => TransferResult::failure(
                    recipient,
                    detail.clone().unwrap_or_default(),
                    batch.index,
                ),
            };
            ctx.metrics.record_transfer(result.outcome);
            session.results.record(*position, result)?;
        }
        self.publish_counts(&session.results);

        let (succeeded, failed) = if reference.is_some() {
            (included.len(), batch.len() - included.len())
        } else {
            (0, batch.len())
        };
        self.emit(ExecutionEvent::BatchSettled {
            session_id: ctx.session_id,
            index: batch.index,
            reference,
            succeeded,
            failed,
            error: detail,
        });

        Ok(cancelled)
    }

    fn publish_counts(&self, results: &ResultAggregator) {
        let (succeeded, failed) = (results.succeeded(), results.failed());
        self.progress.send_modify(|progress| {
            progress.succeeded = succeeded;
            progress.failed = failed;
        });
    }

    fn emit(&self, event: ExecutionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("engine fault: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("engine fault: {}", message)
    } else {
        "engine fault: unknown panic".to_string()
    }
}
