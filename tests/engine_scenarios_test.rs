//! End-to-end airdrop sessions against the in-memory ledger

use std::sync::Arc;
use std::time::Duration;

use airdrop::asset::{AssetDescriptor, UiAmount};
use airdrop::batch::{Outcome, ValidationError};
use airdrop::engine::{ExecutionEngine, ExecutionError, ExecutionEvent, MetricsCollector, SessionStatus};
use airdrop::ledger::{
    associated_account_address, Cluster, LedgerCallCounts, LedgerFault, MemoryLedger, MemorySigner, TransactionSigner,
};
use airdrop::recipient::{Address, Recipient};
use pretty_assertions::assert_eq;

const MINT: Address = Address::new([200; 32]);
const SOURCE: Address = Address::new([201; 32]);

fn fixture(batch_size: usize) -> (ExecutionEngine, Arc<MemoryLedger>, Arc<MemorySigner>) {
    let ledger = Arc::new(MemoryLedger::new());
    let signer = Arc::new(MemorySigner::new([42; 32]));
    ledger.fund_native(signer.address(), 1_000_000_000_000);

    let engine = ExecutionEngine::new(ledger.clone(), signer.clone())
        .with_batch_size(batch_size)
        .with_batch_delay(Duration::ZERO)
        .with_confirmation_timeout(Some(Duration::from_millis(100)));
    (engine, ledger, signer)
}

fn wallet(i: usize) -> Address {
    Address::new([i as u8 + 1; 32])
}

fn recipients(count: usize, amount: &str) -> Vec<Recipient> {
    (0..count)
        .map(|i| Recipient::new(wallet(i).to_string(), amount.parse().unwrap(), i))
        .collect()
}

fn native(balance: u64) -> AssetDescriptor {
    AssetDescriptor::native(UiAmount::from(balance))
}

#[tokio::test]
async fn test_all_batches_succeed() {
    let (engine, ledger, _) = fixture(5);

    let report = engine
        .execute(native(100), recipients(12, "0.1"))
        .await
        .expect("session should run");

    assert_eq!(report.status, SessionStatus::Finished);
    assert_eq!(report.results.len(), 12);
    assert!(report.results.iter().all(|r| r.is_success()));
    assert_eq!(report.references().len(), 3);
    assert_eq!(report.fault, None);

    let batch_sizes: Vec<usize> = (0..3)
        .map(|b| report.results.iter().filter(|r| r.batch_index == b).count())
        .collect();
    assert_eq!(batch_sizes, vec![5, 5, 2]);
    for batch in report.results.chunks(5) {
        assert!(batch.iter().all(|r| r.reference == batch[0].reference));
    }

    assert_eq!(ledger.transaction_count(), 3);
    assert_eq!(ledger.native_balance(&wallet(11)), 100_000_000);
    assert_eq!(engine.status(), SessionStatus::Finished);
}

#[tokio::test]
async fn test_insufficient_balance_aborts_before_network() {
    let (engine, ledger, signer) = fixture(5);
    let mut list = recipients(6, "100");
    list.push(Recipient::new(wallet(6).to_string(), UiAmount::from(400), 6));

    let err = engine.execute(native(500), list).await.unwrap_err();

    match err {
        ExecutionError::Validation(ValidationError::InsufficientBalance {
            requested,
            available,
            ..
        }) => {
            assert_eq!(requested, UiAmount::from(1000));
            assert_eq!(available, UiAmount::from(500));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(ledger.call_counts().network_calls(), 0);
    assert_eq!(signer.sign_count(), 0);
    assert_eq!(engine.status(), SessionStatus::Idle);
    assert!(engine.history().is_empty());
}

#[tokio::test]
async fn test_confirmation_timeout_fails_only_its_batch() {
    let (engine, ledger, _) = fixture(5);
    ledger.inject_fault(1, LedgerFault::ConfirmationHang);

    let report = engine.execute(native(100), recipients(10, "1")).await.unwrap();

    assert_eq!(report.status, SessionStatus::Finished);
    assert!(report.results[..5].iter().all(|r| r.is_success()));
    let first = report.results[0].reference.clone();
    assert!(report.results[..5].iter().all(|r| r.reference == first));

    for result in &report.results[5..] {
        assert_eq!(result.outcome, Outcome::Failure);
        let detail = result.error.as_deref().unwrap();
        assert!(detail.contains("timed out after 100ms"), "unexpected detail: {detail}");
    }
    assert_eq!(report.summary.succeeded, 5);
    assert_eq!(report.summary.failed, 5);
}

#[tokio::test]
async fn test_missing_source_account_fails_without_network() {
    let (engine, ledger, signer) = fixture(5);
    let asset = AssetDescriptor::token(MINT.to_string(), "USDC", 6, UiAmount::from(1_000), None);

    let report = engine.execute(asset, recipients(3, "1")).await.unwrap();

    assert_eq!(report.status, SessionStatus::Finished);
    for result in &report.results {
        assert_eq!(result.error.as_deref(), Some("missing source account"));
    }
    assert_eq!(ledger.call_counts(), LedgerCallCounts::default());
    assert_eq!(signer.sign_count(), 0);
}

#[tokio::test]
async fn test_token_amounts_truncate_to_base_units() {
    let (engine, ledger, signer) = fixture(5);
    ledger.create_token_account(SOURCE, MINT, signer.address(), 1_000);
    let asset = AssetDescriptor::token(
        MINT.to_string(),
        "PTS",
        2,
        UiAmount::from(10),
        Some(SOURCE.to_string()),
    );
    let list = vec![
        Recipient::new(wallet(0).to_string(), "0.1".parse().unwrap(), 0),
        Recipient::new(wallet(1).to_string(), "0.125".parse().unwrap(), 1),
    ];

    let report = engine.execute(asset, list).await.unwrap();

    assert_eq!(report.summary.succeeded, 2);
    assert_eq!(ledger.token_balance(&associated_account_address(&MINT, &wallet(0))), 10);
    assert_eq!(ledger.token_balance(&associated_account_address(&MINT, &wallet(1))), 12);
    assert_eq!(ledger.token_balance(&SOURCE), 1_000 - 22);
}

#[tokio::test]
async fn test_results_follow_input_order() {
    let (engine, _, signer) = fixture(3);
    signer.decline_call(1, "user rejected the request");
    let mut list = recipients(8, "1");
    list[1] = Recipient::new("not-an-address", UiAmount::from(1), 1);
    list[7] = Recipient::new("0OIl", UiAmount::from(1), 7);

    let report = engine.execute(native(100), list.clone()).await.unwrap();

    let reported: Vec<Recipient> = report.results.iter().map(|r| r.recipient.clone()).collect();
    assert_eq!(reported, list);

    let outcomes: Vec<Outcome> = report.results.iter().map(|r| r.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            Outcome::Success,
            Outcome::Failure,
            Outcome::Success,
            Outcome::Failure,
            Outcome::Failure,
            Outcome::Failure,
            Outcome::Success,
            Outcome::Failure,
        ]
    );
    assert_eq!(
        report.results[3].error.as_deref(),
        Some("Signature request declined: user rejected the request")
    );
    assert_eq!(report.results[0].reference, report.results[2].reference);
}

#[tokio::test]
async fn test_empty_recipient_list_is_rejected() {
    let (engine, _, _) = fixture(5);

    let err = engine.execute(native(1), Vec::new()).await.unwrap_err();

    assert!(matches!(err, ExecutionError::NoRecipients));
    assert_eq!(engine.status(), SessionStatus::Idle);
}

#[tokio::test]
async fn test_second_session_rejected_while_running() {
    let (engine, ledger, _) = fixture(5);
    let engine = engine.with_confirmation_timeout(None);
    ledger.inject_fault(0, LedgerFault::ConfirmationHang);
    let mut hanging = native(100);
    hanging.symbol = "HANG".to_string();
    let metrics = MetricsCollector::new("HANG");

    let mut events = engine.subscribe();
    let mut progress = engine.subscribe_progress();
    let running = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.execute(hanging, recipients(5, "1")).await })
    };
    progress
        .wait_for(|p| p.status == SessionStatus::Running)
        .await
        .unwrap();
    assert_eq!(metrics.active_sessions(), 1);

    let err = engine.execute(native(100), recipients(2, "1")).await.unwrap_err();
    assert!(matches!(err, ExecutionError::AlreadyRunning));

    running.abort();
    assert!(running.await.unwrap_err().is_cancelled());
    assert_eq!(engine.status(), SessionStatus::Cancelled);
    assert_eq!(metrics.active_sessions(), 0);

    let mut finished = None;
    while let Ok(event) = events.try_recv() {
        if let ExecutionEvent::SessionFinished { status, summary, .. } = event {
            finished = Some((status, summary.total, summary.pending()));
        }
    }
    assert_eq!(finished, Some((SessionStatus::Cancelled, 5, 5)));
    assert!(engine.history().is_empty());

    let report = engine.execute(native(100), recipients(2, "1")).await.unwrap();
    assert_eq!(report.summary.succeeded, 2);
}

#[tokio::test(start_paused = true)]
async fn test_no_pause_after_last_batch() {
    let (engine, _, _) = fixture(5);
    let delay = Duration::from_secs(2);
    let engine = engine.with_batch_delay(delay);

    let started = tokio::time::Instant::now();
    let report = engine.execute(native(100), recipients(12, "1")).await.unwrap();

    assert_eq!(report.summary.succeeded, 12);
    assert_eq!(report.references().len(), 3);
    assert_eq!(started.elapsed(), 2 * delay);
}

#[tokio::test]
async fn test_events_and_progress() {
    let (engine, _, _) = fixture(5);
    let mut events = engine.subscribe();

    let report = engine.execute(native(100), recipients(12, "0.5")).await.unwrap();

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    assert_eq!(received.len(), 1 + 3 + 3 + 1);
    assert!(matches!(
        received[0],
        ExecutionEvent::SessionStarted { recipients: 12, batches: 3, .. }
    ));
    let settled: Vec<usize> = received
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::BatchSettled { succeeded, .. } => Some(*succeeded),
            _ => None,
        })
        .collect();
    assert_eq!(settled, vec![5, 5, 2]);
    assert_eq!(
        received.last(),
        Some(&ExecutionEvent::SessionFinished {
            session_id: report.session_id,
            status: SessionStatus::Finished,
            summary: report.summary,
        })
    );

    let progress = engine.progress();
    assert_eq!(progress.session_id, Some(report.session_id));
    assert_eq!(progress.total_batches, 3);
    assert_eq!(progress.completed(), 12);
    assert_eq!(progress.current_batch, None);
}

#[tokio::test]
async fn test_history_and_explorer_links() {
    let (engine, _, _) = fixture(5);
    let engine = engine.with_cluster(Cluster::Devnet);

    engine.execute(native(100), recipients(2, "1")).await.unwrap();
    let second = engine.execute(native(100), recipients(3, "1")).await.unwrap();

    let history = engine.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1], second);

    let url = second.results[0].explorer_url(engine.config().cluster).unwrap();
    assert!(url.starts_with("https://explorer.solana.com/tx/"));
    assert!(url.ends_with("?cluster=devnet"));
}

#[tokio::test]
async fn test_reconciliation_recovers_unconfirmed_batch() {
    let (engine, ledger, _) = fixture(5);
    ledger.inject_fault(0, LedgerFault::Confirmation("node behind".to_string()));
    ledger.inject_fault(1, LedgerFault::Confirmation("node behind".to_string()));

    let without = engine.execute(native(100), recipients(3, "1")).await.unwrap();
    assert_eq!(without.summary.failed, 3);
    assert!(without.results[0].error.as_deref().unwrap().contains("node behind"));

    let engine = engine.with_reconciliation(true);
    let with = engine.execute(native(100), recipients(3, "1")).await.unwrap();
    assert_eq!(with.summary.succeeded, 3);
    assert_eq!(ledger.call_counts().status, 1);
}
