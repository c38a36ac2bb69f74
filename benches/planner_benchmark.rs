use airdrop::asset::{AssetDescriptor, UiAmount};
use airdrop::batch::{BalanceValidator, BatchPlanner, ResultAggregator, TransferResult};
use airdrop::engine::ExecutionEngine;
use airdrop::ledger::{MemoryLedger, MemorySigner, TransactionSigner, TxReference};
use airdrop::recipient::{Address, Recipient};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

fn create_recipients(count: usize) -> Vec<Recipient> {
    (0..count)
        .map(|i| {
            let mut bytes = [0u8; 32];
            bytes[..8].copy_from_slice(&(i as u64 + 1).to_le_bytes());
            Recipient::new(
                Address::new(bytes).to_string(),
                "0.000125".parse().unwrap(),
                i,
            )
        })
        .collect()
}

fn benchmark_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_batches");
    for count in [100usize, 1_000, 10_000] {
        let recipients = create_recipients(count);
        let planner = BatchPlanner::default();
        group.bench_with_input(BenchmarkId::from_parameter(count), &recipients, |b, r| {
            b.iter(|| planner.plan(black_box(r)))
        });
    }
    group.finish();
}

fn benchmark_validation(c: &mut Criterion) {
    let recipients = create_recipients(10_000);
    let asset = AssetDescriptor::native(UiAmount::from(1_000_000));

    c.bench_function("validate_balance_10k", |b| {
        b.iter(|| BalanceValidator::validate(black_box(&asset), black_box(&recipients)))
    });
}

fn benchmark_aggregation(c: &mut Criterion) {
    let recipients = create_recipients(10_000);
    let reference = TxReference("bench".to_string());

    c.bench_function("aggregate_results_10k", |b| {
        b.iter(|| {
            let mut aggregator = ResultAggregator::new(recipients.len());
            for (position, recipient) in recipients.iter().enumerate().rev() {
                let result = TransferResult::success(recipient.clone(), reference.clone(), position / 5);
                aggregator.record(position, result).unwrap();
            }
            aggregator.into_results()
        })
    });
}

fn benchmark_session(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let recipients = create_recipients(100);

    c.bench_function("execute_session_100", |b| {
        b.iter(|| {
            rt.block_on(async {
                let ledger = Arc::new(MemoryLedger::new());
                let signer = Arc::new(MemorySigner::new([1; 32]));
                ledger.fund_native(signer.address(), u64::MAX / 2);

                ExecutionEngine::new(ledger, signer)
                    .with_batch_delay(Duration::ZERO)
                    .execute(AssetDescriptor::native(UiAmount::from(1_000)), recipients.clone())
                    .await
            })
        })
    });
}

criterion_group!(
    benches,
    benchmark_planning,
    benchmark_validation,
    benchmark_aggregation,
    benchmark_session
);

criterion_main!(benches);
