//! Airdrop demo
//!
//! Distributes a token to a dozen wallets on the in-memory ledger. The
//! second batch's confirmation is scripted to fail, so the report shows
//! one batch failing while the others settle.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use airdrop::{
    asset::{AssetDescriptor, UiAmount},
    engine::{gather_metrics, EngineConfig, ExecutionEngine, ExecutionEvent},
    ledger::{Cluster, LedgerFault, MemoryLedger, MemorySigner, TransactionSigner},
    recipient::{Address, Recipient},
    telemetry,
};

const MINT: Address = Address::new([0xA7; 32]);
const TREASURY: Address = Address::new([0xA8; 32]);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing("airdrop=info");

    println!("🪂 Airdrop Engine Demonstration");
    println!("==============================\n");

    let ledger = Arc::new(MemoryLedger::new());
    let signer = Arc::new(MemorySigner::new(*b"demo-treasury-signing-key-000001"));
    ledger.fund_native(signer.address(), 5_000_000_000);
    ledger.create_token_account(TREASURY, MINT, signer.address(), 10_000_000_000);
    ledger.inject_fault(1, LedgerFault::Confirmation("blockhash expired".to_string()));

    let asset = AssetDescriptor::token(
        MINT.to_string(),
        "DEMO",
        6,
        UiAmount::from_base_units(10_000_000_000, 6)?,
        Some(TREASURY.to_string()),
    );

    let mut recipients = Vec::new();
    for i in 0..12u8 {
        let amount: UiAmount = format!("{}.5", 10 + i as u64).parse()?;
        recipients.push(Recipient::new(Address::new([i + 1; 32]).to_string(), amount, i as usize));
    }
    // One malformed wallet is rejected on its own
    recipients[4] = Recipient::new("not-a-wallet", UiAmount::from(1), 4);

    let config = EngineConfig::from_json(
        r#"{ "batch_size": 5, "batch_delay_ms": 250, "cluster": "devnet" }"#,
    )
    .context("demo engine config")?;
    let engine = ExecutionEngine::new(ledger.clone(), signer).with_config(config);

    let summary = engine.preview(&asset, &recipients)?;
    println!("📋 Airdrop Summary");
    println!("   Token:       {}", summary.symbol);
    println!("   Recipients:  {}", summary.recipient_count);
    println!("   Total:       {} {}", summary.total_amount, summary.symbol);
    println!("   Available:   {} {}", summary.available_balance, summary.symbol);
    println!("   Batches:     {}", summary.batch_count);
    println!("   Sufficient:  {}\n", if summary.sufficient { "yes" } else { "no" });

    let mut events = engine.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::BatchStarted { index, total, .. } => {
                    println!("⏳ Processing batch {} of {}", index + 1, total);
                }
                ExecutionEvent::RecipientRejected { position, reason, .. } => {
                    println!("   ⚠️  recipient #{} rejected: {}", position + 1, reason);
                }
                ExecutionEvent::BatchSettled {
                    index,
                    reference: Some(reference),
                    succeeded,
                    ..
                } => {
                    println!("   ✅ batch {} settled {} transfers in {}", index + 1, succeeded, reference);
                }
                ExecutionEvent::BatchSettled {
                    index,
                    error: Some(error),
                    ..
                } => {
                    println!("   ❌ batch {} failed: {}", index + 1, error);
                }
                ExecutionEvent::SessionFinished { .. } => break,
                _ => {}
            }
        }
    });

    let report = engine
        .execute(asset, recipients)
        .await
        .context("airdrop session was rejected")?;
    let _ = tokio::time::timeout(Duration::from_secs(1), printer).await;

    println!("\n📊 Results ({:?})", report.status);
    println!("   Succeeded: {}", report.succeeded());
    println!("   Failed:    {}", report.failed());
    println!("   Transactions: {}", report.references().len());

    for result in &report.results {
        let position = result.recipient.index + 1;
        match result.explorer_url(Cluster::Devnet) {
            Some(url) => println!("   #{:<2} {:>6} DEMO  {}", position, result.recipient.amount, url),
            None => println!(
                "   #{:<2} {:>6} DEMO  failed: {}",
                position,
                result.recipient.amount,
                result.error.as_deref().unwrap_or("unknown")
            ),
        }
    }

    if let Ok(metrics) = gather_metrics() {
        let transfers: Vec<&str> = metrics
            .lines()
            .filter(|line| line.starts_with("airdrop_transfers_total"))
            .collect();
        println!("\n📈 Metrics");
        for line in transfers {
            println!("   {}", line);
        }
    }

    Ok(())
}
