//! # Airdrop Engine
//!
//! Batched distribution of a native coin or an account-based token from
//! one source account to many recipients on a public ledger.
//!
//! ## Overview
//!
//! The engine validates the requested total against the available
//! balance, splits recipients into fixed-size batches, packs each batch
//! into a single transaction, and records one result per recipient.
//! Batches fail independently; a settled transfer is never re-attempted.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use airdrop::asset::{AssetDescriptor, UiAmount};
//! use airdrop::engine::ExecutionEngine;
//! use airdrop::ledger::{MemoryLedger, MemorySigner, TransactionSigner};
//! use airdrop::recipient::{Address, Recipient};
//!
//! # async fn example() -> airdrop::Result<()> {
//! let ledger = Arc::new(MemoryLedger::new());
//! let signer = Arc::new(MemorySigner::new([9; 32]));
//! ledger.fund_native(signer.address(), 10_000_000_000);
//!
//! let amount: UiAmount = "0.1".parse()?;
//! let recipients: Vec<Recipient> = (0..12u8)
//!     .map(|i| Recipient::new(Address::new([i + 1; 32]).to_string(), amount, i as usize))
//!     .collect();
//!
//! let engine = ExecutionEngine::new(ledger, signer).with_batch_delay(Duration::ZERO);
//! let report = engine
//!     .execute(AssetDescriptor::native(UiAmount::from(10)), recipients)
//!     .await?;
//! assert_eq!(report.references().len(), 3);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`asset`]: asset descriptors and exact decimal amounts
//! - [`recipient`]: recipients and account identifiers
//! - [`ledger`]: the network and signing boundary, plus an in-memory ledger
//! - [`batch`]: validation, planning, transfer building, submission, aggregation
//! - [`engine`]: session orchestration, progress, events and metrics
//! - [`telemetry`]: tracing subscriber setup

#![warn(rustdoc::missing_crate_level_docs)]

use thiserror::Error;

/// Result type for airdrop operations
pub type Result<T> = std::result::Result<T, AirdropError>;

/// Main error type for airdrop operations
#[derive(Error, Debug)]
pub enum AirdropError {
    /// Session-level rejection
    #[error("Execution error: {0}")]
    Execution(#[from] engine::ExecutionError),

    /// Engine configuration error
    #[error("Config error: {0}")]
    Config(#[from] engine::ConfigError),

    /// Malformed amount
    #[error("Amount error: {0}")]
    Amount(#[from] asset::AmountError),

    /// Malformed account identifier
    #[error("Address error: {0}")]
    Address(#[from] recipient::AddressError),

    /// Requested total exceeds the available balance
    #[error("Validation error: {0}")]
    Validation(#[from] batch::ValidationError),

    /// Invalid batch plan
    #[error("Plan error: {0}")]
    Plan(#[from] batch::PlanError),

    /// Transfer could not be built for a recipient
    #[error("Recipient error: {0}")]
    Recipient(#[from] batch::RecipientError),

    /// Batch submission failure
    #[error("Submission error: {0}")]
    Submission(#[from] batch::SubmissionError),

    /// Ledger communication failure
    #[error("Ledger error: {0}")]
    Ledger(#[from] ledger::LedgerError),

    /// Signing refused or unavailable
    #[error("Signer error: {0}")]
    Signer(#[from] ledger::SignerError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Asset descriptors and amounts
pub mod asset;

/// Recipients and addresses
pub mod recipient;

/// Ledger and signer boundary
pub mod ledger;

/// Batch pipeline
pub mod batch;

/// Execution engine module
pub mod engine;

/// Logging setup
pub mod telemetry;
