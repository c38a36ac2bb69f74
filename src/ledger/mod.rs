//! Ledger boundary
//!
//! The engine talks to the network and to key custody only through the
//! [`LedgerClient`] and [`TransactionSigner`] traits defined here. The
//! types that cross that boundary (instructions, transactions, references)
//! live here as well.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::recipient::Address;

pub mod derive;
pub mod memory;

pub use derive::associated_account_address;
pub use memory::{LedgerCallCounts, LedgerFault, MemoryLedger, MemorySigner};

/// Errors reported by a ledger client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Transaction rejected: {0}")]
    Rejected(String),

    #[error("Confirmation failed: {0}")]
    Confirmation(String),

    #[error("Transaction encoding failed: {0}")]
    Encoding(String),
}

/// Errors reported by the signing collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("Signature request declined: {0}")]
    Declined(String),

    #[error("Signer unavailable: {0}")]
    Unavailable(String),
}

/// Recent ledger state marker a transaction must reference to be valid
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checkpoint(pub String);

/// Reference to a broadcast transaction, used for lookup and audit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxReference(pub String);

impl fmt::Display for TxReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single transfer, one variant per asset kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferInstruction {
    /// Direct value transfer of the native coin
    Native {
        from: Address,
        to: Address,
        lamports: u64,
    },
    /// Token transfer between two token accounts, authorised by `owner`
    Token {
        source: Address,
        destination: Address,
        owner: Address,
        amount: u64,
    },
}

impl TransferInstruction {
    /// Account that must sign for this instruction
    pub fn authority(&self) -> &Address {
        match self {
            TransferInstruction::Native { from, .. } => from,
            TransferInstruction::Token { owner, .. } => owner,
        }
    }
}

/// Unsigned composite transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub instructions: Vec<TransferInstruction>,
    pub fee_payer: Address,
    pub recent_checkpoint: Checkpoint,
}

impl Transaction {
    /// Create an unsigned transaction
    pub fn new(
        instructions: Vec<TransferInstruction>,
        fee_payer: Address,
        recent_checkpoint: Checkpoint,
    ) -> Self {
        Self {
            instructions,
            fee_payer,
            recent_checkpoint,
        }
    }

    /// Bytes covered by the signature
    pub fn message_bytes(&self) -> Result<Vec<u8>, LedgerError> {
        bincode::serialize(self).map_err(|e| LedgerError::Encoding(e.to_string()))
    }

    /// Digest of the message, handy for logging
    pub fn message_digest(&self) -> Result<String, LedgerError> {
        let digest = Sha256::digest(self.message_bytes()?);
        Ok(bs58::encode(digest).into_string())
    }
}

/// Transaction carrying the fee payer's signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    pub signer: Address,
    pub signature: Vec<u8>,
}

impl SignedTransaction {
    /// The ledger identifies a transaction by its first signature
    pub fn reference(&self) -> TxReference {
        TxReference(bs58::encode(&self.signature).into_string())
    }
}

/// Status of a transaction as reported by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Failed(String),
}

/// Network client used by the engine
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Fetch a recent checkpoint for transaction construction
    async fn latest_checkpoint(&self) -> Result<Checkpoint, LedgerError>;

    /// Broadcast a signed transaction
    async fn broadcast(&self, transaction: &SignedTransaction) -> Result<TxReference, LedgerError>;

    /// Wait until the ledger reports the transaction as durably accepted
    async fn await_confirmation(&self, reference: &TxReference) -> Result<(), LedgerError>;

    /// Look up a transaction by reference; `None` if the ledger never saw it
    async fn transaction_status(
        &self,
        reference: &TxReference,
    ) -> Result<Option<TransactionStatus>, LedgerError>;

    /// Balance of an account in smallest units
    async fn account_balance(&self, account: &Address) -> Result<u64, LedgerError>;

    /// Associated account holding `asset` on behalf of `owner`
    fn derive_associated_account(&self, asset: &Address, owner: &Address) -> Address {
        associated_account_address(asset, owner)
    }
}

/// Key custody collaborator that signs on behalf of the source account
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Account this signer signs for; it pays fees and authorises transfers
    fn address(&self) -> Address;

    /// Sign a transaction, or fail if the key holder declines
    async fn sign(&self, transaction: Transaction) -> Result<SignedTransaction, SignerError>;
}

/// Ledger cluster, used for explorer links
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cluster {
    #[default]
    Mainnet,
    Devnet,
    Testnet,
}

impl Cluster {
    fn as_str(&self) -> &'static str {
        match self {
            Cluster::Mainnet => "mainnet",
            Cluster::Devnet => "devnet",
            Cluster::Testnet => "testnet",
        }
    }

    /// Explorer page for a transaction on this cluster
    pub fn explorer_tx_url(&self, reference: &TxReference) -> String {
        format!(
            "https://explorer.solana.com/tx/{}?cluster={}",
            reference,
            self.as_str()
        )
    }
}
