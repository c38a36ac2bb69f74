//! In-memory ledger and signer
//!
//! `MemoryLedger` applies native and token transfers atomically per
//! transaction and can be scripted to fail individual submissions, which
//! makes it the backing store for tests and the demo.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{
    associated_account_address, Checkpoint, LedgerClient, LedgerError, SignedTransaction,
    SignerError, Transaction, TransactionSigner, TransactionStatus, TransferInstruction,
    TxReference,
};
use crate::recipient::{Address, ADDRESS_LEN};

/// Scripted failure for one submission attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerFault {
    /// Checkpoint fetch fails
    Checkpoint(String),
    /// Broadcast is rejected before anything is applied
    Broadcast(String),
    /// The transaction lands but confirmation reports an error
    Confirmation(String),
    /// The transaction lands but confirmation never resolves
    ConfirmationHang,
}

/// Number of calls the ledger has served, per operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerCallCounts {
    pub checkpoint: usize,
    pub broadcast: usize,
    pub confirmation: usize,
    pub status: usize,
    pub balance: usize,
    pub derive: usize,
}

impl LedgerCallCounts {
    /// Total network round trips (derivation is local and not counted)
    pub fn network_calls(&self) -> usize {
        self.checkpoint + self.broadcast + self.confirmation + self.status + self.balance
    }
}

#[derive(Debug, Clone)]
struct TokenAccount {
    mint: Address,
    owner: Option<Address>,
    amount: u64,
}

#[derive(Debug, Clone, Default)]
struct Balances {
    native: HashMap<Address, u64>,
    tokens: HashMap<Address, TokenAccount>,
}

impl Balances {
    fn apply(&mut self, instruction: &TransferInstruction) -> Result<(), LedgerError> {
        match instruction {
            TransferInstruction::Native { from, to, lamports } => {
                let available = self.native.get(from).copied().unwrap_or(0);
                let remaining = available.checked_sub(*lamports).ok_or_else(|| {
                    LedgerError::Rejected(format!("insufficient lamports in {from}"))
                })?;
                self.native.insert(*from, remaining);

                let credited = self.native.entry(*to).or_insert(0);
                *credited = credited
                    .checked_add(*lamports)
                    .ok_or_else(|| LedgerError::Rejected(format!("balance overflow in {to}")))?;
            }
            TransferInstruction::Token {
                source,
                destination,
                owner,
                amount,
            } => {
                let mint = {
                    let account = self.tokens.get_mut(source).ok_or_else(|| {
                        LedgerError::Rejected(format!("token account {source} not found"))
                    })?;
                    if account.owner != Some(*owner) {
                        return Err(LedgerError::Rejected(format!(
                            "{owner} is not the owner of {source}"
                        )));
                    }
                    account.amount = account.amount.checked_sub(*amount).ok_or_else(|| {
                        LedgerError::Rejected(format!("insufficient funds in {source}"))
                    })?;
                    account.mint
                };

                let target = self.tokens.entry(*destination).or_insert(TokenAccount {
                    mint,
                    owner: None,
                    amount: 0,
                });
                if target.mint != mint {
                    return Err(LedgerError::Rejected(format!(
                        "mint mismatch for {destination}"
                    )));
                }
                target.amount = target.amount.checked_add(*amount).ok_or_else(|| {
                    LedgerError::Rejected(format!("balance overflow in {destination}"))
                })?;
            }
        }
        Ok(())
    }
}

/// Deterministic ledger kept entirely in memory
#[derive(Debug, Default)]
pub struct MemoryLedger {
    balances: RwLock<Balances>,
    transactions: DashMap<TxReference, TransactionStatus>,
    checkpoints: DashMap<Checkpoint, u64>,
    faults: Mutex<HashMap<usize, LedgerFault>>,
    slot: AtomicU64,
    attempts: AtomicUsize,
    counts: Mutex<LedgerCallCounts>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit native balance to an account
    pub fn fund_native(&self, account: Address, lamports: u64) {
        let mut balances = self.balances.write();
        let balance = balances.native.entry(account).or_insert(0);
        *balance = balance.saturating_add(lamports);
    }

    /// Create (or replace) a token account
    pub fn create_token_account(&self, account: Address, mint: Address, owner: Address, amount: u64) {
        self.balances.write().tokens.insert(
            account,
            TokenAccount {
                mint,
                owner: Some(owner),
                amount,
            },
        );
    }

    /// Native balance of an account
    pub fn native_balance(&self, account: &Address) -> u64 {
        self.balances.read().native.get(account).copied().unwrap_or(0)
    }

    /// Token balance of a token account
    pub fn token_balance(&self, account: &Address) -> u64 {
        self.balances
            .read()
            .tokens
            .get(account)
            .map(|a| a.amount)
            .unwrap_or(0)
    }

    /// Fail the given submission attempt (zero-based, counted by checkpoint fetches)
    pub fn inject_fault(&self, attempt: usize, fault: LedgerFault) {
        self.faults.lock().insert(attempt, fault);
    }

    /// Calls served so far
    pub fn call_counts(&self) -> LedgerCallCounts {
        *self.counts.lock()
    }

    /// Number of transactions that landed
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    fn current_fault(&self) -> Option<LedgerFault> {
        let attempt = self.attempts.load(Ordering::SeqCst).checked_sub(1)?;
        self.faults.lock().get(&attempt).cloned()
    }

    fn verify(&self, signed: &SignedTransaction) -> Result<(), LedgerError> {
        let tx = &signed.transaction;
        if signed.signer != tx.fee_payer {
            return Err(LedgerError::Rejected(
                "signature does not belong to the fee payer".to_string(),
            ));
        }
        if signed.signature.len() != 64 {
            return Err(LedgerError::Rejected("malformed signature".to_string()));
        }
        if !self.checkpoints.contains_key(&tx.recent_checkpoint) {
            return Err(LedgerError::Rejected("checkpoint not found".to_string()));
        }
        if let Some(unsigned) = tx
            .instructions
            .iter()
            .find(|ix| ix.authority() != &signed.signer)
        {
            return Err(LedgerError::Rejected(format!(
                "missing signature for {}",
                unsigned.authority()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn latest_checkpoint(&self) -> Result<Checkpoint, LedgerError> {
        self.counts.lock().checkpoint += 1;
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(LedgerFault::Checkpoint(message)) = self.current_fault() {
            return Err(LedgerError::Rpc(message));
        }

        let slot = self.slot.fetch_add(1, Ordering::SeqCst) + 1;
        let digest = Sha256::digest(format!("checkpoint-{slot}").as_bytes());
        let checkpoint = Checkpoint(bs58::encode(digest).into_string());
        self.checkpoints.insert(checkpoint.clone(), slot);
        Ok(checkpoint)
    }

    async fn broadcast(&self, signed: &SignedTransaction) -> Result<TxReference, LedgerError> {
        self.counts.lock().broadcast += 1;
        if let Some(LedgerFault::Broadcast(message)) = self.current_fault() {
            return Err(LedgerError::Rejected(message));
        }
        self.verify(signed)?;

        let reference = signed.reference();
        if self.transactions.contains_key(&reference) {
            return Err(LedgerError::Rejected("transaction already processed".to_string()));
        }

        {
            let mut balances = self.balances.write();
            let mut staged = balances.clone();
            for instruction in &signed.transaction.instructions {
                staged.apply(instruction)?;
            }
            *balances = staged;
        }

        debug!(
            reference = %reference,
            instructions = signed.transaction.instructions.len(),
            "Transaction applied"
        );
        self.transactions
            .insert(reference.clone(), TransactionStatus::Confirmed);
        Ok(reference)
    }

    async fn await_confirmation(&self, reference: &TxReference) -> Result<(), LedgerError> {
        self.counts.lock().confirmation += 1;
        match self.current_fault() {
            Some(LedgerFault::Confirmation(message)) => {
                return Err(LedgerError::Confirmation(message));
            }
            Some(LedgerFault::ConfirmationHang) => {
                return std::future::pending::<Result<(), LedgerError>>().await;
            }
            _ => {}
        }

        match self.transactions.get(reference).map(|e| e.value().clone()) {
            Some(TransactionStatus::Confirmed) => Ok(()),
            Some(TransactionStatus::Failed(message)) => Err(LedgerError::Confirmation(message)),
            Some(TransactionStatus::Pending) => Err(LedgerError::Confirmation(format!(
                "transaction {reference} still pending"
            ))),
            None => Err(LedgerError::Confirmation(format!(
                "transaction {reference} not found"
            ))),
        }
    }

    async fn transaction_status(
        &self,
        reference: &TxReference,
    ) -> Result<Option<TransactionStatus>, LedgerError> {
        self.counts.lock().status += 1;
        Ok(self.transactions.get(reference).map(|e| e.value().clone()))
    }

    async fn account_balance(&self, account: &Address) -> Result<u64, LedgerError> {
        self.counts.lock().balance += 1;
        let balances = self.balances.read();
        let balance = balances
            .native
            .get(account)
            .copied()
            .or_else(|| balances.tokens.get(account).map(|a| a.amount))
            .unwrap_or(0);
        Ok(balance)
    }

    fn derive_associated_account(&self, asset: &Address, owner: &Address) -> Address {
        self.counts.lock().derive += 1;
        associated_account_address(asset, owner)
    }
}

/// Signer holding a key seed in memory
#[derive(Debug)]
pub struct MemorySigner {
    seed: [u8; 32],
    address: Address,
    declined: Mutex<HashMap<usize, String>>,
    calls: AtomicUsize,
}

impl MemorySigner {
    pub fn new(seed: [u8; 32]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"memory-signer");
        hasher.update(seed);
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(&hasher.finalize());

        Self {
            seed,
            address: Address::new(bytes),
            declined: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Decline the given signing request (zero-based)
    pub fn decline_call(&self, call: usize, reason: impl Into<String>) {
        self.declined.lock().insert(call, reason.into());
    }

    /// Number of signing requests received
    pub fn sign_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionSigner for MemorySigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign(&self, transaction: Transaction) -> Result<SignedTransaction, SignerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.declined.lock().get(&call).cloned() {
            return Err(SignerError::Declined(reason));
        }
        if transaction.fee_payer != self.address {
            return Err(SignerError::Declined(format!(
                "fee payer {} is not {}",
                transaction.fee_payer, self.address
            )));
        }

        let message = transaction
            .message_bytes()
            .map_err(|e| SignerError::Unavailable(e.to_string()))?;
        let mut signature = Vec::with_capacity(64);
        signature.extend_from_slice(
            &Sha256::new()
                .chain_update(self.seed)
                .chain_update(&message)
                .finalize(),
        );
        signature.extend_from_slice(
            &Sha256::new()
                .chain_update(&message)
                .chain_update(self.seed)
                .finalize(),
        );

        Ok(SignedTransaction {
            transaction,
            signer: self.address,
            signature,
        })
    }
}
