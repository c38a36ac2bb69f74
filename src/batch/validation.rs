//! Pre-flight balance check

use thiserror::Error;

use crate::asset::{AssetDescriptor, UiAmount};
use crate::recipient::Recipient;

/// Session-level validation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Insufficient balance: {requested} {symbol} requested, {available} {symbol} available")]
    InsufficientBalance {
        symbol: String,
        requested: UiAmount,
        available: UiAmount,
    },

    #[error("Requested total overflows")]
    TotalOverflow,
}

/// Checks that the source can cover every requested amount.
///
/// Pure and synchronous; it runs once before any network interaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct BalanceValidator;

impl BalanceValidator {
    /// Exact sum of requested amounts
    pub fn total_requested(recipients: &[Recipient]) -> Result<UiAmount, ValidationError> {
        recipients.iter().try_fold(UiAmount::ZERO, |total, recipient| {
            total
                .checked_add(&recipient.amount)
                .ok_or(ValidationError::TotalOverflow)
        })
    }

    /// Returns the requested total when it fits within the available balance
    pub fn validate(
        asset: &AssetDescriptor,
        recipients: &[Recipient],
    ) -> Result<UiAmount, ValidationError> {
        let requested = Self::total_requested(recipients)?;
        if requested > asset.balance {
            return Err(ValidationError::InsufficientBalance {
                symbol: asset.symbol.clone(),
                requested,
                available: asset.balance,
            });
        }
        Ok(requested)
    }
}
