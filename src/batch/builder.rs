//! Conversion of recipients into ledger transfer instructions

use thiserror::Error;

use crate::asset::{AssetDescriptor, AssetKind, UiAmount};
use crate::ledger::{LedgerClient, TransferInstruction};
use crate::recipient::{Address, AddressError, Recipient};

/// Reasons a single recipient is excluded from its batch
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecipientError {
    #[error("missing source account")]
    MissingSourceAccount,

    #[error("invalid recipient address: {0}")]
    InvalidAddress(#[from] AddressError),

    #[error("invalid asset id: {0}")]
    InvalidAsset(AddressError),

    #[error("invalid source account: {0}")]
    InvalidSourceAccount(AddressError),

    #[error("amount {amount} exceeds the {decimals}-decimal base unit range")]
    AmountOverflow { amount: UiAmount, decimals: u8 },
}

impl RecipientError {
    /// Stable reason code for reporting
    pub fn code(&self) -> &'static str {
        match self {
            RecipientError::MissingSourceAccount => "missing_source_account",
            RecipientError::InvalidAddress(_) => "invalid_address",
            RecipientError::InvalidAsset(_) => "invalid_asset",
            RecipientError::InvalidSourceAccount(_) => "invalid_source_account",
            RecipientError::AmountOverflow { .. } => "amount_overflow",
        }
    }
}

/// Builds one transfer instruction per recipient for a fixed asset and authority
pub struct TransferBuilder<'a> {
    asset: &'a AssetDescriptor,
    authority: Address,
    ledger: &'a dyn LedgerClient,
}

impl<'a> TransferBuilder<'a> {
    pub fn new(asset: &'a AssetDescriptor, authority: Address, ledger: &'a dyn LedgerClient) -> Self {
        Self {
            asset,
            authority,
            ledger,
        }
    }

    pub fn build(&self, recipient: &Recipient) -> Result<TransferInstruction, RecipientError> {
        match self.asset.kind() {
            AssetKind::Native => self.native_transfer(recipient),
            AssetKind::Token => self.token_transfer(recipient),
        }
    }

    fn base_units(&self, recipient: &Recipient) -> Result<u64, RecipientError> {
        recipient
            .amount
            .to_base_units(self.asset.decimals)
            .ok_or(RecipientError::AmountOverflow {
                amount: recipient.amount,
                decimals: self.asset.decimals,
            })
    }

    fn native_transfer(&self, recipient: &Recipient) -> Result<TransferInstruction, RecipientError> {
        let to = recipient.parsed_address()?;
        let lamports = self.base_units(recipient)?;
        Ok(TransferInstruction::Native {
            from: self.authority,
            to,
            lamports,
        })
    }

    fn token_transfer(&self, recipient: &Recipient) -> Result<TransferInstruction, RecipientError> {
        let source = self
            .asset
            .source_account
            .as_deref()
            .ok_or(RecipientError::MissingSourceAccount)?
            .parse::<Address>()
            .map_err(RecipientError::InvalidSourceAccount)?;
        let mint = self
            .asset
            .id
            .parse::<Address>()
            .map_err(RecipientError::InvalidAsset)?;
        let owner = recipient.parsed_address()?;
        let amount = self.base_units(recipient)?;

        Ok(TransferInstruction::Token {
            source,
            destination: self.ledger.derive_associated_account(&mint, &owner),
            owner: self.authority,
            amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{associated_account_address, MemoryLedger};

    const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    fn address(byte: u8) -> Address {
        Address::new([byte; 32])
    }

    fn recipient(amount: &str) -> Recipient {
        Recipient::new(address(4).to_string(), amount.parse().unwrap(), 0)
    }

    #[test]
    fn test_native_transfer_truncates() {
        let ledger = MemoryLedger::new();
        let asset = AssetDescriptor::native(UiAmount::from(10));
        let builder = TransferBuilder::new(&asset, address(1), &ledger);

        let ix = builder.build(&recipient("0.0000000015")).unwrap();
        assert_eq!(
            ix,
            TransferInstruction::Native {
                from: address(1),
                to: address(4),
                lamports: 1,
            }
        );
    }

    #[test]
    fn test_token_transfer_targets_associated_account() {
        let ledger = MemoryLedger::new();
        let source = address(9).to_string();
        let asset = AssetDescriptor::token(USDC, "USDC", 6, UiAmount::from(100), Some(source));
        let builder = TransferBuilder::new(&asset, address(1), &ledger);

        let ix = builder.build(&recipient("2.5")).unwrap();
        let mint: Address = USDC.parse().unwrap();
        assert_eq!(
            ix,
            TransferInstruction::Token {
                source: address(9),
                destination: associated_account_address(&mint, &address(4)),
                owner: address(1),
                amount: 2_500_000,
            }
        );
        assert_eq!(ledger.call_counts().derive, 1);
    }

    #[test]
    fn test_missing_source_account_touches_nothing() {
        let ledger = MemoryLedger::new();
        let asset = AssetDescriptor::token(USDC, "USDC", 6, UiAmount::from(100), None);
        let builder = TransferBuilder::new(&asset, address(1), &ledger);

        let err = builder.build(&recipient("1")).unwrap_err();
        assert_eq!(err, RecipientError::MissingSourceAccount);
        assert_eq!(err.to_string(), "missing source account");
        assert_eq!(err.code(), "missing_source_account");
        assert_eq!(ledger.call_counts(), Default::default());
    }

    #[test]
    fn test_malformed_recipient_address() {
        let ledger = MemoryLedger::new();
        let asset = AssetDescriptor::native(UiAmount::from(10));
        let builder = TransferBuilder::new(&asset, address(1), &ledger);

        let bad = Recipient::new("not-an-address", UiAmount::from(1), 0);
        let err = builder.build(&bad).unwrap_err();
        assert_eq!(err.code(), "invalid_address");
    }

    #[test]
    fn test_amount_overflow() {
        let ledger = MemoryLedger::new();
        let asset = AssetDescriptor::native(UiAmount::from(10));
        let builder = TransferBuilder::new(&asset, address(1), &ledger);

        let err = builder.build(&recipient("100000000000")).unwrap_err();
        assert!(matches!(err, RecipientError::AmountOverflow { decimals: 9, .. }));
    }
}
