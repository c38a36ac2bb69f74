//! Static facts about the asset being distributed

use serde::{Deserialize, Serialize};

pub mod amount;

pub use amount::{AmountError, UiAmount};

/// Mint id the ledger uses to identify its native coin
pub const NATIVE_MINT: &str = "So11111111111111111111111111111111111111112";

/// Decimal precision of the native coin
pub const NATIVE_DECIMALS: u8 = 9;

/// How transfers of an asset are expressed on the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetKind {
    /// The ledger's base coin, moved with a direct value transfer
    Native,
    /// A token whose balances live in per-owner associated accounts
    Token,
}

/// Descriptor of the asset for one execution.
///
/// Immutable once a session starts; the engine only ever borrows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    /// Unique asset id (mint address)
    pub id: String,

    /// Display symbol
    pub symbol: String,

    /// Decimal precision of the smallest unit
    pub decimals: u8,

    /// Balance available to the source account, in human units
    pub balance: UiAmount,

    /// Source token account, required for `AssetKind::Token`
    pub source_account: Option<String>,
}

impl AssetDescriptor {
    /// Descriptor for the native coin
    pub fn native(balance: UiAmount) -> Self {
        Self {
            id: NATIVE_MINT.to_string(),
            symbol: "SOL".to_string(),
            decimals: NATIVE_DECIMALS,
            balance,
            source_account: None,
        }
    }

    /// Descriptor for an account-based token
    pub fn token(
        id: impl Into<String>,
        symbol: impl Into<String>,
        decimals: u8,
        balance: UiAmount,
        source_account: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.into(),
            decimals,
            balance,
            source_account,
        }
    }

    /// Kind of transfer this asset requires
    pub fn kind(&self) -> AssetKind {
        if self.id == NATIVE_MINT {
            AssetKind::Native
        } else {
            AssetKind::Token
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_follows_identifier() {
        let sol = AssetDescriptor::native(UiAmount::from(10));
        assert_eq!(sol.kind(), AssetKind::Native);
        assert_eq!(sol.decimals, 9);

        let usdc = AssetDescriptor::token(
            "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
            "USDC",
            6,
            UiAmount::from(100),
            None,
        );
        assert_eq!(usdc.kind(), AssetKind::Token);
    }
}
