//! Deterministic associated-account derivation
//!
//! A stand-in for program-derived addresses: the associated token account
//! seeds (owner, token program, mint) and the derivation program id are
//! hashed once, with no bump seed and no off-curve search. The result is
//! stable and collision-free enough for the in-memory ledger; clients
//! talking to a real cluster override
//! [`LedgerClient::derive_associated_account`] with the cluster's own
//! derivation.
//!
//! [`LedgerClient::derive_associated_account`]: super::LedgerClient::derive_associated_account

use sha2::{Digest, Sha256};

use crate::recipient::{Address, ADDRESS_LEN};

pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
pub const ASSOCIATED_TOKEN_PROGRAM_ID: &str = "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL";

/// Decoded key of [`TOKEN_PROGRAM_ID`]
pub const TOKEN_PROGRAM: Address = Address::new([
    6, 221, 246, 225, 215, 101, 161, 147, 217, 203, 225, 70, 206, 235, 121, 172, 28, 180, 133,
    237, 95, 91, 55, 145, 58, 140, 245, 133, 126, 255, 0, 169,
]);

/// Decoded key of [`ASSOCIATED_TOKEN_PROGRAM_ID`]
pub const ASSOCIATED_TOKEN_PROGRAM: Address = Address::new([
    140, 151, 37, 143, 78, 36, 137, 241, 187, 61, 16, 41, 20, 142, 13, 131, 11, 90, 19, 153, 218,
    255, 16, 132, 4, 142, 123, 216, 219, 233, 248, 89,
]);

const DERIVATION_MARKER: &[u8] = b"ProgramDerivedAddress";

/// Address of the account holding `asset` for `owner`
pub fn associated_account_address(asset: &Address, owner: &Address) -> Address {
    let mut hasher = Sha256::new();
    hasher.update(owner.as_bytes());
    hasher.update(TOKEN_PROGRAM.as_bytes());
    hasher.update(asset.as_bytes());
    hasher.update(ASSOCIATED_TOKEN_PROGRAM.as_bytes());
    hasher.update(DERIVATION_MARKER);

    let mut bytes = [0u8; ADDRESS_LEN];
    bytes.copy_from_slice(&hasher.finalize());
    Address::new(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_keys_match_their_ids() {
        assert_eq!(TOKEN_PROGRAM_ID.parse::<Address>().unwrap(), TOKEN_PROGRAM);
        assert_eq!(
            ASSOCIATED_TOKEN_PROGRAM_ID.parse::<Address>().unwrap(),
            ASSOCIATED_TOKEN_PROGRAM
        );
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let mint = Address::new([1; 32]);
        let owner = Address::new([2; 32]);
        assert_eq!(
            associated_account_address(&mint, &owner),
            associated_account_address(&mint, &owner)
        );
    }

    #[test]
    fn test_derivation_depends_on_both_inputs() {
        let mint = Address::new([1; 32]);
        let owner = Address::new([2; 32]);
        let other = Address::new([3; 32]);
        let base = associated_account_address(&mint, &owner);
        assert_ne!(base, associated_account_address(&mint, &other));
        assert_ne!(base, associated_account_address(&other, &owner));
    }
}
