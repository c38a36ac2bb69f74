//! Recipients and account identifiers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::asset::UiAmount;

/// Length in bytes of a ledger account id
pub const ADDRESS_LEN: usize = 32;

/// Errors for malformed account identifiers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid base58 account id '{0}'")]
    Encoding(String),

    #[error("account id '{value}' decodes to {len} bytes, expected {ADDRESS_LEN}")]
    Length { value: String, len: usize },
}

/// A well-formed ledger account id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    /// Wrap raw account id bytes
    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw bytes of the account id
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|_| AddressError::Encoding(s.to_string()))?;
        let len = bytes.len();
        let bytes: [u8; ADDRESS_LEN] = bytes.try_into().map_err(|_| AddressError::Length {
            value: s.to_string(),
            len,
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

impl Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One entry of the distribution list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    /// Destination account id, as supplied by the caller
    pub address: String,

    /// Requested amount in human units
    pub amount: UiAmount,

    /// Position in the original list
    pub index: usize,
}

impl Recipient {
    /// Create a recipient at the given list position
    pub fn new(address: impl Into<String>, amount: UiAmount, index: usize) -> Self {
        Self {
            address: address.into(),
            amount,
            index,
        }
    }

    /// Parse the destination account id
    pub fn parsed_address(&self) -> Result<Address, AddressError> {
        self.address.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_roundtrip() {
        let text = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
        let address: Address = text.parse().unwrap();
        assert_eq!(address.to_string(), text);
    }

    #[test]
    fn test_rejects_bad_encoding() {
        // '0' and 'l' are not in the base58 alphabet
        assert!(matches!(
            "0l0l".parse::<Address>(),
            Err(AddressError::Encoding(_))
        ));
    }

    #[test]
    fn test_rejects_short_ids() {
        assert!(matches!(
            "abc".parse::<Address>(),
            Err(AddressError::Length { .. })
        ));
    }
}
