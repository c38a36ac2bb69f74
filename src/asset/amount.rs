//! Exact decimal amounts expressed in human units
//!
//! Amounts arrive as text ("12.5") and must be scaled to the ledger's
//! smallest unit without ever paying out more than was asked for, so
//! they are kept as an integer mantissa plus a decimal scale instead of
//! a float.

use std::cmp::Ordering;
use std::fmt;
use std::iter::Sum;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of fractional digits accepted when parsing
pub const MAX_SCALE: u32 = 18;

/// Errors produced while parsing or combining amounts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("Amount is empty")]
    Empty,

    #[error("Invalid amount '{0}'")]
    Invalid(String),

    #[error("Amount '{0}' has more than {MAX_SCALE} fractional digits")]
    TooPrecise(String),

    #[error("Amount overflow")]
    Overflow,
}

/// A non-negative decimal amount: `units / 10^scale`
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UiAmount {
    units: u128,
    scale: u32,
}

impl UiAmount {
    /// Zero in any precision
    pub const ZERO: UiAmount = UiAmount { units: 0, scale: 0 };

    /// Build an amount from a mantissa and a decimal scale
    pub fn new(units: u128, scale: u32) -> Result<Self, AmountError> {
        if scale > MAX_SCALE {
            return Err(AmountError::TooPrecise(format!("{units}e-{scale}")));
        }
        Ok(Self { units, scale })
    }

    /// Convert an amount held in smallest units back to human units
    pub fn from_base_units(amount: u64, decimals: u8) -> Result<Self, AmountError> {
        Self::new(amount as u128, decimals as u32)
    }

    /// Whole units, ignoring the fractional part
    pub fn whole(&self) -> u128 {
        self.units / pow10(self.scale)
    }

    /// Fractional part normalised to `MAX_SCALE` digits
    fn fraction(&self) -> u128 {
        (self.units % pow10(self.scale)) * pow10(MAX_SCALE - self.scale)
    }

    /// Whether this amount is exactly zero
    pub fn is_zero(&self) -> bool {
        self.units == 0
    }

    /// Exact addition, failing on overflow
    pub fn checked_add(&self, other: &UiAmount) -> Option<UiAmount> {
        let scale = self.scale.max(other.scale);
        let a = self.units.checked_mul(pow10(scale - self.scale))?;
        let b = other.units.checked_mul(pow10(scale - other.scale))?;
        Some(UiAmount {
            units: a.checked_add(b)?,
            scale,
        })
    }

    /// Scale to the ledger's smallest unit, truncating toward zero.
    ///
    /// `0.125` at 2 decimals yields `12`; excess precision is dropped,
    /// never rounded up. Returns `None` when the result exceeds `u64`.
    pub fn to_base_units(&self, decimals: u8) -> Option<u64> {
        if self.units == 0 {
            return Some(0);
        }
        let decimals = decimals as u32;
        let scaled = if decimals >= self.scale {
            let factor = 10u128.checked_pow(decimals - self.scale)?;
            self.units.checked_mul(factor)?
        } else {
            self.units / 10u128.checked_pow(self.scale - decimals)?
        };
        u64::try_from(scaled).ok()
    }
}

fn pow10(exp: u32) -> u128 {
    10u128.pow(exp)
}

impl FromStr for UiAmount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(AmountError::Empty);
        }

        let (int_part, frac_part) = match trimmed.split_once('.') {
            Some((i, f)) => (i, f),
            None => (trimmed, ""),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(AmountError::Invalid(s.to_string()));
        }
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(int_part) || !all_digits(frac_part) {
            return Err(AmountError::Invalid(s.to_string()));
        }
        if frac_part.len() > MAX_SCALE as usize {
            return Err(AmountError::TooPrecise(s.to_string()));
        }

        let mut units: u128 = 0;
        for digit in int_part.bytes().chain(frac_part.bytes()) {
            units = units
                .checked_mul(10)
                .and_then(|u| u.checked_add((digit - b'0') as u128))
                .ok_or(AmountError::Overflow)?;
        }

        Ok(UiAmount {
            units,
            scale: frac_part.len() as u32,
        })
    }
}

impl TryFrom<String> for UiAmount {
    type Error = AmountError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<UiAmount> for String {
    fn from(amount: UiAmount) -> Self {
        amount.to_string()
    }
}

impl From<u64> for UiAmount {
    fn from(value: u64) -> Self {
        UiAmount {
            units: value as u128,
            scale: 0,
        }
    }
}

impl fmt::Display for UiAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.whole();
        if self.scale == 0 {
            return write!(f, "{whole}");
        }
        let frac = self.units % pow10(self.scale);
        let digits = format!("{:0width$}", frac, width = self.scale as usize);
        let digits = digits.trim_end_matches('0');
        if digits.is_empty() {
            write!(f, "{whole}")
        } else {
            write!(f, "{whole}.{digits}")
        }
    }
}

impl PartialEq for UiAmount {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for UiAmount {}

impl PartialOrd for UiAmount {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UiAmount {
    fn cmp(&self, other: &Self) -> Ordering {
        self.whole()
            .cmp(&other.whole())
            .then_with(|| self.fraction().cmp(&other.fraction()))
    }
}

/// Sums saturate at overflow; callers that must detect it use `checked_add`.
impl<'a> Sum<&'a UiAmount> for UiAmount {
    fn sum<I: Iterator<Item = &'a UiAmount>>(iter: I) -> Self {
        iter.fold(UiAmount::ZERO, |acc, amount| {
            acc.checked_add(amount).unwrap_or(UiAmount {
                units: u128::MAX,
                scale: 0,
            })
        })
    }
}
