//! Native-currency amounts
//!
//! Amounts are held in the ledger's fixed-point unit (wei, 18 decimals) so that
//! conversion between display strings and ledger integers is exact.

use crate::error::CoreError;
use alloy_primitives::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Fractional digits of the native currency
pub const NATIVE_DECIMALS: usize = 18;

/// Ticker of the native currency on the supported networks
pub const NATIVE_SYMBOL: &str = "BNB";

const WEI_PER_UNIT: u64 = 1_000_000_000_000_000_000;

/// Non-negative amount of native currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(U256);

impl Amount {
    /// Zero amount
    pub const ZERO: Self = Self(U256::ZERO);

    /// Wrap a raw ledger integer
    #[inline]
    #[must_use]
    pub const fn from_wei(wei: U256) -> Self {
        Self(wei)
    }

    /// Raw ledger integer
    #[inline]
    #[must_use]
    pub const fn wei(self) -> U256 {
        self.0
    }

    /// Parse a decimal display string such as `"0.05"` into ledger units.
    ///
    /// # Errors
    /// `InvalidInput` for empty, signed, exponent or over-precise input.
    pub fn parse_decimal(raw: &str) -> Result<Self, CoreError> {
        let trimmed = raw.trim();
        let (whole, frac) = trimmed.split_once('.').unwrap_or((trimmed, ""));

        if whole.is_empty() && frac.is_empty() {
            return Err(CoreError::invalid_input(format!(
                "amount must be a non-negative decimal, got {raw:?}"
            )));
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(CoreError::invalid_input(format!(
                "amount must be a non-negative decimal, got {raw:?}"
            )));
        }
        if frac.len() > NATIVE_DECIMALS {
            return Err(CoreError::invalid_input(format!(
                "amount supports at most {NATIVE_DECIMALS} decimal places, got {raw:?}"
            )));
        }

        let overflow = || CoreError::invalid_input(format!("amount {raw:?} is out of range"));

        let whole_value = if whole.is_empty() {
            U256::ZERO
        } else {
            U256::from_str(whole).map_err(|_| overflow())?
        };
        let frac_value = if frac.is_empty() {
            U256::ZERO
        } else {
            let padded = format!("{frac:0<width$}", width = NATIVE_DECIMALS);
            U256::from_str(&padded).map_err(|_| overflow())?
        };

        whole_value
            .checked_mul(U256::from(WEI_PER_UNIT))
            .and_then(|v| v.checked_add(frac_value))
            .map(Self)
            .ok_or_else(overflow)
    }

    /// Whether the amount is zero
    #[inline]
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    /// Checked addition
    #[inline]
    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Saturating addition
    #[inline]
    #[must_use]
    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Subtraction floored at zero
    #[inline]
    #[must_use]
    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Shortest exact decimal rendering: `10^18` is `"1"`, `5 * 10^16` is `"0.05"`
    #[must_use]
    pub fn to_decimal_string(self) -> String {
        let unit = U256::from(WEI_PER_UNIT);
        let whole = self.0 / unit;
        let frac = self.0 % unit;
        if frac.is_zero() {
            return whole.to_string();
        }
        let digits = format!("{:0>width$}", frac.to_string(), width = NATIVE_DECIMALS);
        format!("{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_decimal_string())
    }
}

impl FromStr for Amount {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_decimal(s)
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Self::saturating_add)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse_decimal(&raw).map_err(serde::de::Error::custom)
    }
}

/// Narrow a ledger integer to `u64`, `None` when it does not fit
#[inline]
#[must_use]
pub fn narrow_u64(value: U256) -> Option<u64> {
    if value > U256::from(u64::MAX) {
        None
    } else {
        Some(value.as_limbs()[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wei(raw: u64) -> Amount {
        Amount::from_wei(U256::from(raw))
    }

    #[test]
    fn parses_display_units_into_wei() {
        assert_eq!(Amount::parse_decimal("0.5").unwrap(), wei(500_000_000_000_000_000));
        assert_eq!(Amount::parse_decimal("1").unwrap(), wei(WEI_PER_UNIT));
        assert_eq!(Amount::parse_decimal(".25").unwrap(), wei(250_000_000_000_000_000));
        assert_eq!(Amount::parse_decimal("0.000000000000000001").unwrap(), wei(1));
    }

    #[test]
    fn rejects_malformed_amounts() {
        for raw in ["", ".", "-1", "1e5", "abc", "0.1.2", " 1 2", "0.0000000000000000001"] {
            assert!(
                matches!(Amount::parse_decimal(raw), Err(CoreError::InvalidInput(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn renders_shortest_decimal() {
        assert_eq!(wei(50_000_000_000_000_000).to_string(), "0.05");
        assert_eq!(wei(WEI_PER_UNIT).to_string(), "1");
        assert_eq!(wei(1).to_string(), "0.000000000000000001");
        assert_eq!(Amount::ZERO.to_string(), "0");
        assert_eq!(Amount::parse_decimal("12.3400").unwrap().to_string(), "12.34");
    }

    #[test]
    fn sum_saturates() {
        let total: Amount = ["0.05", "0.02", "0.08"]
            .iter()
            .map(|s| Amount::parse_decimal(s).unwrap())
            .sum();
        assert_eq!(total.to_string(), "0.15");
    }

    #[test]
    fn narrow_rejects_wide_values() {
        assert_eq!(narrow_u64(U256::from(7u64)), Some(7));
        assert_eq!(narrow_u64(U256::from(u64::MAX) + U256::from(1u64)), None);
    }
}
