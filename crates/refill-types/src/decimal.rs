//! Conversions between human-readable decimal amounts and atomic integer units.
//!
//! Ground rule (spec §3 invariant): `amount_atomic = amount * 10^decimals`, computed
//! in arbitrary-precision decimal. Binary floating-point never touches an amount.

use rust_decimal::Decimal;
use rust_decimal::prelude::{ToPrimitive, Zero};
use std::fmt;
use std::str::FromStr;

/// A non-negative decimal amount, parsed from a human-readable string.
///
/// Mirrors the shape of a money-amount parser: preserves the original scale so
/// callers can reject inputs with more precision than the asset supports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecimalAmount(pub Decimal);

/// Errors converting between decimal and atomic-unit representations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecimalConversionError {
    #[error("invalid decimal amount: {0}")]
    InvalidFormat(String),
    #[error("negative amounts are not allowed")]
    Negative,
    #[error("amount has {amount_scale} decimal places but asset supports {asset_decimals}")]
    TooPrecise {
        amount_scale: u32,
        asset_decimals: u32,
    },
    #[error("atomic amount overflows u128")]
    Overflow,
}

impl DecimalAmount {
    pub fn parse(input: &str) -> Result<Self, DecimalConversionError> {
        let trimmed = input.trim();
        let value = Decimal::from_str(trimmed)
            .map_err(|_| DecimalConversionError::InvalidFormat(input.to_string()))?;
        if value.is_sign_negative() {
            return Err(DecimalConversionError::Negative);
        }
        Ok(Self(value))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        !self.0.is_zero() && self.0.is_sign_positive()
    }

    /// Converts to atomic units given the asset's decimal places.
    ///
    /// Rejects inputs whose precision exceeds what `decimals` can represent rather
    /// than silently truncating.
    pub fn to_atomic(&self, decimals: u32) -> Result<u128, DecimalConversionError> {
        let scale = self.0.scale();
        if scale > decimals {
            return Err(DecimalConversionError::TooPrecise {
                amount_scale: scale,
                asset_decimals: decimals,
            });
        }
        let scaled = self.0 * Decimal::from(10u64.pow(decimals));
        let rescaled = scaled.round();
        rescaled.to_u128().ok_or(DecimalConversionError::Overflow)
    }
}

impl fmt::Display for DecimalAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

/// Converts a raw atomic-unit integer (as carried in provider balance responses,
/// which are always decimal strings of integers) into a `u128`.
pub fn atomic_from_str(raw: &str) -> Result<u128, DecimalConversionError> {
    raw.trim()
        .parse::<u128>()
        .map_err(|_| DecimalConversionError::InvalidFormat(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_whole_and_fractional_amounts() {
        let amount = DecimalAmount::parse("0.5").unwrap();
        assert_eq!(amount.to_atomic(8).unwrap(), 50_000_000u128);
    }

    #[test]
    fn rejects_excess_precision() {
        let amount = DecimalAmount::parse("0.123456789").unwrap();
        let err = amount.to_atomic(8).unwrap_err();
        assert!(matches!(err, DecimalConversionError::TooPrecise { .. }));
    }

    #[test]
    fn rejects_negative() {
        let err = DecimalAmount::parse("-1").unwrap_err();
        assert_eq!(err, DecimalConversionError::Negative);
    }

    #[test]
    fn exact_round_trip_matches_invariant() {
        let amount = DecimalAmount::parse("1.23456789").unwrap();
        assert_eq!(amount.to_atomic(8).unwrap(), 123_456_789u128);
    }
}
