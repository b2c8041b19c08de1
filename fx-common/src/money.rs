//! [`Money`]: an opaque `(amount_in_minor_units, currency_code)` pair.
//!
//! Arithmetic is exact-integer (no floats) except when converting between
//! currencies, where a [`rust_decimal::Decimal`] rate is applied and the
//! result is rounded to the target currency's minor unit. The wire format
//! (`{"amount": <major unit float>, "currency": "USD"}`) only exists at the
//! boundary -- see [`MoneyWire`].

use rust_decimal::{prelude::FromPrimitive, Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::currency;

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum MoneyError {
    #[error("currency mismatch: {lhs} vs {rhs}")]
    CurrencyMismatch { lhs: String, rhs: String },
    #[error("arithmetic overflow")]
    Overflow,
    #[error("amount must be positive, got {0}")]
    NotPositive(i64),
}

/// An exact amount of a single currency, stored as an integer count of the
/// currency's smallest subdivision (cents for USD, yen for JPY, fils for
/// KWD).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Money {
    amount_minor: i64,
    currency: CurrencyCode,
}

type CurrencyCode = [u8; 3];

fn code_to_array(code: &str) -> CurrencyCode {
    let bytes = code.as_bytes();
    let mut arr = [0u8; 3];
    let len = bytes.len().min(3);
    arr[..len].copy_from_slice(&bytes[..len]);
    arr
}

fn array_to_code(arr: CurrencyCode) -> String {
    String::from_utf8_lossy(&arr).trim_end_matches('\0').to_string()
}

impl Money {
    pub fn new(amount_minor: i64, currency: &str) -> Self {
        Self {
            amount_minor,
            currency: code_to_array(currency),
        }
    }

    pub fn amount_minor(&self) -> i64 {
        self.amount_minor
    }

    pub fn currency(&self) -> String {
        array_to_code(self.currency)
    }

    pub fn is_zero(&self) -> bool {
        self.amount_minor == 0
    }

    pub fn is_positive(&self) -> bool {
        self.amount_minor > 0
    }

    fn same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                lhs: self.currency(),
                rhs: other.currency(),
            });
        }
        Ok(())
    }

    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.same_currency(other)?;
        self.amount_minor
            .checked_add(other.amount_minor)
            .map(|amount_minor| Money {
                amount_minor,
                currency: self.currency,
            })
            .ok_or(MoneyError::Overflow)
    }

    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.same_currency(other)?;
        self.amount_minor
            .checked_sub(other.amount_minor)
            .map(|amount_minor| Money {
                amount_minor,
                currency: self.currency,
            })
            .ok_or(MoneyError::Overflow)
    }

    pub fn checked_mul_scalar(&self, scalar: i64) -> Result<Money, MoneyError> {
        self.amount_minor
            .checked_mul(scalar)
            .map(|amount_minor| Money {
                amount_minor,
                currency: self.currency,
            })
            .ok_or(MoneyError::Overflow)
    }

    pub fn checked_div_scalar(&self, scalar: i64) -> Result<Money, MoneyError> {
        if scalar == 0 {
            return Err(MoneyError::Overflow);
        }
        Ok(Money {
            amount_minor: self.amount_minor / scalar,
            currency: self.currency,
        })
    }

    pub fn negate(&self) -> Money {
        Money {
            amount_minor: self.amount_minor.saturating_neg(),
            currency: self.currency,
        }
    }

    /// Converts this amount of money to `to_currency` at the given `rate`
    /// (units of `to_currency` per unit of `self.currency()`), rounding
    /// half-away-from-zero to `to_currency`'s minor unit.
    pub fn convert(&self, rate: f64, to_currency: &str) -> Result<Money, MoneyError> {
        let rate = Decimal::from_f64(rate).ok_or(MoneyError::Overflow)?;
        let from_decimals = currency::decimal_places(&self.currency());
        let to_decimals = currency::decimal_places(to_currency);

        let major = Decimal::from(self.amount_minor)
            / Decimal::from(10i64.pow(from_decimals));
        let converted_major = major * rate;
        let converted_minor = (converted_major * Decimal::from(10i64.pow(to_decimals)))
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);

        let amount_minor = converted_minor
            .to_string()
            .parse::<i64>()
            .map_err(|_| MoneyError::Overflow)?;

        Ok(Money::new(amount_minor, to_currency))
    }

    pub fn to_major_f64(&self) -> f64 {
        let decimals = currency::decimal_places(&self.currency());
        self.amount_minor as f64 / 10f64.powi(decimals as i32)
    }

    pub fn from_major_f64(amount: f64, currency: &str) -> Result<Money, MoneyError> {
        let decimals = currency::decimal_places(currency);
        let scaled = amount * 10f64.powi(decimals as i32);
        if !scaled.is_finite() {
            return Err(MoneyError::Overflow);
        }
        Ok(Money::new(scaled.round() as i64, currency))
    }

    pub fn to_wire(&self) -> MoneyWire {
        MoneyWire {
            amount: self.to_major_f64(),
            currency: self.currency(),
        }
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.currency == other.currency && self.amount_minor == other.amount_minor
    }
}

impl PartialOrd for Money {
    /// Returns `None` when the two amounts are in different currencies --
    /// they are incomparable, not "unordered".
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        if self.currency != other.currency {
            return None;
        }
        self.amount_minor.partial_cmp(&other.amount_minor)
    }
}

/// The wire representation of [`Money`]: `{ "amount": <major unit>,
/// "currency": "USD" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoneyWire {
    pub amount: f64,
    pub currency: String,
}

impl TryFrom<MoneyWire> for Money {
    type Error = MoneyError;

    fn try_from(wire: MoneyWire) -> Result<Self, Self::Error> {
        Money::from_major_f64(wire.amount, &wire.currency)
    }
}

impl From<Money> for MoneyWire {
    fn from(money: Money) -> Self {
        money.to_wire()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_requires_matching_currency() {
        let a = Money::new(100, "USD");
        let b = Money::new(100, "EUR");
        assert!(matches!(
            a.checked_add(&b).unwrap_err(),
            MoneyError::CurrencyMismatch { .. }
        ));
    }

    #[test]
    fn add_sub_roundtrip() {
        let a = Money::new(1000, "USD");
        let b = Money::new(250, "USD");
        let sum = a.checked_add(&b).unwrap();
        assert_eq!(sum.amount_minor(), 1250);
        let diff = sum.checked_sub(&b).unwrap();
        assert_eq!(diff, a);
    }

    #[test]
    fn mul_overflow_detected() {
        let a = Money::new(i64::MAX, "USD");
        assert_eq!(a.checked_mul_scalar(2).unwrap_err(), MoneyError::Overflow);
    }

    #[test]
    fn convert_identity_rate_preserves_amount_when_same_currency() {
        let a = Money::new(10000, "USD");
        let converted = a.convert(1.0, "USD").unwrap();
        assert_eq!(converted.amount_minor(), 10000);
    }

    #[test]
    fn convert_usd_to_eur() {
        // $100.00 at 0.85 -> 85.00 EUR
        let a = Money::new(10000, "USD");
        let converted = a.convert(0.85, "EUR").unwrap();
        assert_eq!(converted.amount_minor(), 8500);
        assert_eq!(converted.currency(), "EUR");
    }

    #[test]
    fn convert_usd_to_jpy_zero_decimals() {
        // $100.00 at 150.0 -> 15000 JPY (0 decimal places)
        let a = Money::new(10000, "USD");
        let converted = a.convert(150.0, "JPY").unwrap();
        assert_eq!(converted.amount_minor(), 15000);
    }

    #[test]
    fn wire_roundtrip_preserves_minor_units() {
        let a = Money::new(12345, "USD");
        let wire = a.to_wire();
        assert_eq!(wire.amount, 123.45);
        let back = Money::try_from(wire).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn partial_cmp_none_across_currencies() {
        let a = Money::new(100, "USD");
        let b = Money::new(100, "EUR");
        assert_eq!(a.partial_cmp(&b), None);
    }
}
