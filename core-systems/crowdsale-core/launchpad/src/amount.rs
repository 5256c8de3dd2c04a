// crowdsale-core/launchpad/src/amount.rs
//! Decimal token quantities parsed from user text.
//!
//! Values are kept as `digits / 10^scale` where `scale` is the number of
//! characters after the decimal point exactly as typed. Nothing goes through
//! floating point, so `"1.50"` has two decimal places and `"0.1"` is exact.

use core::cmp::Ordering;
use core::fmt;

use ethers_core::types::U256;
use thiserror::Error;

/// Largest power of ten representable in 256 bits.
pub const MAX_SCALE: u32 = 77;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,
    #[error("`{0}` is not a decimal number")]
    NotNumeric(String),
    #[error("amount is negative")]
    Negative,
    #[error("amount does not fit into 256 bits")]
    Overflow,
}

/// Non-negative decimal amount with its original precision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TokenAmount {
    digits: U256,
    scale: u32,
}

impl TokenAmount {
    /// `digits / 10^scale`.
    pub fn new(digits: u64, scale: u32) -> Self {
        Self { digits: U256::from(digits), scale: scale.min(MAX_SCALE) }
    }

    /// Whole amount of `units` smallest units of a token with `decimals` places.
    pub fn from_units(units: U256, decimals: u32) -> Self {
        Self { digits: units, scale: decimals.min(MAX_SCALE) }
    }

    pub fn parse(input: &str) -> Result<Self, AmountError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(AmountError::Empty);
        }
        let s = match s.strip_prefix('-') {
            Some(rest) if is_decimal_literal(rest) => return Err(AmountError::Negative),
            Some(_) => return Err(AmountError::NotNumeric(input.to_string())),
            None => s.strip_prefix('+').unwrap_or(s),
        };
        if !is_decimal_literal(s) {
            return Err(AmountError::NotNumeric(input.to_string()));
        }

        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };
        let scale = u32::try_from(frac_part.len()).map_err(|_| AmountError::Overflow)?;
        if scale > MAX_SCALE {
            return Err(AmountError::Overflow);
        }

        let mut joined = String::with_capacity(int_part.len() + frac_part.len());
        joined.push_str(int_part);
        joined.push_str(frac_part);
        let trimmed = joined.trim_start_matches('0');
        let digits = if trimmed.is_empty() {
            U256::zero()
        } else {
            U256::from_dec_str(trimmed).map_err(|_| AmountError::Overflow)?
        };

        Ok(Self { digits, scale })
    }

    /// Decimal places as written, trailing zeros included.
    pub fn decimal_places(&self) -> u32 {
        self.scale
    }

    pub fn is_zero(&self) -> bool {
        self.digits.is_zero()
    }

    pub fn is_integer(&self) -> bool {
        self.scale == 0 || (self.digits % pow10(self.scale)).is_zero()
    }

    /// Amount in the smallest units of a token with `decimals` places.
    /// `None` when the amount has more places than the token or overflows.
    pub fn to_units(&self, decimals: u32) -> Option<U256> {
        if self.scale > decimals || decimals > MAX_SCALE {
            return None;
        }
        self.digits.checked_mul(pow10(decimals - self.scale))
    }

    /// `floor(self * factor)`. Truncation never rounds in the buyer's disfavour.
    pub fn mul_floor(&self, factor: U256) -> Option<U256> {
        let product = self.digits.checked_mul(factor)?;
        Some(product / pow10(self.scale))
    }

    /// Numeric comparison, independent of how many places were typed.
    pub fn cmp_value(&self, other: &Self) -> Ordering {
        let scale = self.scale.max(other.scale);
        let lhs = self.digits.checked_mul(pow10(scale - self.scale));
        let rhs = other.digits.checked_mul(pow10(scale - other.scale));
        match (lhs, rhs) {
            (Some(l), Some(r)) => l.cmp(&r),
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (None, None) => Ordering::Equal,
        }
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.digits);
        }
        let unit = pow10(self.scale);
        let whole = self.digits / unit;
        let frac = (self.digits % unit).to_string();
        write!(f, "{}.{:0>width$}", whole, frac, width = self.scale as usize)
    }
}

impl core::str::FromStr for TokenAmount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

pub(crate) fn pow10(exp: u32) -> U256 {
    U256::exp10(exp.min(MAX_SCALE) as usize)
}

/// `123`, `123.`, `.5`, `1.25`; no sign, no exponent.
fn is_decimal_literal(s: &str) -> bool {
    let mut seen_digit = false;
    let mut seen_dot = false;
    for c in s.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => return false,
        }
    }
    seen_digit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_fractional() {
        let a = TokenAmount::parse("3.5").unwrap();
        assert_eq!(a.decimal_places(), 1);
        assert_eq!(a.to_units(18), Some(U256::from(35u64) * U256::exp10(17)));

        let b = TokenAmount::parse(" 10 ").unwrap();
        assert_eq!(b.decimal_places(), 0);
        assert_eq!(b.to_string(), "10");

        assert_eq!(TokenAmount::parse(".25").unwrap().to_string(), "0.25");
        assert_eq!(TokenAmount::parse("7.").unwrap().to_string(), "7");
    }

    #[test]
    fn trailing_zeros_count_as_places() {
        let a = TokenAmount::parse("1.50").unwrap();
        assert_eq!(a.decimal_places(), 2);
        assert_eq!(a.to_string(), "1.50");
        assert!(a.to_units(1).is_none());
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(TokenAmount::parse(""), Err(AmountError::Empty));
        assert_eq!(TokenAmount::parse("-1"), Err(AmountError::Negative));
        assert!(matches!(TokenAmount::parse("1e5"), Err(AmountError::NotNumeric(_))));
        assert!(matches!(TokenAmount::parse("1.2.3"), Err(AmountError::NotNumeric(_))));
        assert!(matches!(TokenAmount::parse("."), Err(AmountError::NotNumeric(_))));
        assert!(matches!(TokenAmount::parse("--1"), Err(AmountError::NotNumeric(_))));
    }

    #[test]
    fn value_comparison_ignores_scale() {
        let a = TokenAmount::parse("0.10").unwrap();
        let b = TokenAmount::parse("0.1").unwrap();
        assert_eq!(a.cmp_value(&b), Ordering::Equal);
        assert_eq!(TokenAmount::parse("0.09").unwrap().cmp_value(&b), Ordering::Less);
        assert!(TokenAmount::parse("2.000").unwrap().is_integer());
        assert!(!TokenAmount::parse("2.001").unwrap().is_integer());
    }

    #[test]
    fn mul_floor_truncates() {
        let a = TokenAmount::parse("3.333333334").unwrap();
        assert_eq!(a.mul_floor(U256::from(3u64)), Some(U256::from(10u64)));
    }
}
