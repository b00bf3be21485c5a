//! Exact base-10 decimals.

use std::fmt;

use num_bigint::BigInt;
use num_traits::{Signed, Zero};

/// A decimal as `coefficient * 10^exponent`.
///
/// Equality is representational: `1.0` (`10d-1`) and `1.00` (`100d-2`) are
/// different values, matching how the binary format preserves precision.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Decimal {
    coefficient: BigInt,
    exponent: i32,
}

impl Decimal {
    pub fn new(coefficient: impl Into<BigInt>, exponent: i32) -> Self {
        Self {
            coefficient: coefficient.into(),
            exponent,
        }
    }

    pub fn zero() -> Self {
        Self::new(0, 0)
    }

    #[inline]
    pub fn coefficient(&self) -> &BigInt {
        &self.coefficient
    }

    #[inline]
    pub fn exponent(&self) -> i32 {
        self.exponent
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.coefficient.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.coefficient.is_negative()
    }

    /// True when `0 <= self < 1`, the range allowed for fractional seconds.
    pub fn is_unit_fraction(&self) -> bool {
        if self.coefficient.is_negative() {
            return false;
        }
        if self.coefficient.is_zero() {
            return true;
        }
        if self.exponent >= 0 {
            return false;
        }
        let digits = self.coefficient.magnitude().to_string().len();
        digits <= self.exponent.unsigned_abs() as usize
    }
}

impl Default for Decimal {
    fn default() -> Self {
        Self::zero()
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Self::new(value, 0)
    }
}

impl fmt::Display for Decimal {
    /// Ion text notation, e.g. `125d-2`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d{}", self.coefficient, self.exponent)
    }
}
