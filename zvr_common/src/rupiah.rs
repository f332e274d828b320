use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const CURRENCY_CODE: &str = "IDR";

//--------------------------------------       Rupiah        ---------------------------------------------------------
/// An amount of Indonesian Rupiah, held in the minor currency unit. Rupiah has no sub-unit in circulation, so the
/// minor unit is one Rupiah and every amount is an exact integer.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize, Hash)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct Rupiah(i64);

op!(binary Rupiah, Add, add);
op!(binary Rupiah, Sub, sub);
op!(inplace Rupiah, SubAssign, sub_assign);
op!(unary Rupiah, Neg, neg);

impl Mul<i64> for Rupiah {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Rupiah {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl<'a> Sum<&'a Rupiah> for Rupiah {
    fn sum<I: Iterator<Item = &'a Rupiah>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in Rupiah: {0}")]
pub struct RupiahConversionError(String);

impl From<i64> for Rupiah {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Rupiah {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Rupiah {}

impl TryFrom<u64> for Rupiah {
    type Error = RupiahConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(RupiahConversionError(format!("Value {} is too large to convert to Rupiah", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Rupiah {
    /// Formats with Indonesian digit grouping, e.g. `Rp115.000`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let digits = self.0.unsigned_abs().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(c);
        }
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{sign}Rp{grouped}")
    }
}

impl Rupiah {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn zero() -> Self {
        Self(0)
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    pub fn checked_mul(self, qty: i64) -> Option<Self> {
        self.0.checked_mul(qty).map(Self)
    }

    /// Applies a rate in basis points, rounding half up to the nearest minor unit.
    pub fn apply_basis_points(self, bps: i64) -> Self {
        let scaled = i128::from(self.0) * i128::from(bps);
        let rounded = (scaled + 5_000) / 10_000;
        #[allow(clippy::cast_possible_truncation)]
        Self(rounded as i64)
    }
}

#[cfg(test)]
mod test {
    use super::Rupiah;

    #[test]
    fn display() {
        assert_eq!(Rupiah::from(115_000).to_string(), "Rp115.000");
        assert_eq!(Rupiah::from(999).to_string(), "Rp999");
        assert_eq!(Rupiah::from(1_234_567).to_string(), "Rp1.234.567");
        assert_eq!(Rupiah::from(-50_000).to_string(), "-Rp50.000");
    }

    #[test]
    fn arithmetic() {
        let a = Rupiah::from(100_000) + Rupiah::from(15_000) - Rupiah::from(5_000);
        assert_eq!(a, Rupiah::from(110_000));
        assert_eq!(Rupiah::from(50_000) * 2, Rupiah::from(100_000));
        let total: Rupiah = vec![Rupiah::from(1), Rupiah::from(2)].into_iter().sum();
        assert_eq!(total, Rupiah::from(3));
        assert!(Rupiah::from(i64::MAX).checked_add(Rupiah::from(1)).is_none());
    }

    #[test]
    fn basis_points_round_half_up() {
        assert_eq!(Rupiah::from(100_000).apply_basis_points(1_100), Rupiah::from(11_000));
        assert_eq!(Rupiah::from(5).apply_basis_points(1_000), Rupiah::from(1));
        assert_eq!(Rupiah::from(4).apply_basis_points(1_000), Rupiah::from(0));
    }

    #[test]
    fn serializes_as_integer() {
        let json = serde_json::to_string(&Rupiah::from(115_000)).unwrap();
        assert_eq!(json, "115000");
    }
}
