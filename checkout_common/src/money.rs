use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const DEFAULT_CURRENCY_CODE: &str = "EUR";

//--------------------------------------       Money         ---------------------------------------------------------
/// An amount of money, expressed as a signed count of minor currency units (e.g. cents).
///
/// The currency itself is carried alongside the amount by the owning record. All arithmetic is integral, so totals
/// always reconcile exactly.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, AddAssign, add_assign);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in minor currency units: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl TryFrom<u64> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(MoneyConversionError(format!("Value {} is too large to convert to Money", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_major(units: i64) -> Self {
        Self(units * 100)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// `None` if the sum does not fit in a `Money`.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    /// `None` if the product does not fit in a `Money`.
    pub fn checked_mul(self, rhs: i64) -> Option<Self> {
        self.0.checked_mul(rhs).map(Self)
    }

    /// Minor units are not negative, as the processor APIs expect.
    pub fn to_unsigned(self) -> Result<u64, MoneyConversionError> {
        u64::try_from(self.0).map_err(|_| MoneyConversionError(format!("{} is negative", self.0)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn checked_arithmetic() {
        assert_eq!(Money::from(1100).checked_mul(2), Some(Money::from(2200)));
        assert_eq!(Money::from(i64::MAX / 2).checked_mul(3), None);
        assert_eq!(Money::from(100).checked_add(Money::from(-50)), Some(Money::from(50)));
        assert_eq!(Money::from(i64::MAX).checked_add(Money::from(1)), None);
    }

    #[test]
    fn display() {
        assert_eq!(Money::from(1050).to_string(), "10.50");
        assert_eq!(Money::from(7).to_string(), "0.07");
        assert_eq!(Money::from(-250).to_string(), "-2.50");
        assert_eq!(Money::ZERO.to_string(), "0.00");
    }

    #[test]
    fn arithmetic() {
        let mut a = Money::from(1000);
        a -= Money::from(150);
        assert_eq!(a, Money::from(850));
        a += Money::from(50);
        assert_eq!(a * 2, Money::from(1800));
        assert_eq!(-a, Money::from(-900));
        let total: Money = [Money::from(100), Money::from(200), Money::from(-50)].iter().sum();
        assert_eq!(total, Money::from(250));
    }

    #[test]
    fn unsigned_conversion() {
        assert_eq!(Money::from(42).to_unsigned().unwrap(), 42);
        assert!(Money::from(-1).to_unsigned().is_err());
        assert!(Money::try_from(u64::MAX).is_err());
    }

    #[test]
    fn serializes_as_plain_integer() {
        let json = serde_json::to_string(&Money::from(1234)).unwrap();
        assert_eq!(json, "1234");
    }
}
