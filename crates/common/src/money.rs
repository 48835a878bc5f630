//! Money in integer minor units.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Money amount in minor units (kopecks) to avoid floating point issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money {
    minor: i64,
}

/// Error returned when parsing a price typed by a user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid amount: {input:?}")]
pub struct ParseMoneyError {
    pub input: String,
}

impl Money {
    /// Largest price a catalog product may carry (one billion major units).
    pub const MAX_PRICE: Money = Money::from_minor(100_000_000_000);

    /// Creates a new amount from minor units.
    pub const fn from_minor(minor: i64) -> Self {
        Self { minor }
    }

    /// Creates a new amount from whole major units. Meant for literals;
    /// overflowing `i64` panics.
    pub const fn from_major(major: i64) -> Self {
        Self { minor: major * 100 }
    }

    /// Returns zero money.
    pub const fn zero() -> Self {
        Self { minor: 0 }
    }

    /// Returns the amount in minor units.
    pub const fn minor(&self) -> i64 {
        self.minor
    }

    /// Returns the whole major-unit portion.
    pub const fn major(&self) -> i64 {
        self.minor / 100
    }

    /// Returns the minor-unit remainder after the major portion.
    pub const fn minor_part(&self) -> i64 {
        self.minor.abs() % 100
    }

    pub const fn is_zero(&self) -> bool {
        self.minor == 0
    }

    pub const fn is_negative(&self) -> bool {
        self.minor < 0
    }

    /// Multiplies by a quantity, or None on overflow.
    pub const fn checked_multiply(&self, quantity: u32) -> Option<Money> {
        match self.minor.checked_mul(quantity as i64) {
            Some(minor) => Some(Money { minor }),
            None => None,
        }
    }

    /// Adds two amounts, or None on overflow.
    pub const fn checked_add(&self, rhs: Money) -> Option<Money> {
        match self.minor.checked_add(rhs.minor) {
            Some(minor) => Some(Money { minor }),
            None => None,
        }
    }

    /// Sums amounts, or None if the total overflows.
    pub fn checked_sum(amounts: impl IntoIterator<Item = Money>) -> Option<Money> {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |acc, amount| acc.checked_add(amount))
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.minor < 0 {
            write!(f, "-{}.{:02}", self.major().abs(), self.minor_part())
        } else {
            write!(f, "{}.{:02}", self.major(), self.minor_part())
        }
    }
}

/// Parses `"100"`, `"99.9"`, `"99,90"` into minor units. At most two
/// fractional digits are accepted.
impl std::str::FromStr for Money {
    type Err = ParseMoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseMoneyError {
            input: s.to_string(),
        };
        let normalized = s.trim().replace(',', ".");
        let (negative, digits) = match normalized.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, normalized.as_str()),
        };

        let (major, fraction) = match digits.split_once('.') {
            Some((major, fraction)) => (major, fraction),
            None => (digits, ""),
        };
        if major.is_empty() || fraction.len() > 2 {
            return Err(err());
        }
        if !major.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(err());
        }

        let major: i64 = major.parse().map_err(|_| err())?;
        let fraction: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().map_err(|_| err())? * 10,
            _ => fraction.parse().map_err(|_| err())?,
        };
        let minor = major
            .checked_mul(100)
            .and_then(|m| m.checked_add(fraction))
            .ok_or_else(err)?;

        Ok(Money::from_minor(if negative { -minor } else { minor }))
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            minor: self.minor + rhs.minor,
        }
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money {
            minor: self.minor - rhs.minor,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_from_major() {
        let money = Money::from_major(50);
        assert_eq!(money.minor(), 5000);
        assert_eq!(money.major(), 50);
        assert_eq!(money.minor_part(), 0);
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_minor(1234).to_string(), "12.34");
        assert_eq!(Money::from_minor(5).to_string(), "0.05");
        assert_eq!(Money::from_minor(-1234).to_string(), "-12.34");
    }

    #[test]
    fn test_money_parse() {
        assert_eq!("100".parse::<Money>().unwrap(), Money::from_major(100));
        assert_eq!("99.9".parse::<Money>().unwrap(), Money::from_minor(9990));
        assert_eq!("99,05".parse::<Money>().unwrap(), Money::from_minor(9905));
        assert_eq!(" 0.5 ".parse::<Money>().unwrap(), Money::from_minor(50));
    }

    #[test]
    fn test_money_parse_rejects_garbage() {
        assert!("".parse::<Money>().is_err());
        assert!("abc".parse::<Money>().is_err());
        assert!("1.234".parse::<Money>().is_err());
        assert!(".5".parse::<Money>().is_err());
        assert!("1e3".parse::<Money>().is_err());
    }

    #[test]
    fn test_money_arithmetic() {
        let a = Money::from_minor(1000);
        let b = Money::from_minor(500);

        assert_eq!((a + b).minor(), 1500);
        assert_eq!((a - b).minor(), 500);
        assert_eq!(a.checked_multiply(3), Some(Money::from_minor(3000)));
        assert_eq!(Money::checked_sum([a, b, b]), Some(Money::from_minor(2000)));
        assert_eq!(Money::checked_sum([]), Some(Money::zero()));
    }

    #[test]
    fn test_money_overflow_is_reported() {
        let huge: Money = "90000000000000000".parse().unwrap();
        assert_eq!(huge.checked_multiply(2), None);
        assert_eq!(Money::checked_sum([huge, huge]), None);
        assert!(huge > Money::MAX_PRICE);
        assert!("999999999999999999999".parse::<Money>().is_err());
    }
}
