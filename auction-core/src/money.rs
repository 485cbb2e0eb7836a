use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A non-negative monetary amount.
///
/// Always backed by `rust_decimal::Decimal`; no bid amount, current
/// high bid, or comparison in this workspace ever touches a binary
/// floating-point type.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

#[derive(Debug, thiserror::Error)]
pub enum MoneyError {
    #[error("amount must be non-negative")]
    Negative,
    #[error("could not parse amount: {0}")]
    Parse(#[from] rust_decimal::Error),
}

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() {
            return Err(MoneyError::Negative);
        }
        Ok(Self(amount))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Strict `>`: used for the bid-too-low check, where a bid
    /// equal to the current high bid is rejected, not accepted.
    pub fn exceeds(&self, other: &Money) -> bool {
        self.0 > other.0
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let amount = Decimal::from_str(s)?;
        Self::new(amount)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl TryFrom<Decimal> for Money {
    type Error = MoneyError;

    fn try_from(amount: Decimal) -> Result<Self, Self::Error> {
        Self::new(amount)
    }
}
