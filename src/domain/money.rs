use crate::error::LendingError;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of fractional digits kept on every stored monetary amount.
pub const MONEY_SCALE: u32 = 2;

/// A non-negative monetary value rounded to [`MONEY_SCALE`] places.
///
/// Limits, loan terms and installment balances are all expressed in `Money`.
/// Subtraction saturates at zero, which is the clamping rule the limit ledger
/// and installment bookkeeping rely on. Addition is checked: an overflowing
/// sum is a validation failure, never a panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

/// Represents a positive monetary amount moved by a request.
///
/// Ensures that principals and payment amounts are always positive.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Money);

impl Money {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Result<Self, LendingError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(LendingError::ValidationError(format!(
                "Monetary amount must not be negative, got {value}"
            )));
        }
        Ok(Self(round(value)))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// `self - rhs`, clamped at zero.
    pub fn saturating_sub(self, rhs: Self) -> Self {
        if rhs.0 >= self.0 {
            Self::ZERO
        } else {
            Self(self.0 - rhs.0)
        }
    }

    pub fn checked_add(self, rhs: Self) -> Result<Self, LendingError> {
        self.0
            .checked_add(rhs.0)
            .map(Self)
            .ok_or_else(|| {
                LendingError::ValidationError(format!(
                    "Monetary amount overflow adding {rhs} to {self}"
                ))
            })
    }

    /// `self + rhs`, clamped at `ceiling`. A sum too large to represent is
    /// past any ceiling.
    pub fn capped_add(self, rhs: Self, ceiling: Self) -> Self {
        self.checked_add(rhs).map_or(ceiling, |sum| sum.min(ceiling))
    }

    /// Rounded `self / divisor`; `None` when `divisor` is zero.
    pub fn divide(self, divisor: u32) -> Option<Self> {
        if divisor == 0 {
            return None;
        }
        Some(Self(round(self.0 / Decimal::from(divisor))))
    }

    /// `self * factor`; `None` on overflow.
    pub fn times(self, factor: u32) -> Option<Self> {
        self.0.checked_mul(Decimal::from(factor)).map(Self)
    }
}

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, LendingError> {
        let money = Money::new(value)?;
        if money.is_zero() {
            Err(LendingError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        } else {
            Ok(Self(money))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0.value()
    }

    pub fn money(&self) -> Money {
        self.0
    }
}

fn round(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

impl TryFrom<Decimal> for Money {
    type Error = LendingError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = LendingError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Money {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.value()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn money(value: Decimal) -> Money {
        Money::new(value).unwrap()
    }

    #[test]
    fn test_money_rounds_to_scale() {
        assert_eq!(money(dec!(10.005)).value(), dec!(10.01));
        assert_eq!(money(dec!(10.004)).value(), dec!(10.00));
    }

    #[test]
    fn test_money_rejects_negative() {
        assert!(matches!(
            Money::new(dec!(-0.01)),
            Err(LendingError::ValidationError(_))
        ));
        assert!(Money::new(dec!(0)).is_ok());
    }

    #[test]
    fn test_saturating_sub_clamps_at_zero() {
        assert_eq!(money(dec!(10)).saturating_sub(money(dec!(4))), money(dec!(6)));
        assert_eq!(money(dec!(10)).saturating_sub(money(dec!(40))), Money::ZERO);
    }

    #[test]
    fn test_capped_add_clamps_at_ceiling() {
        let ceiling = money(dec!(100));
        assert_eq!(money(dec!(50)).capped_add(money(dec!(20)), ceiling), money(dec!(70)));
        assert_eq!(money(dec!(90)).capped_add(money(dec!(20)), ceiling), ceiling);
    }

    #[test]
    fn test_checked_add_reports_overflow() {
        assert_eq!(money(dec!(1.25)).checked_add(money(dec!(2))).unwrap(), money(dec!(3.25)));
        assert!(matches!(
            money(Decimal::MAX).checked_add(money(dec!(1))),
            Err(LendingError::ValidationError(_))
        ));
        assert_eq!(
            money(Decimal::MAX).capped_add(money(Decimal::MAX), money(dec!(100))),
            money(dec!(100))
        );
        assert_eq!(money(Decimal::MAX).times(2), None);
        assert_eq!(money(dec!(3)).times(2), Some(money(dec!(6))));
    }

    #[test]
    fn test_deserialize_goes_through_validation() {
        let parsed: Money = serde_json::from_str("\"10.005\"").unwrap();
        assert_eq!(parsed, money(dec!(10.01)));
        assert!(serde_json::from_str::<Money>("\"-1\"").is_err());
        assert!(serde_json::from_str::<Amount>("\"0\"").is_err());
        assert!(serde_json::from_str::<Amount>("\"-5\"").is_err());
        assert_eq!(serde_json::to_string(&money(dec!(2.50))).unwrap(), "\"2.50\"");
    }

    #[test]
    fn test_divide() {
        assert_eq!(money(dec!(5000000)).divide(6), Some(money(dec!(833333.33))));
        assert_eq!(money(dec!(2)).divide(3), Some(money(dec!(0.67))));
        assert_eq!(money(dec!(1)).divide(0), None);
    }

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(1.0)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.0)),
            Err(LendingError::ValidationError(_))
        ));
        assert!(matches!(
            Amount::new(dec!(0.001)),
            Err(LendingError::ValidationError(_))
        ));
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(LendingError::ValidationError(_))
        ));
    }

    #[test]
    fn test_display_is_normalized() {
        assert_eq!(money(dec!(1500.00)).to_string(), "1500");
        assert_eq!(money(dec!(0.50)).to_string(), "0.5");
    }
}
