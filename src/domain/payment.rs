use super::installment::InstallmentId;
use super::loan::LoanId;
use super::money::{Amount, Money};
use crate::error::{LendingError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type PaymentId = u64;

/// A payment request against one installment.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentInput {
    pub installment: InstallmentId,
    pub amount: Decimal,
    pub method: String,
    /// Caller-supplied token; a retried request with the same key is not re-applied.
    pub idempotency_key: Option<String>,
}

impl PaymentInput {
    pub(crate) fn validate(&self) -> Result<Amount> {
        if self.method.trim().is_empty() {
            return Err(LendingError::ValidationError(
                "Payment method is required".to_string(),
            ));
        }
        if matches!(&self.idempotency_key, Some(key) if key.trim().is_empty()) {
            return Err(LendingError::ValidationError(
                "Idempotency key must not be blank".to_string(),
            ));
        }
        Amount::new(self.amount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentDraft {
    pub installment: InstallmentId,
    pub loan: LoanId,
    pub amount: Money,
    pub method: String,
    pub idempotency_key: Option<String>,
    pub paid_at: DateTime<Utc>,
}

/// Append-only record of money received for an installment.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Payment {
    pub id: PaymentId,
    pub installment: InstallmentId,
    pub loan: LoanId,
    pub amount: Money,
    pub method: String,
    pub idempotency_key: Option<String>,
    pub paid_at: DateTime<Utc>,
}

impl Payment {
    pub fn from_draft(id: PaymentId, draft: PaymentDraft) -> Self {
        Self {
            id,
            installment: draft.installment,
            loan: draft.loan,
            amount: draft.amount,
            method: draft.method,
            idempotency_key: draft.idempotency_key,
            paid_at: draft.paid_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn input(amount: Decimal, method: &str, key: Option<&str>) -> PaymentInput {
        PaymentInput {
            installment: 1,
            amount,
            method: method.to_string(),
            idempotency_key: key.map(str::to_string),
        }
    }

    #[test]
    fn test_valid_payment_input() {
        let amount = input(dec!(150.5), "transfer", Some("retry-1")).validate().unwrap();
        assert_eq!(amount.value(), dec!(150.5));
    }

    #[test]
    fn test_invalid_payment_input() {
        for case in [
            input(dec!(0), "transfer", None),
            input(dec!(-10), "transfer", None),
            input(dec!(10), "  ", None),
            input(dec!(10), "transfer", Some("")),
        ] {
            assert!(matches!(
                case.validate(),
                Err(LendingError::ValidationError(_))
            ));
        }
    }
}
