use super::loan::LoanId;
use super::money::{Amount, Money};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type InstallmentId = u64;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Paid,
    // Declared for completeness; nothing in this crate moves an installment here.
    Overdue,
    Failed,
}

impl PaymentStatus {
    /// Statuses a loan cancellation turns into `Failed`.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Pending | PaymentStatus::Partial | PaymentStatus::Overdue
        )
    }
}

/// A scheduled installment before the store has assigned it an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallmentDraft {
    pub loan: LoanId,
    pub installment_number: u32,
    pub due_date: DateTime<Utc>,
    pub amount_due: Money,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Installment {
    pub id: InstallmentId,
    pub loan: LoanId,
    pub installment_number: u32,
    pub due_date: DateTime<Utc>,
    pub amount_due: Money,
    pub amount_paid: Money,
    pub payment_status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Installment {
    pub fn from_draft(id: InstallmentId, draft: InstallmentDraft) -> Self {
        Self {
            id,
            loan: draft.loan,
            installment_number: draft.installment_number,
            due_date: draft.due_date,
            amount_due: draft.amount_due,
            amount_paid: Money::ZERO,
            payment_status: PaymentStatus::Pending,
            paid_at: None,
        }
    }

    /// Whether this is the last installment of a loan with `tenor` months.
    pub fn is_final(&self, tenor: u32) -> bool {
        self.installment_number == tenor
    }

    /// Whether paying `amount` would bring this installment to `Paid`.
    pub fn settled_by(&self, amount: Amount) -> bool {
        self.amount_paid
            .checked_add(amount.money())
            .map_or(true, |paid| paid >= self.amount_due)
    }

    /// Books `amount` against this installment.
    ///
    /// Overpayment is not rejected: the balance is clamped at `amount_due`
    /// and the excess is simply absorbed, including a sum too large to
    /// represent.
    pub fn apply(&mut self, amount: Amount, now: DateTime<Utc>) {
        match self.amount_paid.checked_add(amount.money()) {
            Ok(new_amount_paid) if new_amount_paid < self.amount_due => {
                self.amount_paid = new_amount_paid;
                self.payment_status = PaymentStatus::Partial;
            }
            _ => {
                self.amount_paid = self.amount_due;
                self.payment_status = PaymentStatus::Paid;
                self.paid_at = Some(now);
            }
        }
    }
}
