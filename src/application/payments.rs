use super::engine::{LendingEngine, finish};
use super::locking::LockSet;
use crate::domain::borrower::BorrowerId;
use crate::domain::installment::{Installment, InstallmentId, PaymentStatus};
use crate::domain::limit::{CreditLimit, Direction};
use crate::domain::lock::LockKey;
use crate::domain::loan::{Loan, LoanStatus};
use crate::domain::money::Amount;
use crate::domain::payment::{Payment, PaymentDraft, PaymentInput};
use crate::domain::ports::LedgerTransaction;
use crate::error::{LendingError, Result};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

/// Everything a payment writes once the locks are held.
struct Settlement {
    draft: PaymentDraft,
    installment: Installment,
    completed_loan: Option<(Loan, Vec<CreditLimit>)>,
}

impl LendingEngine {
    /// Books a payment against one installment.
    ///
    /// Settling the final installment of an active loan also marks the loan
    /// `paid` and credits the principal back to the borrower's limit, inside
    /// the same transaction and under the borrower's limit lock.
    ///
    /// A payment carrying an idempotency key that was already booked returns
    /// the original payment without applying the amount again.
    #[instrument(skip(self, input), fields(installment = input.installment))]
    pub async fn apply_payment(&self, caller: BorrowerId, input: PaymentInput) -> Result<Payment> {
        let amount = input.validate()?;
        let actor = self.resolve_borrower(caller).await?;
        let (installment, loan) = self.payable(input.installment).await?;
        if !actor.may_act_for(loan.borrower) {
            return Err(LendingError::forbidden(
                caller,
                &format!("pay installment {}", installment.id),
            ));
        }

        let completes =
            installment.is_final(loan.tenor) && loan.is_active() && installment.settled_by(amount);
        let mut keys = vec![LockKey::Installment(installment.id)];
        if completes {
            keys.push(LockKey::Limit(loan.borrower));
        }

        let mut locks = self.lock(keys).await?;
        let result = self.book_payment(&mut locks, input, amount).await;
        locks.release().await;

        match &result {
            Ok(payment) => info!(
                payment = payment.id,
                loan = payment.loan,
                amount = %payment.amount,
                "payment applied"
            ),
            Err(e) => warn!(error = %e, "payment rejected"),
        }
        result
    }

    /// Loads an installment that may still receive money, with its loan.
    async fn payable(&self, id: InstallmentId) -> Result<(Installment, Loan)> {
        let installment = self
            .ledger
            .installment(id)
            .await?
            .filter(|installment| installment.payment_status != PaymentStatus::Failed)
            .ok_or(LendingError::InstallmentNotFound(id))?;
        let loan = self
            .ledger
            .loan(installment.loan)
            .await?
            .ok_or(LendingError::LoanNotFound(installment.loan))?;
        Ok((installment, loan))
    }

    async fn book_payment(&self, locks: &mut LockSet, input: PaymentInput, amount: Amount) -> Result<Payment> {
        if let Some(key) = &input.idempotency_key
            && let Some(existing) = self.ledger.payment_by_key(key).await?
        {
            if existing.installment != input.installment {
                return Err(LendingError::ValidationError(format!(
                    "Idempotency key {key} was already used for installment {}",
                    existing.installment
                )));
            }
            debug!(payment = existing.id, "idempotent replay");
            return Ok(existing);
        }

        // State may have moved between the unlocked read and the lock.
        let (mut installment, loan) = self.payable(input.installment).await?;
        let now = Utc::now();
        installment.apply(amount, now);

        let completed_loan = if installment.is_final(loan.tenor)
            && installment.payment_status == PaymentStatus::Paid
            && loan.is_active()
        {
            locks.extend(LockKey::Limit(loan.borrower)).await?;
            let mut loan = loan;
            let buckets = self
                .adjusted_limits(loan.borrower, loan.tenor, loan.on_the_road, Direction::Credit)
                .await?;
            loan.mark(LoanStatus::Paid)?;
            Some((loan, buckets))
        } else {
            None
        };

        let settlement = Settlement {
            draft: PaymentDraft {
                installment: installment.id,
                loan: installment.loan,
                amount: amount.money(),
                method: input.method,
                idempotency_key: input.idempotency_key,
                paid_at: now,
            },
            installment,
            completed_loan,
        };

        let completed = settlement.completed_loan.as_ref().map(|(loan, _)| loan.id);
        let mut tx = self.ledger.begin().await?;
        let outcome = write_settlement(tx.as_mut(), settlement).await;
        let payment = finish(tx, outcome).await?;
        if let Some(loan) = completed {
            info!(loan, "loan fully paid");
        }
        Ok(payment)
    }
}

async fn write_settlement(tx: &mut dyn LedgerTransaction, settlement: Settlement) -> Result<Payment> {
    let payment = tx.insert_payment(settlement.draft).await?;
    tx.update_installment(&settlement.installment).await?;
    if let Some((loan, buckets)) = settlement.completed_loan {
        tx.update_loan(&loan).await?;
        tx.bulk_update_limits(buckets).await?;
    }
    Ok(payment)
}
