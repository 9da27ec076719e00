use super::engine::{LendingEngine, finish};
use crate::domain::borrower::BorrowerId;
use crate::domain::limit::{CreditLimit, Direction};
use crate::domain::lock::LockKey;
use crate::domain::loan::{Loan, LoanId, LoanStatus};
use crate::domain::ports::LedgerTransaction;
use crate::error::{LendingError, Result};
use tracing::{info, instrument, warn};

impl LendingEngine {
    /// Cancels an active loan.
    ///
    /// Installments that are not yet paid become `failed` and the principal
    /// is credited back to the borrower's limit. Paid installments are left
    /// untouched.
    #[instrument(skip(self))]
    pub async fn cancel(&self, caller: BorrowerId, loan_id: LoanId) -> Result<Loan> {
        let actor = self.resolve_borrower(caller).await?;
        let loan = self
            .ledger
            .loan(loan_id)
            .await?
            .ok_or(LendingError::LoanNotFound(loan_id))?;
        // Ownership is checked before status.
        if !actor.may_act_for(loan.borrower) {
            return Err(LendingError::forbidden(caller, &format!("cancel loan {loan_id}")));
        }
        ensure_cancelable(&loan)?;

        let locks = self
            .lock([
                LockKey::Limit(loan.borrower),
                LockKey::Loan(loan_id),
                LockKey::InstallmentGroup(loan_id),
            ])
            .await?;
        let result = self.void_loan(loan_id).await;
        locks.release().await;

        match &result {
            Ok(loan) => info!(loan = loan.id, borrower = loan.borrower, "loan canceled"),
            Err(e) => warn!(error = %e, "cancellation rejected"),
        }
        result
    }

    async fn void_loan(&self, id: LoanId) -> Result<Loan> {
        // A final payment may have completed the loan before the locks were taken.
        let mut loan = self.ledger.loan(id).await?.ok_or(LendingError::LoanNotFound(id))?;
        ensure_cancelable(&loan)?;
        let buckets = self
            .adjusted_limits(loan.borrower, loan.tenor, loan.on_the_road, Direction::Credit)
            .await?;
        loan.mark(LoanStatus::Canceled)?;

        let mut tx = self.ledger.begin().await?;
        let outcome = write_cancellation(tx.as_mut(), &loan, buckets).await;
        finish(tx, outcome).await?;
        Ok(loan)
    }
}

fn ensure_cancelable(loan: &Loan) -> Result<()> {
    if loan.is_active() {
        return Ok(());
    }
    Err(LendingError::InvalidState(format!(
        "Loan {} is {:?} and cannot be canceled",
        loan.id, loan.status
    )))
}

async fn write_cancellation(
    tx: &mut dyn LedgerTransaction,
    loan: &Loan,
    buckets: Vec<CreditLimit>,
) -> Result<()> {
    tx.update_loan(loan).await?;
    tx.fail_open_installments(loan.id).await?;
    tx.bulk_update_limits(buckets).await
}
