use super::engine::{LendingEngine, finish};
use crate::domain::borrower::BorrowerId;
use crate::domain::limit::{CreditLimit, Direction};
use crate::domain::lock::LockKey;
use crate::domain::loan::{Loan, LoanInput, LoanTerms};
use crate::domain::ports::LedgerTransaction;
use crate::error::Result;
use chrono::Utc;
use tracing::{info, instrument, warn};

impl LendingEngine {
    /// Originates a loan for `caller` against the credit limit bucket of the
    /// requested tenor.
    ///
    /// Holds the borrower's limit lock while the limit is debited and the loan
    /// and its installment schedule are written in one transaction.
    #[instrument(skip(self, input), fields(tenor = input.tenor))]
    pub async fn originate(&self, caller: BorrowerId, input: LoanInput) -> Result<Loan> {
        let borrower = self.resolve_borrower(caller).await?;
        let terms = LoanTerms::price(borrower.id, input, Utc::now())?;

        let locks = self.lock([LockKey::Limit(borrower.id)]).await?;
        let result = self.book_loan(terms).await;
        locks.release().await;

        match &result {
            Ok(loan) => info!(
                loan = loan.id,
                borrower = loan.borrower,
                principal = %loan.on_the_road,
                "loan originated"
            ),
            Err(e) => warn!(borrower = borrower.id, error = %e, "origination rejected"),
        }
        result
    }

    async fn book_loan(&self, terms: LoanTerms) -> Result<Loan> {
        let buckets = self
            .adjusted_limits(
                terms.borrower,
                terms.tenor,
                terms.on_the_road.money(),
                Direction::Debit,
            )
            .await?;

        let mut tx = self.ledger.begin().await?;
        let outcome = write_loan(tx.as_mut(), terms, buckets).await;
        finish(tx, outcome).await
    }
}

async fn write_loan(
    tx: &mut dyn LedgerTransaction,
    terms: LoanTerms,
    buckets: Vec<CreditLimit>,
) -> Result<Loan> {
    let loan = tx.insert_loan(terms).await?;
    tx.bulk_insert_installments(loan.schedule()).await?;
    tx.bulk_update_limits(buckets).await?;
    Ok(loan)
}
