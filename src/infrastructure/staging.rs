//! Write-set transactions shared by the ledger store backends.
//!
//! A [`StagedTransaction`] only records intended writes. On commit the backend
//! replays them against its current rows through [`apply_writes`], which
//! enforces the row-level guards, and persists the result atomically or not
//! at all.

use crate::domain::borrower::BorrowerId;
use crate::domain::installment::{Installment, InstallmentDraft, InstallmentId, PaymentStatus};
use crate::domain::limit::CreditLimit;
use crate::domain::loan::{Loan, LoanId, LoanTerms};
use crate::domain::payment::{Payment, PaymentDraft};
use crate::domain::ports::LedgerTransaction;
use crate::error::{LendingError, Result};
use async_trait::async_trait;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum LedgerWrite {
    InsertLimits(Vec<CreditLimit>),
    UpdateLimits(Vec<CreditLimit>),
    InsertLoan(Loan),
    UpdateLoan(Loan),
    InsertInstallments(Vec<Installment>),
    UpdateInstallment(Installment),
    FailOpenInstallments(LoanId),
    InsertPayment(Payment),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Loans,
    Installments,
    Payments,
}

/// Row access used while replaying a write set.
///
/// Reads must see rows put earlier in the same replay.
pub trait Rows {
    fn limit(&self, borrower: BorrowerId, tenor: u32) -> Result<Option<CreditLimit>>;
    fn loan(&self, id: LoanId) -> Result<Option<Loan>>;
    fn installment(&self, id: InstallmentId) -> Result<Option<Installment>>;
    fn installments_by_loan(&self, loan: LoanId) -> Result<Vec<Installment>>;
    fn payment_key_taken(&self, key: &str) -> Result<bool>;
    fn put_limit(&mut self, limit: CreditLimit) -> Result<()>;
    fn put_loan(&mut self, loan: Loan) -> Result<()>;
    fn put_installment(&mut self, installment: Installment) -> Result<()>;
    fn put_payment(&mut self, payment: Payment) -> Result<()>;
}

/// A backend that hands out row ids and atomically applies write sets.
#[async_trait]
pub trait CommitTarget: Clone + Send + Sync + 'static {
    fn next_id(&self, table: Table) -> u64;
    async fn apply(&self, writes: Vec<LedgerWrite>) -> Result<()>;
}

fn rejected(what: String) -> LendingError {
    LendingError::PersistenceFailure(what)
}

/// Replays `writes` in order, failing on the first guard violation.
pub fn apply_writes<R: Rows>(rows: &mut R, writes: Vec<LedgerWrite>) -> Result<()> {
    for write in writes {
        match write {
            LedgerWrite::InsertLimits(limits) => {
                for limit in limits {
                    if rows.limit(limit.borrower, limit.tenor)?.is_some() {
                        return Err(rejected(format!(
                            "duplicate credit limit for borrower {} tenor {}",
                            limit.borrower, limit.tenor
                        )));
                    }
                    check_limit(&limit)?;
                    rows.put_limit(limit)?;
                }
            }
            LedgerWrite::UpdateLimits(limits) => {
                for limit in limits {
                    if rows.limit(limit.borrower, limit.tenor)?.is_none() {
                        return Err(rejected(format!(
                            "credit limit for borrower {} tenor {} does not exist",
                            limit.borrower, limit.tenor
                        )));
                    }
                    check_limit(&limit)?;
                    rows.put_limit(limit)?;
                }
            }
            LedgerWrite::InsertLoan(loan) => rows.put_loan(loan)?,
            LedgerWrite::UpdateLoan(loan) => {
                let stored = rows
                    .loan(loan.id)?
                    .ok_or_else(|| rejected(format!("loan {} does not exist", loan.id)))?;
                if !stored.is_active() {
                    return Err(rejected(format!(
                        "loan {} is no longer active ({:?})",
                        loan.id, stored.status
                    )));
                }
                rows.put_loan(loan)?;
            }
            LedgerWrite::InsertInstallments(installments) => {
                for installment in installments {
                    if rows.loan(installment.loan)?.is_none() {
                        return Err(rejected(format!(
                            "installment {} references unknown loan {}",
                            installment.id, installment.loan
                        )));
                    }
                    rows.put_installment(installment)?;
                }
            }
            LedgerWrite::UpdateInstallment(installment) => {
                let stored = rows.installment(installment.id)?.ok_or_else(|| {
                    rejected(format!("installment {} does not exist", installment.id))
                })?;
                if stored.payment_status == PaymentStatus::Failed {
                    return Err(rejected(format!(
                        "installment {} has already failed",
                        installment.id
                    )));
                }
                if installment.amount_paid > installment.amount_due {
                    return Err(rejected(format!(
                        "installment {} would be overpaid",
                        installment.id
                    )));
                }
                rows.put_installment(installment)?;
            }
            LedgerWrite::FailOpenInstallments(loan) => {
                for mut installment in rows.installments_by_loan(loan)? {
                    if installment.payment_status.is_open() {
                        installment.payment_status = PaymentStatus::Failed;
                        rows.put_installment(installment)?;
                    }
                }
            }
            LedgerWrite::InsertPayment(payment) => {
                if let Some(key) = &payment.idempotency_key
                    && rows.payment_key_taken(key)?
                {
                    return Err(rejected(format!("duplicate idempotency key {key}")));
                }
                rows.put_payment(payment)?;
            }
        }
    }
    Ok(())
}

fn check_limit(limit: &CreditLimit) -> Result<()> {
    if limit.is_consistent() {
        Ok(())
    } else {
        Err(rejected(format!(
            "credit limit for borrower {} tenor {} exceeds its ceiling",
            limit.borrower, limit.tenor
        )))
    }
}

/// A [`LedgerTransaction`] that buffers writes until commit.
pub struct StagedTransaction<T: CommitTarget> {
    target: T,
    writes: Vec<LedgerWrite>,
}

impl<T: CommitTarget> StagedTransaction<T> {
    pub fn new(target: T) -> Self {
        Self {
            target,
            writes: Vec::new(),
        }
    }
}

#[async_trait]
impl<T: CommitTarget> LedgerTransaction for StagedTransaction<T> {
    async fn insert_limits(&mut self, limits: Vec<CreditLimit>) -> Result<()> {
        self.writes.push(LedgerWrite::InsertLimits(limits));
        Ok(())
    }

    async fn bulk_update_limits(&mut self, limits: Vec<CreditLimit>) -> Result<()> {
        self.writes.push(LedgerWrite::UpdateLimits(limits));
        Ok(())
    }

    async fn insert_loan(&mut self, terms: LoanTerms) -> Result<Loan> {
        let loan = Loan::open(self.target.next_id(Table::Loans), terms);
        self.writes.push(LedgerWrite::InsertLoan(loan.clone()));
        Ok(loan)
    }

    async fn update_loan(&mut self, loan: &Loan) -> Result<()> {
        self.writes.push(LedgerWrite::UpdateLoan(loan.clone()));
        Ok(())
    }

    async fn bulk_insert_installments(
        &mut self,
        drafts: Vec<InstallmentDraft>,
    ) -> Result<Vec<Installment>> {
        let installments: Vec<Installment> = drafts
            .into_iter()
            .map(|draft| Installment::from_draft(self.target.next_id(Table::Installments), draft))
            .collect();
        self.writes
            .push(LedgerWrite::InsertInstallments(installments.clone()));
        Ok(installments)
    }

    async fn update_installment(&mut self, installment: &Installment) -> Result<()> {
        self.writes
            .push(LedgerWrite::UpdateInstallment(installment.clone()));
        Ok(())
    }

    async fn fail_open_installments(&mut self, loan: LoanId) -> Result<()> {
        self.writes.push(LedgerWrite::FailOpenInstallments(loan));
        Ok(())
    }

    async fn insert_payment(&mut self, draft: PaymentDraft) -> Result<Payment> {
        let payment = Payment::from_draft(self.target.next_id(Table::Payments), draft);
        self.writes.push(LedgerWrite::InsertPayment(payment.clone()));
        Ok(payment)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let Self { target, writes } = *self;
        let count = writes.len();
        target.apply(writes).await?;
        debug!(writes = count, "ledger transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) {
        debug!(writes = self.writes.len(), "ledger transaction rolled back");
    }
}
