use super::borrower::{Borrower, BorrowerId};
use super::installment::{Installment, InstallmentDraft, InstallmentId};
use super::limit::CreditLimit;
use super::loan::{Loan, LoanId, LoanTerms};
use super::payment::{Payment, PaymentDraft};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Read side of the user registry, plus the onboarding write used to seed it.
#[async_trait]
pub trait BorrowerDirectory: Send + Sync {
    async fn register(&self, borrower: Borrower) -> Result<()>;
    async fn find_by_id(&self, id: BorrowerId) -> Result<Option<Borrower>>;
    async fn find_by_uuid(&self, uuid: Uuid) -> Result<Option<Borrower>>;
}

/// Transactional store for limits, loans, installments and payments.
///
/// Reads observe committed state only. All writes go through a
/// [`LedgerTransaction`] obtained from [`LedgerStore::begin`].
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>>;
    async fn limits_by_borrower(&self, borrower: BorrowerId) -> Result<Vec<CreditLimit>>;
    async fn all_limits(&self) -> Result<Vec<CreditLimit>>;
    async fn loan(&self, id: LoanId) -> Result<Option<Loan>>;
    async fn loan_by_uuid(&self, uuid: Uuid) -> Result<Option<Loan>>;
    async fn all_loans(&self) -> Result<Vec<Loan>>;
    async fn installment(&self, id: InstallmentId) -> Result<Option<Installment>>;
    async fn installments_by_loan(&self, loan: LoanId) -> Result<Vec<Installment>>;
    async fn payments_by_loan(&self, loan: LoanId) -> Result<Vec<Payment>>;
    async fn payment_by_key(&self, key: &str) -> Result<Option<Payment>>;
}

/// One commit/rollback unit.
///
/// Nothing written here is visible to readers until [`commit`](Self::commit)
/// succeeds. Dropping a transaction without committing discards it.
#[async_trait]
pub trait LedgerTransaction: Send {
    async fn insert_limits(&mut self, limits: Vec<CreditLimit>) -> Result<()>;
    async fn bulk_update_limits(&mut self, limits: Vec<CreditLimit>) -> Result<()>;
    async fn insert_loan(&mut self, terms: LoanTerms) -> Result<Loan>;
    async fn update_loan(&mut self, loan: &Loan) -> Result<()>;
    async fn bulk_insert_installments(
        &mut self,
        drafts: Vec<InstallmentDraft>,
    ) -> Result<Vec<Installment>>;
    async fn update_installment(&mut self, installment: &Installment) -> Result<()>;
    /// Marks every pending, partial or overdue installment of `loan` as failed.
    async fn fail_open_installments(&mut self, loan: LoanId) -> Result<()>;
    async fn insert_payment(&mut self, draft: PaymentDraft) -> Result<Payment>;
    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>);
}

/// Key/TTL mutual exclusion shared by every process instance.
///
/// `acquire` is a single non-blocking attempt: `Ok(false)` means the key is
/// currently held by someone else.
#[async_trait]
pub trait LockService: Send + Sync {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<bool>;
    async fn release(&self, key: &str) -> Result<()>;
}

pub type SharedBorrowerDirectory = Arc<dyn BorrowerDirectory>;
pub type SharedLedgerStore = Arc<dyn LedgerStore>;
pub type SharedLockService = Arc<dyn LockService>;
