#![allow(dead_code)]

use async_trait::async_trait;
use credit_ledger::application::engine::LendingEngine;
use credit_ledger::config::LendingConfig;
use credit_ledger::domain::borrower::{BorrowerId, Role};
use credit_ledger::domain::installment::{Installment, InstallmentDraft, InstallmentId};
use credit_ledger::domain::limit::CreditLimit;
use credit_ledger::domain::loan::{Loan, LoanId, LoanInput, LoanTerms};
use credit_ledger::domain::payment::{Payment, PaymentDraft, PaymentInput};
use credit_ledger::domain::ports::{LedgerStore, LedgerTransaction, SharedLedgerStore};
use credit_ledger::error::{LendingError, Result};
use credit_ledger::infrastructure::in_memory::{
    InMemoryBorrowerDirectory, InMemoryLedger, InMemoryLockService,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const ADMIN: BorrowerId = 1;
pub const BORROWER: BorrowerId = 7;
pub const STRANGER: BorrowerId = 9;

pub struct Harness {
    pub engine: LendingEngine,
    pub locks: InMemoryLockService,
}

/// Engine over in-memory adapters whose activation seeds `limits`.
pub async fn harness(limits: &[(u32, Decimal)]) -> Harness {
    harness_with(Arc::new(InMemoryLedger::new()), limits).await
}

/// Same as [`harness`] but over the given ledger store.
///
/// Registers an administrator, `BORROWER` and `STRANGER`, and activates `BORROWER`.
pub async fn harness_with(ledger: SharedLedgerStore, limits: &[(u32, Decimal)]) -> Harness {
    let locks = InMemoryLockService::new();
    let config = LendingConfig {
        activation_limits: limits.to_vec(),
        ..LendingConfig::default()
    };
    let engine = LendingEngine::new(
        ledger,
        Arc::new(InMemoryBorrowerDirectory::new()),
        Arc::new(locks.clone()),
        config,
    );

    engine.register(ADMIN, "Ops", Role::Admin).await.unwrap();
    engine.register(BORROWER, "Budi", Role::Borrower).await.unwrap();
    engine.register(STRANGER, "Sari", Role::Borrower).await.unwrap();
    engine.activate(BORROWER, BORROWER).await.unwrap();

    Harness { engine, locks }
}

pub fn loan_input(on_the_road: Decimal, admin_fee: Decimal, interest: Decimal, tenor: u32) -> LoanInput {
    LoanInput {
        asset_name: "Honda Vario".to_string(),
        contract_number: format!("KTR-{tenor}-{on_the_road}"),
        on_the_road,
        admin_fee,
        interest_amount: interest,
        tenor,
    }
}

pub fn payment(installment: InstallmentId, amount: Decimal) -> PaymentInput {
    PaymentInput {
        installment,
        amount,
        method: "virtual_account".to_string(),
        idempotency_key: None,
    }
}

/// Current limit of `BORROWER`'s bucket for `tenor`.
pub async fn current_limit(engine: &LendingEngine, tenor: u32) -> Decimal {
    engine
        .limits(ADMIN, BORROWER)
        .await
        .unwrap()
        .into_iter()
        .find(|bucket| bucket.tenor == tenor)
        .map(|bucket| bucket.current_limit.value())
        .unwrap()
}

pub async fn installments(engine: &LendingEngine, loan: LoanId) -> Vec<Installment> {
    engine.loan(ADMIN, loan).await.unwrap().installments
}

/// Pays every installment of `loan` in full except the last one.
pub async fn pay_all_but_last(engine: &LendingEngine, loan: &Loan) {
    for installment in installments(engine, loan.id).await.iter().take(loan.tenor as usize - 1) {
        engine
            .apply_payment(BORROWER, payment(installment.id, installment.amount_due.value()))
            .await
            .unwrap();
    }
}

pub fn default_limits() -> Vec<(u32, Decimal)> {
    vec![(3, dec!(2000000)), (6, dec!(10000000))]
}

/// Which transaction call a [`FaultyLedger`] fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    BulkInsertInstallments,
    BulkUpdateLimits,
    UpdateLoan,
    Commit,
}

/// Ledger store that behaves like [`InMemoryLedger`] until a failure is armed.
#[derive(Clone, Default)]
pub struct FaultyLedger {
    inner: InMemoryLedger,
    fault: Arc<Mutex<Option<Fault>>>,
    stale: Arc<Mutex<Option<Installment>>>,
}

impl FaultyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every transaction begun from now on fails on `fault`.
    pub fn arm(&self, fault: Fault) {
        *self.fault.lock().unwrap() = Some(fault);
    }

    /// The next read of `snapshot.id` returns `snapshot` instead of the
    /// stored row, as if a concurrent write landed right after that read.
    pub fn serve_stale_once(&self, snapshot: Installment) {
        *self.stale.lock().unwrap() = Some(snapshot);
    }
}

struct FaultyTransaction {
    inner: Box<dyn LedgerTransaction>,
    fault: Option<Fault>,
}

impl FaultyTransaction {
    fn check(&self, call: Fault) -> Result<()> {
        if self.fault == Some(call) {
            return Err(LendingError::PersistenceFailure(format!("injected {call:?} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerTransaction for FaultyTransaction {
    async fn insert_limits(&mut self, limits: Vec<CreditLimit>) -> Result<()> {
        self.inner.insert_limits(limits).await
    }

    async fn bulk_update_limits(&mut self, limits: Vec<CreditLimit>) -> Result<()> {
        self.check(Fault::BulkUpdateLimits)?;
        self.inner.bulk_update_limits(limits).await
    }

    async fn insert_loan(&mut self, terms: LoanTerms) -> Result<Loan> {
        self.inner.insert_loan(terms).await
    }

    async fn update_loan(&mut self, loan: &Loan) -> Result<()> {
        self.check(Fault::UpdateLoan)?;
        self.inner.update_loan(loan).await
    }

    async fn bulk_insert_installments(
        &mut self,
        drafts: Vec<InstallmentDraft>,
    ) -> Result<Vec<Installment>> {
        self.check(Fault::BulkInsertInstallments)?;
        self.inner.bulk_insert_installments(drafts).await
    }

    async fn update_installment(&mut self, installment: &Installment) -> Result<()> {
        self.inner.update_installment(installment).await
    }

    async fn fail_open_installments(&mut self, loan: LoanId) -> Result<()> {
        self.inner.fail_open_installments(loan).await
    }

    async fn insert_payment(&mut self, draft: PaymentDraft) -> Result<Payment> {
        self.inner.insert_payment(draft).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if self.fault == Some(Fault::Commit) {
            self.inner.rollback().await;
            return Err(LendingError::PersistenceFailure("injected commit failure".to_string()));
        }
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) {
        self.inner.rollback().await
    }
}

#[async_trait]
impl LedgerStore for FaultyLedger {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>> {
        Ok(Box::new(FaultyTransaction {
            inner: self.inner.begin().await?,
            fault: *self.fault.lock().unwrap(),
        }))
    }

    async fn limits_by_borrower(&self, borrower: BorrowerId) -> Result<Vec<CreditLimit>> {
        self.inner.limits_by_borrower(borrower).await
    }

    async fn all_limits(&self) -> Result<Vec<CreditLimit>> {
        self.inner.all_limits().await
    }

    async fn loan(&self, id: LoanId) -> Result<Option<Loan>> {
        self.inner.loan(id).await
    }

    async fn loan_by_uuid(&self, uuid: Uuid) -> Result<Option<Loan>> {
        self.inner.loan_by_uuid(uuid).await
    }

    async fn all_loans(&self) -> Result<Vec<Loan>> {
        self.inner.all_loans().await
    }

    async fn installment(&self, id: InstallmentId) -> Result<Option<Installment>> {
        let stale = {
            let mut slot = self.stale.lock().unwrap();
            if slot.as_ref().is_some_and(|snapshot| snapshot.id == id) {
                slot.take()
            } else {
                None
            }
        };
        match stale {
            Some(snapshot) => Ok(Some(snapshot)),
            None => self.inner.installment(id).await,
        }
    }

    async fn installments_by_loan(&self, loan: LoanId) -> Result<Vec<Installment>> {
        self.inner.installments_by_loan(loan).await
    }

    async fn payments_by_loan(&self, loan: LoanId) -> Result<Vec<Payment>> {
        self.inner.payments_by_loan(loan).await
    }

    async fn payment_by_key(&self, key: &str) -> Result<Option<Payment>> {
        self.inner.payment_by_key(key).await
    }
}
