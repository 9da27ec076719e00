use super::staging::{CommitTarget, LedgerWrite, Rows, StagedTransaction, Table, apply_writes};
use crate::domain::borrower::{Borrower, BorrowerId};
use crate::domain::installment::{Installment, InstallmentId};
use crate::domain::limit::CreditLimit;
use crate::domain::loan::{Loan, LoanId};
use crate::domain::payment::{Payment, PaymentId};
use crate::domain::ports::{BorrowerDirectory, LedgerStore, LedgerTransaction, LockService};
use crate::error::{LendingError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use uuid::Uuid;

/// A thread-safe in-memory borrower registry.
#[derive(Default, Clone)]
pub struct InMemoryBorrowerDirectory {
    borrowers: Arc<RwLock<HashMap<BorrowerId, Borrower>>>,
}

impl InMemoryBorrowerDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BorrowerDirectory for InMemoryBorrowerDirectory {
    async fn register(&self, borrower: Borrower) -> Result<()> {
        let mut borrowers = self.borrowers.write().await;
        if borrowers.contains_key(&borrower.id) {
            return Err(LendingError::InvalidState(format!(
                "Borrower {} is already registered",
                borrower.id
            )));
        }
        borrowers.insert(borrower.id, borrower);
        Ok(())
    }

    async fn find_by_id(&self, id: BorrowerId) -> Result<Option<Borrower>> {
        let borrowers = self.borrowers.read().await;
        Ok(borrowers.get(&id).cloned())
    }

    async fn find_by_uuid(&self, uuid: Uuid) -> Result<Option<Borrower>> {
        let borrowers = self.borrowers.read().await;
        Ok(borrowers.values().find(|b| b.uuid == uuid).cloned())
    }
}

#[derive(Default, Clone, Debug)]
struct LedgerTables {
    limits: BTreeMap<(BorrowerId, u32), CreditLimit>,
    loans: BTreeMap<LoanId, Loan>,
    installments: BTreeMap<InstallmentId, Installment>,
    payments: BTreeMap<PaymentId, Payment>,
}

impl Rows for LedgerTables {
    fn limit(&self, borrower: BorrowerId, tenor: u32) -> Result<Option<CreditLimit>> {
        Ok(self.limits.get(&(borrower, tenor)).cloned())
    }

    fn loan(&self, id: LoanId) -> Result<Option<Loan>> {
        Ok(self.loans.get(&id).cloned())
    }

    fn installment(&self, id: InstallmentId) -> Result<Option<Installment>> {
        Ok(self.installments.get(&id).cloned())
    }

    fn installments_by_loan(&self, loan: LoanId) -> Result<Vec<Installment>> {
        Ok(self
            .installments
            .values()
            .filter(|i| i.loan == loan)
            .cloned()
            .collect())
    }

    fn payment_key_taken(&self, key: &str) -> Result<bool> {
        Ok(self
            .payments
            .values()
            .any(|p| p.idempotency_key.as_deref() == Some(key)))
    }

    fn put_limit(&mut self, limit: CreditLimit) -> Result<()> {
        self.limits.insert((limit.borrower, limit.tenor), limit);
        Ok(())
    }

    fn put_loan(&mut self, loan: Loan) -> Result<()> {
        self.loans.insert(loan.id, loan);
        Ok(())
    }

    fn put_installment(&mut self, installment: Installment) -> Result<()> {
        self.installments.insert(installment.id, installment);
        Ok(())
    }

    fn put_payment(&mut self, payment: Payment) -> Result<()> {
        self.payments.insert(payment.id, payment);
        Ok(())
    }
}

impl LedgerTables {
    fn absorb(&mut self, pending: LedgerTables) {
        self.limits.extend(pending.limits);
        self.loans.extend(pending.loans);
        self.installments.extend(pending.installments);
        self.payments.extend(pending.payments);
    }
}

/// Writes of one commit, read through over the committed tables.
struct PendingRows<'a> {
    committed: &'a LedgerTables,
    pending: LedgerTables,
}

impl<'a> PendingRows<'a> {
    fn new(committed: &'a LedgerTables) -> Self {
        Self {
            committed,
            pending: LedgerTables::default(),
        }
    }
}

impl Rows for PendingRows<'_> {
    fn limit(&self, borrower: BorrowerId, tenor: u32) -> Result<Option<CreditLimit>> {
        match self.pending.limit(borrower, tenor)? {
            Some(limit) => Ok(Some(limit)),
            None => self.committed.limit(borrower, tenor),
        }
    }

    fn loan(&self, id: LoanId) -> Result<Option<Loan>> {
        match self.pending.loan(id)? {
            Some(loan) => Ok(Some(loan)),
            None => self.committed.loan(id),
        }
    }

    fn installment(&self, id: InstallmentId) -> Result<Option<Installment>> {
        match self.pending.installment(id)? {
            Some(installment) => Ok(Some(installment)),
            None => self.committed.installment(id),
        }
    }

    fn installments_by_loan(&self, loan: LoanId) -> Result<Vec<Installment>> {
        let mut installments: Vec<Installment> = self
            .committed
            .installments_by_loan(loan)?
            .into_iter()
            .filter(|i| !self.pending.installments.contains_key(&i.id))
            .collect();
        installments.extend(self.pending.installments_by_loan(loan)?);
        Ok(installments)
    }

    fn payment_key_taken(&self, key: &str) -> Result<bool> {
        Ok(self.pending.payment_key_taken(key)? || self.committed.payment_key_taken(key)?)
    }

    fn put_limit(&mut self, limit: CreditLimit) -> Result<()> {
        self.pending.put_limit(limit)
    }

    fn put_loan(&mut self, loan: Loan) -> Result<()> {
        self.pending.put_loan(loan)
    }

    fn put_installment(&mut self, installment: Installment) -> Result<()> {
        self.pending.put_installment(installment)
    }

    fn put_payment(&mut self, payment: Payment) -> Result<()> {
        self.pending.put_payment(payment)
    }
}

#[derive(Default, Debug)]
struct Sequences {
    loans: AtomicU64,
    installments: AtomicU64,
    payments: AtomicU64,
}

/// A thread-safe in-memory ledger store.
///
/// Commits replay the write set into a pending overlay over the live tables
/// and merge it only when every write passed, so a failed commit leaves no
/// trace. Ids are
/// handed out from per-table sequences; ids of rolled-back rows are not reused.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    tables: Arc<RwLock<LedgerTables>>,
    sequences: Arc<Sequences>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CommitTarget for InMemoryLedger {
    fn next_id(&self, table: Table) -> u64 {
        let sequence = match table {
            Table::Loans => &self.sequences.loans,
            Table::Installments => &self.sequences.installments,
            Table::Payments => &self.sequences.payments,
        };
        sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn apply(&self, writes: Vec<LedgerWrite>) -> Result<()> {
        let mut tables = self.tables.write().await;
        let mut staged = PendingRows::new(&tables);
        apply_writes(&mut staged, writes)?;
        let pending = staged.pending;
        tables.absorb(pending);
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>> {
        Ok(Box::new(StagedTransaction::new(self.clone())))
    }

    async fn limits_by_borrower(&self, borrower: BorrowerId) -> Result<Vec<CreditLimit>> {
        let tables = self.tables.read().await;
        Ok(tables
            .limits
            .range((borrower, u32::MIN)..=(borrower, u32::MAX))
            .map(|(_, limit)| limit.clone())
            .collect())
    }

    async fn all_limits(&self) -> Result<Vec<CreditLimit>> {
        let tables = self.tables.read().await;
        Ok(tables.limits.values().cloned().collect())
    }

    async fn loan(&self, id: LoanId) -> Result<Option<Loan>> {
        let tables = self.tables.read().await;
        tables.loan(id)
    }

    async fn loan_by_uuid(&self, uuid: Uuid) -> Result<Option<Loan>> {
        let tables = self.tables.read().await;
        Ok(tables.loans.values().find(|l| l.uuid == uuid).cloned())
    }

    async fn all_loans(&self) -> Result<Vec<Loan>> {
        let tables = self.tables.read().await;
        Ok(tables.loans.values().cloned().collect())
    }

    async fn installment(&self, id: InstallmentId) -> Result<Option<Installment>> {
        let tables = self.tables.read().await;
        tables.installment(id)
    }

    async fn installments_by_loan(&self, loan: LoanId) -> Result<Vec<Installment>> {
        let tables = self.tables.read().await;
        let mut installments = tables.installments_by_loan(loan)?;
        installments.sort_by_key(|i| i.installment_number);
        Ok(installments)
    }

    async fn payments_by_loan(&self, loan: LoanId) -> Result<Vec<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payments
            .values()
            .filter(|p| p.loan == loan)
            .cloned()
            .collect())
    }

    async fn payment_by_key(&self, key: &str) -> Result<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payments
            .values()
            .find(|p| p.idempotency_key.as_deref() == Some(key))
            .cloned())
    }
}

/// Process-local stand-in for the shared lock service.
///
/// A key is free when it was never taken, was released, or its TTL elapsed.
#[derive(Default, Clone)]
pub struct InMemoryLockService {
    held: Arc<Mutex<HashMap<String, Instant>>>,
}

impl InMemoryLockService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_held(&self, key: &str) -> bool {
        let held = self.held.lock().await;
        held.get(key).is_some_and(|expiry| *expiry > Instant::now())
    }
}

#[async_trait]
impl LockService for InMemoryLockService {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut held = self.held.lock().await;
        let now = Instant::now();
        match held.get(key) {
            Some(expiry) if *expiry > now => Ok(false),
            _ => {
                held.insert(key.to_string(), now + ttl);
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &str) -> Result<()> {
        let mut held = self.held.lock().await;
        held.remove(key);
        Ok(())
    }
}
