use super::locking::LockSet;
use crate::config::LendingConfig;
use crate::domain::borrower::{Borrower, BorrowerId, Role};
use crate::domain::installment::Installment;
use crate::domain::limit::{self, CreditLimit, Direction};
use crate::domain::lock::LockKey;
use crate::domain::loan::{Loan, LoanId};
use crate::domain::money::Money;
use crate::domain::payment::Payment;
use crate::domain::ports::{
    LedgerTransaction, SharedBorrowerDirectory, SharedLedgerStore, SharedLockService,
};
use crate::error::{LendingError, Result};
use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

/// A loan together with its schedule and the payments booked against it.
#[derive(Debug, Clone, PartialEq)]
pub struct LoanStatement {
    pub loan: Loan,
    pub installments: Vec<Installment>,
    pub payments: Vec<Payment>,
}

/// The limit–loan–payment consistency engine.
///
/// `LendingEngine` owns handles to the ledger store, the borrower directory and
/// the lock service. Every mutating operation takes its locks through a
/// [`LockSet`], opens a ledger transaction only once those are held, and
/// commits or rolls back before the locks are released.
pub struct LendingEngine {
    pub(crate) ledger: SharedLedgerStore,
    pub(crate) borrowers: SharedBorrowerDirectory,
    pub(crate) locks: SharedLockService,
    pub(crate) config: LendingConfig,
}

impl LendingEngine {
    /// Creates a new `LendingEngine` instance.
    ///
    /// # Arguments
    ///
    /// * `ledger` - Transactional store for limits, loans, installments and payments.
    /// * `borrowers` - Directory used to resolve callers and loan owners.
    /// * `locks` - Lock service shared with every other engine instance.
    /// * `config` - Lock TTL and activation limits.
    pub fn new(
        ledger: SharedLedgerStore,
        borrowers: SharedBorrowerDirectory,
        locks: SharedLockService,
        config: LendingConfig,
    ) -> Self {
        Self {
            ledger,
            borrowers,
            locks,
            config,
        }
    }

    pub fn config(&self) -> &LendingConfig {
        &self.config
    }

    pub(crate) async fn lock(&self, keys: impl IntoIterator<Item = LockKey>) -> Result<LockSet> {
        LockSet::acquire(self.locks.clone(), self.config.lock_ttl, keys).await
    }

    pub(crate) async fn resolve_borrower(&self, id: BorrowerId) -> Result<Borrower> {
        self.borrowers
            .find_by_id(id)
            .await?
            .ok_or(LendingError::BorrowerNotFound(id))
    }

    /// Limit ledger: the bucket set resulting from moving `delta` on `tenor`.
    ///
    /// Callers must hold `LockKey::Limit(borrower)`.
    pub(crate) async fn adjusted_limits(
        &self,
        borrower: BorrowerId,
        tenor: u32,
        delta: Money,
        direction: Direction,
    ) -> Result<Vec<CreditLimit>> {
        let buckets = self.ledger.limits_by_borrower(borrower).await?;
        limit::adjust(borrower, &buckets, tenor, delta, direction, Utc::now())
    }

    /// Adds a user to the borrower directory.
    pub async fn register(&self, id: BorrowerId, name: &str, role: Role) -> Result<Borrower> {
        if name.trim().is_empty() {
            return Err(LendingError::ValidationError("Borrower name is required".to_string()));
        }
        let borrower = Borrower::new(id, name.trim(), role);
        self.borrowers.register(borrower.clone()).await?;
        info!(borrower = id, role = ?role, "borrower registered");
        Ok(borrower)
    }

    /// Seeds the configured credit limit buckets for a newly onboarded borrower.
    #[instrument(skip(self))]
    pub async fn activate(&self, caller: BorrowerId, borrower: BorrowerId) -> Result<Vec<CreditLimit>> {
        let actor = self.resolve_borrower(caller).await?;
        let owner = self.resolve_borrower(borrower).await?;
        if !actor.may_act_for(owner.id) {
            return Err(LendingError::forbidden(caller, &format!("activate borrower {borrower}")));
        }

        let now = Utc::now();
        let buckets = self
            .config
            .activation_limits
            .iter()
            .map(|(tenor, ceiling)| {
                Money::new(*ceiling).map(|ceiling| CreditLimit::seeded(owner.id, *tenor, ceiling, now))
            })
            .collect::<Result<Vec<_>>>()?;

        let locks = self.lock([LockKey::Limit(owner.id)]).await?;
        let result = self.seed_limits(owner.id, buckets).await;
        locks.release().await;

        let buckets = result?;
        info!(borrower = owner.id, buckets = buckets.len(), "borrower activated");
        Ok(buckets)
    }

    async fn seed_limits(&self, borrower: BorrowerId, buckets: Vec<CreditLimit>) -> Result<Vec<CreditLimit>> {
        if !self.ledger.limits_by_borrower(borrower).await?.is_empty() {
            return Err(LendingError::InvalidState(format!(
                "Borrower {borrower} is already activated"
            )));
        }
        let mut tx = self.ledger.begin().await?;
        let outcome = tx.insert_limits(buckets.clone()).await;
        finish(tx, outcome).await?;
        Ok(buckets)
    }

    /// Current credit limit buckets of `borrower`.
    pub async fn limits(&self, caller: BorrowerId, borrower: BorrowerId) -> Result<Vec<CreditLimit>> {
        let actor = self.resolve_borrower(caller).await?;
        let owner = self.resolve_borrower(borrower).await?;
        if !actor.may_act_for(owner.id) {
            return Err(LendingError::forbidden(caller, &format!("view limits of borrower {borrower}")));
        }
        self.ledger.limits_by_borrower(owner.id).await
    }

    /// A loan with its installments and payments.
    pub async fn loan(&self, caller: BorrowerId, id: LoanId) -> Result<LoanStatement> {
        let actor = self.resolve_borrower(caller).await?;
        let loan = self.ledger.loan(id).await?.ok_or(LendingError::LoanNotFound(id))?;
        self.statement(&actor, loan).await
    }

    pub async fn loan_by_uuid(&self, caller: BorrowerId, uuid: Uuid) -> Result<LoanStatement> {
        let actor = self.resolve_borrower(caller).await?;
        let loan = self
            .ledger
            .loan_by_uuid(uuid)
            .await?
            .ok_or(LendingError::LoanUuidNotFound(uuid))?;
        self.statement(&actor, loan).await
    }

    async fn statement(&self, actor: &Borrower, loan: Loan) -> Result<LoanStatement> {
        if !actor.may_act_for(loan.borrower) {
            return Err(LendingError::forbidden(actor.id, &format!("view loan {}", loan.id)));
        }
        let installments = self.ledger.installments_by_loan(loan.id).await?;
        let payments = self.ledger.payments_by_loan(loan.id).await?;
        Ok(LoanStatement {
            loan,
            installments,
            payments,
        })
    }

    /// Final state of the ledger: every bucket and every loan.
    pub async fn snapshot(&self) -> Result<(Vec<CreditLimit>, Vec<LoanStatement>)> {
        let limits = self.ledger.all_limits().await?;
        let mut loans = Vec::new();
        for loan in self.ledger.all_loans().await? {
            let installments = self.ledger.installments_by_loan(loan.id).await?;
            let payments = self.ledger.payments_by_loan(loan.id).await?;
            loans.push(LoanStatement {
                loan,
                installments,
                payments,
            });
        }
        Ok((limits, loans))
    }
}

/// Commits `tx` if `outcome` succeeded, rolls it back otherwise.
pub(crate) async fn finish<T>(tx: Box<dyn LedgerTransaction>, outcome: Result<T>) -> Result<T> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            tx.rollback().await;
            Err(e)
        }
    }
}
