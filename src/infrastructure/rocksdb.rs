use super::staging::{CommitTarget, LedgerWrite, Rows, StagedTransaction, Table, apply_writes};
use crate::domain::borrower::{Borrower, BorrowerId};
use crate::domain::installment::{Installment, InstallmentId};
use crate::domain::limit::CreditLimit;
use crate::domain::loan::{Loan, LoanId};
use crate::domain::payment::Payment;
use crate::domain::ports::{BorrowerDirectory, LedgerStore, LedgerTransaction};
use crate::error::{LendingError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Column Family for the borrower directory.
pub const CF_BORROWERS: &str = "borrowers";
/// Column Family for credit limit buckets, keyed by borrower then tenor.
pub const CF_LIMITS: &str = "limits";
pub const CF_LOANS: &str = "loans";
pub const CF_INSTALLMENTS: &str = "installments";
pub const CF_PAYMENTS: &str = "payments";
/// Column Family mapping payment idempotency keys to payment ids.
pub const CF_PAYMENT_KEYS: &str = "payment_keys";

const COLUMN_FAMILIES: [&str; 6] = [
    CF_BORROWERS,
    CF_LIMITS,
    CF_LOANS,
    CF_INSTALLMENTS,
    CF_PAYMENTS,
    CF_PAYMENT_KEYS,
];

/// A persistent ledger store and borrower directory using RocksDB.
///
/// Each entity kind lives in its own Column Family. A commit replays the
/// transaction's write set into a single `WriteBatch`, so either every row of
/// the transaction lands or none does. Commits are serialized by an async
/// mutex; the store does not coordinate with other processes opening the same
/// path.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    commit_lock: Arc<Mutex<()>>,
    sequences: Arc<[AtomicU64; 3]>,
}

fn id_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

fn limit_key(borrower: BorrowerId, tenor: u32) -> Vec<u8> {
    let mut key = borrower.to_be_bytes().to_vec();
    key.extend_from_slice(&tenor.to_be_bytes());
    key
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| LendingError::corrupt(format!("Serialization error: {e}")))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| LendingError::corrupt(format!("Deserialization error: {e}")))
}

fn table_slot(table: Table) -> usize {
    match table {
        Table::Loans => 0,
        Table::Installments => 1,
        Table::Payments => 2,
    }
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures every ledger Column Family exists and resumes the id
    /// sequences from the highest stored ids.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        let store = Self {
            db: Arc::new(db),
            commit_lock: Arc::new(Mutex::new(())),
            sequences: Arc::new([AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)]),
        };
        for (table, cf) in [
            (Table::Loans, CF_LOANS),
            (Table::Installments, CF_INSTALLMENTS),
            (Table::Payments, CF_PAYMENTS),
        ] {
            let last = store.last_id(cf)?;
            store.sequences[table_slot(table)].store(last, Ordering::SeqCst);
        }
        Ok(store)
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            LendingError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn last_id(&self, name: &str) -> Result<u64> {
        let cf = self.cf(name)?;
        match self.db.iterator_cf(cf, IteratorMode::End).next() {
            Some(item) => {
                let (key, _) = item?;
                let bytes: [u8; 8] = key
                    .as_ref()
                    .try_into()
                    .map_err(|_| LendingError::corrupt(format!("malformed key in {name}")))?;
                Ok(u64::from_be_bytes(bytes))
            }
            None => Ok(0),
        }
    }

    fn get<T: DeserializeOwned>(&self, name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(name)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, name: &str, mode: IteratorMode) -> Result<Vec<T>> {
        let cf = self.cf(name)?;
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(cf, mode) {
            let (_key, value) = item?;
            rows.push(decode(&value)?);
        }
        Ok(rows)
    }

    fn scan_installments(&self, loan: LoanId) -> Result<Vec<Installment>> {
        let installments: Vec<Installment> = self.scan(CF_INSTALLMENTS, IteratorMode::Start)?;
        Ok(installments.into_iter().filter(|i| i.loan == loan).collect())
    }
}

/// Rows seen by a commit: pending puts first, then the database.
struct BatchRows<'a> {
    store: &'a RocksDBStore,
    batch: WriteBatch,
    limits: HashMap<(BorrowerId, u32), CreditLimit>,
    loans: HashMap<LoanId, Loan>,
    installments: HashMap<InstallmentId, Installment>,
    payment_keys: HashSet<String>,
}

impl<'a> BatchRows<'a> {
    fn new(store: &'a RocksDBStore) -> Self {
        Self {
            store,
            batch: WriteBatch::default(),
            limits: HashMap::new(),
            loans: HashMap::new(),
            installments: HashMap::new(),
            payment_keys: HashSet::new(),
        }
    }
}

impl Rows for BatchRows<'_> {
    fn limit(&self, borrower: BorrowerId, tenor: u32) -> Result<Option<CreditLimit>> {
        match self.limits.get(&(borrower, tenor)) {
            Some(limit) => Ok(Some(limit.clone())),
            None => self.store.get(CF_LIMITS, &limit_key(borrower, tenor)),
        }
    }

    fn loan(&self, id: LoanId) -> Result<Option<Loan>> {
        match self.loans.get(&id) {
            Some(loan) => Ok(Some(loan.clone())),
            None => self.store.get(CF_LOANS, &id_key(id)),
        }
    }

    fn installment(&self, id: InstallmentId) -> Result<Option<Installment>> {
        match self.installments.get(&id) {
            Some(installment) => Ok(Some(installment.clone())),
            None => self.store.get(CF_INSTALLMENTS, &id_key(id)),
        }
    }

    fn installments_by_loan(&self, loan: LoanId) -> Result<Vec<Installment>> {
        let mut merged: BTreeMap<InstallmentId, Installment> = self
            .store
            .scan_installments(loan)?
            .into_iter()
            .map(|i| (i.id, i))
            .collect();
        for installment in self.installments.values().filter(|i| i.loan == loan) {
            merged.insert(installment.id, installment.clone());
        }
        Ok(merged.into_values().collect())
    }

    fn payment_key_taken(&self, key: &str) -> Result<bool> {
        if self.payment_keys.contains(key) {
            return Ok(true);
        }
        let cf = self.store.cf(CF_PAYMENT_KEYS)?;
        Ok(self.store.db.get_cf(cf, key.as_bytes())?.is_some())
    }

    fn put_limit(&mut self, limit: CreditLimit) -> Result<()> {
        let cf = self.store.cf(CF_LIMITS)?;
        self.batch
            .put_cf(cf, limit_key(limit.borrower, limit.tenor), encode(&limit)?);
        self.limits.insert((limit.borrower, limit.tenor), limit);
        Ok(())
    }

    fn put_loan(&mut self, loan: Loan) -> Result<()> {
        let cf = self.store.cf(CF_LOANS)?;
        self.batch.put_cf(cf, id_key(loan.id), encode(&loan)?);
        self.loans.insert(loan.id, loan);
        Ok(())
    }

    fn put_installment(&mut self, installment: Installment) -> Result<()> {
        let cf = self.store.cf(CF_INSTALLMENTS)?;
        self.batch
            .put_cf(cf, id_key(installment.id), encode(&installment)?);
        self.installments.insert(installment.id, installment);
        Ok(())
    }

    fn put_payment(&mut self, payment: Payment) -> Result<()> {
        let cf = self.store.cf(CF_PAYMENTS)?;
        self.batch.put_cf(cf, id_key(payment.id), encode(&payment)?);
        if let Some(key) = &payment.idempotency_key {
            let keys = self.store.cf(CF_PAYMENT_KEYS)?;
            self.batch.put_cf(keys, key.as_bytes(), id_key(payment.id));
            self.payment_keys.insert(key.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl CommitTarget for RocksDBStore {
    fn next_id(&self, table: Table) -> u64 {
        self.sequences[table_slot(table)].fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn apply(&self, writes: Vec<LedgerWrite>) -> Result<()> {
        let _guard = self.commit_lock.lock().await;
        let mut rows = BatchRows::new(self);
        apply_writes(&mut rows, writes)?;
        self.db.write(rows.batch)?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for RocksDBStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>> {
        Ok(Box::new(StagedTransaction::new(self.clone())))
    }

    async fn limits_by_borrower(&self, borrower: BorrowerId) -> Result<Vec<CreditLimit>> {
        let cf = self.cf(CF_LIMITS)?;
        let prefix = borrower.to_be_bytes();
        let mut limits = Vec::new();
        let mode = IteratorMode::From(&prefix, rocksdb::Direction::Forward);
        for item in self.db.iterator_cf(cf, mode) {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            limits.push(decode(&value)?);
        }
        Ok(limits)
    }

    async fn all_limits(&self) -> Result<Vec<CreditLimit>> {
        self.scan(CF_LIMITS, IteratorMode::Start)
    }

    async fn loan(&self, id: LoanId) -> Result<Option<Loan>> {
        self.get(CF_LOANS, &id_key(id))
    }

    async fn loan_by_uuid(&self, uuid: Uuid) -> Result<Option<Loan>> {
        let loans: Vec<Loan> = self.scan(CF_LOANS, IteratorMode::Start)?;
        Ok(loans.into_iter().find(|l| l.uuid == uuid))
    }

    async fn all_loans(&self) -> Result<Vec<Loan>> {
        self.scan(CF_LOANS, IteratorMode::Start)
    }

    async fn installment(&self, id: InstallmentId) -> Result<Option<Installment>> {
        self.get(CF_INSTALLMENTS, &id_key(id))
    }

    async fn installments_by_loan(&self, loan: LoanId) -> Result<Vec<Installment>> {
        let mut installments = self.scan_installments(loan)?;
        installments.sort_by_key(|i| i.installment_number);
        Ok(installments)
    }

    async fn payments_by_loan(&self, loan: LoanId) -> Result<Vec<Payment>> {
        let payments: Vec<Payment> = self.scan(CF_PAYMENTS, IteratorMode::Start)?;
        Ok(payments.into_iter().filter(|p| p.loan == loan).collect())
    }

    async fn payment_by_key(&self, key: &str) -> Result<Option<Payment>> {
        let cf = self.cf(CF_PAYMENT_KEYS)?;
        match self.db.get_cf(cf, key.as_bytes())? {
            Some(id) => self.get(CF_PAYMENTS, &id),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl BorrowerDirectory for RocksDBStore {
    async fn register(&self, borrower: Borrower) -> Result<()> {
        let _guard = self.commit_lock.lock().await;
        let cf = self.cf(CF_BORROWERS)?;
        let key = id_key(borrower.id);
        if self.db.get_pinned_cf(cf, key)?.is_some() {
            return Err(LendingError::InvalidState(format!(
                "Borrower {} is already registered",
                borrower.id
            )));
        }
        self.db.put_cf(cf, key, encode(&borrower)?)?;
        Ok(())
    }

    async fn find_by_id(&self, id: BorrowerId) -> Result<Option<Borrower>> {
        self.get(CF_BORROWERS, &id_key(id))
    }

    async fn find_by_uuid(&self, uuid: Uuid) -> Result<Option<Borrower>> {
        let borrowers: Vec<Borrower> = self.scan(CF_BORROWERS, IteratorMode::Start)?;
        Ok(borrowers.into_iter().find(|b| b.uuid == uuid))
    }
}
