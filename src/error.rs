use crate::domain::borrower::BorrowerId;
use crate::domain::installment::InstallmentId;
use crate::domain::loan::LoanId;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, LendingError>;

/// How a failure should be surfaced to whoever submitted the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A business rule rejected the request; the message can be shown verbatim.
    Rejected,
    /// The system could not complete the request; callers may resubmit.
    Failed,
}

#[derive(Error, Debug)]
pub enum LendingError {
    #[error("Borrower {0} not found")]
    BorrowerNotFound(BorrowerId),
    #[error("Loan {0} not found")]
    LoanNotFound(LoanId),
    #[error("Loan {0} not found")]
    LoanUuidNotFound(Uuid),
    #[error("Installment {0} not found")]
    InstallmentNotFound(InstallmentId),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Over limit for tenor {tenor}: available {available}, requested {requested}")]
    OverLimit {
        tenor: u32,
        available: Decimal,
        requested: Decimal,
    },
    #[error("Borrower {borrower} has no credit limit for tenor {tenor}")]
    TenorNotFound { borrower: BorrowerId, tenor: u32 },
    #[error("Caller {caller} is not allowed to {action}")]
    Forbidden { caller: BorrowerId, action: String },
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Lock {key} is held by another request")]
    LockUnavailable { key: String },
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    StorageError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl LendingError {
    pub fn outcome(&self) -> Outcome {
        match self {
            LendingError::BorrowerNotFound(_)
            | LendingError::LoanNotFound(_)
            | LendingError::LoanUuidNotFound(_)
            | LendingError::InstallmentNotFound(_)
            | LendingError::InvalidState(_)
            | LendingError::OverLimit { .. }
            | LendingError::TenorNotFound { .. }
            | LendingError::Forbidden { .. }
            | LendingError::ValidationError(_) => Outcome::Rejected,
            _ => Outcome::Failed,
        }
    }

    pub fn is_rejection(&self) -> bool {
        self.outcome() == Outcome::Rejected
    }

    pub(crate) fn forbidden(caller: BorrowerId, action: &str) -> Self {
        LendingError::Forbidden {
            caller,
            action: action.to_string(),
        }
    }

    pub(crate) fn corrupt(what: impl std::fmt::Display) -> Self {
        LendingError::InternalError(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            what.to_string(),
        )))
    }
}
