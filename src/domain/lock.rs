use super::borrower::BorrowerId;
use super::installment::InstallmentId;
use super::loan::LoanId;
use std::fmt;

/// A per-resource mutual-exclusion key.
///
/// Variants are declared in global acquisition order; the derived `Ord`
/// compares the variant first, so sorting a key set yields the order every
/// operation must acquire in: limit, loan, installment group, installment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
    Limit(BorrowerId),
    Loan(LoanId),
    InstallmentGroup(LoanId),
    Installment(InstallmentId),
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockKey::Limit(borrower) => write!(f, "limit:{borrower}"),
            LockKey::Loan(loan) => write!(f, "loan:{loan}"),
            LockKey::InstallmentGroup(loan) => write!(f, "installment-group:{loan}"),
            LockKey::Installment(installment) => write!(f, "installment:{installment}"),
        }
    }
}
