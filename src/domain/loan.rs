use super::borrower::BorrowerId;
use super::installment::InstallmentDraft;
use super::money::{Amount, Money};
use crate::error::{LendingError, Result};
use chrono::{DateTime, Days, Months, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type LoanId = u64;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Paid,
    Canceled,
}

impl LoanStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LoanStatus::Active)
    }
}

/// Raw origination request as submitted by a borrower.
#[derive(Debug, Clone, PartialEq)]
pub struct LoanInput {
    pub asset_name: String,
    pub contract_number: String,
    pub on_the_road: Decimal,
    pub admin_fee: Decimal,
    pub interest_amount: Decimal,
    pub tenor: u32,
}

/// Validated and priced loan terms, ready to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct LoanTerms {
    pub borrower: BorrowerId,
    pub asset_name: String,
    pub contract_number: String,
    pub on_the_road: Amount,
    pub admin_fee: Money,
    pub total_loan_amount: Money,
    pub interest_amount: Money,
    pub monthly_installment: Money,
    pub tenor: u32,
    pub start_date: DateTime<Utc>,
}

impl LoanTerms {
    /// Prices a loan: `(on_the_road + admin_fee) / tenor + interest_amount`.
    pub fn price(borrower: BorrowerId, input: LoanInput, now: DateTime<Utc>) -> Result<Self> {
        if input.tenor == 0 {
            return Err(LendingError::ValidationError(
                "Tenor must be a positive number of months".to_string(),
            ));
        }
        if input.asset_name.trim().is_empty() || input.contract_number.trim().is_empty() {
            return Err(LendingError::ValidationError(
                "Asset name and contract number are required".to_string(),
            ));
        }

        let on_the_road = Amount::new(input.on_the_road)?;
        let admin_fee = Money::new(input.admin_fee)?;
        let interest_amount = Money::new(input.interest_amount)?;
        let total_loan_amount = on_the_road.money().checked_add(admin_fee)?;
        let monthly_installment = total_loan_amount
            .divide(input.tenor)
            .ok_or_else(|| LendingError::ValidationError("Tenor must not be zero".to_string()))?
            .checked_add(interest_amount)?;

        Ok(Self {
            borrower,
            asset_name: input.asset_name,
            contract_number: input.contract_number,
            on_the_road,
            admin_fee,
            total_loan_amount,
            interest_amount,
            monthly_installment,
            tenor: input.tenor,
            start_date: now,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Loan {
    pub id: LoanId,
    pub uuid: Uuid,
    pub borrower: BorrowerId,
    pub asset_name: String,
    pub contract_number: String,
    pub on_the_road: Money,
    pub admin_fee: Money,
    pub total_loan_amount: Money,
    pub monthly_installment: Money,
    pub interest_amount: Money,
    pub tenor: u32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: LoanStatus,
}

impl Loan {
    /// Materialises persisted terms under the id assigned by the store.
    pub fn open(id: LoanId, terms: LoanTerms) -> Self {
        let start = terms.start_date;
        let end_date = start
            .checked_add_months(Months::new(terms.tenor))
            .and_then(|date| date.checked_add_days(Days::new(1)))
            .unwrap_or(start);
        let principal = terms.on_the_road.money();

        Self {
            id,
            uuid: Uuid::new_v4(),
            borrower: terms.borrower,
            asset_name: terms.asset_name,
            contract_number: terms.contract_number,
            on_the_road: principal,
            admin_fee: terms.admin_fee,
            total_loan_amount: terms.total_loan_amount,
            monthly_installment: terms.monthly_installment,
            interest_amount: terms.interest_amount,
            tenor: terms.tenor,
            start_date: start,
            end_date,
            status: LoanStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Active
    }

    /// One installment per tenor month, due on the same day-of-month.
    pub fn schedule(&self) -> Vec<InstallmentDraft> {
        (1..=self.tenor)
            .map(|number| InstallmentDraft {
                loan: self.id,
                installment_number: number,
                due_date: self
                    .start_date
                    .checked_add_months(Months::new(number))
                    .unwrap_or(self.start_date),
                amount_due: self.monthly_installment,
            })
            .collect()
    }

    pub fn mark(&mut self, status: LoanStatus) -> Result<()> {
        if self.status.is_terminal() {
            return Err(LendingError::InvalidState(format!(
                "Loan {} is already {:?}",
                self.id, self.status
            )));
        }
        self.status = status;
        Ok(())
    }
}
