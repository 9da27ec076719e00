use crate::application::engine::LoanStatement;
use crate::domain::installment::PaymentStatus;
use crate::domain::limit::CreditLimit;
use crate::error::Result;
use std::io::Write;

/// Writes the final ledger state as CSV.
///
/// Two tables are written one after the other, each with its own header:
/// credit limit buckets ordered by borrower and tenor, then loans ordered by id.
pub struct LedgerWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> LedgerWriter<W> {
    pub fn new(sink: W) -> Self {
        let writer = csv::WriterBuilder::new().flexible(true).from_writer(sink);
        Self { writer }
    }

    pub fn write_limits(&mut self, mut limits: Vec<CreditLimit>) -> Result<()> {
        limits.sort_by_key(|bucket| (bucket.borrower, bucket.tenor));
        self.writer
            .write_record(["borrower", "tenor", "current_limit", "original_limit"])?;
        for bucket in limits {
            self.writer.write_record([
                bucket.borrower.to_string(),
                bucket.tenor.to_string(),
                bucket.current_limit.to_string(),
                bucket.original_limit.to_string(),
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn write_loans(&mut self, mut loans: Vec<LoanStatement>) -> Result<()> {
        loans.sort_by_key(|statement| statement.loan.id);
        self.writer.write_record([
            "loan",
            "borrower",
            "tenor",
            "status",
            "monthly_installment",
            "paid_installments",
        ])?;
        for LoanStatement {
            loan, installments, ..
        } in loans
        {
            let paid = installments
                .iter()
                .filter(|installment| installment.payment_status == PaymentStatus::Paid)
                .count();
            self.writer.write_record([
                loan.id.to_string(),
                loan.borrower.to_string(),
                loan.tenor.to_string(),
                format!("{:?}", loan.status).to_lowercase(),
                loan.monthly_installment.to_string(),
                paid.to_string(),
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
