use crate::application::engine::LendingEngine;
use crate::domain::borrower::{BorrowerId, Role};
use crate::domain::loan::{LoanId, LoanInput};
use crate::domain::payment::PaymentInput;
use crate::error::{LendingError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum CommandType {
    Register,
    Activate,
    Originate,
    Pay,
    Cancel,
}

/// One CSV row: `type,caller,target,amount,admin_fee,interest,tenor,detail,reference`.
///
/// Which columns are read depends on `type`; unused ones may be left empty.
#[derive(Debug, Deserialize)]
struct CommandRecord {
    #[serde(rename = "type")]
    command_type: CommandType,
    caller: BorrowerId,
    target: Option<u64>,
    amount: Option<Decimal>,
    admin_fee: Option<Decimal>,
    interest: Option<Decimal>,
    tenor: Option<u32>,
    detail: Option<String>,
    reference: Option<String>,
}

/// A request read from the command file, ready to be run against the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Register {
        id: BorrowerId,
        name: String,
        role: Role,
    },
    Activate {
        caller: BorrowerId,
        borrower: BorrowerId,
    },
    Originate {
        caller: BorrowerId,
        input: LoanInput,
    },
    Pay {
        caller: BorrowerId,
        input: PaymentInput,
    },
    Cancel {
        caller: BorrowerId,
        loan: LoanId,
    },
}

fn required<T>(value: Option<T>, column: &str, command: CommandType) -> Result<T> {
    value.ok_or_else(|| {
        LendingError::ValidationError(format!("{command:?} command requires the '{column}' column"))
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl TryFrom<CommandRecord> for Command {
    type Error = LendingError;

    fn try_from(record: CommandRecord) -> Result<Self> {
        let kind = record.command_type;
        let caller = record.caller;
        Ok(match kind {
            CommandType::Register => Command::Register {
                id: caller,
                name: required(non_blank(record.reference), "reference", kind)?,
                role: record.detail.as_deref().unwrap_or_default().parse()?,
            },
            CommandType::Activate => Command::Activate {
                caller,
                borrower: record.target.unwrap_or(caller),
            },
            CommandType::Originate => Command::Originate {
                caller,
                input: LoanInput {
                    asset_name: required(non_blank(record.detail), "detail", kind)?,
                    contract_number: required(non_blank(record.reference), "reference", kind)?,
                    on_the_road: required(record.amount, "amount", kind)?,
                    admin_fee: record.admin_fee.unwrap_or_default(),
                    interest_amount: record.interest.unwrap_or_default(),
                    tenor: required(record.tenor, "tenor", kind)?,
                },
            },
            CommandType::Pay => Command::Pay {
                caller,
                input: PaymentInput {
                    installment: required(record.target, "target", kind)?,
                    amount: required(record.amount, "amount", kind)?,
                    method: required(non_blank(record.detail), "detail", kind)?,
                    idempotency_key: non_blank(record.reference),
                },
            },
            CommandType::Cancel => Command::Cancel {
                caller,
                loan: required(record.target, "target", kind)?,
            },
        })
    }
}

impl Command {
    /// Runs the command; the value produced by the engine is discarded.
    pub async fn run(self, engine: &LendingEngine) -> Result<()> {
        match self {
            Command::Register { id, name, role } => engine.register(id, &name, role).await.map(drop),
            Command::Activate { caller, borrower } => engine.activate(caller, borrower).await.map(drop),
            Command::Originate { caller, input } => engine.originate(caller, input).await.map(drop),
            Command::Pay { caller, input } => engine.apply_payment(caller, input).await.map(drop),
            Command::Cancel { caller, loan } => engine.cancel(caller, loan).await.map(drop),
        }
    }
}

/// Reads commands from a CSV source.
///
/// Wraps `csv::Reader` with whitespace trimming and flexible record lengths,
/// so trailing unused columns can be omitted.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads and converts each row; a malformed row yields an error
    /// without ending the stream.
    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.reader
            .into_deserialize::<CommandRecord>()
            .map(|result| result.map_err(LendingError::from).and_then(Command::try_from))
    }
}
