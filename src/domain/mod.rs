//! Domain model: value objects, entities, lending rules and the ports the
//! application layer drives.

pub mod borrower;
pub mod installment;
pub mod limit;
pub mod loan;
pub mod lock;
pub mod money;
pub mod payment;
pub mod ports;
