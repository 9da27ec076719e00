//! Application layer orchestrating the lending operations.
//!
//! [`engine::LendingEngine`] is the entry point. Each mutating operation lives in
//! its own module (`origination`, `payments`, `cancellation`) as an `impl` block
//! on the engine, and shares the lock and transaction plumbing in [`locking`].

pub mod cancellation;
pub mod engine;
pub mod locking;
pub mod origination;
pub mod payments;
