//! Server-authoritative credit balances.
//!
//! [`CreditLedger::adjust_credits`] is the single entry point for changing a
//! balance. Atomicity is the store's job: [`CreditStore::apply_delta`] must add
//! the delta in one indivisible operation, never as a read followed by a write.
//! Payment events go through [`CreditLedger::credit_payment`], which records
//! the payment id in the same operation as the credit.

mod ledger;
mod memory;
mod postgres;
mod store;

pub use ledger::{AdjustmentContext, AdjustmentReason, CreditAdjustment, CreditLedger};
pub use memory::MemoryCreditStore;
pub use postgres::PgCreditStore;
pub use store::{BalanceChange, CreditStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Invalid adjustment: {0}")]
    Validation(String),

    #[error("User not found: {0}")]
    UserNotFound(uuid::Uuid),

    #[error("Insufficient credits: balance {balance}, requested {requested}")]
    InsufficientBalance { balance: i32, requested: i32 },

    #[error("Credit store error: {0}")]
    Persistence(String),
}
