use crate::ledger::CreditAdjustment;
use async_trait::async_trait;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceChange {
    pub old_balance: i32,
    pub new_balance: i32,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no profile for user {0}")]
    UnknownUser(Uuid),

    #[error("balance {balance} cannot absorb {delta}")]
    Insufficient { balance: i32, delta: i32 },

    #[error("{0}")]
    Backend(String),
}

/// Persistence collaborator for balances.
#[async_trait]
pub trait CreditStore: Send + Sync {
    /// Adds `delta` to the balance as one atomic operation and returns the
    /// values on either side of it. Refuses, without writing, when the result
    /// would be negative.
    async fn apply_delta(&self, user_id: Uuid, delta: i32) -> Result<BalanceChange, StoreError>;

    async fn balance(&self, user_id: Uuid) -> Result<i32, StoreError>;

    /// Credits `credits` and records `payment_id` as one atomic operation.
    ///
    /// Returns `None`, with nothing written, when `payment_id` was recorded
    /// before. If the credit cannot be applied the id is not recorded either,
    /// so a redelivery of the same event can still succeed.
    async fn apply_payment(
        &self,
        payment_id: &str,
        user_id: Uuid,
        credits: i32,
    ) -> Result<Option<BalanceChange>, StoreError>;

    /// Appends an audit record. Independent of `apply_delta`.
    async fn record_adjustment(&self, record: &CreditAdjustment) -> Result<(), StoreError>;
}
