use crate::{BalanceChange, CreditAdjustment, CreditStore, StoreError};
use async_trait::async_trait;
use postgres_models::credits::{self, DeltaOutcome, PaymentOutcome};
use postgres_models::models::{NewCreditAdjustment, NewProcessedPayment};
use postgres_models::{DbError, DbPool};
use uuid::Uuid;

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<bb8::RunError<diesel_async::pooled_connection::PoolError>> for StoreError {
    fn from(err: bb8::RunError<diesel_async::pooled_connection::PoolError>) -> Self {
        StoreError::from(DbError::from(err))
    }
}

/// Balances in `profiles.credits_remaining`, audit rows in `credit_adjustments`,
/// payment ids in `processed_payments`.
#[derive(Clone)]
pub struct PgCreditStore {
    pool: DbPool,
}

impl PgCreditStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CreditStore for PgCreditStore {
    async fn apply_delta(&self, user_id: Uuid, delta: i32) -> Result<BalanceChange, StoreError> {
        let mut conn = self.pool.get().await?;
        let outcome = credits::apply_credit_delta(&mut conn, user_id, delta)
            .await
            .map_err(DbError::from)?;
        balance_change(outcome, user_id, delta)
    }

    async fn apply_payment(
        &self,
        payment_id: &str,
        user_id: Uuid,
        credits: i32,
    ) -> Result<Option<BalanceChange>, StoreError> {
        let payment = NewProcessedPayment::new(payment_id.to_owned(), user_id, credits);
        let mut conn = self.pool.get().await?;
        let outcome = credits::apply_payment_credit(&mut conn, &payment)
            .await
            .map_err(DbError::from)?;
        payment_change(outcome, user_id, credits)
    }

    async fn balance(&self, user_id: Uuid) -> Result<i32, StoreError> {
        let mut conn = self.pool.get().await?;
        credits::fetch_balance(&mut conn, user_id)
            .await
            .map_err(DbError::from)?
            .ok_or(StoreError::UnknownUser(user_id))
    }

    async fn record_adjustment(&self, record: &CreditAdjustment) -> Result<(), StoreError> {
        let row = NewCreditAdjustment {
            id: record.id,
            user_id: record.user_id,
            change_amount: record.change,
            reason: record.reason.as_str().to_string(),
            old_balance: record.old_balance,
            new_balance: record.new_balance,
            actor: record.actor.clone(),
            reference: record.reference.clone(),
            created_at: record.timestamp,
        };

        let mut conn = self.pool.get().await?;
        credits::insert_adjustment(&mut conn, &row)
            .await
            .map_err(DbError::from)?;
        Ok(())
    }
}

fn balance_change(outcome: DeltaOutcome, user_id: Uuid, delta: i32) -> Result<BalanceChange, StoreError> {
    match outcome {
        DeltaOutcome::Applied {
            old_balance,
            new_balance,
        } => Ok(BalanceChange {
            old_balance,
            new_balance,
        }),
        DeltaOutcome::Insufficient { balance } => Err(StoreError::Insufficient { balance, delta }),
        DeltaOutcome::UnknownUser => Err(StoreError::UnknownUser(user_id)),
    }
}

fn payment_change(
    outcome: PaymentOutcome,
    user_id: Uuid,
    credits: i32,
) -> Result<Option<BalanceChange>, StoreError> {
    match outcome {
        PaymentOutcome::Credited {
            old_balance,
            new_balance,
        } => Ok(Some(BalanceChange {
            old_balance,
            new_balance,
        })),
        PaymentOutcome::Duplicate => Ok(None),
        PaymentOutcome::Rejected(outcome) => balance_change(outcome, user_id, credits).map(Some),
    }
}
