//! Credit balance statements.
//!
//! [`apply_credit_delta`] is the only statement in the workspace that writes
//! `profiles.credits_remaining`. It is a single `UPDATE ... RETURNING`, so
//! Postgres' row lock serializes concurrent adjustments for the same user.
//! [`apply_payment_credit`] runs it inside a transaction with the payment id
//! insert.

use crate::models::{NewCreditAdjustment, NewProcessedPayment};
use crate::schema::{credit_adjustments, processed_payments, profiles};
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

/// Outcome of [`apply_credit_delta`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOutcome {
    Applied { old_balance: i32, new_balance: i32 },
    /// The row exists but the delta would take the balance below zero.
    Insufficient { balance: i32 },
    UnknownUser,
}

/// Adds `delta` to the user's balance in one statement, refusing to go negative.
pub async fn apply_credit_delta(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
    delta: i32,
) -> QueryResult<DeltaOutcome> {
    let updated: Option<i32> = diesel::update(
        profiles::table
            .filter(profiles::id.eq(user_id))
            .filter((profiles::credits_remaining + delta).ge(0)),
    )
    .set((
        profiles::credits_remaining.eq(profiles::credits_remaining + delta),
        profiles::updated_at.eq(Utc::now()),
    ))
    .returning(profiles::credits_remaining)
    .get_result(conn)
    .await
    .optional()?;

    if let Some(new_balance) = updated {
        return Ok(DeltaOutcome::Applied {
            old_balance: new_balance - delta,
            new_balance,
        });
    }

    // Nothing was written; find out why.
    match fetch_balance(conn, user_id).await? {
        Some(balance) => Ok(DeltaOutcome::Insufficient { balance }),
        None => Ok(DeltaOutcome::UnknownUser),
    }
}

pub async fn fetch_balance(conn: &mut AsyncPgConnection, user_id: Uuid) -> QueryResult<Option<i32>> {
    profiles::table
        .find(user_id)
        .select(profiles::credits_remaining)
        .first(conn)
        .await
        .optional()
}

pub async fn insert_adjustment(
    conn: &mut AsyncPgConnection,
    record: &NewCreditAdjustment,
) -> QueryResult<()> {
    diesel::insert_into(credit_adjustments::table)
        .values(record)
        .execute(conn)
        .await?;
    Ok(())
}

/// Outcome of [`apply_payment_credit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Credited { old_balance: i32, new_balance: i32 },
    /// The payment id was recorded before; nothing was written.
    Duplicate,
    /// The credit was refused; the payment id was not recorded.
    Rejected(DeltaOutcome),
}

/// Credits a payment and records its id in one transaction.
///
/// The balance is updated first and the id inserted second. A conflicting id
/// rolls the update back, so a payment is either credited and recorded, or
/// neither. Concurrent deliveries of one id serialize on the profile row lock.
pub async fn apply_payment_credit(
    conn: &mut AsyncPgConnection,
    payment: &NewProcessedPayment,
) -> QueryResult<PaymentOutcome> {
    let result = conn
        .transaction::<_, diesel::result::Error, _>(|conn| {
            async move {
                let outcome = apply_credit_delta(conn, payment.user_id, payment.credits).await?;
                let DeltaOutcome::Applied {
                    old_balance,
                    new_balance,
                } = outcome
                else {
                    return Ok(PaymentOutcome::Rejected(outcome));
                };

                let inserted = diesel::insert_into(processed_payments::table)
                    .values(payment)
                    .on_conflict(processed_payments::payment_id)
                    .do_nothing()
                    .execute(conn)
                    .await?;
                if inserted == 0 {
                    return Err(diesel::result::Error::RollbackTransaction);
                }

                Ok(PaymentOutcome::Credited {
                    old_balance,
                    new_balance,
                })
            }
            .scope_boxed()
        })
        .await;

    match result {
        Err(diesel::result::Error::RollbackTransaction) => Ok(PaymentOutcome::Duplicate),
        other => other,
    }
}
