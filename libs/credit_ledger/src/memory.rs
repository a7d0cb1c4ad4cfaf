use crate::{BalanceChange, CreditAdjustment, CreditStore, StoreError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-process balances for local development and tests.
///
/// `apply_delta` does its read-compare-write under one lock, which gives the
/// same guarantee as the single `UPDATE` in [`crate::PgCreditStore`].
/// `apply_payment` holds the same lock while it checks and records the id.
#[derive(Debug, Default)]
pub struct MemoryCreditStore {
    balances: Mutex<HashMap<Uuid, i32>>,
    processed_payments: Mutex<HashSet<String>>,
    audit: Mutex<Vec<CreditAdjustment>>,
    unavailable: AtomicBool,
    fail_audit: AtomicBool,
}

impl MemoryCreditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a profile row, as sign-up would.
    pub fn insert_profile(&self, user_id: Uuid, credits: i32) {
        lock(&self.balances).insert(user_id, credits.max(0));
    }

    pub fn is_payment_processed(&self, payment_id: &str) -> bool {
        lock(&self.processed_payments).contains(payment_id)
    }

    pub fn audit_log(&self) -> Vec<CreditAdjustment> {
        lock(&self.audit).clone()
    }

    /// Makes every balance operation fail as if the database were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn fail_audit_writes(&self, fail: bool) {
        self.fail_audit.store(fail, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("credit store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CreditStore for MemoryCreditStore {
    async fn apply_delta(&self, user_id: Uuid, delta: i32) -> Result<BalanceChange, StoreError> {
        self.check_available()?;
        apply_locked(&mut lock(&self.balances), user_id, delta)
    }

    async fn apply_payment(
        &self,
        payment_id: &str,
        user_id: Uuid,
        credits: i32,
    ) -> Result<Option<BalanceChange>, StoreError> {
        self.check_available()?;

        // Lock order: balances, then processed_payments.
        let mut balances = lock(&self.balances);
        let mut processed = lock(&self.processed_payments);
        if processed.contains(payment_id) {
            return Ok(None);
        }

        let change = apply_locked(&mut balances, user_id, credits)?;
        processed.insert(payment_id.to_owned());
        Ok(Some(change))
    }

    async fn balance(&self, user_id: Uuid) -> Result<i32, StoreError> {
        self.check_available()?;
        lock(&self.balances)
            .get(&user_id)
            .copied()
            .ok_or(StoreError::UnknownUser(user_id))
    }

    async fn record_adjustment(&self, record: &CreditAdjustment) -> Result<(), StoreError> {
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("audit table unavailable".to_string()));
        }
        lock(&self.audit).push(record.clone());
        Ok(())
    }
}

fn apply_locked(
    balances: &mut HashMap<Uuid, i32>,
    user_id: Uuid,
    delta: i32,
) -> Result<BalanceChange, StoreError> {
    let balance = balances
        .get_mut(&user_id)
        .ok_or(StoreError::UnknownUser(user_id))?;

    let new_balance = balance
        .checked_add(delta)
        .ok_or_else(|| StoreError::Backend("integer out of range".to_string()))?;
    if new_balance < 0 {
        return Err(StoreError::Insufficient {
            balance: *balance,
            delta,
        });
    }

    let old_balance = std::mem::replace(balance, new_balance);
    Ok(BalanceChange {
        old_balance,
        new_balance,
    })
}
