use crate::{BalanceChange, CreditStore, LedgerError, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentReason {
    PaymentProcessed,
    AdminGrant,
    AdminDeduction,
    Refund,
    Promotion,
    MusicGeneration,
    GenerationRefund,
}

impl AdjustmentReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PaymentProcessed => "payment_processed",
            Self::AdminGrant => "admin_grant",
            Self::AdminDeduction => "admin_deduction",
            Self::Refund => "refund",
            Self::Promotion => "promotion",
            Self::MusicGeneration => "music_generation",
            Self::GenerationRefund => "generation_refund",
        }
    }

    /// Whether this reason only ever adds credits.
    pub fn is_credit(&self) -> bool {
        !matches!(self, Self::AdminDeduction | Self::MusicGeneration)
    }
}

impl fmt::Display for AdjustmentReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdjustmentReason {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "payment_processed" => Ok(Self::PaymentProcessed),
            "admin_grant" => Ok(Self::AdminGrant),
            "admin_deduction" => Ok(Self::AdminDeduction),
            "refund" => Ok(Self::Refund),
            "promotion" => Ok(Self::Promotion),
            "music_generation" => Ok(Self::MusicGeneration),
            "generation_refund" => Ok(Self::GenerationRefund),
            other => Err(LedgerError::Validation(format!("unknown reason '{}'", other))),
        }
    }
}

/// Who asked for an adjustment and what it relates to. Audit only.
#[derive(Debug, Clone, Default)]
pub struct AdjustmentContext {
    pub actor: Option<String>,
    pub reference: Option<String>,
}

impl AdjustmentContext {
    pub fn actor(actor: impl Into<String>) -> Self {
        Self {
            actor: Some(actor.into()),
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// A committed balance change. Also the audit record appended for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditAdjustment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub change: i32,
    pub reason: AdjustmentReason,
    pub old_balance: i32,
    pub new_balance: i32,
    pub actor: Option<String>,
    pub reference: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone)]
pub struct CreditLedger {
    store: Arc<dyn CreditStore>,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn CreditStore>) -> Self {
        Self { store }
    }

    pub fn parse_user_id(raw: &str) -> Result<Uuid, LedgerError> {
        match Uuid::parse_str(raw.trim()) {
            Ok(id) if !id.is_nil() => Ok(id),
            _ => Err(LedgerError::Validation(format!("invalid user id '{}'", raw))),
        }
    }

    /// Applies `delta` to the user's balance.
    ///
    /// The balance is changed by one atomic store operation; on any error it is
    /// left exactly as it was. On success one audit record is appended. A
    /// failed audit append is logged and does not undo the change.
    ///
    /// Not idempotent: external events that must apply exactly once go through
    /// [`CreditLedger::credit_payment`].
    pub async fn adjust_credits(
        &self,
        user_id: &str,
        delta: i32,
        reason: AdjustmentReason,
        context: &AdjustmentContext,
    ) -> Result<CreditAdjustment, LedgerError> {
        let user_id = Self::parse_user_id(user_id)?;
        validate_delta(delta, reason)?;

        let change = self
            .store
            .apply_delta(user_id, delta)
            .await
            .map_err(|err| rejected(err, user_id, delta, reason))?;

        Ok(self.commit(user_id, delta, reason, context, change).await)
    }

    /// Credits a completed payment exactly once per `payment_id`.
    ///
    /// Returns `Ok(None)` for a payment id that was already credited. The id
    /// is recorded in the same store operation as the credit, so a failed
    /// credit leaves it unrecorded and a redelivery can succeed.
    pub async fn credit_payment(
        &self,
        payment_id: &str,
        user_id: &str,
        credits: i32,
        context: &AdjustmentContext,
    ) -> Result<Option<CreditAdjustment>, LedgerError> {
        let reason = AdjustmentReason::PaymentProcessed;
        let user_id = Self::parse_user_id(user_id)?;
        let payment_id = payment_id.trim();
        if payment_id.is_empty() {
            return Err(LedgerError::Validation("payment id is required".to_string()));
        }
        if credits <= 0 {
            return Err(LedgerError::Validation(
                "amount to add must be positive".to_string(),
            ));
        }

        let change = self
            .store
            .apply_payment(payment_id, user_id, credits)
            .await
            .map_err(|err| rejected(err, user_id, credits, reason))?;

        let Some(change) = change else {
            tracing::info!(payment_id, user_id = %user_id, "Payment already credited");
            return Ok(None);
        };

        let context = context.clone().with_reference(payment_id);
        Ok(Some(self.commit(user_id, credits, reason, &context, change).await))
    }

    /// Builds the record for a committed change, logs it and appends it to the
    /// audit trail.
    async fn commit(
        &self,
        user_id: Uuid,
        delta: i32,
        reason: AdjustmentReason,
        context: &AdjustmentContext,
        change: BalanceChange,
    ) -> CreditAdjustment {
        let adjustment = CreditAdjustment {
            id: Uuid::new_v4(),
            user_id,
            change: delta,
            reason,
            old_balance: change.old_balance,
            new_balance: change.new_balance,
            actor: context.actor.clone(),
            reference: context.reference.clone(),
            timestamp: Utc::now(),
        };

        tracing::info!(
            user_id = %user_id,
            change = delta,
            reason = %reason,
            old_balance = change.old_balance,
            new_balance = change.new_balance,
            reference = context.reference.as_deref(),
            "Credits adjusted"
        );

        if let Err(err) = self.store.record_adjustment(&adjustment).await {
            tracing::error!(
                adjustment_id = %adjustment.id,
                user_id = %user_id,
                change = delta,
                old_balance = change.old_balance,
                new_balance = change.new_balance,
                error = %err,
                "Failed to append credit audit record"
            );
        }

        adjustment
    }

    /// Adds a strictly positive amount.
    pub async fn add_credits(
        &self,
        user_id: &str,
        amount: i32,
        reason: AdjustmentReason,
        context: &AdjustmentContext,
    ) -> Result<CreditAdjustment, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::Validation(
                "amount to add must be positive".to_string(),
            ));
        }
        self.adjust_credits(user_id, amount, reason, context).await
    }

    pub async fn balance(&self, user_id: &str) -> Result<i32, LedgerError> {
        let user_id = Self::parse_user_id(user_id)?;
        self.store.balance(user_id).await.map_err(ledger_error)
    }
}

fn validate_delta(delta: i32, reason: AdjustmentReason) -> Result<(), LedgerError> {
    if delta == 0 {
        return Err(LedgerError::Validation("amount must be non-zero".to_string()));
    }
    if reason.is_credit() && delta < 0 {
        return Err(LedgerError::Validation(format!(
            "reason '{}' requires a positive amount",
            reason
        )));
    }
    if !reason.is_credit() && delta > 0 {
        return Err(LedgerError::Validation(format!(
            "reason '{}' requires a negative amount",
            reason
        )));
    }
    Ok(())
}

fn rejected(err: StoreError, user_id: Uuid, delta: i32, reason: AdjustmentReason) -> LedgerError {
    let err = ledger_error(err);
    match &err {
        LedgerError::Persistence(detail) => tracing::error!(
            user_id = %user_id,
            delta,
            reason = %reason,
            error = %detail,
            "Credit adjustment failed"
        ),
        other => tracing::warn!(
            user_id = %user_id,
            delta,
            reason = %reason,
            error = %other,
            "Credit adjustment rejected"
        ),
    }
    err
}

fn ledger_error(err: StoreError) -> LedgerError {
    match err {
        StoreError::UnknownUser(user_id) => LedgerError::UserNotFound(user_id),
        StoreError::Insufficient { balance, delta } => LedgerError::InsufficientBalance {
            balance,
            requested: delta.saturating_neg(),
        },
        StoreError::Backend(detail) => LedgerError::Persistence(detail),
    }
}
