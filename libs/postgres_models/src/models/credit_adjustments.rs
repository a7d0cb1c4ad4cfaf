use crate::schema::credit_adjustments;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audit row for one committed balance change. Rows are never updated.
#[derive(Debug, Clone, Serialize, Deserialize, Insertable)]
#[diesel(table_name = credit_adjustments)]
pub struct NewCreditAdjustment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub change_amount: i32,
    pub reason: String,
    pub old_balance: i32,
    pub new_balance: i32,
    pub actor: Option<String>,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}
