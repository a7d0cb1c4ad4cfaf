use crate::schema::processed_payments;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, Insertable)]
#[diesel(table_name = processed_payments)]
pub struct NewProcessedPayment {
    pub payment_id: String,
    pub user_id: Uuid,
    pub credits: i32,
}

impl NewProcessedPayment {
    pub fn new(payment_id: String, user_id: Uuid, credits: i32) -> Self {
        Self {
            payment_id,
            user_id,
            credits,
        }
    }
}
