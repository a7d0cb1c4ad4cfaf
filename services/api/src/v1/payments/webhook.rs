use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};
use credit_ledger::{AdjustmentContext, CreditLedger};
use rate_limiter::LimiterCategory;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    errors::{AppError, AppResult},
    extractors::{require_webhook_secret, ClientIp},
    rate_limit::{enforce, rate_limit_headers},
    v1::integer_field,
    AppState,
};

const MAX_PAYMENT_ID_LEN: usize = 255;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCompletedEvent {
    pub payment_id: String,
    pub user_id: String,
    pub credits: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentWebhookResponse {
    pub success: bool,
    pub duplicate: bool,
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_balance: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_balance: Option<i32>,
}

/// Credits a completed checkout exactly once per payment id.
///
/// A redelivered callback is acknowledged without crediting again. A callback
/// whose credit fails leaves no trace, so the processor's retry can succeed.
///
/// Only authenticated callbacks count against the webhook bucket. Callers
/// presenting a bad secret are throttled on the strict bucket instead.
pub async fn handler(
    State(state): State<AppState>,
    client_ip: ClientIp,
    headers: HeaderMap,
    payload: Result<Json<PaymentCompletedEvent>, JsonRejection>,
) -> AppResult<(HeaderMap, Json<PaymentWebhookResponse>)> {
    if let Err(err) = require_webhook_secret(&headers, state.webhook_secret.as_deref()) {
        enforce(&state.rate_limiters, LimiterCategory::Strict, &client_ip.identifier()).await?;
        return Err(err);
    }
    let decision = enforce(&state.rate_limiters, LimiterCategory::Webhook, &client_ip.identifier()).await?;

    let Json(event) = payload?;
    let payment_id = event.payment_id.trim();
    if payment_id.is_empty() || payment_id.len() > MAX_PAYMENT_ID_LEN {
        return Err(AppError::bad_request("paymentId is required (1-255 characters)"));
    }
    let user_id = CreditLedger::parse_user_id(&event.user_id)?;
    let credits = integer_field(&event.credits, "credits")?;
    if credits <= 0 {
        return Err(AppError::bad_request("credits must be a positive integer"));
    }

    let context = AdjustmentContext::actor("payment_webhook");
    let credited = state
        .ledger
        .credit_payment(payment_id, &user_id.to_string(), credits, &context)
        .await?;

    let Some(adjustment) = credited else {
        return Ok((
            rate_limit_headers(&decision),
            Json(PaymentWebhookResponse {
                success: true,
                duplicate: true,
                user_id,
                old_balance: None,
                new_balance: None,
            }),
        ));
    };

    Ok((
        rate_limit_headers(&decision),
        Json(PaymentWebhookResponse {
            success: true,
            duplicate: false,
            user_id,
            old_balance: Some(adjustment.old_balance),
            new_balance: Some(adjustment.new_balance),
        }),
    ))
}
