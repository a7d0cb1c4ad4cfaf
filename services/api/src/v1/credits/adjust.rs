use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};
use credit_ledger::{AdjustmentContext, AdjustmentReason};
use rate_limiter::LimiterCategory;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    errors::{AppError, AppResult},
    extractors::{require_admin, ClientIp},
    rate_limit::{enforce, rate_limit_headers},
    v1::integer_field,
    AppState,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustCreditsRequest {
    pub user_id: String,
    pub amount: Value,
    pub reason: Option<String>,
    pub reference: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustCreditsResponse {
    pub success: bool,
    pub user_id: Uuid,
    pub change: i32,
    pub old_balance: i32,
    pub new_balance: i32,
}

/// Administrative credit grant or deduction.
pub async fn handler(
    State(state): State<AppState>,
    client_ip: ClientIp,
    headers: HeaderMap,
    payload: Result<Json<AdjustCreditsRequest>, JsonRejection>,
) -> AppResult<(HeaderMap, Json<AdjustCreditsResponse>)> {
    let decision = enforce(&state.rate_limiters, LimiterCategory::Strict, &client_ip.identifier()).await?;
    require_admin(&headers, state.admin_token.as_deref())?;

    let Json(request) = payload?;
    let amount = integer_field(&request.amount, "amount")?;
    if amount == 0 {
        return Err(AppError::bad_request("amount must be non-zero"));
    }

    let reason = match request.reason.as_deref() {
        Some(raw) => raw.parse::<AdjustmentReason>()?,
        None if amount > 0 => AdjustmentReason::AdminGrant,
        None => AdjustmentReason::AdminDeduction,
    };

    let mut context = AdjustmentContext::actor(format!("admin@{}", client_ip.0));
    if let Some(reference) = request.reference.filter(|r| !r.trim().is_empty()) {
        context = context.with_reference(reference);
    }

    let adjustment = state
        .ledger
        .adjust_credits(&request.user_id, amount, reason, &context)
        .await?;

    Ok((
        rate_limit_headers(&decision),
        Json(AdjustCreditsResponse {
            success: true,
            user_id: adjustment.user_id,
            change: adjustment.change,
            old_balance: adjustment.old_balance,
            new_balance: adjustment.new_balance,
        }),
    ))
}
