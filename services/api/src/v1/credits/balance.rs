use axum::{extract::State, http::HeaderMap, Json};
use rate_limiter::LimiterCategory;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    errors::AppResult,
    extractors::AuthenticatedUser,
    rate_limit::{enforce, rate_limit_headers},
    AppState,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub success: bool,
    pub user_id: Uuid,
    pub credits_remaining: i32,
}

/// Current credit balance of the calling user.
pub async fn handler(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> AppResult<(HeaderMap, Json<BalanceResponse>)> {
    let decision = enforce(&state.rate_limiters, LimiterCategory::General, &user_id.to_string()).await?;

    let credits_remaining = state.ledger.balance(&user_id.to_string()).await?;

    Ok((
        rate_limit_headers(&decision),
        Json(BalanceResponse {
            success: true,
            user_id,
            credits_remaining,
        }),
    ))
}
