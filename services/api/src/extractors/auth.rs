use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use credit_ledger::CreditLedger;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};

/// Header the auth gateway sets after validating the session.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

/// User id forwarded by the auth gateway, trusted verbatim.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("Unauthorized: missing user identity"))?;

        let user_id = CreditLedger::parse_user_id(raw)
            .map_err(|_| AppError::unauthorized("Unauthorized: invalid user identity"))?;

        Ok(AuthenticatedUser(user_id))
    }
}

/// Checks `Authorization: Bearer <token>` against the configured admin token.
pub fn require_admin(headers: &HeaderMap, admin_token: Option<&str>) -> AppResult<()> {
    let expected = admin_token.ok_or_else(|| AppError::forbidden("Admin API is disabled"))?;

    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::unauthorized("Unauthorized: missing admin token"))?;

    if !bool::from(presented.trim().as_bytes().ct_eq(expected.as_bytes())) {
        tracing::warn!("Rejected admin request with wrong token");
        return Err(AppError::forbidden("Forbidden"));
    }
    Ok(())
}

/// Checks the shared secret the payment processor sends with callbacks.
pub fn require_webhook_secret(headers: &HeaderMap, secret: Option<&str>) -> AppResult<()> {
    let expected = secret.ok_or_else(|| AppError::forbidden("Webhook endpoint is disabled"))?;

    let presented = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if !bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
        tracing::warn!("Rejected webhook with invalid secret");
        return Err(AppError::forbidden("Invalid webhook secret"));
    }
    Ok(())
}
