//! Glue between handlers and the [`RateLimiters`] registry.

use axum::http::{HeaderMap, HeaderValue};
use rate_limiter::{Decision, LimiterCategory, RateLimiters};

use crate::errors::{AppError, AppResult};

/// Counts one request against `category` for `identifier`.
///
/// `Ok` means proceed; `Err` is a ready-to-send 429.
pub async fn enforce(
    limiters: &RateLimiters,
    category: LimiterCategory,
    identifier: &str,
) -> AppResult<Decision> {
    let decision = limiters.check(category, identifier).await;
    if decision.allowed {
        Ok(decision)
    } else {
        Err(AppError::rate_limited(&decision))
    }
}

pub fn rate_limit_headers(decision: &Decision) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(decision.reset_timestamp()));
    headers
}
