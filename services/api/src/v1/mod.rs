use axum::Router;
use serde_json::Value;

use crate::errors::{AppError, AppResult};
use crate::AppState;

mod credits;
mod music;
mod payments;

pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/credits", credits::router())
        .nest("/admin", credits::admin_router())
        .nest("/payments", payments::router())
        .nest("/music", music::router())
}

/// Reads a JSON number that must be a whole `i32`. `1.5`, `"3"` and `1e12`
/// are all rejected.
pub(crate) fn integer_field(value: &Value, field: &str) -> AppResult<i32> {
    let number = value
        .as_number()
        .ok_or_else(|| AppError::bad_request(format!("{} must be a number", field)))?;

    number
        .as_i64()
        .and_then(|n| i32::try_from(n).ok())
        .ok_or_else(|| AppError::bad_request(format!("{} must be an integer", field)))
}
