use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use credit_ledger::LedgerError;
use rate_limiter::Decision;
use serde_json::json;
use std::fmt;

use crate::music::MusicApiError;
use crate::rate_limit::rate_limit_headers;

const GENERIC_ERROR: &str = "An unexpected error occurred";
const SAFE_PATTERNS: [&str; 5] = ["not found", "unauthorized", "invalid", "missing", "required"];

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    pub headers: Option<HeaderMap>,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            headers: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn payment_required(message: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYMENT_REQUIRED, message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, message)
    }

    /// 429 carrying `Retry-After` and the `X-RateLimit-*` headers.
    pub fn rate_limited(decision: &Decision) -> Self {
        let mut headers = rate_limit_headers(decision);
        if let Some(retry_after) = decision.retry_after {
            headers.insert("retry-after", HeaderValue::from(retry_after));
        }
        Self::too_many_requests("Too many requests, please try again later").with_headers(headers)
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Some(headers);
        self
    }
}

/// Replaces a server-side error message with a generic one unless it matches
/// an allow-listed pattern.
pub fn sanitize_message(message: &str) -> String {
    let lower = message.to_lowercase();
    if SAFE_PATTERNS.iter().any(|pattern| lower.contains(pattern)) {
        message.to_string()
    } else {
        GENERIC_ERROR.to_string()
    }
}

fn public_message(status: StatusCode, message: String) -> String {
    if status.is_server_error() && !cfg!(debug_assertions) {
        sanitize_message(&message)
    } else {
        message
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = self.status.as_u16(), error = %self.message, "Request failed");
        }

        let body = Json(json!({
            "error": public_message(self.status, self.message),
        }));

        let mut resp = (self.status, body).into_response();

        if let Some(headers) = self.headers {
            let headers_mut = resp.headers_mut();
            for (key, value) in headers.iter() {
                headers_mut.insert(key, value.clone());
            }
        }

        resp
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::bad_request(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Validation(message) => AppError::bad_request(message),
            LedgerError::UserNotFound(_) => AppError::not_found("User not found"),
            LedgerError::InsufficientBalance { balance, requested } => AppError::payment_required(
                format!("Insufficient credits: {} available, {} required", balance, requested),
            ),
            LedgerError::Persistence(detail) => {
                AppError::internal_server_error(format!("Credit store error: {}", detail))
            }
        }
    }
}

impl From<MusicApiError> for AppError {
    fn from(err: MusicApiError) -> Self {
        match err {
            MusicApiError::Upstream { status, message } => {
                tracing::error!(upstream_status = status, error = %message, "Music API call failed");
                let status = StatusCode::from_u16(status)
                    .ok()
                    .filter(|s| s.is_client_error() || s.is_server_error())
                    .unwrap_or(StatusCode::BAD_GATEWAY);
                AppError::new(status, format!("Music generation failed: {}", message))
            }
            MusicApiError::RateLimited { attempts } => {
                tracing::error!(attempts, "Music API still rate limited after retries");
                AppError::service_unavailable("Music service is busy, please try again later")
            }
            MusicApiError::NotConfigured => AppError::service_unavailable("Music generation is not configured"),
            MusicApiError::Transport(detail) => {
                tracing::error!(error = %detail, "Music API unreachable");
                AppError::new(StatusCode::BAD_GATEWAY, "Music service unreachable")
            }
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
