use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};
use credit_ledger::{AdjustmentContext, AdjustmentReason};
use rate_limiter::LimiterCategory;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    errors::{AppError, AppResult},
    extractors::AuthenticatedUser,
    music::GenerationRequest,
    rate_limit::{enforce, rate_limit_headers},
    AppState,
};

const MAX_LYRICS_CHARS: usize = 5000;
const MAX_LABEL_CHARS: usize = 200;
const GENERATION_COST: i32 = 1;

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub lyrics: Option<String>,
    pub style: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub success: bool,
    pub credits_remaining: i32,
    pub generation: Value,
}

fn optional_label(value: Option<String>, field: &str) -> AppResult<Option<String>> {
    match value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(v) if v.chars().count() > MAX_LABEL_CHARS => Err(AppError::bad_request(format!(
            "{} must be at most {} characters",
            field, MAX_LABEL_CHARS
        ))),
        other => Ok(other),
    }
}

fn validate(request: GenerateRequest) -> AppResult<GenerationRequest> {
    let lyrics = request
        .lyrics
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .ok_or_else(|| AppError::bad_request("lyrics are required"))?;
    if lyrics.chars().count() > MAX_LYRICS_CHARS {
        return Err(AppError::bad_request(format!(
            "lyrics must be at most {} characters",
            MAX_LYRICS_CHARS
        )));
    }

    Ok(GenerationRequest {
        lyrics,
        style: optional_label(request.style, "style")?,
        title: optional_label(request.title, "title")?,
    })
}

/// Renders lyrics to audio, charging one credit.
///
/// The credit is taken before the upstream call and given back if the call
/// fails, so a failed generation never costs anything.
pub async fn handler(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> AppResult<(HeaderMap, Json<GenerateResponse>)> {
    let user = user_id.to_string();
    let decision = enforce(&state.rate_limiters, LimiterCategory::MusicGeneration, &user).await?;

    let Json(request) = payload?;
    let request = validate(request)?;

    let context = AdjustmentContext::actor(user.clone());
    let charge = state
        .ledger
        .adjust_credits(&user, -GENERATION_COST, AdjustmentReason::MusicGeneration, &context)
        .await?;

    match state.music.generate(&request).await {
        Ok(generation) => Ok((
            rate_limit_headers(&decision),
            Json(GenerateResponse {
                success: true,
                credits_remaining: charge.new_balance,
                generation,
            }),
        )),
        Err(err) => {
            let refund_context = AdjustmentContext::actor(user.clone()).with_reference(charge.id.to_string());
            if let Err(refund_err) = state
                .ledger
                .add_credits(&user, GENERATION_COST, AdjustmentReason::GenerationRefund, &refund_context)
                .await
            {
                tracing::error!(
                    user_id = %user_id,
                    charge_id = %charge.id,
                    error = %refund_err,
                    "Failed to refund credit after music generation error"
                );
            }
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(lyrics: Option<&str>) -> GenerateRequest {
        GenerateRequest {
            lyrics: lyrics.map(str::to_string),
            style: Some("  indie folk ".to_string()),
            title: Some("   ".to_string()),
        }
    }

    #[test]
    fn test_validate_trims_and_drops_blank_labels() {
        let valid = validate(request(Some("  la la la  "))).unwrap();
        assert_eq!(valid.lyrics, "la la la");
        assert_eq!(valid.style.as_deref(), Some("indie folk"));
        assert_eq!(valid.title, None);
    }

    #[test]
    fn test_validate_rejects_missing_or_oversized_lyrics() {
        assert!(validate(request(None)).is_err());
        assert!(validate(request(Some("   "))).is_err());

        let long = "a".repeat(MAX_LYRICS_CHARS + 1);
        assert!(validate(request(Some(&long))).is_err());
    }
}
