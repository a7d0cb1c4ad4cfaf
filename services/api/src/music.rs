//! Client for the hosted music generation API.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::MusicApiConfig;

#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub lyrics: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum MusicApiError {
    #[error("music API returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("music API still rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("music API is not configured")]
    NotConfigured,

    #[error("music API request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl MusicApiError {
    fn is_rate_limit(&self) -> bool {
        matches!(self, Self::Upstream { status: 429, .. })
    }
}

#[async_trait]
pub trait MusicGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Value, MusicApiError>;
}

/// Backoff applied when the music API answers 429.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based): initial, then doubling.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        self.initial_backoff.saturating_mul(2u32.saturating_pow(retry))
    }
}

/// Runs `call`, retrying only upstream 429s. Any other error aborts at once.
pub async fn with_backoff<F, Fut, T>(policy: &RetryPolicy, mut call: F) -> Result<T, MusicApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, MusicApiError>>,
{
    let mut retries = 0;
    loop {
        match call().await {
            Err(err) if err.is_rate_limit() => {
                if retries >= policy.max_retries {
                    return Err(MusicApiError::RateLimited {
                        attempts: retries + 1,
                    });
                }
                let delay = policy.backoff_for(retries);
                tracing::warn!(
                    retry = retries + 1,
                    max_retries = policy.max_retries,
                    delay_secs = delay.as_secs(),
                    "Music API rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
                retries += 1;
            }
            other => return other,
        }
    }
}

pub struct HttpMusicClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    retry: RetryPolicy,
}

impl HttpMusicClient {
    /// `timeout` bounds each attempt, from connect to the end of the body.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self, MusicApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            retry,
        })
    }

    async fn send_once(&self, request: &GenerationRequest) -> Result<Value, MusicApiError> {
        let mut builder = self
            .client
            .post(format!("{}/generate", self.base_url))
            .json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        Err(MusicApiError::Upstream {
            status: status.as_u16(),
            message: upstream_message(&body, status.canonical_reason()),
        })
    }
}

/// Pulls a human-readable message out of an upstream error body.
fn upstream_message(body: &str, fallback: Option<&str>) -> String {
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|json| {
        ["message", "error", "detail"]
            .iter()
            .find_map(|field| json.get(*field).and_then(Value::as_str).map(str::to_string))
    });

    from_json
        .or_else(|| (!body.trim().is_empty()).then(|| body.trim().chars().take(200).collect()))
        .unwrap_or_else(|| fallback.unwrap_or("unknown error").to_string())
}

#[async_trait]
impl MusicGenerator for HttpMusicClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<Value, MusicApiError> {
        with_backoff(&self.retry, || self.send_once(request)).await
    }
}

/// Used when no music API URL is configured.
pub struct DisabledMusicGenerator;

#[async_trait]
impl MusicGenerator for DisabledMusicGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<Value, MusicApiError> {
        Err(MusicApiError::NotConfigured)
    }
}

pub fn generator_from_config(config: &MusicApiConfig) -> Result<Arc<dyn MusicGenerator>, MusicApiError> {
    match &config.base_url {
        Some(url) => Ok(Arc::new(HttpMusicClient::new(
            url.clone(),
            config.api_key.clone(),
            config.retry.clone(),
            config.request_timeout,
        )?)),
        None => {
            tracing::warn!("MUSIC_API_URL not set, music generation disabled");
            Ok(Arc::new(DisabledMusicGenerator))
        }
    }
}
