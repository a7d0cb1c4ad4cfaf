use anyhow::{anyhow, Context, Result};
use rate_limiter::{LimiterCategory, RateLimitConfig};
use std::collections::HashMap;
use std::time::Duration;

use crate::music::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone)]
pub struct MusicApiConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub redis_url: String,
    pub environment: String,
    pub rate_limit_backend: RateLimitBackend,
    pub rate_limit_sweep_interval: Duration,
    pub rate_limits: HashMap<LimiterCategory, RateLimitConfig>,
    pub admin_api_token: Option<String>,
    pub webhook_secret: Option<String>,
    pub music_api: MusicApiConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let rate_limit_backend = match var("RATE_LIMIT_BACKEND").as_deref() {
            None | Some("memory") => RateLimitBackend::Memory,
            Some("redis") => RateLimitBackend::Redis,
            Some(other) => return Err(anyhow!("RATE_LIMIT_BACKEND must be 'memory' or 'redis', got '{}'", other)),
        };

        let mut rate_limits = HashMap::new();
        for category in LimiterCategory::ALL {
            let defaults = category.default_config();
            let max_key = format!("RATE_LIMIT_{}_MAX", category.env_name());
            let window_key = format!("RATE_LIMIT_{}_WINDOW_SECS", category.env_name());

            let max_requests = parse_or(var(&max_key), &max_key, defaults.max_requests)?;
            let window_secs = parse_or(var(&window_key), &window_key, defaults.window.as_secs())?;
            if window_secs == 0 {
                return Err(anyhow!("{} must be greater than zero", window_key));
            }

            rate_limits.insert(
                category,
                RateLimitConfig::new(max_requests, Duration::from_secs(window_secs)),
            );
        }

        let retry_defaults = RetryPolicy::default();

        Ok(Self {
            port: parse_or(var("PORT"), "PORT", 3000)?,
            database_url: var("DATABASE_URL").context("DATABASE_URL must be set")?,
            redis_url: var("REDIS_URL").unwrap_or_else(|| "redis://localhost:6379".to_string()),
            environment: var("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            rate_limit_backend,
            rate_limit_sweep_interval: Duration::from_secs(parse_or(
                var("RATE_LIMIT_SWEEP_SECS"),
                "RATE_LIMIT_SWEEP_SECS",
                60,
            )?),
            rate_limits,
            admin_api_token: var("ADMIN_API_TOKEN"),
            webhook_secret: var("WEBHOOK_SECRET"),
            music_api: MusicApiConfig {
                base_url: var("MUSIC_API_URL"),
                api_key: var("MUSIC_API_KEY"),
                retry: RetryPolicy {
                    max_retries: parse_or(
                        var("MUSIC_API_MAX_RETRIES"),
                        "MUSIC_API_MAX_RETRIES",
                        retry_defaults.max_retries,
                    )?,
                    initial_backoff: Duration::from_secs(parse_or(
                        var("MUSIC_API_INITIAL_BACKOFF_SECS"),
                        "MUSIC_API_INITIAL_BACKOFF_SECS",
                        retry_defaults.initial_backoff.as_secs(),
                    )?),
                },
                request_timeout: Duration::from_secs(parse_or(
                    var("MUSIC_API_TIMEOUT_SECS"),
                    "MUSIC_API_TIMEOUT_SECS",
                    120,
                )?),
            },
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value '{}'", key, raw)),
        None => Ok(default),
    }
}
