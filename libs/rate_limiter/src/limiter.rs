use crate::{RateLimitStore, WindowHit};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Derives the per-category part of a key from the raw identifier.
pub type KeyGenerator = fn(&str) -> String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimiterCategory {
    General,
    Auth,
    MusicGeneration,
    Email,
    Webhook,
    Strict,
}

impl LimiterCategory {
    pub const ALL: [LimiterCategory; 6] = [
        Self::General,
        Self::Auth,
        Self::MusicGeneration,
        Self::Email,
        Self::Webhook,
        Self::Strict,
    ];

    fn index(&self) -> usize {
        *self as usize
    }

    /// Prefix applied to every key of this category.
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Self::General => "api",
            Self::Auth => "auth",
            Self::MusicGeneration => "music_gen",
            Self::Email => "email",
            Self::Webhook => "webhook",
            Self::Strict => "strict",
        }
    }

    /// Name used in `RATE_LIMIT_<NAME>_*` environment overrides.
    pub fn env_name(&self) -> &'static str {
        match self {
            Self::General => "GENERAL",
            Self::Auth => "AUTH",
            Self::MusicGeneration => "MUSIC_GENERATION",
            Self::Email => "EMAIL",
            Self::Webhook => "WEBHOOK",
            Self::Strict => "STRICT",
        }
    }

    pub fn default_config(&self) -> RateLimitConfig {
        let (max_requests, window_secs) = match self {
            Self::General => (100, 15 * 60),
            Self::Auth => (5, 15 * 60),
            Self::MusicGeneration => (5, 60 * 60),
            Self::Email => (10, 60 * 60),
            Self::Webhook => (100, 60),
            Self::Strict => (10, 60),
        };
        RateLimitConfig::new(max_requests, Duration::from_secs(window_secs))
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
    pub key_generator: Option<KeyGenerator>,
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            key_generator: None,
        }
    }

    pub fn with_key_generator(mut self, key_generator: KeyGenerator) -> Self {
        self.key_generator = Some(key_generator);
        self
    }
}

/// Result of a limit check. A denial is a value, never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    /// Whole seconds until the window resets, rounded up. Only set on denial.
    pub retry_after: Option<u64>,
}

impl Decision {
    fn from_hit(limit: u32, hit: WindowHit) -> Self {
        let allowed = hit.count <= limit;
        Self {
            allowed,
            limit,
            remaining: limit.saturating_sub(hit.count),
            reset_at: reset_at(hit.resets_in),
            retry_after: (!allowed).then(|| ceil_secs(hit.resets_in).max(1)),
        }
    }

    /// Reset time as a unix timestamp in seconds.
    pub fn reset_timestamp(&self) -> i64 {
        self.reset_at.timestamp()
    }
}

fn reset_at(resets_in: Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::from_std(resets_in).unwrap_or_else(|_| chrono::Duration::zero())
}

fn ceil_secs(duration: Duration) -> u64 {
    if duration.subsec_nanos() > 0 {
        duration.as_secs() + 1
    } else {
        duration.as_secs()
    }
}

/// Fixed-window limiter for one category.
#[derive(Clone)]
pub struct RateLimiter {
    category: LimiterCategory,
    config: RateLimitConfig,
    store: Arc<dyn RateLimitStore>,
}

impl RateLimiter {
    pub fn new(category: LimiterCategory, config: RateLimitConfig, store: Arc<dyn RateLimitStore>) -> Self {
        Self {
            category,
            config,
            store,
        }
    }

    pub fn category(&self) -> LimiterCategory {
        self.category
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Store key for `identifier`. The category prefix is always applied, even
    /// on top of a custom key generator, so categories never share counters.
    pub fn key_for(&self, identifier: &str) -> String {
        let base = match self.config.key_generator {
            Some(generate) => generate(identifier),
            None => identifier.to_owned(),
        };
        format!("{}:{}", self.category.key_prefix(), base)
    }

    /// Counts one request for `identifier`.
    ///
    /// Store failures fail open: the request is allowed and the error logged.
    pub async fn check(&self, identifier: &str) -> Decision {
        let key = self.key_for(identifier);

        match self.store.hit(&key, self.config.window).await {
            Ok(hit) => {
                let decision = Decision::from_hit(self.config.max_requests, hit);
                if !decision.allowed {
                    tracing::warn!(
                        category = self.category.key_prefix(),
                        key = %key,
                        count = hit.count,
                        limit = self.config.max_requests,
                        retry_after = decision.retry_after,
                        "Rate limit exceeded"
                    );
                }
                decision
            }
            Err(err) => {
                tracing::error!(
                    category = self.category.key_prefix(),
                    key = %key,
                    error = %err,
                    "Rate limit store unavailable, allowing request"
                );
                Decision {
                    allowed: true,
                    limit: self.config.max_requests,
                    remaining: self.config.max_requests,
                    reset_at: reset_at(self.config.window),
                    retry_after: None,
                }
            }
        }
    }
}

/// One limiter per category over a shared store.
#[derive(Clone)]
pub struct RateLimiters {
    store: Arc<dyn RateLimitStore>,
    // indexed by LimiterCategory::index, in ALL order
    limiters: Vec<RateLimiter>,
}

impl RateLimiters {
    /// Builds every category with its default configuration.
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self::with_configs(store, HashMap::new())
    }

    /// Builds every category, taking configuration from `overrides` where
    /// present and the category default otherwise.
    pub fn with_configs(
        store: Arc<dyn RateLimitStore>,
        mut overrides: HashMap<LimiterCategory, RateLimitConfig>,
    ) -> Self {
        let limiters = LimiterCategory::ALL
            .into_iter()
            .map(|category| {
                let config = overrides
                    .remove(&category)
                    .unwrap_or_else(|| category.default_config());
                RateLimiter::new(category, config, store.clone())
            })
            .collect();

        Self { store, limiters }
    }

    pub fn limiter(&self, category: LimiterCategory) -> &RateLimiter {
        &self.limiters[category.index()]
    }

    pub async fn check(&self, category: LimiterCategory, identifier: &str) -> Decision {
        self.limiter(category).check(identifier).await
    }

    pub async fn sweep(&self) -> usize {
        self.store.sweep().await
    }

    /// Runs [`RateLimiters::sweep`] every `every`, independent of request traffic.
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let store = self.store.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = store.sweep().await;
                if removed > 0 {
                    tracing::debug!(removed, "Swept expired rate limit windows");
                }
            }
        })
    }
}
