pub mod config;
pub mod errors;
pub mod extractors;
pub mod music;
pub mod rate_limit;
pub mod v1;

use axum::{routing::get, Json, Router};
use credit_ledger::{CreditLedger, PgCreditStore};
use rate_limiter::{MemoryStore, RateLimitStore, RateLimiters, RedisStore};
use serde_json::json;
use std::sync::Arc;

use crate::config::{Config, RateLimitBackend};
use crate::music::MusicGenerator;

#[derive(Clone)]
pub struct AppState {
    pub ledger: CreditLedger,
    pub rate_limiters: RateLimiters,
    pub music: Arc<dyn MusicGenerator>,
    pub admin_token: Option<String>,
    pub webhook_secret: Option<String>,
}

impl AppState {
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let db_pool = postgres_models::create_pool(&config.database_url)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create database pool: {}", e))?;

        let limiter_store: Arc<dyn RateLimitStore> = match config.rate_limit_backend {
            RateLimitBackend::Memory => Arc::new(MemoryStore::new()),
            RateLimitBackend::Redis => {
                let redis_pool = rate_limiter::create_pool(&config.redis_url)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to create Redis pool: {}", e))?;
                Arc::new(RedisStore::new(redis_pool))
            }
        };

        Ok(Self {
            ledger: CreditLedger::new(Arc::new(PgCreditStore::new(db_pool))),
            rate_limiters: RateLimiters::with_configs(limiter_store, config.rate_limits.clone()),
            music: music::generator_from_config(&config.music_api)?,
            admin_token: config.admin_api_token.clone(),
            webhook_secret: config.webhook_secret.clone(),
        })
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "songcraft-api"
    }))
}

/// Routes without the outer tracing/CORS layers.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/v1", v1::router())
        .with_state(state)
}
