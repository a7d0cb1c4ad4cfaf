//! Fixed-window rate limiting.
//!
//! A [`RateLimiters`] registry owns one [`RateLimiter`] per [`LimiterCategory`],
//! all sharing a single [`RateLimitStore`]. The store is injected, so tests build
//! isolated instances and a deployment can swap the in-process [`MemoryStore`]
//! for the shared [`RedisStore`].

mod limiter;
mod memory;
mod redis_store;
mod store;

pub use limiter::{
    Decision, KeyGenerator, LimiterCategory, RateLimitConfig, RateLimiter, RateLimiters,
};
pub use memory::MemoryStore;
pub use redis_store::{create_pool, RedisPool, RedisStore};
pub use store::{RateLimitStore, WindowHit};

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Configuration error: {0}")]
    Config(String),
}
