use crate::RateLimitError;
use async_trait::async_trait;
use std::time::Duration;

/// State of a key's window immediately after counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHit {
    /// Requests counted in the current window, including this one.
    pub count: u32,
    /// Time left until the window resets.
    pub resets_in: Duration,
}

/// Backing storage for fixed-window counters.
///
/// `hit` must count the request and report the window atomically per key: a
/// window that has ended (`now >= window_end`) is replaced by a fresh one with
/// `count = 1`, never merged.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn hit(&self, key: &str, window: Duration) -> Result<WindowHit, RateLimitError>;

    /// Drops entries whose window has elapsed. Returns how many were removed.
    async fn sweep(&self) -> usize;
}
