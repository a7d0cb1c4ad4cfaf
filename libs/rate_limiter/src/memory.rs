use crate::{RateLimitError, RateLimitStore, WindowHit};
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Entry {
    count: u32,
    window_end: Instant,
}

/// Process-local counters. A restart resets every window.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn hit(&self, key: &str, window: Duration) -> Result<WindowHit, RateLimitError> {
        let now = Instant::now();

        // The shard lock is held for the whole read-compare-write on this key.
        let mut entry = self.entries.entry(key.to_owned()).or_insert(Entry {
            count: 0,
            window_end: now,
        });

        if now >= entry.window_end {
            *entry = Entry {
                count: 1,
                window_end: now + window,
            };
        } else {
            entry.count = entry.count.saturating_add(1);
        }

        Ok(WindowHit {
            count: entry.count,
            resets_in: entry.window_end.saturating_duration_since(now),
        })
    }

    async fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.window_end > now);
        before.saturating_sub(self.entries.len())
    }
}
