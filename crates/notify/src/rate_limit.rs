//! Keyed rate-limit counters.
//!
//! Callers hold an `Arc<dyn RateLimitStore>` rather than process-global
//! state. [`MemoryRateLimiter`] suits a single instance; several instances
//! need a shared backend implementing the same trait.

use std::collections::HashMap;

use academy_core::types::Timestamp;
use async_trait::async_trait;
use chrono::TimeDelta;
use tokio::sync::Mutex;

/// Result of one counter hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: TimeDelta },
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Count one hit for `key` at `now` against `limit` per `window`.
    async fn hit(&self, key: &str, limit: u32, window: TimeDelta, now: Timestamp) -> RateDecision;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: Timestamp,
    count: u32,
}

/// Fixed-window counter held in memory.
#[derive(Debug, Default)]
pub struct MemoryRateLimiter {
    windows: Mutex<HashMap<String, Window>>,
}

impl MemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimiter {
    async fn hit(&self, key: &str, limit: u32, window: TimeDelta, now: Timestamp) -> RateDecision {
        let mut windows = self.windows.lock().await;

        // Drop expired windows so idle keys do not accumulate.
        windows.retain(|_, w| now - w.started_at < window);

        let current = windows.entry(key.to_string()).or_insert(Window {
            started_at: now,
            count: 0,
        });

        if current.count >= limit {
            return RateDecision::Limited {
                retry_after: current.started_at + window - now,
            };
        }
        current.count += 1;
        RateDecision::Allowed {
            remaining: limit - current.count,
        }
    }
}
