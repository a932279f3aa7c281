//! Fixed-window rate limiting keyed by `client_ip:path`.
//!
//! The counter resets entirely when a window elapses, so up to `2 * limit`
//! requests can pass around a window boundary. That burst is accepted.

use crate::ports::Clock;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info};

/// Window state for one key
#[derive(Debug, Clone, Copy)]
struct RateLimitEntry {
    count: u32,
    window_reset_at: Instant,
}

/// Rate limiter state shared across requests
pub struct RateLimitState {
    entries: DashMap<String, RateLimitEntry>,
    clock: Arc<dyn Clock>,
}

impl RateLimitState {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Whether a request under `key` fits in the current window
    pub fn allow(&self, key: &str, limit: u32, window: Duration) -> bool {
        self.check(key, limit, window).is_ok()
    }

    /// Count a request against `key`.
    ///
    /// On denial returns how long until the window resets. Denied requests are
    /// not counted.
    pub fn check(&self, key: &str, limit: u32, window: Duration) -> Result<(), Duration> {
        let now = self.clock.now();

        if limit == 0 {
            return Err(window);
        }

        // The entry guard holds the shard lock, so read-modify-write is atomic per key
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| RateLimitEntry {
                count: 0,
                window_reset_at: now + window,
            });

        if now > entry.window_reset_at {
            entry.count = 0;
            entry.window_reset_at = now + window;
        }

        if entry.count < limit {
            entry.count += 1;
            Ok(())
        } else {
            let retry_after = entry.window_reset_at.saturating_duration_since(now);
            debug!(key = key, count = entry.count, limit, "Rate limit window exhausted");
            Err(retry_after)
        }
    }

    /// Requests counted in the current window for `key`
    pub fn current_count(&self, key: &str) -> Option<u32> {
        self.entries.get(key).map(|e| e.count)
    }

    /// Drop entries whose window has elapsed
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| now <= entry.window_reset_at);
        before.saturating_sub(self.entries.len())
    }

    /// Number of tracked keys
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

/// Limiter key for a client/path pair
pub fn rate_limit_key(client_ip: &str, path: &str) -> String {
    format!("{}:{}", client_ip, path)
}

/// Background task to drop expired windows
pub async fn cleanup_task(
    state: Arc<RateLimitState>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut cleanup_interval = tokio::time::interval(interval);
    cleanup_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    cleanup_interval.tick().await;

    loop {
        tokio::select! {
            _ = cleanup_interval.tick() => {
                let removed = state.cleanup();
                if removed > 0 {
                    debug!(
                        removed,
                        remaining = state.entry_count(),
                        "Removed expired rate limit windows"
                    );
                }
            }
            _ = shutdown.changed() => {
                info!("Rate limit cleanup shutting down");
                break;
            }
        }
    }
}
