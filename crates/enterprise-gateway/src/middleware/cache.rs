//! Response cache with per-entry TTL.
//!
//! Expired entries are evicted lazily on `get`; the periodic sweep only bounds
//! memory for keys that are never read again.

use crate::domain::types::{Request, Response};
use crate::ports::Clock;
use base64::{engine::general_purpose::STANDARD, Engine};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info};

/// Cached response plus bookkeeping
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub data: Response,
    pub created_at: Instant,
    pub ttl: Duration,
    pub hit_count: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= self.ttl
    }
}

/// Read-only cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    /// Hits over lookups since the last clear, in `[0, 1]`
    pub hit_rate: f64,
    pub total_hits: u64,
}

pub struct CacheStore {
    entries: DashMap<String, CacheEntry>,
    clock: Arc<dyn Clock>,
    lookups: AtomicU64,
    hits: AtomicU64,
}

impl CacheStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            lookups: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }

    /// Fetch a live entry, evicting it if it has expired
    pub fn get(&self, key: &str) -> Option<Response> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now();

        if let Some(mut entry) = self.entries.get_mut(key) {
            if !entry.is_expired(now) {
                entry.hit_count += 1;
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.data.clone());
            }
        } else {
            return None;
        }

        // A concurrent `set` may have refreshed the key; only drop it if still stale
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        debug!(key = key, "Evicted expired cache entry");
        None
    }

    /// Insert or overwrite; resets the hit count
    pub fn set(&self, key: impl Into<String>, response: Response, ttl_seconds: u64) {
        let key = key.into();
        let entry = CacheEntry {
            key: key.clone(),
            data: response,
            created_at: self.clock.now(),
            ttl: Duration::from_secs(ttl_seconds),
            hit_count: 0,
        };
        self.entries.insert(key, entry);
    }

    /// Hit count of a live entry
    pub fn hit_count(&self, key: &str) -> Option<u64> {
        self.entries.get(key).map(|e| e.hit_count)
    }

    /// Remove every expired entry, returning how many were dropped
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Drop all entries and reset statistics
    pub fn clear(&self) {
        self.entries.clear();
        self.lookups.store(0, Ordering::Relaxed);
        self.hits.store(0, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let lookups = self.lookups.load(Ordering::Relaxed);
        let hits = self.hits.load(Ordering::Relaxed);
        CacheStats {
            size: self.entries.len(),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
            total_hits: hits,
        }
    }
}

/// Deterministic cache key for a request.
///
/// `base64(METHOD|path|canonical_json(query)|user_id or "anonymous")`
pub fn cache_key(request: &Request) -> String {
    build_cache_key(
        &request.method,
        &request.path,
        &request.query,
        request.user_id(),
    )
}

pub fn build_cache_key(
    method: &str,
    path: &str,
    query: &BTreeMap<String, Value>,
    user_id: Option<&str>,
) -> String {
    let query_json = canonical_json(&Value::Object(
        query.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
    ));
    let raw = format!(
        "{}|{}|{}|{}",
        method,
        path,
        query_json,
        user_id.unwrap_or("anonymous")
    );
    STANDARD.encode(raw)
}

/// Compact JSON with object keys sorted at every level
pub fn canonical_json(value: &Value) -> String {
    fn write(value: &Value, out: &mut String) {
        match value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                out.push('{');
                for (i, key) in keys.into_iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&Value::String(key.clone()).to_string());
                    out.push(':');
                    write(&map[key], out);
                }
                out.push('}');
            }
            Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write(item, out);
                }
                out.push(']');
            }
            scalar => out.push_str(&scalar.to_string()),
        }
    }

    let mut out = String::new();
    write(value, &mut out);
    out
}

/// Background task sweeping expired entries until shutdown
pub async fn sweep_task(
    cache: Arc<CacheStore>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = cache.sweep();
                if removed > 0 {
                    debug!(removed, remaining = cache.len(), "Cache sweep completed");
                }
            }
            _ = shutdown.changed() => {
                info!("Cache sweeper shutting down");
                break;
            }
        }
    }
}
