//! Outbound ports for the API Gateway.
//!
//! The gateway reaches external collaborators (session store, security event
//! sink, upstream health endpoints) only through these traits.

use crate::domain::types::Session;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Monotonic time source for windows and TTLs
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock backed implementation
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for deterministic tests
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

/// Structured event forwarded to the security logging sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(event_type: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            details,
            timestamp: Utc::now(),
        }
    }
}

/// Failure reported by the security logging sink
#[derive(Debug, Clone, thiserror::Error)]
#[error("security log unavailable: {0}")]
pub struct SecurityLogError(pub String);

/// External security event sink. Best effort; failures never reach callers.
#[async_trait]
pub trait SecurityLogger: Send + Sync {
    async fn log_security_event(&self, event: SecurityEvent) -> Result<(), SecurityLogError>;
}

/// External session validation (auth provider)
#[async_trait]
pub trait SessionValidator: Send + Sync {
    /// `None` when the token is unknown or expired
    async fn validate_session(&self, token: &str) -> Option<Session>;
}

/// Failure of a single health probe
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProbeError {
    #[error("unreachable: {0}")]
    Unreachable(String),
    #[error("unhealthy status {0}")]
    BadStatus(u16),
    #[error("probe timed out")]
    Timeout,
}

/// Reachability check against a node's `/health` endpoint
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, base_url: &str) -> Result<(), ProbeError>;
}
