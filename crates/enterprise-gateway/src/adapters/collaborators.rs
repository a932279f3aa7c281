//! Default implementations of the outbound ports.
//!
//! Suitable for the standalone runtime and for tests. Deployments with a real
//! auth provider or SIEM plug in their own implementations instead.

use crate::domain::types::Session;
use crate::ports::{
    HealthProbe, ProbeError, SecurityEvent, SecurityLogError, SecurityLogger, SessionValidator,
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tracing::{info, warn};

/// Writes security events to the `security` tracing target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSecurityLogger;

#[async_trait]
impl SecurityLogger for TracingSecurityLogger {
    async fn log_security_event(&self, event: SecurityEvent) -> Result<(), SecurityLogError> {
        let details = serde_json::to_string(&event.details)
            .map_err(|e| SecurityLogError(e.to_string()))?;

        if event.event_type == "api_request" {
            info!(
                target: "security",
                event_type = %event.event_type,
                timestamp = %event.timestamp.to_rfc3339(),
                details = %details,
                "Security event"
            );
        } else {
            warn!(
                target: "security",
                event_type = %event.event_type,
                timestamp = %event.timestamp.to_rfc3339(),
                details = %details,
                "Security incident"
            );
        }
        Ok(())
    }
}

/// Token → session table held in memory
#[derive(Debug, Default)]
pub struct InMemorySessionValidator {
    sessions: DashMap<String, Session>,
}

impl InMemorySessionValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue or replace the session bound to `token`
    pub fn insert(&self, token: impl Into<String>, session: Session) {
        self.sessions.insert(token.into(), session);
    }

    /// Builder-style `insert`
    pub fn with_session(self, token: impl Into<String>, session: Session) -> Self {
        self.insert(token, session);
        self
    }

    /// Invalidate a token; returns whether it existed
    pub fn revoke(&self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionValidator for InMemorySessionValidator {
    async fn validate_session(&self, token: &str) -> Option<Session> {
        self.sessions.get(token).map(|s| s.value().clone())
    }
}

/// `GET {base_url}/health`; any 2xx counts as healthy
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
}

impl HttpHealthProbe {
    /// Client-level timeout backs up the checker's own per-probe timeout
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, base_url: &str) -> Result<(), ProbeError> {
        let url = format!("{}/health", base_url.trim_end_matches('/'));
        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout
            } else {
                ProbeError::Unreachable(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ProbeError::BadStatus(status.as_u16()))
        }
    }
}
