//! Security filter: request event logging and malicious-pattern inspection.
//!
//! Every inspected request is reported to the external security sink without
//! waiting on it. The body (serialized as JSON) and the path are then matched
//! against a fixed set of injection patterns; any match rejects the request.

use crate::domain::config::{ConfigError, SecurityConfig};
use crate::domain::error::{GatewayError, GatewayResult};
use crate::domain::types::Request;
use crate::ports::{SecurityEvent, SecurityLogger};
use regex::Regex;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

/// Built-in patterns: script tags, `javascript:` URIs, SQL injection
const BUILTIN_PATTERNS: &[(&str, &str)] = &[
    ("script_tag", r"(?i)<\s*script\b"),
    ("javascript_uri", r"(?i)javascript\s*:"),
    ("sql_union_select", r"(?i)\bunion\b(\s+all)?\s+select\b"),
    ("sql_select_from", r"(?i)\bselect\b[\s\S]+?\bfrom\b"),
];

struct SecurityPattern {
    name: String,
    regex: Regex,
}

pub struct SecurityFilter {
    logger: Arc<dyn SecurityLogger>,
    patterns: Vec<SecurityPattern>,
    enabled: bool,
}

impl SecurityFilter {
    /// Compile built-in and configured patterns
    pub fn new(
        logger: Arc<dyn SecurityLogger>,
        config: &SecurityConfig,
    ) -> Result<Self, ConfigError> {
        let mut patterns = Vec::with_capacity(BUILTIN_PATTERNS.len() + config.extra_patterns.len());

        for (name, pattern) in BUILTIN_PATTERNS {
            patterns.push(SecurityPattern {
                name: (*name).to_string(),
                regex: Regex::new(pattern)
                    .map_err(|e| ConfigError::InvalidPattern(format!("{name}: {e}")))?,
            });
        }

        for (i, pattern) in config.extra_patterns.iter().enumerate() {
            patterns.push(SecurityPattern {
                name: format!("custom_{i}"),
                regex: Regex::new(pattern)
                    .map_err(|e| ConfigError::InvalidPattern(format!("{pattern}: {e}")))?,
            });
        }

        Ok(Self {
            logger,
            patterns,
            enabled: config.enabled,
        })
    }

    /// Log the request and reject it on any pattern match
    pub fn inspect(&self, request: &Request) -> GatewayResult<()> {
        self.report(SecurityEvent::new(
            "api_request",
            json!({
                "path": request.path,
                "method": request.method,
                "ip": request.client_ip,
                "user_agent": request.user_agent,
                "request_id": request.id.to_string(),
            }),
        ));

        if !self.enabled {
            return Ok(());
        }

        if let Some(pattern) = self.find_match(request) {
            warn!(
                request_id = %request.id,
                path = %request.path,
                ip = %request.client_ip,
                pattern = %pattern,
                "Malicious request blocked"
            );
            self.report(SecurityEvent::new(
                "malicious_request_blocked",
                json!({
                    "path": request.path,
                    "method": request.method,
                    "ip": request.client_ip,
                    "pattern": pattern,
                    "request_id": request.id.to_string(),
                }),
            ));
            return Err(GatewayError::MaliciousRequestDetected);
        }

        Ok(())
    }

    /// Name of the first pattern matching body + path
    fn find_match(&self, request: &Request) -> Option<&str> {
        let body = if request.body.is_null() {
            String::new()
        } else {
            request.body.to_string()
        };
        let haystack = format!("{}{}", body, request.path);

        self.patterns
            .iter()
            .find(|p| p.regex.is_match(&haystack))
            .map(|p| p.name.as_str())
    }

    /// Fire-and-forget delivery to the security sink
    fn report(&self, event: SecurityEvent) {
        let logger = Arc::clone(&self.logger);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = logger.log_security_event(event).await {
                        warn!(error = %e, "Failed to deliver security event");
                    }
                });
            }
            Err(_) => {
                debug!(
                    event_type = %event.event_type,
                    "No runtime available, security event dropped"
                );
            }
        }
    }
}
