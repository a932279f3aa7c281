//! Gateway error taxonomy.
//!
//! Every pipeline rejection maps to exactly one HTTP status and one public
//! message. Internal details (matched patterns, handler errors, panic payloads)
//! are logged at the pipeline boundary and never copied into a [`Response`].

use crate::domain::types::Response;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// HTTP status codes produced by the gateway itself
pub mod status {
    pub const UNAUTHORIZED: u16 = 401;
    pub const FORBIDDEN: u16 = 403;
    pub const NOT_FOUND: u16 = 404;
    pub const TOO_MANY_REQUESTS: u16 = 429;
    pub const INTERNAL_SERVER_ERROR: u16 = 500;
}

/// Why authentication failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// No `Authorization: Bearer <token>` header on the request
    MissingHeader,
    /// The session validator rejected the token
    InvalidToken,
}

impl AuthFailure {
    pub fn message(&self) -> &'static str {
        match self {
            AuthFailure::MissingHeader => "Missing or invalid authorization header",
            AuthFailure::InvalidToken => "Invalid or expired token",
        }
    }
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Request-level gateway errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    /// Fixed-window limit for `(client, path)` exhausted
    #[error("rate limit exceeded (retry after {retry_after:?})")]
    RateLimitExceeded { retry_after: Duration },

    /// No endpoint registered for `method:path`
    #[error("route not found: {method} {path}")]
    RouteNotFound { method: String, path: String },

    /// Missing header or rejected token
    #[error("authentication failed: {0}")]
    AuthenticationFailed(AuthFailure),

    /// Authenticated user lacks a required permission
    #[error("authorization denied")]
    AuthorizationDenied,

    /// Security filter matched a malicious pattern
    #[error("malicious request detected")]
    MaliciousRequestDetected,

    /// Dispatch exceeded the request timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Catch-all for handler failures and unexpected stage errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn internal(details: impl Into<String>) -> Self {
        GatewayError::Internal(details.into())
    }

    /// HTTP status surfaced to the caller
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::RateLimitExceeded { .. } => status::TOO_MANY_REQUESTS,
            GatewayError::RouteNotFound { .. } => status::NOT_FOUND,
            GatewayError::AuthenticationFailed(_) => status::UNAUTHORIZED,
            GatewayError::AuthorizationDenied => status::FORBIDDEN,
            GatewayError::MaliciousRequestDetected
            | GatewayError::Timeout(_)
            | GatewayError::Internal(_) => status::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to the caller
    pub fn public_message(&self) -> &'static str {
        match self {
            GatewayError::RateLimitExceeded { .. } => "Rate limit exceeded",
            GatewayError::RouteNotFound { .. } => "Endpoint not found",
            GatewayError::AuthenticationFailed(reason) => reason.message(),
            GatewayError::AuthorizationDenied => "Insufficient permissions",
            GatewayError::MaliciousRequestDetected => "Malicious request detected",
            GatewayError::Timeout(_) | GatewayError::Internal(_) => "Internal server error",
        }
    }

    /// Whether the rejection should be treated as a security incident
    pub fn is_security_incident(&self) -> bool {
        matches!(self, GatewayError::MaliciousRequestDetected)
    }

    /// Convert into the caller-facing response
    pub fn into_response(self) -> Response {
        let mut response = Response::error(self.status_code(), self.public_message());
        match &self {
            GatewayError::RateLimitExceeded { retry_after } => {
                let secs = retry_after.as_millis().div_ceil(1000).max(1);
                response.headers = Some(HashMap::from([(
                    "retry-after".to_string(),
                    secs.to_string(),
                )]));
            }
            GatewayError::AuthenticationFailed(_) => {
                response.headers = Some(HashMap::from([(
                    "www-authenticate".to_string(),
                    "Bearer".to_string(),
                )]));
            }
            _ => {}
        }
        response
    }
}

/// Result type for gateway stages
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Error returned by backend handlers.
///
/// Converted to a generic 500 at the pipeline boundary; the message is only
/// ever logged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(format!("serialization failed: {e}"))
    }
}
