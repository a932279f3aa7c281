//! Endpoint descriptors and the handler contract.

use crate::domain::error::HandlerError;
use crate::domain::types::{Request, Response};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Fixed-window rate limit declared by an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Max requests per window per `(client, path)`
    pub limit: u32,
    pub window_seconds: u64,
}

impl RateLimitPolicy {
    pub fn new(limit: u32, window_seconds: u64) -> Self {
        Self {
            limit,
            window_seconds,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

/// Response caching declared by an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    pub ttl_seconds: u64,
}

impl CachePolicy {
    pub fn new(ttl_seconds: u64) -> Self {
        Self { ttl_seconds }
    }
}

/// Backend node chosen for a request, handed to the handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamTarget {
    pub id: String,
    pub url: String,
}

/// Backend handler registered by an external service.
///
/// The gateway treats handlers as opaque. `upstream` is `None` when no node
/// was available; handlers that need a backend decide how to respond.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(
        &self,
        request: Request,
        upstream: Option<UpstreamTarget>,
    ) -> Result<Response, HandlerError>;
}

/// Adapter turning an async closure into a [`Handler`]
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Request, Option<UpstreamTarget>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, HandlerError>> + Send,
{
    async fn handle(
        &self,
        request: Request,
        upstream: Option<UpstreamTarget>,
    ) -> Result<Response, HandlerError> {
        (self.f)(request, upstream).await
    }
}

/// Wrap an async closure as a shareable handler
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn Handler>
where
    F: Fn(Request, Option<UpstreamTarget>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

/// Registered route. Immutable once handed to the registry.
#[derive(Clone)]
pub struct Endpoint {
    pub path: String,
    pub method: String,
    pub auth_required: bool,
    pub permissions: HashSet<String>,
    pub rate_limit: Option<RateLimitPolicy>,
    pub cache: Option<CachePolicy>,
    pub handler: Arc<dyn Handler>,
}

impl Endpoint {
    /// Public endpoint with no policies
    pub fn new(method: &str, path: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        Self {
            path: path.into(),
            method: method.to_ascii_uppercase(),
            auth_required: false,
            permissions: HashSet::new(),
            rate_limit: None,
            cache: None,
            handler,
        }
    }

    pub fn require_auth(mut self) -> Self {
        self.auth_required = true;
        self
    }

    /// Require permissions. Implies authentication.
    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        if !self.permissions.is_empty() {
            self.auth_required = true;
        }
        self
    }

    pub fn with_rate_limit(mut self, limit: u32, window_seconds: u64) -> Self {
        self.rate_limit = Some(RateLimitPolicy::new(limit, window_seconds));
        self
    }

    pub fn with_cache(mut self, ttl_seconds: u64) -> Self {
        self.cache = Some(CachePolicy::new(ttl_seconds));
        self
    }

    /// Registry key `METHOD:path`
    pub fn key(&self) -> String {
        route_key(&self.method, &self.path)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("auth_required", &self.auth_required)
            .field("permissions", &self.permissions)
            .field("rate_limit", &self.rate_limit)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

/// Build the registry key for a method/path pair
pub fn route_key(method: &str, path: &str) -> String {
    format!("{}:{}", method.to_ascii_uppercase(), path)
}
