//! Request pipeline.
//!
//! Stages run strictly in order and short-circuit with a [`GatewayError`]:
//!
//! ```text
//! SecurityCheck → RateLimit → RouteLookup → Authenticate → Authorize
//!     → CacheLookup → LoadBalanceSelect → Dispatch → CacheStore → MetricsUpdate
//! ```
//!
//! Handler errors, panics and timeouts are converted to a generic 500 at the
//! pipeline boundary. The connection slot taken in `LoadBalanceSelect` is a
//! guard, so it is released on every exit path.

use crate::domain::config::GatewayConfig;
use crate::domain::error::{GatewayError, GatewayResult};
use crate::domain::types::{Request, Response};
use crate::middleware::auth::{authorize, Authenticator};
use crate::middleware::cache::{cache_key, CacheStore};
use crate::middleware::metrics::{GatewayMetrics, RequestTimer};
use crate::middleware::rate_limit::{rate_limit_key, RateLimitState};
use crate::middleware::security::SecurityFilter;
use crate::registry::EndpointRegistry;
use crate::upstream::{ConnectionGuard, LoadBalancer};
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info_span, warn, Instrument, Span};

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    SecurityCheck,
    RateLimit,
    RouteLookup,
    Authenticate,
    Authorize,
    CacheLookup,
    LoadBalanceSelect,
    Dispatch,
    CacheStore,
    MetricsUpdate,
}

impl PipelineStage {
    /// Stage that produces a given rejection
    pub fn for_error(error: &GatewayError) -> Self {
        match error {
            GatewayError::MaliciousRequestDetected => PipelineStage::SecurityCheck,
            GatewayError::RateLimitExceeded { .. } => PipelineStage::RateLimit,
            GatewayError::RouteNotFound { .. } => PipelineStage::RouteLookup,
            GatewayError::AuthenticationFailed(_) => PipelineStage::Authenticate,
            GatewayError::AuthorizationDenied => PipelineStage::Authorize,
            GatewayError::Timeout(_) | GatewayError::Internal(_) => PipelineStage::Dispatch,
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::SecurityCheck => "security_check",
            PipelineStage::RateLimit => "rate_limit",
            PipelineStage::RouteLookup => "route_lookup",
            PipelineStage::Authenticate => "authenticate",
            PipelineStage::Authorize => "authorize",
            PipelineStage::CacheLookup => "cache_lookup",
            PipelineStage::LoadBalanceSelect => "load_balance_select",
            PipelineStage::Dispatch => "dispatch",
            PipelineStage::CacheStore => "cache_store",
            PipelineStage::MetricsUpdate => "metrics_update",
        };
        f.write_str(name)
    }
}

/// Runtime switches for optional stages
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub request_timeout: Duration,
    pub cache_enabled: bool,
    pub rate_limit_enabled: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            cache_enabled: true,
            rate_limit_enabled: true,
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            request_timeout: config.timeouts.request,
            cache_enabled: config.cache.enabled,
            rate_limit_enabled: config.rate_limit.enabled,
        }
    }
}

/// Shared components the pipeline runs against
pub struct PipelineComponents {
    pub registry: Arc<EndpointRegistry>,
    pub cache: Arc<CacheStore>,
    pub rate_limiter: Arc<RateLimitState>,
    pub load_balancer: Arc<LoadBalancer>,
    pub metrics: Arc<GatewayMetrics>,
    pub security: Arc<SecurityFilter>,
    pub authenticator: Arc<Authenticator>,
}

pub struct RequestPipeline {
    components: PipelineComponents,
    settings: PipelineSettings,
}

impl RequestPipeline {
    pub fn new(components: PipelineComponents, settings: PipelineSettings) -> Self {
        Self {
            components,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run a request through every stage. Never fails: rejections and
    /// unexpected errors become error responses.
    pub async fn process(&self, request: Request) -> Response {
        let span = info_span!(
            "gateway_request",
            request_id = %request.id,
            method = %request.method,
            path = %request.path,
            ip = %request.client_ip,
            user_id = tracing::field::Empty,
            status = tracing::field::Empty,
            cache_hit = tracing::field::Empty,
        );

        async move {
            let timer = RequestTimer::start();

            let response = match AssertUnwindSafe(self.run(request)).catch_unwind().await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    log_rejection(&e);
                    e.into_response()
                }
                Err(panic) => {
                    error!(panic = %panic_message(panic.as_ref()), "Pipeline stage panicked");
                    GatewayError::internal("pipeline panic").into_response()
                }
            };

            // MetricsUpdate
            let success = response.status < 400;
            timer.finish(&self.components.metrics, success);
            Span::current().record("status", response.status);

            response
        }
        .instrument(span)
        .await
    }

    async fn run(&self, mut request: Request) -> GatewayResult<Response> {
        let c = &self.components;

        // SecurityCheck
        c.security.inspect(&request)?;

        // The rate-limit stage needs the endpoint's policy, so resolve it up front;
        // a missing route is still reported by RouteLookup below.
        let endpoint = c.registry.lookup(&request.path, &request.method);

        // RateLimit
        if self.settings.rate_limit_enabled {
            if let Some(policy) = endpoint.as_ref().and_then(|e| e.rate_limit) {
                let key = rate_limit_key(&request.client_ip, &request.path);
                let checked = c.rate_limiter.check(&key, policy.limit, policy.window());
                if let Err(retry_after) = checked {
                    c.metrics.record_rate_limit_violation();
                    return Err(GatewayError::RateLimitExceeded { retry_after });
                }
            }
        }

        // RouteLookup
        let endpoint = endpoint.ok_or_else(|| GatewayError::RouteNotFound {
            method: request.method.clone(),
            path: request.path.clone(),
        })?;

        // Authenticate. The session validator is an outbound call and shares
        // the request deadline with dispatch.
        if endpoint.auth_required {
            let user = tokio::time::timeout(
                self.settings.request_timeout,
                c.authenticator.authenticate(&request),
            )
            .await
            .map_err(|_| GatewayError::Timeout(self.settings.request_timeout))?
            .map_err(GatewayError::AuthenticationFailed)?;
            Span::current().record("user_id", user.id.as_str());
            request.user = Some(user);
        }

        // Authorize. Permissions without an authenticated user never pass.
        if !endpoint.permissions.is_empty() {
            let allowed = request
                .user
                .as_ref()
                .is_some_and(|user| authorize(user, &endpoint.permissions));
            if !allowed {
                return Err(GatewayError::AuthorizationDenied);
            }
        }

        // CacheLookup
        let cache_slot = match endpoint.cache {
            Some(policy) if self.settings.cache_enabled => {
                let key = cache_key(&request);
                if let Some(cached) = c.cache.get(&key) {
                    c.metrics.record_cache_hit();
                    Span::current().record("cache_hit", true);
                    return Ok(cached);
                }
                c.metrics.record_cache_miss();
                Some((key, policy))
            }
            _ => None,
        };

        // LoadBalanceSelect
        let guard = c.load_balancer.acquire();
        let target = guard.as_ref().map(ConnectionGuard::target);
        match &target {
            Some(target) => debug!(node = %target.id, "Upstream node selected"),
            None => debug!("No upstream node available"),
        }

        // Dispatch
        let handler = Arc::clone(&endpoint.handler);
        let outcome = tokio::time::timeout(
            self.settings.request_timeout,
            AssertUnwindSafe(handler.handle(request, target)).catch_unwind(),
        )
        .await;
        drop(guard);

        let response = match outcome {
            Ok(Ok(Ok(response))) => response,
            Ok(Ok(Err(e))) => return Err(GatewayError::internal(format!("handler error: {e}"))),
            Ok(Err(panic)) => {
                return Err(GatewayError::internal(format!(
                    "handler panicked: {}",
                    panic_message(panic.as_ref())
                )))
            }
            Err(_) => return Err(GatewayError::Timeout(self.settings.request_timeout)),
        };

        // CacheStore
        if let Some((key, policy)) = cache_slot {
            if response.is_success() {
                c.cache.set(key, response.clone(), policy.ttl_seconds);
            }
        }

        Ok(response)
    }
}

fn log_rejection(error: &GatewayError) {
    let stage = PipelineStage::for_error(error);
    if error.is_security_incident() {
        warn!(stage = %stage, "Security incident: request rejected");
        return;
    }
    match error {
        GatewayError::Internal(_) | GatewayError::Timeout(_) => {
            error!(stage = %stage, error = %error, "Request failed");
        }
        GatewayError::RateLimitExceeded { .. } => {
            warn!(stage = %stage, "Rate limit exceeded");
        }
        _ => {
            debug!(stage = %stage, error = %error, "Request rejected");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
