//! API Gateway service: component wiring, registration and read APIs.
//!
//! One `ApiGateway` is built per process and shared as `Arc<ApiGateway>`.
//! Transport adapters call [`ApiGateway::handle`]; dashboards use the
//! snapshot getters.

use crate::adapters::collaborators::{
    HttpHealthProbe, InMemorySessionValidator, TracingSecurityLogger,
};
use crate::domain::config::{ConfigError, GatewayConfig};
use crate::domain::endpoint::{CachePolicy, Endpoint, Handler, RateLimitPolicy};
use crate::domain::types::{Request, Response};
use crate::middleware::auth::Authenticator;
use crate::middleware::cache::{self, CacheStats, CacheStore};
use crate::middleware::metrics::{GatewayMetrics, MetricsSnapshot};
use crate::middleware::rate_limit::{self, RateLimitState};
use crate::middleware::security::SecurityFilter;
use crate::pipeline::{PipelineComponents, PipelineSettings, RequestPipeline};
use crate::ports::{Clock, HealthProbe, SecurityLogger, SessionValidator, SystemClock};
use crate::registry::EndpointRegistry;
use crate::upstream::{HealthChecker, LoadBalancer, NodeStatus};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// Builder for [`ApiGateway`]. Unset collaborators fall back to the defaults
/// in `adapters::collaborators`.
pub struct ApiGatewayBuilder {
    config: GatewayConfig,
    session_validator: Option<Arc<dyn SessionValidator>>,
    security_logger: Option<Arc<dyn SecurityLogger>>,
    health_probe: Option<Arc<dyn HealthProbe>>,
    clock: Option<Arc<dyn Clock>>,
}

impl ApiGatewayBuilder {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            session_validator: None,
            security_logger: None,
            health_probe: None,
            clock: None,
        }
    }

    pub fn session_validator(mut self, validator: Arc<dyn SessionValidator>) -> Self {
        self.session_validator = Some(validator);
        self
    }

    pub fn security_logger(mut self, logger: Arc<dyn SecurityLogger>) -> Self {
        self.security_logger = Some(logger);
        self
    }

    pub fn health_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.health_probe = Some(probe);
        self
    }

    /// Time source for rate-limit windows and cache TTLs
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<ApiGateway, ConfigError> {
        let config = self.config;
        config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let session_validator = self
            .session_validator
            .unwrap_or_else(|| Arc::new(InMemorySessionValidator::new()));
        let security_logger = self
            .security_logger
            .unwrap_or_else(|| Arc::new(TracingSecurityLogger));
        let health_probe = match self.health_probe {
            Some(probe) => probe,
            None => Arc::new(
                HttpHealthProbe::new(config.load_balancer.health_check_timeout)
                    .map_err(|e| ConfigError::Invalid(format!("health probe client: {e}")))?,
            ),
        };

        let registry = Arc::new(EndpointRegistry::new());
        let cache = Arc::new(CacheStore::new(Arc::clone(&clock)));
        let rate_limiter = Arc::new(RateLimitState::new(Arc::clone(&clock)));
        let load_balancer = Arc::new(LoadBalancer::from_config(&config.load_balancer));
        let metrics = Arc::new(GatewayMetrics::new(config.metrics.latency_window));
        let security = Arc::new(SecurityFilter::new(security_logger, &config.security)?);
        let authenticator = Arc::new(Authenticator::new(session_validator));

        let health_checker = HealthChecker::from_config(
            Arc::clone(&load_balancer),
            health_probe,
            &config.load_balancer,
        );

        let pipeline = RequestPipeline::new(
            PipelineComponents {
                registry: Arc::clone(&registry),
                cache: Arc::clone(&cache),
                rate_limiter: Arc::clone(&rate_limiter),
                load_balancer: Arc::clone(&load_balancer),
                metrics: Arc::clone(&metrics),
                security,
                authenticator,
            },
            PipelineSettings::from_config(&config),
        );

        info!(
            nodes = config.load_balancer.nodes.len(),
            request_timeout = ?config.timeouts.request,
            cache_enabled = config.cache.enabled,
            rate_limit_enabled = config.rate_limit.enabled,
            "API Gateway initialized"
        );

        Ok(ApiGateway {
            config,
            registry,
            cache,
            rate_limiter,
            load_balancer,
            metrics,
            health_checker,
            pipeline,
        })
    }
}

/// API Gateway service state
pub struct ApiGateway {
    config: GatewayConfig,
    registry: Arc<EndpointRegistry>,
    cache: Arc<CacheStore>,
    rate_limiter: Arc<RateLimitState>,
    load_balancer: Arc<LoadBalancer>,
    metrics: Arc<GatewayMetrics>,
    health_checker: HealthChecker,
    pipeline: RequestPipeline,
}

impl ApiGateway {
    /// Gateway with default collaborators
    pub fn new(config: GatewayConfig) -> Result<Self, ConfigError> {
        Self::builder(config).build()
    }

    pub fn builder(config: GatewayConfig) -> ApiGatewayBuilder {
        ApiGatewayBuilder::new(config)
    }

    /// Register an endpoint. Re-registering `METHOD:path` replaces the old one.
    pub fn register(&self, endpoint: Endpoint) {
        self.registry.register(endpoint);
    }

    /// Register from individual route attributes
    #[allow(clippy::too_many_arguments)]
    pub fn register_route<I, S>(
        &self,
        path: &str,
        method: &str,
        handler: Arc<dyn Handler>,
        auth_required: bool,
        permissions: I,
        rate_limit: Option<RateLimitPolicy>,
        cache: Option<CachePolicy>,
    ) where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        // Taken as given; only the `with_permissions` builder implies auth
        let mut endpoint = Endpoint::new(method, path, handler);
        endpoint.auth_required = auth_required;
        endpoint.permissions = permissions.into_iter().map(Into::into).collect();
        endpoint.rate_limit = rate_limit;
        endpoint.cache = cache;
        self.register(endpoint);
    }

    /// Run one request through the pipeline
    pub async fn handle(&self, request: Request) -> Response {
        self.pipeline.process(request).await
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn get_load_balancer_status(&self) -> Vec<NodeStatus> {
        self.load_balancer.status()
    }

    pub fn get_cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        let dropped = self.cache.len();
        self.cache.clear();
        info!(dropped, "Response cache cleared");
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
        info!("Gateway metrics reset");
    }

    /// Spawn the cache sweeper, rate-limit cleanup and health checker.
    ///
    /// Each task exits once `shutdown` observes a change.
    pub fn start_background_tasks(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(3);

        if self.config.cache.enabled {
            handles.push(tokio::spawn(cache::sweep_task(
                Arc::clone(&self.cache),
                self.config.cache.sweep_interval,
                shutdown.clone(),
            )));
        }

        if self.config.rate_limit.enabled {
            handles.push(tokio::spawn(rate_limit::cleanup_task(
                Arc::clone(&self.rate_limiter),
                self.config.rate_limit.cleanup_interval,
                shutdown.clone(),
            )));
        }

        if self.config.load_balancer.health_check_enabled {
            handles.push(self.health_checker.start_with_shutdown(shutdown));
        }

        info!(tasks = handles.len(), "Background tasks started");
        handles
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<EndpointRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimitState> {
        &self.rate_limiter
    }

    pub fn load_balancer(&self) -> &Arc<LoadBalancer> {
        &self.load_balancer
    }

    pub fn metrics(&self) -> &Arc<GatewayMetrics> {
        &self.metrics
    }

    pub fn health_checker(&self) -> &HealthChecker {
        &self.health_checker
    }
}
