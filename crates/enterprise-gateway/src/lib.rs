//! Enterprise API Gateway - single entry point in front of backend handlers.
//!
//! Every request runs through a fixed pipeline: security filtering,
//! per-client rate limiting, route lookup, bearer-token authentication,
//! permission checks, response caching and weighted load balancing, with
//! metrics recorded on the way out.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        ENTERPRISE GATEWAY                         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐                         ┌──────────────┐       │
//! │  │ HTTP bridge  │                         │    Admin     │       │
//! │  │  Port 8080   │                         │  Port 8081   │       │
//! │  └──────┬───────┘                         └──────┬───────┘       │
//! │         │                                        │               │
//! │  ┌──────┴────────────────────────────────────────┴───────┐       │
//! │  │                     ApiGateway                         │       │
//! │  │  Security → RateLimit → Route → Auth → Authz → Cache   │       │
//! │  │        → LoadBalance → Dispatch → Cache → Metrics      │       │
//! │  └──────┬───────────────────┬───────────────────┬─────────┘       │
//! │         │                   │                   │                 │
//! │  SessionValidator    SecurityLogger       HealthProbe             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use enterprise_gateway::{handler_fn, ApiGateway, Endpoint, GatewayConfig, Request, Response};
//!
//! let gateway = ApiGateway::new(GatewayConfig::default())?;
//! gateway.register(
//!     Endpoint::new("GET", "/api/ping", handler_fn(|_req, _up| async {
//!         Ok(Response::ok("pong"))
//!     }))
//!     .with_cache(60),
//! );
//! let response = gateway.handle(Request::get("/api/ping")).await;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod middleware;
pub mod pipeline;
pub mod ports;
pub mod registry;
pub mod service;
pub mod upstream;

// Re-exports for public API
pub use domain::config::{ConfigError, GatewayConfig, NodeConfig};
pub use domain::correlation::RequestId;
pub use domain::endpoint::{
    handler_fn, CachePolicy, Endpoint, Handler, RateLimitPolicy, UpstreamTarget,
};
pub use domain::error::{AuthFailure, GatewayError, GatewayResult, HandlerError};
pub use domain::types::*;
pub use middleware::{CacheStats, GatewayMetrics, MetricsSnapshot};
pub use pipeline::{PipelineStage, RequestPipeline};
pub use service::{ApiGateway, ApiGatewayBuilder};
pub use upstream::{LoadBalancer, NodeStatus};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
