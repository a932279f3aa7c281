//! Pipeline stage components and HTTP layers.
//!
//! Stage components (`security`, `rate_limit`, `auth`, `cache`, `metrics`) are
//! transport-agnostic and driven by [`crate::pipeline::RequestPipeline`].
//! `cors` and `tracing` are tower layers used by the HTTP bridge only.

pub mod auth;
pub mod cache;
pub mod cors;
pub mod metrics;
pub mod rate_limit;
pub mod security;
pub mod tracing;

pub use auth::{authorize, bearer_token, Authenticator};
pub use cache::{cache_key, CacheEntry, CacheStats, CacheStore};
pub use cors::create_cors_layer;
pub use metrics::{GatewayMetrics, MetricsSnapshot, RequestTimer};
pub use rate_limit::{rate_limit_key, RateLimitState};
pub use security::SecurityFilter;
pub use self::tracing::TracingLayer;
