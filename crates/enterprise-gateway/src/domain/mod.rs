//! Domain types for the API Gateway.
//!
//! This module contains the request/response records, endpoint descriptors,
//! configuration, and error handling. Nothing here performs I/O.

pub mod config;
pub mod correlation;
pub mod endpoint;
pub mod error;
pub mod types;

// Re-exports for convenience
pub use config::{ConfigError, GatewayConfig, NodeConfig};
pub use correlation::RequestId;
pub use endpoint::{
    handler_fn, route_key, CachePolicy, Endpoint, Handler, RateLimitPolicy, UpstreamTarget,
};
pub use error::{AuthFailure, GatewayError, GatewayResult, HandlerError};
pub use types::*;
