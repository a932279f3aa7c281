//! Adapters for the API Gateway.
//!
//! Default implementations of the outbound ports and the axum HTTP bridge.

pub mod collaborators;
pub mod http;

pub use collaborators::{HttpHealthProbe, InMemorySessionValidator, TracingSecurityLogger};
pub use http::{admin_router, gateway_router, serve};
