//! Upstream node pool: weighted selection, connection accounting and health checks.

pub mod health;
pub mod load_balancer;

pub use health::{HealthChecker, HealthSummary};
pub use load_balancer::{ConnectionGuard, LoadBalancer, NodeStatus, UpstreamNode};
