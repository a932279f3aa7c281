//! # Enterprise Gateway Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs       # Shared harness: handlers, probes, sessions
//! └── integration/      # End-to-end flows
//!     ├── flows.rs      # Pipeline scenarios through ApiGateway::handle
//!     ├── http_e2e.rs   # Same scenarios over the axum bridge
//!     └── properties.rs # proptest invariants for limiter, metrics, balancer
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p gateway-tests
//!
//! # By category
//! cargo test -p gateway-tests integration::flows
//! cargo test -p gateway-tests integration::http_e2e
//!
//! # Benchmarks
//! cargo bench -p gateway-tests
//! ```

pub mod fixtures;
