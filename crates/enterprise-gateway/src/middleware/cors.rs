//! CORS for the HTTP bridge, built on tower-http.

use crate::domain::config::CorsConfig;
use axum::http::{HeaderName, HeaderValue, Method};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

fn is_wildcard(values: &[String]) -> bool {
    values.iter().any(|v| v == "*")
}

/// Create CORS layer from gateway config.
///
/// Disabled CORS yields a layer that adds no headers, so browsers fall back
/// to same-origin rules.
pub fn create_cors_layer(config: &CorsConfig) -> CorsLayer {
    if !config.enabled {
        return CorsLayer::new();
    }

    let mut cors = CorsLayer::new().max_age(Duration::from_secs(config.max_age));

    cors = if is_wildcard(&config.allowed_origins) {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    };

    let methods: Vec<Method> = config
        .allowed_methods
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect();
    cors = cors.allow_methods(methods);

    cors = if is_wildcard(&config.allowed_headers) {
        cors.allow_headers(Any)
    } else {
        let headers: Vec<HeaderName> = config
            .allowed_headers
            .iter()
            .filter_map(|h| h.parse().ok())
            .collect();
        cors.allow_headers(headers)
    };

    // Clients read the correlation id and rate-limit hints
    cors.expose_headers([
        HeaderName::from_static("x-request-id"),
        HeaderName::from_static("retry-after"),
    ])
}
