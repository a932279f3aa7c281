//! HTTP bridge: axum routers in front of the gateway.
//!
//! The gateway router is a catch-all that converts each HTTP exchange into a
//! gateway [`Request`] and back. The admin router exposes the read-only
//! dashboards and the cache/metrics reset operations.

use crate::domain::correlation::{RequestId, REQUEST_ID_HEADER};
use crate::domain::types::{Request, Response};
use crate::middleware::cors::create_cors_layer;
use crate::middleware::tracing::TracingLayer;
use crate::service::ApiGateway;
use axum::{
    body::Bytes,
    extract::{ConnectInfo, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tracing::{info, warn};

/// Catch-all router feeding every request through the pipeline
pub fn gateway_router(gateway: Arc<ApiGateway>) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(TracingLayer::new())
        .layer(create_cors_layer(&gateway.config().cors));

    Router::new()
        .fallback(proxy)
        .layer(middleware)
        .with_state(gateway)
}

/// Admin and dashboard router
pub fn admin_router(gateway: Arc<ApiGateway>) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/metrics/reset", post(reset_metrics))
        .route("/load-balancer", get(load_balancer))
        .route("/cache", get(cache_stats))
        .route("/cache/clear", post(clear_cache))
        .route("/routes", get(routes));

    #[cfg(feature = "metrics")]
    let router = router.route("/metrics/prometheus", get(prometheus));

    router.layer(TracingLayer::new()).with_state(gateway)
}

/// Bind the enabled surfaces and serve until `shutdown` changes
pub async fn serve(
    gateway: Arc<ApiGateway>,
    shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let config = gateway.config().clone();

    let http = async {
        if !config.http.enabled {
            return Ok(());
        }
        let addr = config.http_addr();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(addr = %addr, "Gateway HTTP server listening");
        axum::serve(
            listener,
            gateway_router(Arc::clone(&gateway))
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(wait_for_shutdown(shutdown.clone()))
        .await
    };

    let admin = async {
        if !config.http.admin_enabled {
            return Ok(());
        }
        let addr = config.admin_addr();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(addr = %addr, "Admin server listening");
        axum::serve(listener, admin_router(Arc::clone(&gateway)))
            .with_graceful_shutdown(wait_for_shutdown(shutdown.clone()))
            .await
    };

    tokio::try_join!(http, admin)?;
    info!("HTTP servers stopped");
    Ok(())
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    // Sender dropped also counts as shutdown
    let _ = shutdown.changed().await;
}

async fn proxy(
    State(gateway): State<Arc<ApiGateway>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    // Undecodable query strings still go through the pipeline, with no query
    query: Option<Query<BTreeMap<String, String>>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    let peer = connect_info.map(|ConnectInfo(addr)| addr);
    let query = query.map(|Query(q)| q).unwrap_or_default();
    let request = to_gateway_request(&method, &uri, &headers, query, &body, peer);
    let request_id = request.id;

    let response = gateway.handle(request).await;
    into_http_response(response, request_id)
}

/// Convert an HTTP exchange into a gateway request
pub fn to_gateway_request(
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    query: BTreeMap<String, String>,
    body: &[u8],
    peer: Option<SocketAddr>,
) -> Request {
    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let id = RequestId::from_header(header_str(REQUEST_ID_HEADER));

    let client_ip = header_str("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string());

    let mut request = Request::new(method.as_str(), uri.path())
        .with_id(id)
        .with_client_ip(client_ip)
        .with_user_agent(header_str("user-agent").unwrap_or_default())
        .with_body(parse_body(body));

    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            request = request.with_header(name.as_str(), value);
        }
    }
    for (key, value) in query {
        request = request.with_query(key, value);
    }

    request
}

/// JSON when it parses, otherwise the raw text; empty bodies are `null`
fn parse_body(body: &[u8]) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

/// Convert a gateway response into HTTP
pub fn into_http_response(
    mut response: Response,
    request_id: RequestId,
) -> axum::response::Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let extra_headers = response.headers.take();

    let mut http = (status, Json(response)).into_response();
    let http_headers = http.headers_mut();

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        http_headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    for (name, value) in extra_headers.into_iter().flatten() {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                http_headers.insert(name, value);
            }
            _ => warn!(header = %name, "Dropping invalid response header"),
        }
    }

    http
}

async fn health(State(gateway): State<Arc<ApiGateway>>) -> impl IntoResponse {
    let healthy_nodes = gateway.load_balancer().healthy_count();
    Json(json!({
        "status": "ok",
        "version": crate::VERSION,
        "healthy_nodes": healthy_nodes,
        "total_nodes": gateway.load_balancer().nodes().len(),
    }))
}

async fn metrics(State(gateway): State<Arc<ApiGateway>>) -> impl IntoResponse {
    Json(gateway.metrics().to_json())
}

#[cfg(feature = "metrics")]
async fn prometheus(State(gateway): State<Arc<ApiGateway>>) -> impl IntoResponse {
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        gateway.metrics().to_prometheus(),
    )
}

async fn reset_metrics(State(gateway): State<Arc<ApiGateway>>) -> impl IntoResponse {
    gateway.reset_metrics();
    StatusCode::NO_CONTENT
}

async fn load_balancer(State(gateway): State<Arc<ApiGateway>>) -> impl IntoResponse {
    Json(gateway.get_load_balancer_status())
}

async fn cache_stats(State(gateway): State<Arc<ApiGateway>>) -> impl IntoResponse {
    Json(gateway.get_cache_stats())
}

async fn clear_cache(State(gateway): State<Arc<ApiGateway>>) -> impl IntoResponse {
    gateway.clear_cache();
    StatusCode::NO_CONTENT
}

async fn routes(State(gateway): State<Arc<ApiGateway>>) -> impl IntoResponse {
    Json(gateway.registry().routes())
}
