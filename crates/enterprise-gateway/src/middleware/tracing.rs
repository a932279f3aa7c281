//! Tower layer wrapping each inbound HTTP exchange in an `http_request` span.
//!
//! The span carries method, target and the caller's `x-request-id`, adopts
//! the trace id of a W3C `traceparent` header, and records status and
//! latency once the inner service answers. The gateway pipeline opens its
//! own `gateway_request` span inside it.

use crate::domain::correlation::REQUEST_ID_HEADER;
use axum::http::{HeaderMap, Request, Response};
use futures::future::BoxFuture;
use std::str::FromStr;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::field::Empty;
use tracing::{info_span, Instrument, Span};

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLayer;

impl TracingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for TracingLayer {
    type Service = HttpSpan<S>;

    fn layer(&self, inner: S) -> Self::Service {
        HttpSpan { inner }
    }
}

/// Service produced by [`TracingLayer`]
#[derive(Debug, Clone)]
pub struct HttpSpan<S> {
    inner: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for HttpSpan<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // The clone is fresh; the instance polled ready is the one we call
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let span = request_span(&req);
        let started = Instant::now();
        let fut = inner.call(req);

        Box::pin(
            async move {
                let result = fut.await;
                let span = Span::current();
                span.record("latency_ms", started.elapsed().as_millis() as u64);
                match &result {
                    Ok(response) => span.record("http.status_code", response.status().as_u16()),
                    Err(_) => span.record("http.status_code", 500u16),
                };
                result
            }
            .instrument(span),
        )
    }
}

fn request_span<B>(req: &Request<B>) -> Span {
    let span = info_span!(
        "http_request",
        http.method = %req.method(),
        http.target = %req.uri().path(),
        request_id = Empty,
        trace_id = Empty,
        http.status_code = Empty,
        latency_ms = Empty,
    );

    if let Some(id) = header(req.headers(), REQUEST_ID_HEADER) {
        span.record("request_id", id);
    }
    if let Some(parent) = parse_traceparent(req) {
        span.record("trace_id", parent.trace_id.as_str());
    }
    span
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Caller's W3C trace context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceParent {
    pub trace_id: String,
    pub parent_id: String,
    pub sampled: bool,
}

impl FromStr for TraceParent {
    type Err = ();

    /// `version-trace_id-parent_id-flags`, lower-case hex, all-zero ids invalid
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('-');
        let (Some(version), Some(trace_id), Some(parent_id), Some(flags), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(());
        };

        let is_hex = |v: &str, len: usize| {
            v.len() == len && v.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        };
        let all_zero = |v: &str| v.bytes().all(|b| b == b'0');

        if !is_hex(version, 2) || version == "ff" || !is_hex(flags, 2) {
            return Err(());
        }
        if !is_hex(trace_id, 32) || all_zero(trace_id) {
            return Err(());
        }
        if !is_hex(parent_id, 16) || all_zero(parent_id) {
            return Err(());
        }

        let flags = u8::from_str_radix(flags, 16).map_err(|_| ())?;
        Ok(TraceParent {
            trace_id: trace_id.to_string(),
            parent_id: parent_id.to_string(),
            sampled: flags & 0x01 == 0x01,
        })
    }
}

/// Read and validate the `traceparent` header
pub fn parse_traceparent<B>(req: &Request<B>) -> Option<TraceParent> {
    header(req.headers(), "traceparent")?.parse().ok()
}
