//! Test harness shared by the integration flows and the benchmarks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use enterprise_gateway::adapters::InMemorySessionValidator;
use enterprise_gateway::ports::{HealthProbe, ManualClock, ProbeError};
use enterprise_gateway::{
    ApiGateway, GatewayConfig, Handler, HandlerError, NodeConfig, Request, Response, Session,
    UpstreamTarget,
};
use serde_json::json;

/// Token with `read:secure`
pub const READER_TOKEN: &str = "token-reader";
/// Token with no permissions
pub const GUEST_TOKEN: &str = "token-guest";
/// Token with `admin:all`
pub const ADMIN_TOKEN: &str = "token-admin";

/// Probe that never touches the network
pub struct StaticProbe {
    pub healthy: bool,
}

#[async_trait]
impl HealthProbe for StaticProbe {
    async fn probe(&self, _base_url: &str) -> Result<(), ProbeError> {
        if self.healthy {
            Ok(())
        } else {
            Err(ProbeError::Unreachable("connection refused".into()))
        }
    }
}

/// What a [`ScriptedHandler`] does when invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// 200 echoing user and upstream
    Echo,
    /// `HandlerError`
    Fail,
    Panic,
    /// Sleep well past any sane request timeout
    Hang,
    /// 503 when no upstream was assigned, otherwise `Echo`
    RequireUpstream,
}

/// Handler counting its invocations
pub struct ScriptedHandler {
    behavior: Behavior,
    calls: AtomicUsize,
}

impl ScriptedHandler {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Handler for ScriptedHandler {
    async fn handle(
        &self,
        request: Request,
        upstream: Option<UpstreamTarget>,
    ) -> Result<Response, HandlerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.behavior {
            Behavior::Fail => Err(HandlerError::new("backend exploded")),
            Behavior::Panic => panic!("handler bug"),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(Response::ok("too late"))
            }
            Behavior::RequireUpstream if upstream.is_none() => {
                Ok(Response::error(503, "No upstream available"))
            }
            Behavior::Echo | Behavior::RequireUpstream => Ok(Response::ok(json!({
                "call": call,
                "path": request.path,
                "user": request.user_id(),
                "upstream": upstream.map(|u| u.id),
                "body": request.body,
            }))),
        }
    }
}

/// Gateway wired with deterministic collaborators
pub struct Harness {
    pub gateway: Arc<ApiGateway>,
    pub clock: Arc<ManualClock>,
    pub sessions: Arc<InMemorySessionValidator>,
}

impl Harness {
    /// Two nodes, short request timeout, background tasks not started
    pub fn new() -> Self {
        let mut config = GatewayConfig::default();
        config.load_balancer.nodes = vec![
            NodeConfig::new("node-a", "http://10.0.0.1:8080", 3),
            NodeConfig::new("node-b", "http://10.0.0.2:8080", 1),
        ];
        config.timeouts.request = Duration::from_millis(200);
        Self::with_config(config)
    }

    pub fn with_config(config: GatewayConfig) -> Self {
        let clock = Arc::new(ManualClock::new());
        let sessions = Arc::new(
            InMemorySessionValidator::new()
                .with_session(READER_TOKEN, Session::new("alice", ["read:secure"]))
                .with_session(GUEST_TOKEN, Session::new("guest", Vec::<String>::new()))
                .with_session(ADMIN_TOKEN, Session::new("root", ["admin:all"])),
        );

        let gateway = ApiGateway::builder(config)
            .clock(clock.clone())
            .session_validator(sessions.clone())
            .health_probe(Arc::new(StaticProbe { healthy: true }))
            .build()
            .expect("harness config is valid");

        Self {
            gateway: Arc::new(gateway),
            clock,
            sessions,
        }
    }

    pub fn total_active_connections(&self) -> u32 {
        self.gateway
            .load_balancer()
            .nodes()
            .iter()
            .map(|n| n.active_connections())
            .sum()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
