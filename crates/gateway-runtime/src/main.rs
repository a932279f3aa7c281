//! # Gateway Runtime
//!
//! Boots a single gateway instance:
//!
//! 1. Initialize logging (`RUST_LOG`, JSON output when `GATEWAY_LOG_JSON` is set)
//! 2. Load [`GatewayConfig`] from `GATEWAY_CONFIG` and env overrides
//! 3. Register the built-in routes
//! 4. Start cache sweep, rate-limit cleanup and health checks
//! 5. Serve the HTTP and admin listeners until Ctrl-C

use std::future::Future;
use std::io;
use std::sync::Arc;

use anyhow::Context;
use enterprise_gateway::{
    adapters, handler_fn, ApiGateway, Endpoint, GatewayConfig, Request, Response, UpstreamTarget,
};
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const ENV_LOG_JSON: &str = "GATEWAY_LOG_JSON";

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("warn,enterprise_gateway=info,gateway_runtime=info,security=info")
    });
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var_os(ENV_LOG_JSON).is_some() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

/// Routes every instance serves regardless of what gets registered later
fn register_builtin_routes(gateway: &ApiGateway) {
    gateway.register(
        Endpoint::new(
            "GET",
            "/api/ping",
            handler_fn(|_request: Request, _upstream: Option<UpstreamTarget>| async {
                Ok(Response::ok("pong"))
            }),
        )
        .with_cache(60),
    );

    gateway.register(Endpoint::new(
        "GET",
        "/api/version",
        handler_fn(|_request: Request, _upstream: Option<UpstreamTarget>| async {
            Ok(Response::ok(json!({ "version": enterprise_gateway::VERSION })))
        }),
    ));
}

/// Wait for the shutdown signal, or for the server to stop first.
///
/// Returns `Ok(true)` on the signal and `Ok(false)` when the server ended
/// cleanly on its own (no listener enabled). A server that fails, for
/// instance on bind, surfaces its error right away.
async fn wait_for_exit<S>(
    server: &mut JoinHandle<io::Result<()>>,
    signal: S,
) -> anyhow::Result<bool>
where
    S: Future<Output = io::Result<()>>,
{
    tokio::select! {
        result = signal => {
            result.context("failed to listen for Ctrl-C")?;
            Ok(true)
        }
        joined = server => {
            joined
                .context("HTTP server task failed")?
                .context("HTTP server failed")?;
            Ok(false)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    info!(version = enterprise_gateway::VERSION, "Starting gateway runtime");

    let config = GatewayConfig::load().context("failed to load gateway configuration")?;
    let gateway = Arc::new(ApiGateway::new(config).context("failed to build gateway")?);
    register_builtin_routes(&gateway);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let background = gateway.start_background_tasks(shutdown_rx.clone());

    let mut server = tokio::spawn(adapters::http::serve(Arc::clone(&gateway), shutdown_rx));

    let outcome = wait_for_exit(&mut server, tokio::signal::ctrl_c()).await;

    // Receivers may already be gone if the server stopped on its own
    let _ = shutdown_tx.send(true);

    if let Ok(true) = outcome {
        info!("Shutdown signal received");
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "HTTP server exited with error"),
            Err(e) => error!(error = %e, "HTTP server task failed"),
        }
    }
    for handle in background {
        if let Err(e) = handle.await {
            error!(error = %e, "Background task failed");
        }
    }
    outcome?;

    let metrics = gateway.get_metrics();
    info!(
        total_requests = metrics.total_requests,
        error_rate = metrics.error_rate,
        "Gateway stopped"
    );
    Ok(())
}
