//! Periodic health probing of upstream nodes.
//!
//! Every round probes all nodes concurrently, each under its own timeout, so a
//! dead node cannot hold back the others.

use super::load_balancer::{LoadBalancer, UpstreamNode};
use crate::domain::config::LoadBalancerConfig;
use crate::ports::{HealthProbe, ProbeError};
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Outcome of one probe round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthSummary {
    pub healthy: usize,
    pub unhealthy: usize,
}

#[derive(Clone)]
pub struct HealthChecker {
    balancer: Arc<LoadBalancer>,
    probe: Arc<dyn HealthProbe>,
    interval: Duration,
    timeout: Duration,
}

impl HealthChecker {
    pub fn new(
        balancer: Arc<LoadBalancer>,
        probe: Arc<dyn HealthProbe>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            balancer,
            probe,
            interval,
            timeout,
        }
    }

    pub fn from_config(
        balancer: Arc<LoadBalancer>,
        probe: Arc<dyn HealthProbe>,
        config: &LoadBalancerConfig,
    ) -> Self {
        Self::new(
            balancer,
            probe,
            config.health_check_interval,
            config.health_check_timeout,
        )
    }

    /// Probe every node once, concurrently
    pub async fn check_all(&self) -> HealthSummary {
        let checks = self
            .balancer
            .nodes()
            .iter()
            .map(|node| self.check_node(node));
        let results = join_all(checks).await;

        let healthy = results.iter().filter(|ok| **ok).count();
        let summary = HealthSummary {
            healthy,
            unhealthy: results.len() - healthy,
        };
        debug!(
            healthy = summary.healthy,
            unhealthy = summary.unhealthy,
            "Health check round completed"
        );
        summary
    }

    async fn check_node(&self, node: &UpstreamNode) -> bool {
        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.timeout, self.probe.probe(&node.url)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout),
        };

        match outcome {
            Ok(()) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                if !node.is_healthy() {
                    info!(node = %node.id, "Upstream node recovered");
                }
                node.record_probe_success(elapsed_ms);
                true
            }
            Err(e) => {
                if node.is_healthy() {
                    warn!(
                        node = %node.id,
                        url = %node.url,
                        error = %e,
                        "Upstream node marked unhealthy"
                    );
                } else {
                    debug!(node = %node.id, error = %e, "Upstream node still unhealthy");
                }
                node.record_probe_failure();
                false
            }
        }
    }

    /// Run probe rounds every `interval` until shutdown is signalled
    pub fn start_with_shutdown(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let checker = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(checker.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // Nodes start healthy; first round runs one interval after startup
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        checker.check_all().await;
                    }
                    _ = shutdown.changed() => {
                        info!("Health checker shutting down");
                        break;
                    }
                }
            }
        })
    }
}
