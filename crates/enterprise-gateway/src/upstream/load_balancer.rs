//! Weighted random load balancing over a fixed node pool.
//!
//! Per-node state is atomic so selection reads never block dispatch. A node's
//! connection slot is held by a [`ConnectionGuard`] and released on drop,
//! which covers handler errors, panics and timeouts alike.

use crate::domain::config::{LoadBalancerConfig, NodeConfig};
use crate::domain::endpoint::UpstreamTarget;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// One backend node and its live state
#[derive(Debug)]
pub struct UpstreamNode {
    pub id: String,
    pub url: String,
    pub weight: u32,
    pub max_connections: u32,
    healthy: AtomicBool,
    active_connections: AtomicU32,
    last_response_time_ms: AtomicU64,
    last_health_check_at: RwLock<Option<DateTime<Utc>>>,
}

impl UpstreamNode {
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            id: config.id.clone(),
            url: config.url.clone(),
            weight: config.weight,
            max_connections: config.max_connections,
            healthy: AtomicBool::new(true),
            active_connections: AtomicU32::new(0),
            last_response_time_ms: AtomicU64::new(0),
            last_health_check_at: RwLock::new(None),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    pub fn active_connections(&self) -> u32 {
        self.active_connections.load(Ordering::Acquire)
    }

    pub fn last_response_time_ms(&self) -> u64 {
        self.last_response_time_ms.load(Ordering::Relaxed)
    }

    pub fn last_health_check_at(&self) -> Option<DateTime<Utc>> {
        *self.last_health_check_at.read()
    }

    /// Healthy and below its connection cap
    pub fn is_available(&self) -> bool {
        self.is_healthy() && self.active_connections() < self.max_connections
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Release);
    }

    /// Successful probe: mark healthy and record its latency
    pub fn record_probe_success(&self, response_time_ms: u64) {
        self.set_healthy(true);
        self.last_response_time_ms
            .store(response_time_ms, Ordering::Relaxed);
        *self.last_health_check_at.write() = Some(Utc::now());
    }

    /// Failed or timed-out probe
    pub fn record_probe_failure(&self) {
        self.set_healthy(false);
        *self.last_health_check_at.write() = Some(Utc::now());
    }

    /// Claim a connection slot unless the node is at capacity
    pub fn try_acquire(self: &Arc<Self>) -> Option<ConnectionGuard> {
        let max = self.max_connections;
        self.active_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < max).then_some(current + 1)
            })
            .ok()
            .map(|_| ConnectionGuard {
                node: Arc::clone(self),
            })
    }

    pub fn target(&self) -> UpstreamTarget {
        UpstreamTarget {
            id: self.id.clone(),
            url: self.url.clone(),
        }
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            id: self.id.clone(),
            url: self.url.clone(),
            weight: self.weight,
            healthy: self.is_healthy(),
            active_connections: self.active_connections(),
            max_connections: self.max_connections,
            last_response_time_ms: self.last_response_time_ms(),
            last_health_check_at: self.last_health_check_at(),
        }
    }
}

/// Holds one connection slot on a node until dropped
#[derive(Debug)]
pub struct ConnectionGuard {
    node: Arc<UpstreamNode>,
}

impl ConnectionGuard {
    pub fn node(&self) -> &Arc<UpstreamNode> {
        &self.node
    }

    pub fn target(&self) -> UpstreamTarget {
        self.node.target()
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        // Saturating: the count never goes below zero
        let _ = self
            .node
            .active_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(1))
            });
    }
}

/// Read-only node view for dashboards
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeStatus {
    pub id: String,
    pub url: String,
    pub weight: u32,
    pub healthy: bool,
    pub active_connections: u32,
    pub max_connections: u32,
    pub last_response_time_ms: u64,
    pub last_health_check_at: Option<DateTime<Utc>>,
}

pub struct LoadBalancer {
    nodes: Vec<Arc<UpstreamNode>>,
}

impl LoadBalancer {
    pub fn new(nodes: Vec<NodeConfig>) -> Self {
        let nodes: Vec<_> = nodes
            .iter()
            .map(|config| Arc::new(UpstreamNode::new(config)))
            .collect();
        info!(nodes = nodes.len(), "Load balancer initialized");
        Self { nodes }
    }

    pub fn from_config(config: &LoadBalancerConfig) -> Self {
        Self::new(config.nodes.clone())
    }

    pub fn nodes(&self) -> &[Arc<UpstreamNode>] {
        &self.nodes
    }

    pub fn node(&self, id: &str) -> Option<&Arc<UpstreamNode>> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Pick a node by weight among available ones. `None` if no node is available.
    pub fn select_node(&self) -> Option<Arc<UpstreamNode>> {
        self.select_with_rng(&mut rand::thread_rng())
    }

    /// Weighted selection with a caller-supplied random source
    pub fn select_with_rng<R: Rng>(&self, rng: &mut R) -> Option<Arc<UpstreamNode>> {
        let candidates: Vec<Arc<UpstreamNode>> = self
            .nodes
            .iter()
            .filter(|n| n.is_available())
            .cloned()
            .collect();

        let first = candidates.first()?;
        let total_weight: f64 = candidates.iter().map(|n| f64::from(n.weight)).sum();
        if total_weight <= 0.0 {
            return Some(Arc::clone(first));
        }

        let mut remaining = rng.gen_range(0.0..total_weight);
        for node in &candidates {
            remaining -= f64::from(node.weight);
            if remaining <= 0.0 {
                trace!(node = %node.id, "Selected upstream node");
                return Some(Arc::clone(node));
            }
        }

        // Float drift left a sliver past the last node
        Some(Arc::clone(first))
    }

    /// Select a node and claim a connection slot on it.
    ///
    /// A selected node may fill up before the slot is claimed; selection is
    /// retried a bounded number of times.
    pub fn acquire(&self) -> Option<ConnectionGuard> {
        for _ in 0..self.nodes.len().max(1) {
            let node = self.select_node()?;
            if let Some(guard) = node.try_acquire() {
                return Some(guard);
            }
            debug!(node = %node.id, "Node filled up during selection, retrying");
        }
        None
    }

    /// Administrative health override
    pub fn set_healthy(&self, id: &str, healthy: bool) -> bool {
        match self.node(id) {
            Some(node) => {
                node.set_healthy(healthy);
                true
            }
            None => false,
        }
    }

    pub fn status(&self) -> Vec<NodeStatus> {
        self.nodes.iter().map(|n| n.status()).collect()
    }

    pub fn healthy_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_healthy()).count()
    }
}
