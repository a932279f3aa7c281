//! Endpoint registry: `METHOD:path` → endpoint descriptor.
//!
//! Written at startup, read on every request. Guarded by a read-write lock so
//! late registration cannot race with in-flight lookups.

use crate::domain::endpoint::{route_key, Endpoint};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Default)]
pub struct EndpointRegistry {
    endpoints: RwLock<HashMap<String, Arc<Endpoint>>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an endpoint. Re-registering a key replaces the previous entry.
    pub fn register(&self, endpoint: Endpoint) {
        let key = endpoint.key();
        let previous = self.endpoints.write().insert(key.clone(), Arc::new(endpoint));
        if previous.is_some() {
            info!(route = %key, "Endpoint re-registered, replacing previous handler");
        } else {
            debug!(route = %key, "Endpoint registered");
        }
    }

    pub fn lookup(&self, path: &str, method: &str) -> Option<Arc<Endpoint>> {
        self.endpoints.read().get(&route_key(method, path)).cloned()
    }

    pub fn len(&self) -> usize {
        self.endpoints.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.read().is_empty()
    }

    /// Registered route keys, sorted
    pub fn routes(&self) -> Vec<String> {
        let mut routes: Vec<String> = self.endpoints.read().keys().cloned().collect();
        routes.sort();
        routes
    }
}
