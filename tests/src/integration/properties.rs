//! Property checks over the stateful components.

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    use enterprise_gateway::middleware::cache::build_cache_key;
    use enterprise_gateway::middleware::{GatewayMetrics, RateLimitState};
    use enterprise_gateway::ports::ManualClock;
    use enterprise_gateway::{LoadBalancer, NodeConfig};
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_rate_limit_admits_at_most_limit(limit in 0u32..50, attempts in 0usize..120) {
            let limiter = RateLimitState::new(Arc::new(ManualClock::new()));
            let admitted = (0..attempts)
                .filter(|_| limiter.allow("10.0.0.1:/api", limit, Duration::from_secs(60)))
                .count();
            prop_assert_eq!(admitted, attempts.min(limit as usize));
        }

        #[test]
        fn prop_metrics_counts_are_consistent(
            outcomes in prop::collection::vec((any::<bool>(), 0u64..5_000), 0..200)
        ) {
            let metrics = GatewayMetrics::new(50);
            for (success, latency) in &outcomes {
                metrics.record_request(*success, *latency);
            }
            let snapshot = metrics.snapshot();
            prop_assert_eq!(snapshot.total_requests, outcomes.len() as u64);
            prop_assert_eq!(
                snapshot.successful_requests + snapshot.failed_requests,
                snapshot.total_requests
            );
            prop_assert!((0.0..=1.0).contains(&snapshot.error_rate));
            prop_assert!(metrics.latency_samples() <= 50);
        }

        #[test]
        fn prop_selection_only_returns_healthy_nodes(
            mask in prop::collection::vec(any::<bool>(), 1..8)
        ) {
            let nodes = (0..mask.len())
                .map(|i| {
                    let weight = (i as u32 % 3) + 1;
                    NodeConfig::new(format!("n{i}"), format!("http://10.0.0.{i}"), weight)
                })
                .collect();
            let balancer = LoadBalancer::new(nodes);
            for (i, healthy) in mask.iter().enumerate() {
                balancer.set_healthy(&format!("n{i}"), *healthy);
            }

            match balancer.select_node() {
                Some(node) => prop_assert!(node.is_healthy()),
                None => prop_assert!(mask.iter().all(|h| !h)),
            }
        }

        #[test]
        fn prop_cache_key_separates_users(a in "[a-z]{1,8}", b in "[a-z]{1,8}") {
            prop_assume!(a != b);
            let query = BTreeMap::new();
            prop_assert_ne!(
                build_cache_key("GET", "/api/me", &query, Some(&a)),
                build_cache_key("GET", "/api/me", &query, Some(&b))
            );
            prop_assert_ne!(
                build_cache_key("GET", "/api/me", &query, Some(&a)),
                build_cache_key("GET", "/api/me", &query, None)
            );
        }
    }
}
