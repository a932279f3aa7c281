//! # Gateway Flows
//!
//! End-to-end scenarios through `ApiGateway::handle`:
//!
//! 1. **Caching**: repeated GETs are served without re-invoking the handler
//! 2. **Auth**: 401 without/with a bad token, 403 without the permission
//! 3. **Upstream**: no healthy node still reaches the handler; slots are
//!    always returned, whether the handler fails, panics or hangs
//! 4. **Security**: malicious input never reaches a handler or the cache
//! 5. **Rate limiting** and **concurrency**

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use enterprise_gateway::{Endpoint, GatewayConfig, Request};
    use serde_json::json;

    use crate::fixtures::{
        Behavior, Harness, ScriptedHandler, ADMIN_TOKEN, GUEST_TOKEN, READER_TOKEN,
    };

    // =============================================================================
    // CACHING
    // =============================================================================

    #[tokio::test]
    async fn test_ping_is_served_from_cache() {
        let h = Harness::new();
        let handler = ScriptedHandler::new(Behavior::Echo);
        h.gateway
            .register(Endpoint::new("GET", "/api/ping", handler.clone()).with_cache(60));

        let first = h.gateway.handle(Request::get("/api/ping")).await;
        let second = h.gateway.handle(Request::get("/api/ping")).await;

        assert_eq!(first.status, 200);
        assert_eq!(second, first);
        assert_eq!(handler.calls(), 1);

        let stats = h.gateway.get_cache_stats();
        assert_eq!(stats.size, 1);
        assert!(stats.hit_rate > 0.0);

        let metrics = h.gateway.get_metrics();
        assert_eq!(metrics.total_requests, 2);
        assert!((metrics.cache_hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_cache_expires_after_ttl() {
        let h = Harness::new();
        let handler = ScriptedHandler::new(Behavior::Echo);
        h.gateway
            .register(Endpoint::new("GET", "/api/ping", handler.clone()).with_cache(60));

        h.gateway.handle(Request::get("/api/ping")).await;
        h.clock.advance(Duration::from_secs(59));
        h.gateway.handle(Request::get("/api/ping")).await;
        assert_eq!(handler.calls(), 1);

        h.clock.advance(Duration::from_secs(1));
        h.gateway.handle(Request::get("/api/ping")).await;
        assert_eq!(handler.calls(), 2);
    }

    #[tokio::test]
    async fn test_cache_is_partitioned_by_query_and_user() {
        let h = Harness::new();
        let handler = ScriptedHandler::new(Behavior::Echo);
        h.gateway
            .register(Endpoint::new("GET", "/api/items", handler.clone()).with_cache(60));

        h.gateway
            .handle(Request::get("/api/items").with_query("page", "1"))
            .await;
        h.gateway
            .handle(Request::get("/api/items").with_query("page", "2"))
            .await;
        assert_eq!(handler.calls(), 2);

        h.gateway
            .handle(Request::get("/api/items").with_query("page", "1"))
            .await;
        assert_eq!(handler.calls(), 2);

        // Cache entries are per user once a route is authenticated
        let secure = ScriptedHandler::new(Behavior::Echo);
        h.gateway.register(
            Endpoint::new("GET", "/api/me", secure.clone())
                .require_auth()
                .with_cache(60),
        );
        let alice = h
            .gateway
            .handle(Request::get("/api/me").with_bearer_token(READER_TOKEN))
            .await;
        let guest = h
            .gateway
            .handle(Request::get("/api/me").with_bearer_token(GUEST_TOKEN))
            .await;
        assert_eq!(secure.calls(), 2);
        assert_eq!(alice.data.unwrap()["user"], "alice");
        assert_eq!(guest.data.unwrap()["user"], "guest");
    }

    #[tokio::test]
    async fn test_clear_cache_forces_refetch() {
        let h = Harness::new();
        let handler = ScriptedHandler::new(Behavior::Echo);
        h.gateway
            .register(Endpoint::new("GET", "/api/ping", handler.clone()).with_cache(60));

        h.gateway.handle(Request::get("/api/ping")).await;
        h.gateway.clear_cache();
        h.gateway.handle(Request::get("/api/ping")).await;

        assert_eq!(handler.calls(), 2);
    }

    // =============================================================================
    // ROUTING
    // =============================================================================

    #[test]
    fn test_unknown_route_is_404_and_counted() {
        let h = Harness::new();
        let response = tokio_test::block_on(h.gateway.handle(Request::get("/api/nowhere")));

        assert_eq!(response.status, 404);
        assert_eq!(response.error.as_deref(), Some("Endpoint not found"));
        assert_eq!(h.gateway.get_metrics().failed_requests, 1);
    }

    #[tokio::test]
    async fn test_reregistering_replaces_route() {
        let h = Harness::new();
        let old = ScriptedHandler::new(Behavior::Echo);
        let new = ScriptedHandler::new(Behavior::Echo);
        h.gateway.register(Endpoint::new("GET", "/api/v", old.clone()));
        h.gateway.register(Endpoint::new("get", "/api/v", new.clone()));

        h.gateway.handle(Request::get("/api/v")).await;
        assert_eq!((old.calls(), new.calls()), (0, 1));
        assert_eq!(h.gateway.registry().len(), 1);
    }

    // =============================================================================
    // AUTHENTICATION & AUTHORIZATION
    // =============================================================================

    #[tokio::test]
    async fn test_secure_endpoint_status_sequence() {
        let h = Harness::new();
        let handler = ScriptedHandler::new(Behavior::Echo);
        h.gateway.register(
            Endpoint::new("GET", "/api/secure", handler.clone()).with_permissions(["read:secure"]),
        );

        let missing = h.gateway.handle(Request::get("/api/secure")).await;
        assert_eq!(missing.status, 401);
        assert_eq!(
            missing.error.as_deref(),
            Some("Missing or invalid authorization header")
        );

        let invalid = h
            .gateway
            .handle(Request::get("/api/secure").with_bearer_token("forged"))
            .await;
        assert_eq!(invalid.status, 401);
        assert_eq!(invalid.error.as_deref(), Some("Invalid or expired token"));

        let forbidden = h
            .gateway
            .handle(Request::get("/api/secure").with_bearer_token(GUEST_TOKEN))
            .await;
        assert_eq!(forbidden.status, 403);
        assert_eq!(forbidden.error.as_deref(), Some("Insufficient permissions"));

        let ok = h
            .gateway
            .handle(Request::get("/api/secure").with_bearer_token(READER_TOKEN))
            .await;
        assert_eq!(ok.status, 200);
        assert_eq!(ok.data.unwrap()["user"], "alice");

        assert_eq!(handler.calls(), 1);
    }

    #[tokio::test]
    async fn test_admin_wildcard_grants_every_permission() {
        let h = Harness::new();
        let handler = ScriptedHandler::new(Behavior::Echo);
        h.gateway.register(
            Endpoint::new("POST", "/api/billing", handler.clone())
                .with_permissions(["billing:write", "billing:read"]),
        );

        let response = h
            .gateway
            .handle(Request::post("/api/billing").with_bearer_token(ADMIN_TOKEN))
            .await;
        assert_eq!(response.status, 200);
        assert_eq!(response.data.unwrap()["user"], "root");
    }

    #[tokio::test]
    async fn test_revoked_session_is_rejected() {
        let h = Harness::new();
        let handler = ScriptedHandler::new(Behavior::Echo);
        h.gateway
            .register(Endpoint::new("GET", "/api/me", handler.clone()).require_auth());

        let before = h
            .gateway
            .handle(Request::get("/api/me").with_bearer_token(READER_TOKEN))
            .await;
        assert_eq!(before.status, 200);

        assert!(h.sessions.revoke(READER_TOKEN));
        let after = h
            .gateway
            .handle(Request::get("/api/me").with_bearer_token(READER_TOKEN))
            .await;
        assert_eq!(after.status, 401);
    }

    // =============================================================================
    // UPSTREAM SELECTION
    // =============================================================================

    #[tokio::test]
    async fn test_handler_receives_a_healthy_upstream() {
        let h = Harness::new();
        let handler = ScriptedHandler::new(Behavior::RequireUpstream);
        h.gateway
            .register(Endpoint::new("GET", "/api/data", handler.clone()));

        h.gateway.load_balancer().set_healthy("node-a", false);
        for _ in 0..20 {
            let response = h.gateway.handle(Request::get("/api/data")).await;
            assert_eq!(response.status, 200);
            assert_eq!(response.data.unwrap()["upstream"], "node-b");
        }
    }

    #[tokio::test]
    async fn test_no_healthy_nodes_still_invokes_handler() {
        let h = Harness::new();
        let handler = ScriptedHandler::new(Behavior::RequireUpstream);
        h.gateway
            .register(Endpoint::new("GET", "/api/data", handler.clone()));

        for node in h.gateway.load_balancer().nodes() {
            node.set_healthy(false);
        }

        let response = h.gateway.handle(Request::get("/api/data")).await;
        assert_eq!(response.status, 503);
        assert_eq!(response.error.as_deref(), Some("No upstream available"));
        assert_eq!(handler.calls(), 1);
        assert_eq!(h.gateway.load_balancer().healthy_count(), 0);
    }

    #[tokio::test]
    async fn test_connections_released_after_error_panic_and_timeout() {
        let h = Harness::new();
        for (path, behavior) in [
            ("/api/fail", Behavior::Fail),
            ("/api/panic", Behavior::Panic),
            ("/api/hang", Behavior::Hang),
        ] {
            h.gateway
                .register(Endpoint::new("GET", path, ScriptedHandler::new(behavior)));
        }

        for path in ["/api/fail", "/api/panic", "/api/hang"] {
            let response = h.gateway.handle(Request::get(path)).await;
            assert_eq!(response.status, 500, "{path}");
            assert_eq!(response.error.as_deref(), Some("Internal server error"));
            assert_eq!(h.total_active_connections(), 0, "{path}");
        }

        let metrics = h.gateway.get_metrics();
        assert_eq!(metrics.failed_requests, 3);
        assert!((metrics.error_rate - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_saturated_pool_is_skipped() {
        let mut config = GatewayConfig::default();
        config.load_balancer.nodes = vec![
            enterprise_gateway::NodeConfig::new("tiny", "http://10.0.0.9", 1)
                .with_max_connections(1),
        ];
        let h = Harness::with_config(config);
        let handler = ScriptedHandler::new(Behavior::RequireUpstream);
        h.gateway
            .register(Endpoint::new("GET", "/api/data", handler.clone()));

        let held = h.gateway.load_balancer().acquire().unwrap();
        let response = h.gateway.handle(Request::get("/api/data")).await;
        assert_eq!(response.status, 503);

        drop(held);
        let response = h.gateway.handle(Request::get("/api/data")).await;
        assert_eq!(response.status, 200);
    }

    // =============================================================================
    // SECURITY
    // =============================================================================

    #[tokio::test]
    async fn test_malicious_request_never_reaches_handler_or_cache() {
        let h = Harness::new();
        let handler = ScriptedHandler::new(Behavior::Echo);
        h.gateway
            .register(Endpoint::new("POST", "/api/comments", handler.clone()).with_cache(60));

        let response = h
            .gateway
            .handle(
                Request::post("/api/comments")
                    .with_body(json!({"text": "<script>alert('x')</script>"})),
            )
            .await;

        assert_eq!(response.status, 500);
        assert_eq!(response.error.as_deref(), Some("Malicious request detected"));
        assert_eq!(handler.calls(), 0);
        assert_eq!(h.gateway.get_cache_stats().size, 0);
    }

    #[tokio::test]
    async fn test_sql_injection_in_path_is_blocked() {
        let h = Harness::new();
        let response = h
            .gateway
            .handle(Request::get("/api/users/1 UNION SELECT password"))
            .await;
        assert_eq!(response.status, 500);
    }

    #[tokio::test]
    async fn test_clean_body_passes_through() {
        let h = Harness::new();
        let handler = ScriptedHandler::new(Behavior::Echo);
        h.gateway
            .register(Endpoint::new("POST", "/api/comments", handler.clone()));

        let response = h
            .gateway
            .handle(Request::post("/api/comments").with_body(json!({"text": "hello"})))
            .await;
        assert_eq!(response.status, 200);
        assert_eq!(response.data.unwrap()["body"]["text"], "hello");
    }

    // =============================================================================
    // RATE LIMITING
    // =============================================================================

    #[tokio::test]
    async fn test_rate_limit_then_window_reset() {
        let h = Harness::new();
        let handler = ScriptedHandler::new(Behavior::Echo);
        h.gateway
            .register(Endpoint::new("GET", "/api/data", handler.clone()).with_rate_limit(3, 60));

        let req = || Request::get("/api/data").with_client_ip("192.0.2.7");
        for _ in 0..3 {
            assert_eq!(h.gateway.handle(req()).await.status, 200);
        }

        let limited = h.gateway.handle(req()).await;
        assert_eq!(limited.status, 429);
        assert_eq!(limited.error.as_deref(), Some("Rate limit exceeded"));
        let retry_after: u64 = limited.headers.as_ref().unwrap()["retry-after"]
            .parse()
            .unwrap();
        assert!((1..=60).contains(&retry_after));

        // Other clients are unaffected
        let other = h
            .gateway
            .handle(Request::get("/api/data").with_client_ip("192.0.2.8"))
            .await;
        assert_eq!(other.status, 200);

        h.clock.advance(Duration::from_secs(61));
        assert_eq!(h.gateway.handle(req()).await.status, 200);

        assert_eq!(handler.calls(), 5);
        assert_eq!(h.gateway.get_metrics().rate_limit_violations, 1);
    }

    // =============================================================================
    // CONCURRENCY
    // =============================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_are_all_accounted() {
        let h = Harness::new();
        let handler = ScriptedHandler::new(Behavior::Echo);
        h.gateway
            .register(Endpoint::new("GET", "/api/data", handler.clone()));

        let tasks: Vec<_> = (0..200)
            .map(|i| {
                let gateway = Arc::clone(&h.gateway);
                tokio::spawn(async move {
                    gateway
                        .handle(Request::get("/api/data").with_client_ip(format!("10.1.0.{i}")))
                        .await
                })
            })
            .collect();

        for response in futures::future::join_all(tasks).await {
            assert_eq!(response.unwrap().status, 200);
        }

        assert_eq!(handler.calls(), 200);
        assert_eq!(h.total_active_connections(), 0);

        let metrics = h.gateway.get_metrics();
        assert_eq!(metrics.total_requests, 200);
        assert_eq!(metrics.successful_requests, 200);
    }

    // =============================================================================
    // BACKGROUND TASKS
    // =============================================================================

    #[tokio::test]
    async fn test_health_checks_mark_nodes_down_and_stop_on_shutdown() {
        let mut config = GatewayConfig::default();
        config.load_balancer.health_check_interval = Duration::from_millis(20);
        config.load_balancer.health_check_timeout = Duration::from_millis(50);
        let gateway = Arc::new(
            enterprise_gateway::ApiGateway::builder(config)
                .health_probe(Arc::new(crate::fixtures::StaticProbe { healthy: false }))
                .build()
                .unwrap(),
        );

        let (tx, rx) = tokio::sync::watch::channel(false);
        let handles = gateway.start_background_tasks(rx);
        assert_eq!(handles.len(), 3);

        tokio::time::timeout(Duration::from_secs(2), async {
            while gateway.load_balancer().healthy_count() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("nodes should be marked unhealthy");

        tx.send(true).unwrap();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .expect("task should stop")
                .unwrap();
        }
    }
}
