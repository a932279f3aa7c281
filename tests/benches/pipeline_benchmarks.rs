//! # Gateway Pipeline Benchmarks
//!
//! | Path | What is measured |
//! |------|------------------|
//! | Cache hit | Security scan, lookup and cached response |
//! | Cache miss | Full pipeline including upstream selection and dispatch |
//! | Authenticated | Session validation and permission check |
//! | Upstream selection | Weighted pick over N healthy nodes |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use enterprise_gateway::{Endpoint, LoadBalancer, NodeConfig, Request};
use gateway_tests::fixtures::{Behavior, Harness, ScriptedHandler, READER_TOKEN};
use std::time::Duration;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn bench_pipeline(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("pipeline");
    group.measurement_time(Duration::from_secs(5));

    let h = Harness::new();
    h.gateway.register(
        Endpoint::new("GET", "/api/ping", ScriptedHandler::new(Behavior::Echo)).with_cache(3600),
    );
    h.gateway.register(Endpoint::new(
        "GET",
        "/api/data",
        ScriptedHandler::new(Behavior::Echo),
    ));
    h.gateway.register(
        Endpoint::new("GET", "/api/secure", ScriptedHandler::new(Behavior::Echo))
            .with_permissions(["read:secure"]),
    );

    rt.block_on(h.gateway.handle(Request::get("/api/ping")));

    group.bench_function("cache_hit", |b| {
        b.iter(|| rt.block_on(h.gateway.handle(black_box(Request::get("/api/ping")))))
    });

    group.bench_function("cache_miss", |b| {
        b.iter(|| rt.block_on(h.gateway.handle(black_box(Request::get("/api/data")))))
    });

    group.bench_function("authenticated", |b| {
        b.iter(|| {
            rt.block_on(h.gateway.handle(black_box(
                Request::get("/api/secure").with_bearer_token(READER_TOKEN),
            )))
        })
    });

    group.finish();
}

fn bench_upstream_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("upstream_selection");

    for size in [2usize, 8, 32] {
        let nodes = (0..size)
            .map(|i| {
                NodeConfig::new(format!("n{i}"), format!("http://10.0.0.{i}"), (i as u32 % 5) + 1)
            })
            .collect();
        let balancer = LoadBalancer::new(nodes);

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("acquire", size), &balancer, |b, lb| {
            b.iter(|| black_box(lb.acquire()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_pipeline, bench_upstream_selection);
criterion_main!(benches);
