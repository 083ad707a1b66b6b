use std::time::Duration;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use warmview::network::cache::cache_key;
use warmview::network::headers::rewrite_cache_control;
use warmview::network::Method;
use warmview::{InterceptedRequest, InterceptionPolicy};

/// Policy decision runs on the engine's resource thread for every request
fn benchmark_policy(c: &mut Criterion) {
    let mut group = c.benchmark_group("policy");
    let asset = InterceptedRequest::get("https://cdn.example.com/static/js/app.min.js?v=42");
    let document = InterceptedRequest::get("https://example.com/articles/index").main_frame(true);

    group.bench_function("static_asset", |b| {
        b.iter(|| InterceptionPolicy.should_proxy(black_box(&asset)))
    });

    group.bench_function("main_frame", |b| {
        b.iter(|| InterceptionPolicy.should_proxy(black_box(&document)))
    });

    group.finish();
}

fn benchmark_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache");
    let headers: Vec<(String, String)> = [
        ("Content-Type", "text/css"),
        ("Pragma", "no-cache"),
        ("Cache-Control", "no-cache, no-store"),
        ("ETag", "\"abc123\""),
        ("Content-Length", "4096"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    group.bench_function("rewrite_headers", |b| {
        b.iter(|| {
            let mut h = headers.clone();
            rewrite_cache_control(&mut h, Duration::from_secs(31_536_000));
            black_box(h)
        })
    });

    group.bench_function("cache_key", |b| {
        b.iter(|| cache_key(Method::Get, black_box("https://cdn.example.com/static/css/site.css")))
    });

    group.finish();
}

criterion_group!(benches, benchmark_policy, benchmark_cache);
criterion_main!(benches);
