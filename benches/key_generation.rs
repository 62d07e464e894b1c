//! Micro-benchmarks for the hot paths every cached or coalesced request
//! touches: key derivation and global-config merge.

use std::hint::black_box;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use reqpipe::{GlobalConfig, KeyStrategy, RequestConfig};
use reqpipe_core::canonical::stable_stringify;

fn representative_config() -> RequestConfig {
    RequestConfig::post("https://api.example.com/v2/orders")
        .with_json(serde_json::json!({
            "customer": {"id": 42, "segment": "smb"},
            "lines": [{"sku": "a-1", "qty": 3}, {"sku": "b-9", "qty": 1}],
            "notes": "deliver after 5pm",
        }))
        .with_param("dryRun", false)
        .with_param("region", "eu-west-1")
        .with_header("x-tenant", "acme")
}

fn bench_key_generation(c: &mut Criterion) {
    let config = representative_config();
    let strategy = KeyStrategy::Parameterized;

    c.bench_function("parameterized_key", |b| {
        b.iter(|| strategy.key_for(black_box(&config)))
    });

    let value = serde_json::json!({
        "zeta": [1, 2, 3],
        "alpha": {"nested": {"deep": true}},
        "mid": "value",
    });
    c.bench_function("stable_stringify", |b| {
        b.iter(|| stable_stringify(black_box(&value)))
    });
}

fn bench_merge(c: &mut Criterion) {
    let global = GlobalConfig::builder()
        .base_url("https://api.example.com")
        .timeout(Duration::from_secs(30))
        .header("x-app", "bench")
        .header("accept", "application/json")
        .build();
    let config = representative_config();

    c.bench_function("merge_effective_config", |b| {
        b.iter(|| reqpipe_core::merge(black_box(&global), black_box(config.clone())))
    });
}

criterion_group!(benches, bench_key_generation, bench_merge);
criterion_main!(benches);
