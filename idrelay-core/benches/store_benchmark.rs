//! Benchmarks for the request store and subscription registry hot paths.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use idrelay_core::store::RequestStore;
use idrelay_core::subscription::{ScheduledTask, SubscriptionKey, SubscriptionRegistry};

fn populated_store(size: usize) -> (RequestStore, Vec<String>) {
    let store = RequestStore::default();
    let ids = (0..size).map(|_| store.create().id).collect();
    (store, ids)
}

fn bench_create(c: &mut Criterion) {
    let store = RequestStore::default();
    c.bench_function("store_create", |b| {
        b.iter(|| black_box(store.create()));
    });
}

fn bench_state(c: &mut Criterion) {
    let (store, ids) = populated_store(10_000);
    let mut i = 0;
    c.bench_function("store_state", |b| {
        b.iter(|| {
            let id = &ids[i % ids.len()];
            i += 1;
            black_box(store.state(id).unwrap());
        });
    });
}

fn bench_resolve(c: &mut Criterion) {
    let (store, ids) = populated_store(10_000);
    let mut i = 0;
    c.bench_function("store_complete", |b| {
        b.iter(|| {
            let id = &ids[i % ids.len()];
            i += 1;
            black_box(store.complete(id, "alice").unwrap());
        });
    });
}

fn bench_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_sweep");
    for size in [100, 1_000, 10_000].iter() {
        let (store, _) = populated_store(*size);
        // Nothing is stale yet, so every iteration walks the full map.
        let now = Utc::now() + TimeDelta::seconds(1);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(store.sweep(now)));
        });
    }
    group.finish();
}

fn bench_registry(c: &mut Criterion) {
    let registry = SubscriptionRegistry::new();
    for i in 0..1_000u64 {
        let key = SubscriptionKey::new(format!("c{}", i % 50), format!("s{}", i), "r1", "bob");
        registry.put(key, Arc::new(ScheduledTask::new(i)));
    }

    let mut next_id = 1_000u64;
    c.bench_function("registry_put_remove", |b| {
        b.iter(|| {
            let key = SubscriptionKey::new("bench", "sub", "r1", "bob");
            registry.put(key.clone(), Arc::new(ScheduledTask::new(next_id)));
            next_id += 1;
            black_box(registry.remove(&key));
        });
    });

    c.bench_function("registry_remove_matching_miss", |b| {
        b.iter(|| black_box(registry.remove_matching(|key| key.belongs_to_connection("none"))));
    });
}

criterion_group!(
    benches,
    bench_create,
    bench_state,
    bench_resolve,
    bench_sweep,
    bench_registry
);
criterion_main!(benches);
