// SPDX-License-Identifier: PMPL-1.0-or-later
//! Performance benchmarks for nskv storage backends

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures::TryStreamExt;
use serde_json::{json, Value};
use tokio::runtime::Runtime;

use nskv_storage::{
    ClampSettings, MemoryStorage, NamespacedStorage, SharedMap, SqliteStorage, UpsertItem,
};

fn batch(prefix: &str, size: usize) -> Vec<(String, Value)> {
    (0..size)
        .map(|i| (format!("{prefix}/{i:06}"), json!({"n": i, "label": "benchmark"})))
        .collect()
}

fn keys(prefix: &str, size: usize) -> Vec<String> {
    (0..size).map(|i| format!("{prefix}/{i:06}")).collect()
}

async fn sqlite_storage(namespace: &str) -> SqliteStorage {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    SqliteStorage::connect(pool, namespace).await.unwrap()
}

/// A memory storage whose map also holds `noise` entries of other namespaces.
async fn crowded_memory(noise: usize) -> MemoryStorage {
    let map = SharedMap::new();
    for ns in 0..4 {
        map.namespace(format!("noise-{ns}"))
            .insert_if_not_exists_many(batch("n", noise / 4), None)
            .await
            .unwrap();
    }
    map.namespace("subject")
}

// ============================================================================
// In-memory backend
// ============================================================================

fn bench_memory_writes(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("memory");

    for size in [10, 100, 1000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("insert_batch", size), &size, |b, &size| {
            b.to_async(&rt).iter(|| async move {
                let storage = MemoryStorage::new("bench");
                black_box(storage.insert_if_not_exists_many(batch("k", size), None).await.unwrap())
            });
        });
    }

    let storage = MemoryStorage::new("bench");
    rt.block_on(storage.insert_if_not_exists_many(batch("k", 1000), None))
        .unwrap();
    let clamp = ClampSettings::between(0.0, 100.0);
    group.bench_function("upsert_clamped_100", |b| {
        b.to_async(&rt).iter(|| async {
            let items = (0..100)
                .map(|i| UpsertItem::new(format!("k/{i:06}"), json!(i), json!(i * 3)))
                .collect();
            black_box(storage.insert_or_update_many(items, Some(&clamp)).await.unwrap())
        });
    });

    group.finish();
}

fn bench_memory_reads(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let storage = rt.block_on(crowded_memory(40_000));
    rt.block_on(storage.insert_if_not_exists_many(batch("k", 10_000), None))
        .unwrap();
    let wanted = keys("k", 100);

    let mut group = c.benchmark_group("memory");
    group.bench_function("get_many_100", |b| {
        b.to_async(&rt).iter(|| async { black_box(storage.get_many(&wanted).await.unwrap()) });
    });
    group.bench_function("size_crowded", |b| {
        b.to_async(&rt).iter(|| async { black_box(storage.size().await.unwrap()) });
    });
    group.throughput(Throughput::Elements(10_000));
    group.bench_function("iterate_10k", |b| {
        b.to_async(&rt).iter(|| async {
            let entries: Vec<_> = storage.iterate().try_collect().await.unwrap();
            black_box(entries)
        });
    });
    group.bench_function("starts_with_scan", |b| {
        b.to_async(&rt).iter(|| async {
            let entries: Vec<_> =
                storage.get_starts_with_many("k/0001").try_collect().await.unwrap();
            black_box(entries)
        });
    });
    group.finish();
}

// ============================================================================
// SQLite backend
// ============================================================================

fn bench_sqlite(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let storage = rt.block_on(sqlite_storage("bench"));
    rt.block_on(storage.insert_if_not_exists_many(batch("k", 5_000), None))
        .unwrap();
    let wanted = keys("k", 100);

    let mut group = c.benchmark_group("sqlite");
    group.bench_function("get_many_100", |b| {
        b.to_async(&rt).iter(|| async { black_box(storage.get_many(&wanted).await.unwrap()) });
    });
    group.bench_function("update_batch_100", |b| {
        b.to_async(&rt).iter(|| async {
            let items = (0..100).map(|i| (format!("k/{i:06}"), json!(i))).collect();
            black_box(storage.update_if_exists_many(items, None).await.unwrap())
        });
    });
    group.throughput(Throughput::Elements(5_000));
    group.bench_function("iterate_5k", |b| {
        b.to_async(&rt).iter(|| async {
            let entries: Vec<_> = storage.iterate().try_collect().await.unwrap();
            black_box(entries)
        });
    });
    group.finish();
}

criterion_group!(benches, bench_memory_writes, bench_memory_reads, bench_sqlite);
criterion_main!(benches);
