//! Status store benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use flowsync_bench::status_keys;
use flowsync_policy::{Action, PoolId, Reason};
use flowsync_status::{
    FailureDetails, FailureQuery, FailureReason, Severity, StatusStore, StoreConfig,
};
use std::time::SystemTime;
use tempfile::TempDir;

fn now() -> Option<flowsync_status::Timestamp> {
    Some(SystemTime::now().into())
}

/// Benchmark single timestamp writes.
fn bench_set_last_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("set_last_push");

    group.bench_function("memory", |b| {
        let store = StatusStore::in_memory();
        let keys = status_keys(1000, 4);
        let mut i = 0;
        b.iter(|| {
            store.set_last_push(black_box(&keys[i % keys.len()]), now()).unwrap();
            i += 1;
        });
    });

    group.bench_function("file_no_sync", |b| {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::new().sync_on_write(false);
        let store = StatusStore::open_file(&dir.path().join("status.journal"), config).unwrap();
        let keys = status_keys(1000, 4);
        let mut i = 0;
        b.iter(|| {
            store.set_last_push(black_box(&keys[i % keys.len()]), now()).unwrap();
            i += 1;
        });
    });

    group.finish();
}

fn populated(count: usize) -> StatusStore {
    let store = StatusStore::in_memory();
    for (i, key) in status_keys(count, 4).iter().enumerate() {
        store.set_last_push(key, now()).unwrap();
        if i % 10 == 0 {
            let details =
                FailureDetails::soft(FailureReason::NoFlow, Action::Update, Reason::Automatic);
            store.set_pull_failed(key, true, true, Some(details)).unwrap();
        }
    }
    store
}

/// Benchmark failure queries over populated stores.
fn bench_failures(c: &mut Criterion) {
    let mut group = c.benchmark_group("failures");

    for count in [100, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let store = populated(count);
            let query = FailureQuery::new().severity(Severity::Soft);
            b.iter(|| {
                black_box(store.failure_counts(black_box(&query)));
            });
        });
    }
    group.finish();
}

/// Benchmark pool resets.
fn bench_reset(c: &mut Criterion) {
    let mut group = c.benchmark_group("reset_pool");

    for count in [100, 1000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let pool = PoolId::new("pool_0");
            b.iter_batched(
                || populated(count),
                |store| black_box(store.reset_status_entities(Some(&pool)).unwrap()),
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_set_last_push, bench_failures, bench_reset);
criterion_main!(benches);
