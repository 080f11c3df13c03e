//! Push and pull evaluation benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use flowsync_bench::policy;
use flowsync_engine::{EntityRef, SyncCore};
use flowsync_policy::{Action, PoolId, Reason};
use flowsync_status::StatusStore;
use std::sync::Arc;

/// Benchmark push target evaluation as the policy grows.
fn bench_evaluate_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate_push");

    for flows in [1, 10, 50].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(flows), flows, |b, &flows| {
            let core = SyncCore::new(
                Arc::new(policy(flows, 20)),
                Arc::new(StatusStore::in_memory()),
            );
            let entity = EntityRef::new("node", "bundle_7", "n1");
            b.iter(|| {
                let targets = core
                    .evaluate_push(black_box(&entity), Reason::Automatic, Action::Update)
                    .unwrap();
                black_box(targets);
            });
        });
    }
    group.finish();
}

/// Benchmark pull flow selection as the policy grows.
fn bench_evaluate_pull(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate_pull");

    for flows in [1, 10, 50].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(flows), flows, |b, &flows| {
            let core = SyncCore::new(
                Arc::new(policy(flows, 20)),
                Arc::new(StatusStore::in_memory()),
            );
            let pool = PoolId::new("content");
            b.iter(|| {
                let flow = core
                    .evaluate_pull(
                        &pool,
                        "node",
                        black_box("bundle_19"),
                        Reason::AsDependency,
                        Action::Create,
                        false,
                    )
                    .unwrap();
                black_box(flow);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_evaluate_push, bench_evaluate_pull);
criterion_main!(benches);
