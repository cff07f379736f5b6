//! Performance benchmarks for the state store.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dotstore::Store;
use serde_json::json;

/// Writes with no interested listener should only touch the tree.
fn bench_fast_path_writes(c: &mut Criterion) {
    let mut group = c.benchmark_group("fast_path_writes");

    for depth in [1, 4, 16] {
        let path = (0..depth)
            .map(|i| format!("level{}", i))
            .collect::<Vec<_>>()
            .join(".");

        group.bench_with_input(BenchmarkId::new("depth", depth), &path, |b, path| {
            let store = Store::new();
            // Unrelated listener keeps the registry non-empty
            store.subscribe("elsewhere.*", |_, _| {}).unwrap();

            let mut i = 0u64;
            b.iter(|| {
                i += 1;
                store.set(black_box(path), i).unwrap();
            });
        });
    }

    group.finish();
}

/// Dispatch cost as listeners accumulate on every tier.
fn bench_dispatch_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_fanout");

    for listeners in [1, 10, 100] {
        group.bench_with_input(
            BenchmarkId::new("listeners_per_tier", listeners),
            &listeners,
            |b, &count| {
                let store = Store::with_initial(json!({"user": {"name": "Alice"}}));
                for _ in 0..count {
                    store.subscribe("user.name", |v, _| {
                        black_box(v);
                    }).unwrap();
                    store.subscribe("user.*", |v, _| {
                        black_box(v);
                    }).unwrap();
                    store.subscribe("*", |v, _| {
                        black_box(v);
                    }).unwrap();
                }

                let mut i = 0u64;
                b.iter(|| {
                    i += 1;
                    store.set("user.name", i).unwrap();
                });
            },
        );
    }

    group.finish();
}

/// Repeated writes to a few paths inside one batch.
fn bench_batched_writes(c: &mut Criterion) {
    let mut group = c.benchmark_group("batched_writes");

    for writes in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("writes", writes), &writes, |b, &writes| {
            let store = Store::new();
            store.subscribe("*", |v, _| {
                black_box(v);
            }).unwrap();

            b.iter(|| {
                store
                    .batch(|| {
                        for i in 0..writes {
                            store.set(&format!("slot{}", i % 8), i).unwrap();
                        }
                    })
                    .unwrap();
            });
        });
    }

    group.finish();
}

/// Reads of nested values.
fn bench_reads(c: &mut Criterion) {
    let store = Store::with_initial(json!({
        "user": {"profile": {"name": "Alice", "tags": ["a", "b", "c"]}}
    }));

    c.bench_function("get_nested", |b| {
        b.iter(|| black_box(store.get(black_box("user.profile.name")).unwrap()));
    });

    c.bench_function("read_without_clone", |b| {
        b.iter(|| {
            black_box(
                store
                    .read(black_box("user.profile"), |lookup| lookup.is_absent())
                    .unwrap(),
            )
        });
    });
}

criterion_group!(
    benches,
    bench_fast_path_writes,
    bench_dispatch_fanout,
    bench_batched_writes,
    bench_reads,
);

criterion_main!(benches);
