//! Benchmarks for morphium-core
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Value as JsonValue};

use morphium_core::{Path, Store, StoreConfig, SubscribeOptions, Tracked, Value};

fn nested(depth: usize) -> JsonValue {
    (0..depth).fold(json!({ "leaf": 0 }), |inner, _| json!({ "child": inner }))
}

fn deepest(root: &Tracked, depth: usize) -> Tracked {
    let path: Path = std::iter::repeat("child").take(depth).map(Into::into).collect();
    root.lookup(&path).unwrap().into_node().unwrap()
}

// =============================================================================
// WRAP BENCHMARKS
// =============================================================================

fn bench_wrap(c: &mut Criterion) {
    let data = json!({
        "user": { "name": "Ada", "tags": ["a", "b", "c"] },
        "posts": [{ "id": 1 }, { "id": 2 }, { "id": 3 }],
    });

    let mut group = c.benchmark_group("wrap");
    for (name, config) in [
        ("deep", StoreConfig::default()),
        ("lazy", StoreConfig::default().deep_wrap(false)),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| {
                let store = Store::with_config(config.clone());
                black_box(store.wrap(data.clone()).unwrap())
            })
        });
    }
    group.finish();
}

fn bench_read(c: &mut Criterion) {
    let store = Store::new();
    let root = store.wrap(nested(8)).unwrap();
    let path: Path = std::iter::repeat("child")
        .take(8)
        .map(Into::into)
        .chain(std::iter::once("leaf".into()))
        .collect();

    c.bench_function("lookup_depth_8", |b| {
        b.iter(|| black_box(root.lookup(&path).unwrap()))
    });
}

// =============================================================================
// NOTIFICATION BENCHMARKS
// =============================================================================

fn bench_write_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_notify_root");
    for depth in [1, 4, 16] {
        let store = Store::new();
        let root = store.wrap(nested(depth)).unwrap();
        let leaf = deepest(&root, depth);
        let _subscription = root.watch(|path: &Path| {
            black_box(path);
        });

        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            let mut n = 0;
            b.iter(|| {
                n += 1;
                leaf.set("leaf", n).unwrap();
            })
        });
    }
    group.finish();
}

fn bench_shared_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("shared_fan_out");
    for parents in [1, 10, 100] {
        let store = Store::new();
        let shared = store.wrap(json!({ "count": 0 })).unwrap();
        let roots: Vec<_> = (0..parents)
            .map(|_| {
                let root = store.wrap(json!({})).unwrap();
                root.set("shared", &shared).unwrap();
                let _ = root.watch(|path: &Path| {
                    black_box(path);
                });
                root
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(parents), &parents, |b, _| {
            let mut n = 0;
            b.iter(|| {
                n += 1;
                shared.set("count", n).unwrap();
            })
        });
        drop(roots);
    }
    group.finish();
}

fn bench_batched_flush(c: &mut Criterion) {
    let store = Store::new();
    let root = store.wrap(json!({ "a": 0, "b": { "c": 0 } })).unwrap();
    let b_node = root.get("b").unwrap().into_node().unwrap();
    let _subscription = store
        .subscribe(
            &Value::from(&root),
            |paths: &[Path]| {
                black_box(paths);
            },
            SubscribeOptions::batched(),
        )
        .unwrap();

    c.bench_function("batch_100_writes", |b| {
        b.iter(|| {
            store.batch(|| {
                for i in 0..50 {
                    root.set("a", i).unwrap();
                    b_node.set("c", i).unwrap();
                }
            })
        })
    });
}

fn bench_cycle_cut(c: &mut Criterion) {
    let store = Store::new();
    let root = store.wrap(json!({ "value": 0 })).unwrap();
    root.set("me", &root).unwrap();
    let _subscription = root.watch(|path: &Path| {
        black_box(path);
    });

    c.bench_function("write_in_cycle", |b| {
        let mut n = 0;
        b.iter(|| {
            n += 1;
            root.set("value", n).unwrap();
        })
    });
}

// =============================================================================
// MAINTENANCE BENCHMARKS
// =============================================================================

fn bench_collect_garbage(c: &mut Criterion) {
    c.bench_function("collect_garbage_100_detached", |b| {
        b.iter_batched(
            || {
                let store = Store::new();
                let root = store.wrap(json!({})).unwrap();
                for _ in 0..100 {
                    root.set("slot", json!({ "x": { "y": 1 } })).unwrap();
                }
                (store, root)
            },
            |(store, _root)| black_box(store.collect_garbage()),
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(wrap_benches, bench_wrap, bench_read);

criterion_group!(
    notify_benches,
    bench_write_depth,
    bench_shared_fan_out,
    bench_batched_flush,
    bench_cycle_cut,
);

criterion_group!(gc_benches, bench_collect_garbage);

criterion_main!(wrap_benches, notify_benches, gc_benches);
