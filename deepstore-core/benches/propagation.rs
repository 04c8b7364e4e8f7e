//! Propagation benchmarks
//!
//! Measures the cost of a write reaching subscribers through plain stores,
//! derived chains and sub store write-backs.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;

use deepstore_core::store::{DerivedStore, Store, SubStore};

// =============================================================================
// Base Store
// =============================================================================

fn bench_set_notify(c: &mut Criterion) {
    let mut group = c.benchmark_group("set_notify");

    for subscribers in [0usize, 1, 16, 128] {
        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, &subscribers| {
                let store = Store::new(0u64);
                let _subs: Vec<_> = (0..subscribers)
                    .map(|_| store.subscribe(|v| {
                        black_box(*v);
                    }))
                    .collect();

                let mut next = 0u64;
                b.iter(|| {
                    next += 1;
                    store.set(black_box(next));
                });
            },
        );
    }

    group.finish();
}

fn bench_equal_write(c: &mut Criterion) {
    let store = Store::new(json!({ "items": (0..64).collect::<Vec<_>>() }));
    let _sub = store.subscribe(|v| {
        black_box(v);
    });
    let same = store.get();

    c.bench_function("equal_write_skipped", |b| {
        b.iter(|| store.set(black_box(same.clone())));
    });
}

// =============================================================================
// Derived Chains
// =============================================================================

fn bench_derived_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("derived_chain");

    for depth in [1usize, 4, 16] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            let base = Store::new(0i64);
            let mut tail = DerivedStore::new(base.clone(), |v: &i64| v + 1);
            for _ in 1..depth {
                tail = DerivedStore::new(tail, |v: &i64| v + 1);
            }
            let _sub = tail.subscribe(|v| {
                black_box(*v);
            });

            let mut next = 0i64;
            b.iter(|| {
                next += 1;
                base.set(black_box(next));
            });
        });
    }

    group.finish();
}

// =============================================================================
// Sub Store Write-back
// =============================================================================

fn bench_sub_store_write(c: &mut Criterion) {
    let parent = Store::new(json!({ "form": { "user": { "name": "ada" } } }));
    let name = SubStore::at_path(parent.clone(), "form.user.name").expect("valid path");
    let _sub = name.subscribe(|v| {
        black_box(v);
    });

    let mut next = 0u64;
    c.bench_function("sub_store_write_back", |b| {
        b.iter(|| {
            next += 1;
            name.set(json!(next));
        });
    });
}

criterion_group!(
    benches,
    bench_set_notify,
    bench_equal_write,
    bench_derived_chain,
    bench_sub_store_write
);
criterion_main!(benches);
