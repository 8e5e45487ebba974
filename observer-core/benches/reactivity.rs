//! Benchmarks for observer-core
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use observer_core::{Object, Observable, Runtime, Value};

fn record(runtime: &Runtime, json: serde_json::Value) -> Observable {
    match runtime.observable(json) {
        Ok(Value::View(view)) => view,
        other => panic!("expected a view, got {other:?}"),
    }
}

// =============================================================================
// VIEW BENCHMARKS
// =============================================================================

fn bench_wrap_cached(c: &mut Criterion) {
    let runtime = Runtime::new();
    let raw = Object::record();
    let _view = runtime.wrap(&raw);
    c.bench_function("wrap_cached", |b| b.iter(|| black_box(runtime.wrap(&raw))));
}

fn bench_untracked_get(c: &mut Criterion) {
    let runtime = Runtime::new();
    let state = record(&runtime, serde_json::json!({ "count": 0 }));
    c.bench_function("untracked_get", |b| b.iter(|| black_box(state.get("count"))));
}

fn bench_set_same_value(c: &mut Criterion) {
    let runtime = Runtime::new();
    let state = record(&runtime, serde_json::json!({ "count": 0 }));
    let reader = state.clone();
    let _reaction = runtime.observe(move || {
        reader.get("count");
    });
    c.bench_function("set_same_value", |b| {
        b.iter(|| state.set("count", black_box(0)))
    });
}

// =============================================================================
// REACTION BENCHMARKS
// =============================================================================

fn bench_write_and_flush(c: &mut Criterion) {
    let runtime = Runtime::new();
    let state = record(&runtime, serde_json::json!({ "count": 0 }));
    let reader = state.clone();
    let _reaction = runtime.observe(move || {
        reader.get("count");
    });

    let mut n = 0.0;
    c.bench_function("write_and_flush", |b| {
        b.iter(|| {
            n += 1.0;
            state.set("count", n);
            black_box(runtime.run_microtasks())
        })
    });
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");

    for readers in [1, 10, 100] {
        let runtime = Runtime::new();
        let state = record(&runtime, serde_json::json!({ "count": 0 }));
        for _ in 0..readers {
            let reader = state.clone();
            let _ = runtime.observe(move || {
                reader.get("count");
            });
        }

        let mut n = 0.0;
        group.bench_with_input(BenchmarkId::from_parameter(readers), &readers, |b, _| {
            b.iter(|| {
                n += 1.0;
                state.set("count", n);
                runtime.flush()
            })
        });
    }

    group.finish();
}

fn bench_map_traversal(c: &mut Criterion) {
    let runtime = Runtime::new();
    let map = match runtime.wrap(&Object::map()).and_then(|view| view.as_map()) {
        Some(map) => map,
        None => panic!("maps are instrumented"),
    };
    for i in 0..100 {
        map.set(i, i);
    }
    let reader = map.clone();
    let _reaction = runtime.observe(move || {
        black_box(reader.values().count());
    });

    c.bench_function("map_traversal_rerun", |b| {
        b.iter(|| {
            map.set("extra", black_box(1));
            map.delete("extra");
            runtime.flush()
        })
    });
}

criterion_group!(
    benches,
    bench_wrap_cached,
    bench_untracked_get,
    bench_set_same_value,
    bench_write_and_flush,
    bench_fan_out,
    bench_map_traversal,
);
criterion_main!(benches);
