//! Integration Tests for the Reactivity Runtime
//!
//! These tests verify that views, reactions and the scheduler work together
//! the way an application uses them.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use observer_core::{
    CascadePolicy, Error, Executor, MicrotaskQueue, Object, Observable, Runtime,
    RuntimeConfig, TokioExecutor, Value,
};

fn view(runtime: &Runtime, json: serde_json::Value) -> Observable {
    runtime.observable(json).unwrap().as_view().cloned().unwrap()
}

fn counter() -> Rc<Cell<usize>> {
    Rc::new(Cell::new(0))
}

/// A reaction sees the initial value, then the written value after a flush.
#[test]
fn reaction_reruns_after_write() {
    let runtime = Runtime::new();
    let state = view(&runtime, serde_json::json!({ "count": 0 }));
    let seen = Rc::new(RefCell::new(Vec::new()));

    let reader = state.clone();
    let seen_clone = seen.clone();
    runtime
        .observe(move || seen_clone.borrow_mut().push(reader.get("count")))
        .unwrap();

    state.set("count", 1);
    // Nothing runs until the deferred flush.
    assert_eq!(*seen.borrow(), vec![Value::from(0)]);

    runtime.run_microtasks();
    assert_eq!(*seen.borrow(), vec![Value::from(0), Value::from(1)]);
}

/// Two reactions on the same key each re-run exactly once per write.
#[test]
fn shared_dependency_runs_each_reaction_once() {
    let runtime = Runtime::new();
    let state = view(&runtime, serde_json::json!({ "count": 0 }));
    let first = counter();
    let second = counter();

    for runs in [first.clone(), second.clone()] {
        let reader = state.clone();
        runtime
            .observe(move || {
                reader.get("count");
                runs.set(runs.get() + 1);
            })
            .unwrap();
    }

    state.set("count", 1);
    state.set("count", 2);
    runtime.run_microtasks();

    assert_eq!(first.get(), 2);
    assert_eq!(second.get(), 2);
}

/// Replacing a nested object re-runs readers of the parent key.
#[test]
fn nested_replacement_reruns_outer_reader() {
    let runtime = Runtime::new();
    let state = view(&runtime, serde_json::json!({ "a": { "b": 1 } }));
    let seen = Rc::new(RefCell::new(Vec::new()));

    let reader = state.clone();
    let seen_clone = seen.clone();
    runtime
        .observe(move || {
            let b = reader
                .get("a")
                .as_view()
                .map(|a| a.get("b"))
                .unwrap_or_default();
            seen_clone.borrow_mut().push(b);
        })
        .unwrap();

    state.set("a", serde_json::json!({ "b": 2 }));
    runtime.run_microtasks();
    assert_eq!(*seen.borrow(), vec![Value::from(1), Value::from(2)]);

    // The new nested object is now tracked too.
    let a = runtime.wrap(state.raw().get(&"a".into()).raw_object().unwrap()).unwrap();
    a.set("b", 3);
    runtime.run_microtasks();
    assert_eq!(seen.borrow().last(), Some(&Value::from(3)));
}

/// Dependencies are rebuilt on every run, so stale branches stop mattering.
#[test]
fn stale_branches_are_released() {
    let runtime = Runtime::new();
    let state = view(
        &runtime,
        serde_json::json!({ "flag": true, "left": 0, "right": 0 }),
    );
    let runs = counter();

    let reader = state.clone();
    let runs_clone = runs.clone();
    runtime
        .observe(move || {
            runs_clone.set(runs_clone.get() + 1);
            if reader.get("flag").as_bool() == Some(true) {
                reader.get("left");
            } else {
                reader.get("right");
            }
        })
        .unwrap();

    state.set("flag", false);
    runtime.run_microtasks();
    assert_eq!(runs.get(), 2);

    state.set("left", 1);
    runtime.run_microtasks();
    assert_eq!(runs.get(), 2);

    state.set("right", 1);
    runtime.run_microtasks();
    assert_eq!(runs.get(), 3);
}

/// An unobserved reaction never runs again, even if it was already queued.
#[test]
fn unobserved_reaction_is_inert() {
    let runtime = Runtime::new();
    let state = view(&runtime, serde_json::json!({ "count": 0 }));
    let runs = counter();

    let reader = state.clone();
    let runs_clone = runs.clone();
    let reaction = runtime
        .observe(move || {
            reader.get("count");
            runs_clone.set(runs_clone.get() + 1);
        })
        .unwrap();

    state.set("count", 1);
    runtime.unobserve(&reaction).unwrap();
    runtime.run_microtasks();
    state.set("count", 2);
    runtime.run_microtasks();

    assert_eq!(runs.get(), 1);
    assert_eq!(runtime.edge_count(&reaction), 0);
}

/// Key enumeration re-runs when keys are added or deleted, but not for missing keys.
#[test]
fn deleting_keys_reruns_enumerators() {
    let runtime = Runtime::new();
    let state = view(&runtime, serde_json::json!({ "a": 1, "b": 2 }));
    let key_counts = Rc::new(RefCell::new(Vec::new()));

    let reader = state.clone();
    let key_counts_clone = key_counts.clone();
    runtime
        .observe(move || key_counts_clone.borrow_mut().push(reader.keys().len()))
        .unwrap();

    state.delete("missing");
    runtime.run_microtasks();
    state.delete("a");
    runtime.run_microtasks();
    state.set("c", 3);
    runtime.run_microtasks();

    assert_eq!(*key_counts.borrow(), vec![2, 1, 2]);
}

/// Map lookups track single entries; traversals track the whole collection.
#[test]
fn map_entries_and_traversal() {
    let runtime = Runtime::new();
    let map = runtime.wrap(&Object::map()).unwrap().as_map().unwrap();
    let lookups = counter();
    let traversals = counter();

    let reader = map.clone();
    let lookups_clone = lookups.clone();
    runtime
        .observe(move || {
            reader.get("k");
            lookups_clone.set(lookups_clone.get() + 1);
        })
        .unwrap();

    let reader = map.clone();
    let traversals_clone = traversals.clone();
    runtime
        .observe(move || {
            reader.keys().count();
            traversals_clone.set(traversals_clone.get() + 1);
        })
        .unwrap();

    map.set("k", 1);
    runtime.run_microtasks();
    assert_eq!((lookups.get(), traversals.get()), (2, 2));

    map.set("k", 1);
    runtime.run_microtasks();
    assert_eq!((lookups.get(), traversals.get()), (2, 2));

    map.set("other", 1);
    runtime.run_microtasks();
    assert_eq!((lookups.get(), traversals.get()), (2, 3));

    map.clear();
    runtime.run_microtasks();
    assert_eq!((lookups.get(), traversals.get()), (2, 4));
}

/// Object keys are matched by identity, and views resolve to their raw object.
#[test]
fn objects_as_map_keys_compare_by_identity() {
    let runtime = Runtime::new();
    let map = runtime.wrap(&Object::map()).unwrap().as_map().unwrap();
    let key = Object::record();

    map.set(key.clone(), "value");
    assert_eq!(map.get(key.clone()), Value::from("value"));
    assert_eq!(map.get(Object::record()), Value::Undefined);

    // A view used as a key resolves to its raw object.
    let key_view = runtime.wrap(&key).unwrap();
    assert_eq!(map.get(key_view), Value::from("value"));
}

/// A failing reaction is reported by the flush without stopping its siblings.
#[test]
fn failing_reaction_is_reported_by_flush() {
    let queue = MicrotaskQueue::new();
    let runtime = Runtime::builder().executor(queue.clone()).build();
    let state = view(&runtime, serde_json::json!({ "n": 0 }));
    let runs = counter();

    let reader = state.clone();
    runtime
        .observe(move || -> Result<(), String> {
            match reader.get("n").as_f64() {
                Some(n) if n > 0.0 => Err(format!("bad n: {n}")),
                _ => Ok(()),
            }
        })
        .unwrap();

    let reader = state.clone();
    let runs_clone = runs.clone();
    runtime
        .observe(move || {
            reader.get("n");
            runs_clone.set(runs_clone.get() + 1);
        })
        .unwrap();

    state.set("n", 1);
    match runtime.flush() {
        Err(Error::Flush { failures }) => assert_eq!(failures.len(), 1),
        other => panic!("expected a flush failure, got {other:?}"),
    }
    assert_eq!(runs.get(), 2);

    // The scheduled flush finds nothing left to do.
    queue.run_until_idle();
    assert_eq!(runs.get(), 2);
}

/// Runtime configuration loads from JSON with defaults for missing fields.
#[test]
fn configuration_loads_from_json() {
    let config = RuntimeConfig::from_json_str(r#"{ "cascade": "next_tick" }"#).unwrap();
    assert_eq!(config.cascade, CascadePolicy::NextTick);

    let runtime = Runtime::builder().config(config).build();
    assert_eq!(runtime.config().max_flush_runs, 10_000);
}

/// Awaiting `next_tick` after a write observes the flushed state.
#[tokio::test(flavor = "current_thread")]
async fn next_tick_follows_the_flush() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let runtime = Runtime::builder().executor(TokioExecutor).build();
            let state = view(&runtime, serde_json::json!({ "count": 0 }));
            let seen = Rc::new(RefCell::new(Vec::new()));

            let reader = state.clone();
            let seen_clone = seen.clone();
            runtime
                .observe(move || seen_clone.borrow_mut().push(reader.get("count")))
                .unwrap();

            state.set("count", 1);
            let seen_after = seen.clone();
            let snapshot = runtime.next_tick(move || seen_after.borrow().clone()).await;

            assert_eq!(snapshot, vec![Value::from(0), Value::from(1)]);
        })
        .await;
}
