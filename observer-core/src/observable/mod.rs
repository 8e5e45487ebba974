//! Observable Views
//!
//! An [`Observable`] is the trackable facade over a raw object. Every read
//! through it records a dependency on the running reaction, and every write
//! through it queues the reactions that depend on what changed. The data
//! itself always lives in the raw object.
//!
//! # How Views Work
//!
//! 1. `get` reads the raw object. Symbol keys and callable values are
//!    returned untracked. Anything else records a `(raw, key)` edge.
//!
//! 2. If a reaction is running and the value read is an object, it is
//!    wrapped before being returned, so tracking follows nested data.
//!    Outside a reaction the cached view is returned if one exists, or the
//!    raw object otherwise.
//!
//! 3. `set` and `delete` compare against the current raw value and queue
//!    dependents of both the key and `ENUMERATE` only on a real change.
//!    Writes to an array's `length` always queue.
//!
//! Keyed collections are tracked through the typed facades in
//! [`collections`], obtained with `as_map`, `as_set`, `as_weak_map` and
//! `as_weak_set`.

pub mod collections;

use std::fmt;
use std::rc::{Rc, Weak};

pub use collections::{Instrumentation, MapView, SetView, WeakMapView, WeakSetView};

use crate::graph::DepKey;
use crate::reactive::{Runtime, RuntimeInner};
use crate::value::{Key, Object, Value};

/// Reading this key through a view returns the raw object.
pub const RAW_KEY: &str = "$raw";

pub(crate) struct ViewInner {
    raw: Object,
    instrumentation: Instrumentation,
    runtime: Weak<RuntimeInner>,
}

/// A tracked view over a raw object.
///
/// Views compare by identity. A view whose runtime has been dropped keeps
/// working, untracked.
#[derive(Clone)]
pub struct Observable {
    inner: Rc<ViewInner>,
}

impl Observable {
    pub(crate) fn new(
        raw: Object,
        instrumentation: Instrumentation,
        runtime: Weak<RuntimeInner>,
    ) -> Self {
        Self {
            inner: Rc::new(ViewInner {
                raw,
                instrumentation,
                runtime,
            }),
        }
    }

    pub(crate) fn from_inner(inner: Rc<ViewInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<ViewInner> {
        Rc::downgrade(&self.inner)
    }

    /// The raw object behind this view.
    pub fn raw(&self) -> &Object {
        &self.inner.raw
    }

    /// How this view's raw object is instrumented.
    pub fn instrumentation(&self) -> Instrumentation {
        self.inner.instrumentation
    }

    fn runtime(&self) -> Option<Runtime> {
        Runtime::from_weak(&self.inner.runtime)
    }

    /// Record a read of `key` against the running reaction.
    pub(crate) fn track(&self, key: DepKey) {
        if let Some(runtime) = self.runtime() {
            runtime.register_read(&self.inner.raw, key);
        }
    }

    /// Queue every reaction depending on `key`.
    pub(crate) fn trigger(&self, key: DepKey) {
        if let Some(runtime) = self.runtime() {
            runtime.queue_reactions(&self.inner.raw, key);
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Read a property.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        let key = key.into();
        let raw = &self.inner.raw;
        if key.is_named(RAW_KEY) {
            return Value::Object(raw.clone());
        }

        let result = raw.get(&key);
        let Some(runtime) = self.runtime() else {
            return result;
        };
        if key.is_symbol() || matches!(result, Value::Function(_)) {
            return result;
        }

        runtime.register_read(raw, DepKey::Prop(key));

        match result {
            Value::Object(object) => {
                let view = if runtime.is_running() {
                    runtime.wrap(&object)
                } else {
                    runtime.cached_view(&object)
                };
                view.map_or(Value::Object(object), Value::View)
            }
            other => other,
        }
    }

    /// Whether `key` is an own or inherited property. Tracks the key-set
    /// shape.
    pub fn has(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        if !key.is_symbol() {
            self.track(DepKey::Enumerate);
        }
        self.inner.raw.has(&key)
    }

    /// The raw object's own keys. Tracks the key-set shape.
    pub fn keys(&self) -> Vec<Key> {
        self.track(DepKey::Enumerate);
        self.inner.raw.own_keys()
    }

    /// Array length, read through the `length` property.
    pub fn len(&self) -> usize {
        self.get("length")
            .as_f64()
            .map_or(0, |n| n as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Write a property.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> bool {
        let raw = self.inner.raw.clone();
        self.set_with_receiver(key.into(), value.into(), &raw)
    }

    /// Write a property on behalf of `receiver`.
    ///
    /// When this view is reached as the prototype of another object, the
    /// receiver is that object: the write is forwarded to it untracked.
    pub(crate) fn set_with_receiver(&self, key: Key, value: Value, receiver: &Object) -> bool {
        let raw = &self.inner.raw;
        let value = value.into_raw();

        if key.is_symbol() || receiver != raw {
            return receiver.write_own(key, value);
        }

        if raw.is_length_marker(&key) || raw.get_own(&key) != value {
            self.trigger(DepKey::Prop(key.clone()));
            self.trigger(DepKey::Enumerate);
        }
        raw.write_own(key, value)
    }

    /// Delete a property. Queues dependents only if it existed.
    pub fn delete(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        let raw = &self.inner.raw;
        if !key.is_symbol() && raw.has_own(&key) {
            self.trigger(DepKey::Prop(key.clone()));
            self.trigger(DepKey::Enumerate);
        }
        raw.delete(&key)
    }

    /// Append to an array: writes the element, then the `length` marker.
    pub fn push(&self, value: impl Into<Value>) -> usize {
        let len = self.len();
        self.set(len, value);
        self.set("length", (len + 1) as f64);
        len + 1
    }

    /// Remove the last array element: reads it, deletes it, then writes the
    /// `length` marker.
    pub fn pop(&self) -> Value {
        let len = self.len();
        if len == 0 {
            self.set("length", 0.0);
            return Value::Undefined;
        }
        let last = self.get(len - 1);
        self.delete(len - 1);
        self.set("length", (len - 1) as f64);
        last
    }

    // ------------------------------------------------------------------
    // Collections
    // ------------------------------------------------------------------

    pub fn as_map(&self) -> Option<MapView> {
        (self.instrumentation() == Instrumentation::Map).then(|| MapView::new(self.clone()))
    }

    pub fn as_set(&self) -> Option<SetView> {
        (self.instrumentation() == Instrumentation::Set).then(|| SetView::new(self.clone()))
    }

    pub fn as_weak_map(&self) -> Option<WeakMapView> {
        (self.instrumentation() == Instrumentation::WeakMap)
            .then(|| WeakMapView::new(self.clone()))
    }

    pub fn as_weak_set(&self) -> Option<WeakSetView> {
        (self.instrumentation() == Instrumentation::WeakSet)
            .then(|| WeakSetView::new(self.clone()))
    }
}

impl PartialEq for Observable {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Observable {}

impl fmt::Debug for Observable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Observable({:?})", self.inner.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Symbol;
    use std::cell::RefCell;

    fn record(runtime: &Runtime, json: serde_json::Value) -> Observable {
        runtime.observable(json).unwrap().as_view().cloned().unwrap()
    }

    #[test]
    fn raw_key_escapes_the_view() {
        let runtime = Runtime::new();
        let state = record(&runtime, serde_json::json!({ "a": 1 }));
        assert_eq!(state.get(RAW_KEY), Value::Object(state.raw().clone()));
    }

    #[test]
    fn wrapping_preserves_identity() {
        let runtime = Runtime::new();
        let raw = Object::record();
        let first = runtime.observable(raw.clone()).unwrap();
        let second = runtime.observable(raw.clone()).unwrap();
        assert_eq!(first, second);
        assert_eq!(runtime.observable(first.clone()).unwrap(), first);
    }

    #[test]
    fn opaque_objects_are_not_wrapped() {
        let runtime = Runtime::new();
        for raw in [Object::date(0.0), Object::pattern("a+"), Object::host("div")] {
            let value = runtime.observable(raw.clone()).unwrap();
            assert_eq!(value, Value::Object(raw));
            assert!(!runtime.is_observable(&value).unwrap());
        }
    }

    #[test]
    fn reads_outside_reactions_do_not_wrap() {
        let runtime = Runtime::new();
        let state = record(&runtime, serde_json::json!({ "nested": { "x": 1 } }));

        assert!(matches!(state.get("nested"), Value::Object(_)));
        assert_eq!(runtime.tracked_objects(), 1);
    }

    #[test]
    fn nested_reads_inside_reactions_are_wrapped() {
        let runtime = Runtime::new();
        let state = record(&runtime, serde_json::json!({ "nested": { "x": 1 } }));
        let seen = Rc::new(RefCell::new(None));

        let reader = state.clone();
        let seen_clone = seen.clone();
        let _reaction = runtime
            .observe(move || *seen_clone.borrow_mut() = Some(reader.get("nested")))
            .unwrap();

        let nested = seen.borrow().clone().unwrap();
        assert!(runtime.is_observable(&nested).unwrap());
        // Outside a reaction, the cached view is now returned.
        assert_eq!(state.get("nested"), nested);
    }

    #[test]
    fn callables_and_symbols_are_untracked() {
        let runtime = Runtime::new();
        let marker = Symbol::new("marker");
        let state = record(&runtime, serde_json::json!({}));
        state.set("method", crate::value::Func::new(|_| Value::Null));
        state.set(marker.clone(), 1);

        let reader = state.clone();
        let reaction = runtime
            .observe(move || {
                reader.get("method");
                reader.get(marker.clone());
            })
            .unwrap();
        assert_eq!(runtime.edge_count(&reaction), 0);
    }

    #[test]
    fn writes_store_raw_objects() {
        let runtime = Runtime::new();
        let state = record(&runtime, serde_json::json!({}));
        let child = record(&runtime, serde_json::json!({ "x": 1 }));

        state.set("child", child.clone());
        assert_eq!(
            state.raw().get(&Key::from("child")),
            Value::Object(child.raw().clone())
        );
    }

    #[test]
    fn same_value_writes_do_not_queue() {
        let runtime = Runtime::new();
        let state = record(&runtime, serde_json::json!({ "a": 1 }));
        let reader = state.clone();
        let reaction = runtime.observe(move || {
            reader.get("a");
        })
        .unwrap();

        state.set("a", 1);
        assert!(!runtime.is_pending(&reaction));
        state.set("a", 2);
        assert!(runtime.is_pending(&reaction));
    }

    #[test]
    fn length_writes_always_queue() {
        let runtime = Runtime::new();
        let list = record(&runtime, serde_json::json!([1, 2]));
        let reader = list.clone();
        let reaction = runtime.observe(move || {
            reader.len();
        })
        .unwrap();

        list.set("length", 2);
        assert!(runtime.is_pending(&reaction));
    }

    #[test]
    fn push_and_pop_track_length() {
        let runtime = Runtime::new();
        let list = record(&runtime, serde_json::json!([]));
        let lengths = Rc::new(RefCell::new(Vec::new()));

        let reader = list.clone();
        let lengths_clone = lengths.clone();
        let _reaction = runtime
            .observe(move || lengths_clone.borrow_mut().push(reader.len()))
            .unwrap();

        assert_eq!(list.push("a"), 1);
        assert_eq!(list.push("b"), 2);
        runtime.run_microtasks();
        assert_eq!(list.pop(), Value::from("b"));
        runtime.run_microtasks();

        assert_eq!(*lengths.borrow(), vec![0, 2, 1]);
    }

    #[test]
    fn delete_queues_only_existing_keys() {
        let runtime = Runtime::new();
        let state = record(&runtime, serde_json::json!({ "a": 1 }));

        let reader = state.clone();
        let enumerator = runtime.observe(move || {
            reader.keys();
        })
        .unwrap();

        let reader = state.clone();
        let direct = runtime.observe(move || {
            reader.get("a");
        })
        .unwrap();

        state.delete("missing");
        assert!(!runtime.is_pending(&enumerator));
        assert!(!runtime.is_pending(&direct));
        state.delete("a");
        assert!(runtime.is_pending(&enumerator));
        assert!(runtime.is_pending(&direct));
    }

    #[test]
    fn deleting_undefined_elements_queues() {
        let runtime = Runtime::new();
        let list = runtime
            .wrap(&Object::array(vec![Value::Undefined]))
            .unwrap();

        let reader = list.clone();
        let reaction = runtime.observe(move || {
            reader.get(0usize);
        })
        .unwrap();

        assert!(list.delete(0usize));
        assert!(runtime.is_pending(&reaction));
        assert!(!list.raw().has_own(&Key::Index(0)));
    }

    #[test]
    fn has_tracks_key_set_shape() {
        let runtime = Runtime::new();
        let state = record(&runtime, serde_json::json!({}));
        let reader = state.clone();
        let reaction = runtime.observe(move || {
            reader.has("flag");
        })
        .unwrap();

        state.set("flag", true);
        assert!(runtime.is_pending(&reaction));
    }

    #[test]
    fn inherited_writes_are_forwarded_untracked() {
        let runtime = Runtime::new();
        let proto = record(&runtime, serde_json::json!({ "shared": 1 }));
        let child = Object::record_with_proto(proto.clone());

        let reader = proto.clone();
        let reaction = runtime.observe(move || {
            reader.get("shared");
        })
        .unwrap();

        child.set("shared", 2);
        assert!(!runtime.is_pending(&reaction));
        assert_eq!(child.get_own(&Key::from("shared")), Value::from(2));
        assert_eq!(proto.raw().get(&Key::from("shared")), Value::from(1));
    }

    #[test]
    fn views_outlive_their_runtime_untracked() {
        let runtime = Runtime::new();
        let state = record(&runtime, serde_json::json!({ "a": 1 }));
        drop(runtime);

        assert!(state.set("a", 2));
        assert_eq!(state.get("a"), Value::from(2));
    }
}
