//! Collection Instrumentation
//!
//! Keyed collections are tracked through typed facades rather than
//! property access. Each facade performs the tracking side effect and then
//! forwards to the raw collection it decorates.
//!
//! | Operation                     | Tracking                                   |
//! |-------------------------------|--------------------------------------------|
//! | `has`, `get`                  | read `(raw, key)`                          |
//! | `add` (sets)                  | if absent: queue `(raw, key)`, `ITERATE`   |
//! | `set` (maps)                  | if changed: queue `(raw, key)`, `ITERATE`  |
//! | `delete`                      | if present: queue `(raw, key)`, `ITERATE`  |
//! | `clear`                       | if non-empty: queue `ITERATE`              |
//! | traversal, `size`             | read `ITERATE`                             |
//!
//! Weak collections have no traversal or size, so their facades only cover
//! lookup, insertion and removal, and never touch `ITERATE`.

use super::Observable;
use crate::error::Result;
use crate::graph::DepKey;
use crate::value::{ObjectKind, Value};

/// How a raw object is tracked, chosen once per instance from its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instrumentation {
    /// Records and arrays: tracked through property access.
    Plain,
    Map,
    Set,
    WeakMap,
    WeakSet,
    /// Built-ins that are never wrapped.
    Opaque,
}

impl Instrumentation {
    pub fn for_kind(kind: ObjectKind) -> Self {
        match kind {
            ObjectKind::Record | ObjectKind::Array => Instrumentation::Plain,
            ObjectKind::Map => Instrumentation::Map,
            ObjectKind::Set => Instrumentation::Set,
            ObjectKind::WeakMap => Instrumentation::WeakMap,
            ObjectKind::WeakSet => Instrumentation::WeakSet,
            ObjectKind::Date | ObjectKind::Pattern | ObjectKind::Host => Instrumentation::Opaque,
        }
    }
}

/// Shared lookup/removal tracking for every collection facade.
fn tracked_has(view: &Observable, key: &Value) -> bool {
    view.track(DepKey::entry(key));
    view.raw().has_entry(key)
}

fn tracked_delete(view: &Observable, key: &Value, iterable: bool) -> bool {
    if view.raw().has_entry(key) {
        view.trigger(DepKey::entry(key));
        if iterable {
            view.trigger(DepKey::Iterate);
        }
    }
    view.raw().remove_entry(key)
}

fn tracked_clear(view: &Observable) {
    if view.raw().size() > 0 {
        view.trigger(DepKey::Iterate);
    }
    view.raw().clear_entries();
}

fn tracked_entries(view: &Observable) -> Vec<(Value, Value)> {
    view.track(DepKey::Iterate);
    view.raw().entries()
}

// ============================================================================
// Map
// ============================================================================

/// Tracked facade over a raw map.
#[derive(Debug, Clone)]
pub struct MapView {
    view: Observable,
}

impl MapView {
    pub(crate) fn new(view: Observable) -> Self {
        Self { view }
    }

    /// The view this facade decorates.
    pub fn view(&self) -> &Observable {
        &self.view
    }

    pub fn has(&self, key: impl Into<Value>) -> bool {
        tracked_has(&self.view, &key.into().into_raw())
    }

    pub fn get(&self, key: impl Into<Value>) -> Value {
        let key = key.into().into_raw();
        self.view.track(DepKey::entry(&key));
        self.view.raw().get_entry(&key)
    }

    /// Insert or overwrite. Queues dependents only if the stored value
    /// changes.
    pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) -> &Self {
        let key = key.into().into_raw();
        let value = value.into().into_raw();
        if self.view.raw().get_entry(&key) != value {
            self.view.trigger(DepKey::entry(&key));
            self.view.trigger(DepKey::Iterate);
        }
        self.view.raw().map_insert(key, value);
        self
    }

    pub fn delete(&self, key: impl Into<Value>) -> bool {
        tracked_delete(&self.view, &key.into().into_raw(), true)
    }

    pub fn clear(&self) {
        tracked_clear(&self.view);
    }

    pub fn size(&self) -> usize {
        self.view.track(DepKey::Iterate);
        self.view.raw().size()
    }

    pub fn for_each(&self, mut f: impl FnMut(&Value, &Value)) {
        for (key, value) in tracked_entries(&self.view) {
            f(&value, &key);
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = Value> {
        tracked_entries(&self.view).into_iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = Value> {
        tracked_entries(&self.view).into_iter().map(|(_, v)| v)
    }

    pub fn entries(&self) -> impl Iterator<Item = (Value, Value)> {
        tracked_entries(&self.view).into_iter()
    }

    /// Default iteration: entries.
    pub fn iter(&self) -> impl Iterator<Item = (Value, Value)> {
        self.entries()
    }
}

// ============================================================================
// Set
// ============================================================================

/// Tracked facade over a raw set.
#[derive(Debug, Clone)]
pub struct SetView {
    view: Observable,
}

impl SetView {
    pub(crate) fn new(view: Observable) -> Self {
        Self { view }
    }

    pub fn view(&self) -> &Observable {
        &self.view
    }

    pub fn has(&self, member: impl Into<Value>) -> bool {
        tracked_has(&self.view, &member.into().into_raw())
    }

    /// Insert a member. Queues dependents only if it was absent.
    pub fn add(&self, member: impl Into<Value>) -> &Self {
        let member = member.into().into_raw();
        if !self.view.raw().has_entry(&member) {
            self.view.trigger(DepKey::entry(&member));
            self.view.trigger(DepKey::Iterate);
        }
        self.view.raw().set_insert(member);
        self
    }

    pub fn delete(&self, member: impl Into<Value>) -> bool {
        tracked_delete(&self.view, &member.into().into_raw(), true)
    }

    pub fn clear(&self) {
        tracked_clear(&self.view);
    }

    pub fn size(&self) -> usize {
        self.view.track(DepKey::Iterate);
        self.view.raw().size()
    }

    pub fn for_each(&self, mut f: impl FnMut(&Value)) {
        for (member, _) in tracked_entries(&self.view) {
            f(&member);
        }
    }

    pub fn values(&self) -> impl Iterator<Item = Value> {
        tracked_entries(&self.view).into_iter().map(|(m, _)| m)
    }

    /// Same as `values`; sets have no separate keys.
    pub fn keys(&self) -> impl Iterator<Item = Value> {
        self.values()
    }

    /// `(member, member)` pairs.
    pub fn entries(&self) -> impl Iterator<Item = (Value, Value)> {
        tracked_entries(&self.view).into_iter()
    }

    /// Default iteration: members.
    pub fn iter(&self) -> impl Iterator<Item = Value> {
        self.values()
    }
}

// ============================================================================
// Weak collections
// ============================================================================

/// Tracked facade over a raw weak map.
#[derive(Debug, Clone)]
pub struct WeakMapView {
    view: Observable,
}

impl WeakMapView {
    pub(crate) fn new(view: Observable) -> Self {
        Self { view }
    }

    pub fn view(&self) -> &Observable {
        &self.view
    }

    pub fn has(&self, key: impl Into<Value>) -> bool {
        tracked_has(&self.view, &key.into().into_raw())
    }

    pub fn get(&self, key: impl Into<Value>) -> Value {
        let key = key.into().into_raw();
        self.view.track(DepKey::entry(&key));
        self.view.raw().get_entry(&key)
    }

    /// Insert or overwrite. Keys must be objects.
    pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) -> Result<&Self> {
        let key = key.into().into_raw();
        let value = value.into().into_raw();
        let changed = self.view.raw().get_entry(&key) != value;
        self.view.raw().weak_map_insert(key.clone(), value)?;
        if changed {
            self.view.trigger(DepKey::entry(&key));
        }
        Ok(self)
    }

    pub fn delete(&self, key: impl Into<Value>) -> bool {
        tracked_delete(&self.view, &key.into().into_raw(), false)
    }
}

/// Tracked facade over a raw weak set.
#[derive(Debug, Clone)]
pub struct WeakSetView {
    view: Observable,
}

impl WeakSetView {
    pub(crate) fn new(view: Observable) -> Self {
        Self { view }
    }

    pub fn view(&self) -> &Observable {
        &self.view
    }

    pub fn has(&self, member: impl Into<Value>) -> bool {
        tracked_has(&self.view, &member.into().into_raw())
    }

    /// Insert a member. Members must be objects.
    pub fn add(&self, member: impl Into<Value>) -> Result<&Self> {
        let member = member.into().into_raw();
        let absent = !self.view.raw().has_entry(&member);
        self.view.raw().weak_set_insert(member.clone())?;
        if absent {
            self.view.trigger(DepKey::entry(&member));
        }
        Ok(self)
    }

    pub fn delete(&self, member: impl Into<Value>) -> bool {
        tracked_delete(&self.view, &member.into().into_raw(), false)
    }
}
