//! Raw Objects
//!
//! An [`Object`] is the caller-owned data the runtime tracks. It is shared
//! (`Rc`-backed) and carries an [`ObjectId`] drawn from a process-wide
//! counter, so an id is never reused after its object is dropped.
//!
//! Every method here is untracked. Tracking only happens when the same
//! object is accessed through an [`Observable`] view.
//!
//! Raw objects never store views: all mutators substitute a view's raw
//! object before storing it.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::{IndexMap, IndexSet};

use super::{Key, Value, MAX_ARRAY_INDEX, MAX_ARRAY_LENGTH};
use crate::error::{Error, Result};
use crate::observable::Observable;

/// Counter for generating unique object IDs.
static OBJECT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a raw object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> Self {
        Self(OBJECT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// The kind of a raw object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Record,
    Array,
    Map,
    Set,
    WeakMap,
    WeakSet,
    Date,
    Pattern,
    Host,
}

/// A plain record: ordered properties plus an optional prototype.
#[derive(Default)]
pub struct Record {
    props: IndexMap<Key, Value>,
    proto: Option<Value>,
}

/// Array elements: a sparse index map plus an explicit length.
///
/// A hole (never written, or deleted) has no entry, which keeps it distinct
/// from an element explicitly set to `Undefined`. Indices never exceed
/// [`MAX_ARRAY_INDEX`].
#[derive(Default)]
pub struct Elements {
    items: BTreeMap<usize, Value>,
    length: usize,
}

impl Elements {
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(&index)
    }

    /// Whether `index` holds an element, as opposed to a hole.
    pub fn contains(&self, index: usize) -> bool {
        self.items.contains_key(&index)
    }

    /// Indices of present elements, ascending.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.items.keys().copied()
    }

    fn insert(&mut self, index: usize, value: Value) -> bool {
        if index > MAX_ARRAY_INDEX {
            return false;
        }
        self.items.insert(index, value);
        self.length = self.length.max(index + 1);
        true
    }

    fn remove(&mut self, index: usize) {
        self.items.remove(&index);
    }

    /// Truncate or extend with holes.
    fn set_len(&mut self, length: usize) {
        drop(self.items.split_off(&length));
        self.length = length;
    }
}

impl FromIterator<Value> for Elements {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        let items: BTreeMap<usize, Value> = iter.into_iter().enumerate().collect();
        let length = items.len();
        Self { items, length }
    }
}

/// A table keyed by object identity that does not keep its keys alive.
///
/// Entries whose key object has been dropped are invisible to lookups and
/// are pruned on the next insertion.
pub struct WeakTable<V> {
    entries: HashMap<ObjectId, (WeakObject, V)>,
}

impl<V> Default for WeakTable<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<V> WeakTable<V> {
    fn live(&self, id: ObjectId) -> Option<&V> {
        self.entries
            .get(&id)
            .filter(|(key, _)| key.is_alive())
            .map(|(_, value)| value)
    }

    fn insert(&mut self, key: &Object, value: V) {
        self.entries.retain(|_, (key, _)| key.is_alive());
        self.entries.insert(key.id(), (key.downgrade(), value));
    }

    fn remove(&mut self, id: ObjectId) -> bool {
        self.entries
            .remove(&id)
            .is_some_and(|(key, _)| key.is_alive())
    }

    /// Number of entries whose key is still alive.
    pub fn live_len(&self) -> usize {
        self.entries.values().filter(|(key, _)| key.is_alive()).count()
    }
}

/// The storage behind a raw object.
pub enum ObjectData {
    Record(Record),
    Array(Elements),
    Map(IndexMap<Value, Value>),
    Set(IndexSet<Value>),
    WeakMap(WeakTable<Value>),
    WeakSet(WeakTable<()>),
    /// Milliseconds since the epoch.
    Date(f64),
    /// Pattern source text.
    Pattern(Rc<str>),
    /// An opaque host-environment node, identified by name.
    Host(Rc<str>),
}

impl ObjectData {
    fn kind(&self) -> ObjectKind {
        match self {
            ObjectData::Record(_) => ObjectKind::Record,
            ObjectData::Array(_) => ObjectKind::Array,
            ObjectData::Map(_) => ObjectKind::Map,
            ObjectData::Set(_) => ObjectKind::Set,
            ObjectData::WeakMap(_) => ObjectKind::WeakMap,
            ObjectData::WeakSet(_) => ObjectKind::WeakSet,
            ObjectData::Date(_) => ObjectKind::Date,
            ObjectData::Pattern(_) => ObjectKind::Pattern,
            ObjectData::Host(_) => ObjectKind::Host,
        }
    }
}

struct ObjectInner {
    id: ObjectId,
    data: RefCell<ObjectData>,
}

/// A shared raw object with a stable identity.
#[derive(Clone)]
pub struct Object {
    inner: Rc<ObjectInner>,
}

/// A non-owning handle to a raw object.
#[derive(Clone)]
pub struct WeakObject {
    id: ObjectId,
    inner: Weak<ObjectInner>,
}

impl WeakObject {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn upgrade(&self) -> Option<Object> {
        self.inner.upgrade().map(|inner| Object { inner })
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl Object {
    /// Create a raw object over the given storage.
    pub fn new(data: ObjectData) -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                id: ObjectId::next(),
                data: RefCell::new(data),
            }),
        }
    }

    /// A fresh empty record.
    pub fn record() -> Self {
        Self::new(ObjectData::Record(Record::default()))
    }

    /// A record with the given properties, in order.
    pub fn record_from<I>(props: I) -> Self
    where
        I: IntoIterator<Item = (Key, Value)>,
    {
        let props = props.into_iter().map(|(k, v)| (k, v.into_raw())).collect();
        Self::new(ObjectData::Record(Record { props, proto: None }))
    }

    /// A fresh empty record inheriting from `proto`.
    pub fn record_with_proto(proto: impl Into<Value>) -> Self {
        Self::new(ObjectData::Record(Record {
            props: IndexMap::new(),
            proto: Some(proto.into()),
        }))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Self::new(ObjectData::Array(items.into_iter().map(Value::into_raw).collect()))
    }

    pub fn map() -> Self {
        Self::new(ObjectData::Map(IndexMap::new()))
    }

    pub fn new_set() -> Self {
        Self::new(ObjectData::Set(IndexSet::new()))
    }

    pub fn weak_map() -> Self {
        Self::new(ObjectData::WeakMap(WeakTable::default()))
    }

    pub fn weak_set() -> Self {
        Self::new(ObjectData::WeakSet(WeakTable::default()))
    }

    pub fn date(millis: f64) -> Self {
        Self::new(ObjectData::Date(millis))
    }

    pub fn pattern(source: &str) -> Self {
        Self::new(ObjectData::Pattern(Rc::from(source)))
    }

    pub fn host(name: &str) -> Self {
        Self::new(ObjectData::Host(Rc::from(name)))
    }

    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    pub fn kind(&self) -> ObjectKind {
        self.inner.data.borrow().kind()
    }

    pub fn downgrade(&self) -> WeakObject {
        WeakObject {
            id: self.inner.id,
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Borrow the underlying storage.
    ///
    /// The closure must not re-enter this object.
    pub fn with_data<R>(&self, f: impl FnOnce(&ObjectData) -> R) -> R {
        f(&self.inner.data.borrow())
    }

    fn with_data_mut<R>(&self, f: impl FnOnce(&mut ObjectData) -> R) -> R {
        f(&mut self.inner.data.borrow_mut())
    }

    pub(crate) fn is_length_marker(&self, key: &Key) -> bool {
        key.is_named("length") && self.kind() == ObjectKind::Array
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    /// Read a property, following the prototype chain for records.
    ///
    /// A prototype that is a view is read through the view, so inherited
    /// reads are tracked on the prototype's raw object.
    pub fn get(&self, key: &Key) -> Value {
        let proto = match &*self.inner.data.borrow() {
            ObjectData::Record(record) => match record.props.get(key) {
                Some(value) => return value.clone(),
                None => record.proto.clone(),
            },
            ObjectData::Array(items) => {
                return match key {
                    Key::Index(i) => items.get(*i).cloned().unwrap_or_default(),
                    key if key.is_named("length") => Value::Number(items.len() as f64),
                    _ => Value::Undefined,
                };
            }
            _ => None,
        };
        match proto {
            Some(Value::View(view)) => view.get(key.clone()),
            Some(Value::Object(object)) => object.get(key),
            _ => Value::Undefined,
        }
    }

    /// Read an own property, ignoring the prototype chain.
    pub fn get_own(&self, key: &Key) -> Value {
        match &*self.inner.data.borrow() {
            ObjectData::Record(record) => record.props.get(key).cloned().unwrap_or_default(),
            ObjectData::Array(items) => match key {
                Key::Index(i) => items.get(*i).cloned().unwrap_or_default(),
                key if key.is_named("length") => Value::Number(items.len() as f64),
                _ => Value::Undefined,
            },
            _ => Value::Undefined,
        }
    }

    /// Whether the object has `key` as an own property.
    pub fn has_own(&self, key: &Key) -> bool {
        match &*self.inner.data.borrow() {
            ObjectData::Record(record) => record.props.contains_key(key),
            ObjectData::Array(items) => match key {
                Key::Index(i) => items.contains(*i),
                key => key.is_named("length"),
            },
            _ => false,
        }
    }

    /// Whether `key` is an own or inherited property.
    pub fn has(&self, key: &Key) -> bool {
        if self.has_own(key) {
            return true;
        }
        match self.proto() {
            Some(Value::View(view)) => view.has(key.clone()),
            Some(Value::Object(object)) => object.has(key),
            _ => false,
        }
    }

    /// The record's prototype, if any.
    pub fn proto(&self) -> Option<Value> {
        match &*self.inner.data.borrow() {
            ObjectData::Record(record) => record.proto.clone(),
            _ => None,
        }
    }

    /// Write a property.
    ///
    /// A record write for a key it does not own, whose prototype chain
    /// reaches a view first, is routed through that view with this object
    /// as the receiver. The view forwards it without tracking.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> bool {
        let key = key.into();
        let value = value.into().into_raw();
        if !self.has_own(&key) {
            if let Some(view) = self.inherited_view() {
                return view.set_with_receiver(key, value, self);
            }
        }
        self.write_own(key, value)
    }

    fn inherited_view(&self) -> Option<Observable> {
        let mut proto = self.proto();
        while let Some(current) = proto {
            match current {
                Value::View(view) => return Some(view),
                Value::Object(object) => proto = object.proto(),
                _ => return None,
            }
        }
        None
    }

    /// Store `value` as an own property of this object.
    pub(crate) fn write_own(&self, key: Key, value: Value) -> bool {
        let value = value.into_raw();
        let length = self.is_length_marker(&key);
        self.with_data_mut(|data| match data {
            ObjectData::Record(record) => {
                record.props.insert(key, value);
                true
            }
            ObjectData::Array(items) if length => match value {
                Value::Number(n)
                    if n >= 0.0 && n.fract() == 0.0 && n <= MAX_ARRAY_LENGTH as f64 =>
                {
                    items.set_len(n as usize);
                    true
                }
                _ => false,
            },
            ObjectData::Array(items) => match key {
                Key::Index(i) => items.insert(i, value),
                _ => false,
            },
            _ => false,
        })
    }

    /// Delete an own property. Array elements become holes.
    pub fn delete(&self, key: &Key) -> bool {
        self.with_data_mut(|data| match data {
            ObjectData::Record(record) => {
                record.props.shift_remove(key);
                true
            }
            ObjectData::Array(items) => match key {
                Key::Index(i) => {
                    items.remove(*i);
                    true
                }
                key => !key.is_named("length"),
            },
            _ => true,
        })
    }

    /// The object's own keys, in order.
    pub fn own_keys(&self) -> Vec<Key> {
        match &*self.inner.data.borrow() {
            ObjectData::Record(record) => record.props.keys().cloned().collect(),
            ObjectData::Array(items) => items
                .indices()
                .map(Key::Index)
                .chain(std::iter::once(Key::from("length")))
                .collect(),
            _ => Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Keyed collections
    // ------------------------------------------------------------------

    /// Membership test for maps, sets and their weak variants.
    pub fn has_entry(&self, key: &Value) -> bool {
        match &*self.inner.data.borrow() {
            ObjectData::Map(map) => map.contains_key(key),
            ObjectData::Set(set) => set.contains(key),
            ObjectData::WeakMap(table) => weak_id(key).is_some_and(|id| table.live(id).is_some()),
            ObjectData::WeakSet(table) => weak_id(key).is_some_and(|id| table.live(id).is_some()),
            _ => false,
        }
    }

    /// Value lookup for maps and weak maps.
    pub fn get_entry(&self, key: &Value) -> Value {
        match &*self.inner.data.borrow() {
            ObjectData::Map(map) => map.get(key).cloned().unwrap_or_default(),
            ObjectData::WeakMap(table) => weak_id(key)
                .and_then(|id| table.live(id).cloned())
                .unwrap_or_default(),
            _ => Value::Undefined,
        }
    }

    /// Insert or overwrite a map entry.
    pub fn map_insert(&self, key: Value, value: Value) {
        let (key, value) = (key.into_raw(), value.into_raw());
        self.with_data_mut(|data| {
            if let ObjectData::Map(map) = data {
                map.insert(key, value);
            }
        });
    }

    /// Add a set member.
    pub fn set_insert(&self, member: Value) {
        let member = member.into_raw();
        self.with_data_mut(|data| {
            if let ObjectData::Set(set) = data {
                set.insert(member);
            }
        });
    }

    /// Insert or overwrite a weak map entry. Keys must be objects.
    pub fn weak_map_insert(&self, key: Value, value: Value) -> Result<()> {
        let key = weak_key(&key)?;
        let value = value.into_raw();
        self.with_data_mut(|data| {
            if let ObjectData::WeakMap(table) = data {
                table.insert(&key, value);
            }
        });
        Ok(())
    }

    /// Add a weak set member. Members must be objects.
    pub fn weak_set_insert(&self, member: Value) -> Result<()> {
        let member = weak_key(&member)?;
        self.with_data_mut(|data| {
            if let ObjectData::WeakSet(table) = data {
                table.insert(&member, ());
            }
        });
        Ok(())
    }

    /// Remove a collection entry. Returns whether it was present.
    pub fn remove_entry(&self, key: &Value) -> bool {
        self.with_data_mut(|data| match data {
            ObjectData::Map(map) => map.shift_remove(key).is_some(),
            ObjectData::Set(set) => set.shift_remove(key),
            ObjectData::WeakMap(table) => weak_id(key).is_some_and(|id| table.remove(id)),
            ObjectData::WeakSet(table) => weak_id(key).is_some_and(|id| table.remove(id)),
            _ => false,
        })
    }

    /// Remove every entry of a map or set.
    pub fn clear_entries(&self) {
        self.with_data_mut(|data| match data {
            ObjectData::Map(map) => map.clear(),
            ObjectData::Set(set) => set.clear(),
            _ => {}
        });
    }

    /// Number of entries in a map or set, or elements in an array.
    pub fn size(&self) -> usize {
        match &*self.inner.data.borrow() {
            ObjectData::Map(map) => map.len(),
            ObjectData::Set(set) => set.len(),
            ObjectData::Array(items) => items.len(),
            _ => 0,
        }
    }

    /// Snapshot of `(key, value)` pairs. Sets yield `(member, member)`.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        match &*self.inner.data.borrow() {
            ObjectData::Map(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            ObjectData::Set(set) => set.iter().map(|m| (m.clone(), m.clone())).collect(),
            _ => Vec::new(),
        }
    }
}

fn weak_id(key: &Value) -> Option<ObjectId> {
    key.raw_object().map(Object::id)
}

fn weak_key(key: &Value) -> Result<Object> {
    key.raw_object()
        .cloned()
        .ok_or(Error::InvalidWeakKey(key.type_name()))
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Object {}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.data.try_borrow() {
            Ok(data) => write!(f, "{:?}#{}", data.kind(), self.inner.id.0),
            Err(_) => write!(f, "Object#{}", self.inner.id.0),
        }
    }
}
