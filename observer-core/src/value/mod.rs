//! Dynamic Data Model
//!
//! Reactivity is transparent: callers keep reading and writing ordinary
//! data, and the runtime tracks it. Rust has no ambient object model to
//! intercept, so this module defines the data the runtime works over:
//!
//! - [`Value`]: a dynamically typed value (primitives, callables, raw
//!   objects, and observable views).
//! - [`Object`]: a shared raw object with a stable identity. Records,
//!   arrays, keyed collections and a few opaque built-ins.
//! - [`Key`]: a property key. Symbol keys are structural markers that are
//!   never tracked.
//!
//! # Equality
//!
//! `Value` equality follows SameValueZero: `NaN` equals `NaN`, `+0` equals
//! `-0`, and objects, views, functions and symbols compare by identity. The
//! interception layer uses this equality to decide whether a write changed
//! anything.

mod object;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

pub use object::{
    Elements, Object, ObjectData, ObjectId, ObjectKind, Record, WeakObject, WeakTable,
};

use crate::observable::Observable;

/// A unique, identity-compared symbol.
///
/// Symbol-keyed properties are structural markers: reading, writing or
/// deleting them through a view never records or triggers a dependency.
#[derive(Clone)]
pub struct Symbol(Rc<str>);

impl Symbol {
    /// Create a new symbol. Two symbols with the same description are
    /// still distinct.
    pub fn new(description: &str) -> Self {
        Self(Rc::from(description))
    }

    /// The symbol's description.
    pub fn description(&self) -> &str {
        &self.0
    }

    fn addr(&self) -> *const u8 {
        Rc::as_ptr(&self.0) as *const u8
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.addr(), other.addr())
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.description())
    }
}

/// Largest valid array index, 2^32 - 2. Larger numeric names are ordinary
/// property names.
pub const MAX_ARRAY_INDEX: usize = u32::MAX as usize - 1;

/// Largest valid array length, 2^32 - 1.
pub const MAX_ARRAY_LENGTH: usize = u32::MAX as usize;

/// A property key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// A named property.
    Name(Rc<str>),
    /// An element index, at most [`MAX_ARRAY_INDEX`]. Canonical numeric
    /// names in range are normalized to this.
    Index(usize),
    /// A structural marker; never tracked.
    Symbol(Symbol),
}

impl Key {
    /// Whether this key is a structural marker.
    pub fn is_symbol(&self) -> bool {
        matches!(self, Key::Symbol(_))
    }

    /// Whether this key names `name`.
    pub fn is_named(&self, name: &str) -> bool {
        matches!(self, Key::Name(n) if &**n == name)
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        let canonical_index = !name.is_empty()
            && name.bytes().all(|b| b.is_ascii_digit())
            && (name == "0" || !name.starts_with('0'));
        match canonical_index.then(|| name.parse::<usize>().ok()).flatten() {
            Some(index) if index <= MAX_ARRAY_INDEX => Key::Index(index),
            _ => Key::Name(Rc::from(name)),
        }
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::from(name.as_str())
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        if index <= MAX_ARRAY_INDEX {
            Key::Index(index)
        } else {
            Key::Name(Rc::from(index.to_string()))
        }
    }
}

impl From<Symbol> for Key {
    fn from(symbol: Symbol) -> Self {
        Key::Symbol(symbol)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name) => write!(f, "{name:?}"),
            Key::Index(index) => write!(f, "{index}"),
            Key::Symbol(symbol) => write!(f, "{symbol:?}"),
        }
    }
}

/// An identity-bearing callable value.
#[derive(Clone)]
pub struct Func(Rc<dyn Fn(&[Value]) -> Value>);

impl Func {
    /// Wrap a closure as a callable value.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Value + 'static,
    {
        Self(Rc::new(f))
    }

    /// Invoke the callable.
    pub fn call(&self, args: &[Value]) -> Value {
        (self.0)(args)
    }

    fn addr(&self) -> *const () {
        Rc::as_ptr(&self.0) as *const ()
    }
}

impl PartialEq for Func {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.addr(), other.addr())
    }
}

impl Eq for Func {}

impl Hash for Func {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Func({:p})", self.addr())
    }
}

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Symbol(Symbol),
    Function(Func),
    /// A raw object. Reads and writes on it are not tracked.
    Object(Object),
    /// An observable view over a raw object.
    View(Observable),
}

impl Value {
    /// The value's type name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Function(_) => "function",
            Value::Object(_) | Value::View(_) => "object",
        }
    }

    /// Whether this is a raw object or a view.
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_) | Value::View(_))
    }

    /// Substitute a view with its raw object. Other values are unchanged.
    pub fn into_raw(self) -> Value {
        match self {
            Value::View(view) => Value::Object(view.raw().clone()),
            other => other,
        }
    }

    /// The underlying raw object of a raw object or view.
    pub fn raw_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            Value::View(view) => Some(view.raw()),
            _ => None,
        }
    }

    pub fn as_view(&self) -> Option<&Observable> {
        match self {
            Value::View(view) => Some(view),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_func(&self) -> Option<&Func> {
        match self {
            Value::Function(func) => Some(func),
            _ => None,
        }
    }

    fn number_bits(n: f64) -> u64 {
        if n.is_nan() {
            f64::NAN.to_bits()
        } else if n == 0.0 {
            0
        } else {
            n.to_bits()
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => (a.is_nan() && b.is_nan()) || a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::View(a), Value::View(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Undefined | Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Number(n) => Self::number_bits(*n).hash(state),
            Value::String(s) => s.hash(state),
            Value::Symbol(symbol) => symbol.hash(state),
            Value::Function(func) => func.hash(state),
            Value::Object(object) => object.id().hash(state),
            Value::View(view) => view.raw().id().hash(state),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Symbol(symbol) => write!(f, "{symbol:?}"),
            Value::Function(func) => write!(f, "{func:?}"),
            Value::Object(object) => write!(f, "{object:?}"),
            Value::View(view) => write!(f, "{view:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<Symbol> for Value {
    fn from(symbol: Symbol) -> Self {
        Value::Symbol(symbol)
    }
}

impl From<Func> for Value {
    fn from(func: Func) -> Self {
        Value::Function(func)
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Value::Object(object)
    }
}

impl From<Observable> for Value {
    fn from(view: Observable) -> Self {
        Value::View(view)
    }
}

/// Builds fresh raw records and arrays from a JSON literal.
impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => {
                Value::Object(Object::array(items.into_iter().map(Value::from).collect()))
            }
            serde_json::Value::Object(fields) => Value::Object(Object::record_from(
                fields.into_iter().map(|(k, v)| (Key::from(k), Value::from(v))),
            )),
        }
    }
}
