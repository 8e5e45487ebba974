//! Dependency keys.

use crate::value::{Key, ObjectId, Value};

/// A collection entry key as used for dependency tracking.
///
/// Object-valued keys are recorded by identity so that a dependency on a
/// weak collection entry never keeps the key object alive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntryKey {
    Value(Value),
    Identity(ObjectId),
}

impl EntryKey {
    pub fn of(key: &Value) -> Self {
        match key.raw_object() {
            Some(object) => EntryKey::Identity(object.id()),
            None => EntryKey::Value(key.clone()),
        }
    }
}

/// What a reaction depends on within one tracked object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepKey {
    /// A concrete property or element.
    Prop(Key),

    /// A concrete collection entry.
    Entry(EntryKey),

    /// The object's key-set shape: enumeration and key-existence checks.
    Enumerate,

    /// A collection's aggregate shape: size and whole-collection traversal.
    Iterate,
}

impl DepKey {
    pub fn entry(key: &Value) -> Self {
        DepKey::Entry(EntryKey::of(key))
    }
}

impl From<Key> for DepKey {
    fn from(key: Key) -> Self {
        DepKey::Prop(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Object;

    #[test]
    fn object_entries_are_keyed_by_identity() {
        let object = Object::record();
        assert_eq!(
            DepKey::entry(&Value::from(object.clone())),
            DepKey::Entry(EntryKey::Identity(object.id()))
        );
        assert_eq!(
            DepKey::entry(&Value::from("a")),
            DepKey::Entry(EntryKey::Value(Value::from("a")))
        );
    }

    #[test]
    fn synthetic_keys_differ_from_props() {
        assert_ne!(DepKey::Enumerate, DepKey::Iterate);
        assert_ne!(DepKey::from(Key::from("enumerate")), DepKey::Enumerate);
    }
}
