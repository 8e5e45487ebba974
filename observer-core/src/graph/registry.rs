//! Dependency Registry
//!
//! Two tables, both owned by one runtime instance:
//!
//! - **connections**: raw object → dependency key → bucket of reactions.
//!   This is the table writes consult.
//! - **cleanup**: reaction → the bucket references it was added to. This is
//!   the table `unobserve` consults, so teardown does not scan every bucket.
//!
//! Buckets are insertion-ordered so that dependents are enqueued in the
//! order they first subscribed.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::{debug, trace};

use super::DepKey;
use crate::reactive::{Reaction, ReactionId};
use crate::value::{Object, ObjectId, WeakObject};

/// Reactions depending on one `(object, key)` pair.
type Bucket = IndexMap<ReactionId, Reaction>;

/// Reference to one bucket, recorded on the reaction side for teardown.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeRef {
    pub object: ObjectId,
    pub key: DepKey,
}

struct ObjectConnections {
    raw: WeakObject,
    keys: HashMap<DepKey, Bucket>,
}

/// Maps `(object, key)` pairs to the reactions that depend on them.
#[derive(Default)]
pub struct DependencyRegistry {
    connections: HashMap<ObjectId, ObjectConnections>,
    cleanup: HashMap<ReactionId, HashSet<EdgeRef>>,
}

impl DependencyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a raw object. Idempotent.
    pub fn store_object(&mut self, object: &Object) {
        self.connections
            .entry(object.id())
            .or_insert_with(|| ObjectConnections {
                raw: object.downgrade(),
                keys: HashMap::new(),
            });
    }

    /// Whether `object` has a connection table.
    pub fn is_stored(&self, object: ObjectId) -> bool {
        self.connections.contains_key(&object)
    }

    /// Prepare the cleanup set for a reaction. Idempotent.
    pub fn store_reaction(&mut self, reaction: ReactionId) {
        self.cleanup.entry(reaction).or_default();
    }

    /// Record that `reaction` depends on `(object, key)`.
    pub fn register_edge(&mut self, object: &Object, key: DepKey, reaction: &Reaction) {
        self.store_object(object);
        let Some(connections) = self.connections.get_mut(&object.id()) else {
            return;
        };

        let bucket = connections.keys.entry(key.clone()).or_default();
        if bucket.insert(reaction.id(), reaction.clone()).is_none() {
            trace!(object = object.id().raw(), ?key, reaction = ?reaction.id(), "registered edge");
        }

        self.cleanup.entry(reaction.id()).or_default().insert(EdgeRef {
            object: object.id(),
            key,
        });
    }

    /// Snapshot of every reaction currently depending on `(object, key)`.
    pub fn dependents(&self, object: ObjectId, key: &DepKey) -> SmallVec<[Reaction; 4]> {
        self.connections
            .get(&object)
            .and_then(|connections| connections.keys.get(key))
            .map(|bucket| bucket.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Invoke `f` once per reaction depending on `(object, key)`.
    pub fn for_each_dependent(&self, object: ObjectId, key: &DepKey, mut f: impl FnMut(&Reaction)) {
        for reaction in self.dependents(object, key) {
            f(&reaction);
        }
    }

    /// Remove `reaction` from every bucket it was added to and clear its
    /// cleanup set. Returns the number of edges released.
    pub fn release_all_edges(&mut self, reaction: ReactionId) -> usize {
        let Some(edges) = self.cleanup.get_mut(&reaction) else {
            return 0;
        };
        let released = edges.len();

        for edge in edges.drain() {
            let Some(connections) = self.connections.get_mut(&edge.object) else {
                continue;
            };
            if let Some(bucket) = connections.keys.get_mut(&edge.key) {
                bucket.shift_remove(&reaction);
                if bucket.is_empty() {
                    connections.keys.remove(&edge.key);
                }
            }
        }

        released
    }

    /// Release every edge of `reaction` and drop its cleanup entry.
    /// Returns the number of edges released.
    pub fn forget_reaction(&mut self, reaction: ReactionId) -> usize {
        let released = self.release_all_edges(reaction);
        self.cleanup.remove(&reaction);
        released
    }

    /// Drop the connection tables of raw objects that have been
    /// deallocated, along with the reaction-side references to them, and
    /// any cleanup sets left empty. Returns the number of tables dropped.
    pub fn sweep(&mut self) -> usize {
        let dead: Vec<ObjectId> = self
            .connections
            .iter()
            .filter(|(_, connections)| !connections.raw.is_alive())
            .map(|(id, _)| *id)
            .collect();

        for id in &dead {
            let Some(connections) = self.connections.remove(id) else {
                continue;
            };
            for (key, bucket) in connections.keys {
                let edge = EdgeRef { object: *id, key };
                for reaction in bucket.keys() {
                    if let Some(edges) = self.cleanup.get_mut(reaction) {
                        edges.remove(&edge);
                    }
                }
            }
        }

        self.cleanup.retain(|_, edges| !edges.is_empty());

        if !dead.is_empty() {
            debug!(dropped = dead.len(), "swept connections of dropped objects");
        }
        dead.len()
    }

    /// Number of edges `reaction` currently holds.
    pub fn edge_count(&self, reaction: ReactionId) -> usize {
        self.cleanup.get(&reaction).map_or(0, HashSet::len)
    }

    /// Number of reactions with a cleanup entry.
    pub fn tracked_reactions(&self) -> usize {
        self.cleanup.len()
    }

    /// Number of objects with a connection table.
    pub fn tracked_objects(&self) -> usize {
        self.connections.len()
    }
}
