//! Dependency Graph
//!
//! This module implements the bookkeeping that connects tracked data to the
//! reactions that read it.
//!
//! # Overview
//!
//! The graph is bipartite and many-to-many:
//!
//! - One side is `(raw object, dependency key)` pairs
//! - The other side is reactions
//! - An edge means "this reaction read this key of this object"
//!
//! When a tracked key is written, we look up its bucket and enqueue every
//! reaction found there.
//!
//! # Design Decisions
//!
//! 1. Edges are stored keyed by `(object, key)` rather than by reaction:
//!    - Writes are the hot path and need lookup by `(object, key)`
//!    - Teardown by reaction is rare and goes through the reaction's own
//!      set of bucket references
//!
//! 2. Edges are never diffed between runs. Every run first releases all of
//!    the reaction's edges and then records the ones it reads again, so
//!    stale branches drop out.
//!
//! 3. Per-object tables hold their raw object weakly, and `sweep` drops the
//!    tables of objects that no longer exist.

mod key;
mod registry;

pub use key::{DepKey, EntryKey};
pub use registry::{DependencyRegistry, EdgeRef};
