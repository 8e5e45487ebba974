//! Reaction types for the reactive system.
//!
//! A Reaction is any computation that should re-run when the tracked data
//! it read changes. Handles are cheap to clone and compare by identity.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::BoxError;

/// Unique identifier for a reaction.
///
/// Each reaction gets a unique ID when it is observed. This ID keys the
/// registry buckets and the pending set, which is what deduplicates a
/// reaction enqueued several times before a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReactionId(u64);

impl ReactionId {
    /// Generate a new unique reaction ID.
    ///
    /// Uses an atomic counter so IDs stay unique across runtime instances.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ReactionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a runtime instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuntimeId(u64);

impl RuntimeId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// What a reaction body may return.
///
/// Bodies returning `()` never fail. Bodies returning `Result` fail with
/// their error, which the runtime surfaces from the run that executed them.
pub trait ReactionOutput {
    fn into_result(self) -> Result<(), BoxError>;
}

impl ReactionOutput for () {
    fn into_result(self) -> Result<(), BoxError> {
        Ok(())
    }
}

impl<E> ReactionOutput for Result<(), E>
where
    E: Into<BoxError>,
{
    fn into_result(self) -> Result<(), BoxError> {
        self.map_err(Into::into)
    }
}

struct ReactionInner {
    id: ReactionId,
    runtime: RuntimeId,
    /// The body, type-erased to a uniform fallible signature.
    body: Box<dyn Fn() -> Result<(), BoxError>>,
    run_count: Cell<usize>,
}

/// A handle to an observed reaction.
///
/// Returned by `Runtime::observe` and accepted by `unobserve`, `unqueue`
/// and `exec`.
#[derive(Clone)]
pub struct Reaction {
    inner: Rc<ReactionInner>,
}

impl Reaction {
    pub(crate) fn new<F, R>(runtime: RuntimeId, body: F) -> Self
    where
        F: Fn() -> R + 'static,
        R: ReactionOutput,
    {
        Self {
            inner: Rc::new(ReactionInner {
                id: ReactionId::new(),
                runtime,
                body: Box::new(move || body().into_result()),
                run_count: Cell::new(0),
            }),
        }
    }

    /// Get the reaction's unique ID.
    pub fn id(&self) -> ReactionId {
        self.inner.id
    }

    pub(crate) fn runtime(&self) -> RuntimeId {
        self.inner.runtime
    }

    /// Number of times the body has been invoked.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Invoke the body. Callers are responsible for the running slot.
    pub(crate) fn invoke(&self) -> Result<(), BoxError> {
        self.inner.run_count.set(self.inner.run_count.get() + 1);
        (self.inner.body)()
    }
}

impl PartialEq for Reaction {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Reaction {}

impl fmt::Debug for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reaction")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .finish()
    }
}
