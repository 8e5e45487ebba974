//! Reactive Runtime
//!
//! The runtime is the central coordinator. It owns the dependency registry,
//! the raw→view table, the running-reaction slot, and the pending set, and
//! it exposes the public surface: `observable`, `is_observable`, `observe`,
//! `unobserve`, `unqueue`, `exec` and `next_tick`.
//!
//! # How It Works
//!
//! 1. `observe` runs a reaction once, synchronously, inside the running
//!    slot. Every tracked read it performs records an edge.
//!
//! 2. A tracked write looks up the edges for `(object, key)` and adds each
//!    dependent reaction to the pending set.
//!
//! 3. The first enqueue of a batch schedules exactly one deferred flush on
//!    the executor. Later enqueues fold into the same batch.
//!
//! 4. The flush runs each pending reaction once, isolating failures so that
//!    one failing reaction never prevents its siblings from running.
//!
//! # Ownership
//!
//! A runtime is an explicitly constructed value; there is no global
//! instance. Views and deferred tasks refer back to it weakly, so reactions
//! capturing views do not keep the runtime alive.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tracing::{debug, error, trace, warn};

use super::context::RunningSlot;
use super::reaction::{Reaction, ReactionId, ReactionOutput, RuntimeId};
use super::tick::{Executor, MicrotaskQueue, NextTick};
use crate::config::{CascadePolicy, RuntimeConfig};
use crate::error::{Error, Result};
use crate::graph::{DepKey, DependencyRegistry};
use crate::observable::{Instrumentation, Observable, ViewInner};
use crate::value::{Object, ObjectId, Value};

pub(crate) struct RuntimeInner {
    id: RuntimeId,
    config: RuntimeConfig,
    executor: Rc<dyn Executor>,
    registry: RefCell<DependencyRegistry>,
    /// raw → view, held weakly.
    views: RefCell<HashMap<ObjectId, Weak<ViewInner>>>,
    running: RunningSlot,
    pending: RefCell<IndexMap<ReactionId, Reaction>>,
    flush_scheduled: Cell<bool>,
    /// View-table size at which `create_view` sweeps.
    sweep_at: Cell<usize>,
}

/// Lower bound for the view-table sweep threshold.
const MIN_SWEEP_AT: usize = 64;

/// A reactivity runtime instance.
///
/// Cloning yields another handle to the same runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

/// Builder for a [`Runtime`].
#[derive(Default)]
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    executor: Option<Rc<dyn Executor>>,
}

impl RuntimeBuilder {
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `executor` for deferred flushes instead of a private
    /// [`MicrotaskQueue`].
    pub fn executor(mut self, executor: impl Executor + 'static) -> Self {
        self.executor = Some(Rc::new(executor));
        self
    }

    pub fn build(self) -> Runtime {
        let executor = self
            .executor
            .unwrap_or_else(|| Rc::new(MicrotaskQueue::new()));
        Runtime {
            inner: Rc::new(RuntimeInner {
                id: RuntimeId::next(),
                config: self.config,
                executor,
                registry: RefCell::new(DependencyRegistry::new()),
                views: RefCell::new(HashMap::new()),
                running: RunningSlot::default(),
                pending: RefCell::new(IndexMap::new()),
                flush_scheduled: Cell::new(false),
                sweep_at: Cell::new(MIN_SWEEP_AT),
            }),
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// A runtime with the default configuration and a private
    /// [`MicrotaskQueue`], drained by [`Runtime::run_microtasks`].
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    pub fn id(&self) -> RuntimeId {
        self.inner.id
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub(crate) fn downgrade(&self) -> Weak<RuntimeInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn from_weak(weak: &Weak<RuntimeInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    // ------------------------------------------------------------------
    // Observables
    // ------------------------------------------------------------------

    /// Wrap `target` for tracking.
    ///
    /// - `Undefined`/`Null` wrap a fresh empty record.
    /// - A view is returned unchanged.
    /// - A raw object returns its view, creating one on first wrap. Opaque
    ///   built-ins (dates, patterns, host nodes) are returned unchanged.
    /// - Anything else is a type error.
    pub fn observable(&self, target: impl Into<Value>) -> Result<Value> {
        match target.into() {
            Value::Undefined | Value::Null => Ok(Value::View(self.create_view(
                &Object::record(),
                Instrumentation::Plain,
            ))),
            Value::View(view) => Ok(Value::View(view)),
            Value::Object(raw) => Ok(match self.wrap(&raw) {
                Some(view) => Value::View(view),
                None => Value::Object(raw),
            }),
            other => Err(Error::NotAnObject(other.type_name())),
        }
    }

    /// The view for `raw`, or `None` if `raw` is an opaque built-in.
    pub fn wrap(&self, raw: &Object) -> Option<Observable> {
        if let Some(view) = self.cached_view(raw) {
            return Some(view);
        }
        match Instrumentation::for_kind(raw.kind()) {
            Instrumentation::Opaque => None,
            instrumentation => Some(self.create_view(raw, instrumentation)),
        }
    }

    /// Whether `value` is an observable view.
    pub fn is_observable(&self, value: &Value) -> Result<bool> {
        match value {
            Value::View(_) => Ok(true),
            Value::Object(_) => Ok(false),
            other => Err(Error::NotAnObject(other.type_name())),
        }
    }

    /// The existing view of `raw`, if one is alive.
    pub(crate) fn cached_view(&self, raw: &Object) -> Option<Observable> {
        self.inner
            .views
            .borrow()
            .get(&raw.id())
            .and_then(Weak::upgrade)
            .map(Observable::from_inner)
    }

    fn create_view(&self, raw: &Object, instrumentation: Instrumentation) -> Observable {
        self.maybe_sweep();
        self.inner.registry.borrow_mut().store_object(raw);
        let view = Observable::new(raw.clone(), instrumentation, self.downgrade());
        self.inner
            .views
            .borrow_mut()
            .insert(raw.id(), view.downgrade());
        trace!(object = raw.id().raw(), ?instrumentation, "created view");
        view
    }

    // ------------------------------------------------------------------
    // Reactions
    // ------------------------------------------------------------------

    /// Register `body` as a reaction and run it once, synchronously.
    ///
    /// If the first run fails the error is returned; edges recorded before
    /// the failure stay registered.
    pub fn observe<F, R>(&self, body: F) -> Result<Reaction>
    where
        F: Fn() -> R + 'static,
        R: ReactionOutput,
    {
        let reaction = Reaction::new(self.id(), body);
        self.inner.registry.borrow_mut().store_reaction(reaction.id());
        debug!(reaction = ?reaction.id(), "observing reaction");
        self.run_reaction(&reaction)?;
        Ok(reaction)
    }

    /// [`Runtime::observe`] for a dynamically typed value, which must be
    /// callable. The function is invoked with no arguments.
    pub fn observe_value(&self, value: &Value) -> Result<Reaction> {
        let func = value
            .as_func()
            .cloned()
            .ok_or(Error::NotCallable(value.type_name()))?;
        self.observe(move || {
            func.call(&[]);
        })
    }

    /// Drop `reaction` from the pending set and release all its edges.
    pub fn unobserve(&self, reaction: &Reaction) -> Result<()> {
        self.check_owned(reaction)?;
        self.inner.pending.borrow_mut().shift_remove(&reaction.id());
        let released = self
            .inner
            .registry
            .borrow_mut()
            .forget_reaction(reaction.id());
        debug!(reaction = ?reaction.id(), released, "unobserved reaction");
        Ok(())
    }

    /// Drop `reaction` from the pending set only. Its edges stay alive.
    pub fn unqueue(&self, reaction: &Reaction) -> Result<()> {
        self.check_owned(reaction)?;
        self.inner.pending.borrow_mut().shift_remove(&reaction.id());
        Ok(())
    }

    /// Run `reaction` now, bypassing the pending set.
    ///
    /// An unobserved reaction re-establishes its edges by running.
    pub fn exec(&self, reaction: &Reaction) -> Result<()> {
        self.check_owned(reaction)?;
        self.inner.registry.borrow_mut().store_reaction(reaction.id());
        self.run_reaction(reaction)
    }

    fn check_owned(&self, reaction: &Reaction) -> Result<()> {
        if reaction.runtime() == self.id() {
            Ok(())
        } else {
            Err(Error::ForeignReaction(reaction.id()))
        }
    }

    /// Edges are rebuilt from scratch on every run.
    fn run_reaction(&self, reaction: &Reaction) -> Result<()> {
        self.inner
            .registry
            .borrow_mut()
            .release_all_edges(reaction.id());
        let _running = self.inner.running.enter(reaction.clone());
        reaction.invoke().map_err(|source| Error::Reaction {
            id: reaction.id(),
            message: source.to_string(),
        })
    }

    /// Run a reaction, converting a panic into an error.
    fn run_isolated(&self, reaction: &Reaction) -> Result<()> {
        match catch_unwind(AssertUnwindSafe(|| self.run_reaction(reaction))) {
            Ok(result) => result,
            Err(payload) => Err(Error::Reaction {
                id: reaction.id(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }

    /// Whether a reaction is currently running.
    pub fn is_running(&self) -> bool {
        self.inner.running.is_active()
    }

    /// The reaction currently running, if any.
    pub fn current_reaction(&self) -> Option<Reaction> {
        self.inner.running.current()
    }

    // ------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------

    /// Record a read of `(raw, key)` against the running reaction.
    pub(crate) fn register_read(&self, raw: &Object, key: DepKey) {
        if let Some(reaction) = self.inner.running.current() {
            self.inner
                .registry
                .borrow_mut()
                .register_edge(raw, key, &reaction);
        }
    }

    /// Enqueue every reaction depending on `(raw, key)`.
    pub(crate) fn queue_reactions(&self, raw: &Object, key: DepKey) {
        let dependents = self.inner.registry.borrow().dependents(raw.id(), &key);
        if dependents.is_empty() {
            return;
        }

        {
            let mut pending = self.inner.pending.borrow_mut();
            for reaction in dependents {
                trace!(object = raw.id().raw(), ?key, reaction = ?reaction.id(), "queued reaction");
                pending.insert(reaction.id(), reaction);
            }
        }
        self.schedule_flush();
    }

    fn schedule_flush(&self) {
        if self.inner.flush_scheduled.replace(true) {
            return;
        }
        let weak = self.downgrade();
        self.inner.executor.schedule_deferred(Box::new(move || {
            if let Some(runtime) = Runtime::from_weak(&weak) {
                if let Err(err) = runtime.flush() {
                    error!(%err, "deferred flush failed");
                }
            }
        }));
    }

    /// Number of reactions awaiting the next flush.
    pub fn pending_len(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    /// Whether `reaction` is awaiting the next flush.
    pub fn is_pending(&self, reaction: &Reaction) -> bool {
        self.inner.pending.borrow().contains_key(&reaction.id())
    }

    /// Number of edges `reaction` currently holds.
    pub fn edge_count(&self, reaction: &Reaction) -> usize {
        self.inner.registry.borrow().edge_count(reaction.id())
    }

    // ------------------------------------------------------------------
    // Flushing
    // ------------------------------------------------------------------

    /// Run every pending reaction once. Returns the number of runs.
    ///
    /// Normally invoked by the executor; calling it directly settles the
    /// pending set synchronously.
    pub fn flush(&self) -> Result<usize> {
        debug!(pending = self.pending_len(), policy = ?self.inner.config.cascade, "flushing reactions");
        let mut failures = Vec::new();

        let outcome = match self.inner.config.cascade {
            CascadePolicy::SamePass => self.drain_live(&mut failures),
            CascadePolicy::NextTick => Ok(self.drain_snapshot(&mut failures)),
        };

        if self.inner.config.sweep_after_flush {
            self.sweep();
        }

        let runs = outcome?;
        debug!(runs, failed = failures.len(), "flush complete");
        if failures.is_empty() {
            Ok(runs)
        } else {
            Err(Error::Flush { failures })
        }
    }

    /// Drain the live pending set, including reactions enqueued mid-flush.
    fn drain_live(&self, failures: &mut Vec<Error>) -> Result<usize> {
        let limit = self.inner.config.max_flush_runs;
        let mut runs = 0;

        loop {
            let next = self.inner.pending.borrow_mut().shift_remove_index(0);
            let Some((_, reaction)) = next else {
                break;
            };

            if runs >= limit {
                let dropped = {
                    let mut pending = self.inner.pending.borrow_mut();
                    let dropped = pending.len() + 1;
                    pending.clear();
                    dropped
                };
                self.inner.flush_scheduled.set(false);
                for failure in failures.drain(..) {
                    warn!(%failure, "reaction failed during flush");
                }
                error!(limit, dropped, "flush exceeded its run budget");
                return Err(Error::CascadeLimit { limit, dropped });
            }

            runs += 1;
            if let Err(failure) = self.run_isolated(&reaction) {
                warn!(%failure, "reaction failed during flush");
                failures.push(failure);
            }
        }

        self.inner.flush_scheduled.set(false);
        Ok(runs)
    }

    /// Run the reactions pending at flush start; later ones wait for the
    /// next deferred flush.
    fn drain_snapshot(&self, failures: &mut Vec<Error>) -> usize {
        self.inner.flush_scheduled.set(false);
        let batch: Vec<ReactionId> = self.inner.pending.borrow().keys().copied().collect();
        let mut runs = 0;

        for id in batch {
            // Skips reactions unqueued by an earlier reaction in this batch.
            let next = self.inner.pending.borrow_mut().shift_remove(&id);
            let Some(reaction) = next else {
                continue;
            };
            runs += 1;
            if let Err(failure) = self.run_isolated(&reaction) {
                warn!(%failure, "reaction failed during flush");
                failures.push(failure);
            }
        }

        if self.pending_len() > 0 {
            self.schedule_flush();
        }
        runs
    }

    /// Drop bookkeeping for raw objects and views that no longer exist.
    /// Returns the number of object tables dropped.
    pub fn sweep(&self) -> usize {
        self.inner
            .views
            .borrow_mut()
            .retain(|_, view| view.strong_count() > 0);
        self.inner.registry.borrow_mut().sweep()
    }

    /// Sweep once the view table has doubled since the last sweep, so
    /// runtimes that never flush still reclaim dropped objects.
    fn maybe_sweep(&self) {
        if self.inner.views.borrow().len() < self.inner.sweep_at.get() {
            return;
        }
        self.sweep();
        let live = self.inner.views.borrow().len();
        self.inner.sweep_at.set((live * 2).max(MIN_SWEEP_AT));
    }

    /// Number of raw objects with dependency tables.
    pub fn tracked_objects(&self) -> usize {
        self.inner.registry.borrow().tracked_objects()
    }

    // ------------------------------------------------------------------
    // Deferred execution
    // ------------------------------------------------------------------

    /// Schedule `f` on this runtime's executor. The returned future
    /// resolves with `f`'s result.
    pub fn next_tick<F, T>(&self, f: F) -> NextTick<T>
    where
        F: FnOnce() -> T + 'static,
        T: 'static,
    {
        NextTick::schedule(self.inner.executor.as_ref(), f)
    }

    /// Drain the executor's queue. Returns the number of tasks run, or 0
    /// for self-driving executors.
    pub fn run_microtasks(&self) -> usize {
        self.inner.executor.run_until_idle()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "reaction panicked".to_string()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("id", &self.inner.id)
            .field("pending", &self.pending_len())
            .field("tracked_objects", &self.tracked_objects())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
