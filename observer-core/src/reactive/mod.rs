//! Reactions and Scheduling
//!
//! This module implements the scheduling half of the reactive system:
//! reaction handles, the running-reaction slot, deferred execution, and the
//! runtime that ties them to the dependency registry.
//!
//! # Concepts
//!
//! ## Reactions
//!
//! A Reaction is a zero-argument computation. While it runs, every tracked
//! read it performs records a dependency edge. When any of those
//! dependencies is written, the reaction is queued to run again.
//!
//! ## Batching
//!
//! Writes never run reactions inline. The first write that queues a
//! reaction schedules one deferred flush; every further write in the same
//! synchronous turn folds into that batch. A reaction queued several times
//! runs once per flush.
//!
//! ## Deferred Execution
//!
//! The flush runs on an [`Executor`], which runs tasks after the current
//! synchronous work unwinds. The same executor backs
//! [`Runtime::next_tick`].
//!
//! # Implementation Notes
//!
//! The runtime is single-threaded (`Rc`/`RefCell`). Substituting real
//! parallelism would require mutual exclusion around the registry and the
//! pending set.

mod context;
mod reaction;
mod runtime;
mod tick;

pub use context::{RunningGuard, RunningSlot};
pub use reaction::{Reaction, ReactionId, ReactionOutput, RuntimeId};
pub use runtime::{Runtime, RuntimeBuilder};
pub(crate) use runtime::RuntimeInner;
pub use tick::{Executor, MicrotaskQueue, NextTick, Task, TokioExecutor};
