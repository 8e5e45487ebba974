//! Deferred Execution
//!
//! The scheduler never runs a flush inline. It hands one task to an
//! [`Executor`], which runs it after the current synchronous work unwinds.
//!
//! Two executors are provided:
//!
//! - [`MicrotaskQueue`]: an in-process FIFO queue drained explicitly with
//!   `run_until_idle`. This is the default, and what tests use.
//! - [`TokioExecutor`]: defers through `tokio::task::spawn_local`, for hosts
//!   already running a current-thread tokio runtime with a `LocalSet`.
//!
//! Tasks run in the order they were scheduled.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// A deferred unit of work.
pub type Task = Box<dyn FnOnce() + 'static>;

/// Runs tasks after the current synchronous execution unwinds.
pub trait Executor {
    /// Schedule `task` to run once, later.
    fn schedule_deferred(&self, task: Task);

    /// Run every queued task, including tasks queued while draining.
    /// Returns the number of tasks run.
    ///
    /// Executors that drive themselves return 0.
    fn run_until_idle(&self) -> usize {
        0
    }
}

/// An explicitly drained FIFO task queue.
#[derive(Clone, Default)]
pub struct MicrotaskQueue {
    tasks: Rc<RefCell<VecDeque<Task>>>,
}

impl MicrotaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }
}

impl Executor for MicrotaskQueue {
    fn schedule_deferred(&self, task: Task) {
        self.tasks.borrow_mut().push_back(task);
    }

    fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        loop {
            // The borrow ends before the task runs; tasks may enqueue more.
            let next = self.tasks.borrow_mut().pop_front();
            match next {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

/// Defers tasks onto the current tokio `LocalSet`.
///
/// Scheduling panics outside a `LocalSet`, as `spawn_local` does.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioExecutor;

impl Executor for TokioExecutor {
    fn schedule_deferred(&self, task: Task) {
        tokio::task::spawn_local(async move { task() });
    }
}

struct TickState<T> {
    value: Option<T>,
    waker: Option<Waker>,
}

/// Future returned by `Runtime::next_tick`.
///
/// Resolves with the scheduled function's result once the executor has run
/// it.
pub struct NextTick<T> {
    state: Rc<RefCell<TickState<T>>>,
}

impl<T: 'static> NextTick<T> {
    pub(crate) fn schedule<F>(executor: &dyn Executor, f: F) -> Self
    where
        F: FnOnce() -> T + 'static,
    {
        let state = Rc::new(RefCell::new(TickState {
            value: None,
            waker: None,
        }));

        let task_state = Rc::clone(&state);
        executor.schedule_deferred(Box::new(move || {
            let value = f();
            let waker = {
                let mut state = task_state.borrow_mut();
                state.value = Some(value);
                state.waker.take()
            };
            if let Some(waker) = waker {
                waker.wake();
            }
        }));

        Self { state }
    }

    /// Whether the scheduled function has run.
    pub fn is_ready(&self) -> bool {
        self.state.borrow().value.is_some()
    }
}

impl<T> Future for NextTick<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let mut state = self.state.borrow_mut();
        match state.value.take() {
            Some(value) => Poll::Ready(value),
            None => {
                state.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use std::cell::Cell;

    #[test]
    fn queue_runs_tasks_in_order() {
        let queue = MicrotaskQueue::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        for i in 0..3 {
            let log = log.clone();
            queue.schedule_deferred(Box::new(move || log.borrow_mut().push(i)));
        }

        assert_eq!(queue.len(), 3);
        assert!(log.borrow().is_empty());
        assert_eq!(queue.run_until_idle(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn queue_drains_tasks_scheduled_while_draining() {
        let queue = MicrotaskQueue::new();
        let ran = Rc::new(Cell::new(0));

        let inner_queue = queue.clone();
        let inner_ran = ran.clone();
        queue.schedule_deferred(Box::new(move || {
            let ran = inner_ran.clone();
            inner_queue.schedule_deferred(Box::new(move || ran.set(ran.get() + 1)));
            inner_ran.set(inner_ran.get() + 1);
        }));

        assert_eq!(queue.run_until_idle(), 2);
        assert_eq!(ran.get(), 2);
    }

    #[test]
    fn next_tick_resolves_after_drain() {
        let queue = MicrotaskQueue::new();
        let tick = NextTick::schedule(&queue, || 42);

        assert!(!tick.is_ready());
        let mut tick = tick;
        assert_eq!((&mut tick).now_or_never(), None);

        queue.run_until_idle();
        assert!(tick.is_ready());
        assert_eq!(tick.now_or_never(), Some(42));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn tokio_executor_runs_on_local_set() {
        let local = tokio::task::LocalSet::new();
        let value = local
            .run_until(async { NextTick::schedule(&TokioExecutor, || "done").await })
            .await;
        assert_eq!(value, "done");
    }
}
