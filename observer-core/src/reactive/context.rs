//! Running Reaction Slot
//!
//! The slot records which reaction is currently running. Tracked reads
//! attribute their dependency edge to it.
//!
//! # Implementation
//!
//! Entering the slot returns a guard. Dropping the guard restores whatever
//! occupied the slot before, which is nothing unless `exec` or `observe`
//! was called from inside another reaction. Because restoration happens in
//! `Drop`, the slot is released on every exit path, including a panicking
//! reaction body.

use std::cell::RefCell;

use super::Reaction;

/// The "currently running reaction" slot of one runtime.
#[derive(Default)]
pub struct RunningSlot {
    current: RefCell<Option<Reaction>>,
}

/// Guard that restores the slot when dropped.
pub struct RunningGuard<'a> {
    slot: &'a RunningSlot,
    previous: Option<Reaction>,
}

impl RunningSlot {
    /// Make `reaction` the running reaction until the guard is dropped.
    pub fn enter(&self, reaction: Reaction) -> RunningGuard<'_> {
        let previous = self.current.replace(Some(reaction));
        RunningGuard {
            slot: self,
            previous,
        }
    }

    /// Check if a reaction is running.
    pub fn is_active(&self) -> bool {
        self.current.borrow().is_some()
    }

    /// The running reaction, if any.
    pub fn current(&self) -> Option<Reaction> {
        self.current.borrow().clone()
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        *self.slot.current.borrow_mut() = self.previous.take();
    }
}
