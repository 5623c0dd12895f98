//! One-shot deferred tasks, run by the engine on the fast tick once they fall due.
//!
//! There is no cancellation: a task whose preconditions have gone away by the time
//! it runs must be a no-op.

use std::time::Instant;

use crate::identity::ShortAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Encode and queue the pending configuration of a node.
    SendConfig(ShortAddr),
}

#[derive(Debug, Default)]
pub struct Deferred {
    tasks: Vec<(Instant, Task)>,
}

impl Deferred {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due: Instant, task: Task) {
        self.tasks.push((due, task));
    }

    /// Remove and return every task due at `now`, in scheduling order.
    pub fn take_due(&mut self, now: Instant) -> Vec<Task> {
        let mut due = Vec::new();
        self.tasks.retain(|&(at, task)| {
            if at <= now {
                due.push(task);
                false
            } else {
                true
            }
        });
        due
    }
}
