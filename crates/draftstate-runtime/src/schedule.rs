#![forbid(unsafe_code)]

//! "Next tick" deferral for notifications that must not run inline.
//!
//! A repeated `setup` with live observers hands its notification to a
//! [`Schedule`] so observers are not re-entered while they may still be
//! initialising. The default [`TickQueue`] holds tasks until the owner
//! flushes it; [`Immediate`] runs them inline; a `futures` `LocalSpawner`
//! runs them on the executor's next pass.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;

use futures::executor::LocalSpawner;
use futures::task::LocalSpawnExt;

/// A deferred unit of work.
pub type Task = Box<dyn FnOnce()>;

/// Where deferred tasks run.
pub trait Schedule {
    /// Queue `task` to run after the current call stack unwinds.
    fn defer(&self, task: Task);

    /// Run whatever this scheduler holds. Returns the number of tasks run.
    fn flush(&self) -> usize {
        0
    }
}

/// Runs every task inline.
#[derive(Debug, Clone, Copy, Default)]
pub struct Immediate;

impl Schedule for Immediate {
    fn defer(&self, task: Task) {
        task();
    }
}

/// FIFO of tasks drained by [`Schedule::flush`].
#[derive(Default)]
pub struct TickQueue {
    tasks: RefCell<VecDeque<Task>>,
}

impl TickQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }
}

impl fmt::Debug for TickQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TickQueue")
            .field("pending", &self.len())
            .finish()
    }
}

impl Schedule for TickQueue {
    fn defer(&self, task: Task) {
        self.tasks.borrow_mut().push_back(task);
    }

    fn flush(&self) -> usize {
        let mut ran = 0;
        // Tasks may defer more work; pop one at a time so the borrow is
        // released before each task runs.
        loop {
            let next = self.tasks.borrow_mut().pop_front();
            let Some(task) = next else { break };
            task();
            ran += 1;
        }
        ran
    }
}

impl Schedule for LocalSpawner {
    fn defer(&self, task: Task) {
        if let Err(err) = self.spawn_local(async move { task() }) {
            tracing::warn!(error = %err, "executor shut down; deferred task dropped");
        }
    }
}
