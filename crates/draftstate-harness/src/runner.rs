#![forbid(unsafe_code)]

//! Single-threaded executor for staged updates.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::executor::{LocalPool, LocalSpawner};
use futures::task::{LocalSpawnExt, SpawnError};

/// Where a spawned future's output lands once it completes.
pub struct Outcome<T> {
    slot: Rc<RefCell<Option<T>>>,
}

impl<T> Outcome<T> {
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Take the output, if the future has completed.
    pub fn take(&self) -> Option<T> {
        self.slot.borrow_mut().take()
    }
}

impl<T: fmt::Debug> fmt::Debug for Outcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Outcome").field(&self.slot.borrow()).finish()
    }
}

/// `LocalPool` wrapper that keeps spawned outputs observable.
pub struct LocalRunner {
    pool: LocalPool,
}

impl Default for LocalRunner {
    fn default() -> Self {
        Self {
            pool: LocalPool::new(),
        }
    }
}

impl fmt::Debug for LocalRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalRunner").finish_non_exhaustive()
    }
}

impl LocalRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawner for this runner, usable as a store `Schedule`.
    #[must_use]
    pub fn spawner(&self) -> LocalSpawner {
        self.pool.spawner()
    }

    /// Spawn `fut`; its output is stored in the returned [`Outcome`].
    pub fn spawn<F>(&self, fut: F) -> Result<Outcome<F::Output>, SpawnError>
    where
        F: Future + 'static,
    {
        let slot = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&slot);
        self.pool.spawner().spawn_local(async move {
            let output = fut.await;
            *sink.borrow_mut() = Some(output);
        })?;
        Ok(Outcome { slot })
    }

    /// Poll every spawned future until none can make progress.
    pub fn run_until_stalled(&mut self) {
        self.pool.run_until_stalled();
    }

    /// Run `fut` to completion on this pool.
    pub fn block_on<F: Future>(&mut self, fut: F) -> F::Output {
        self.pool.run_until(fut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::manual_op;

    #[test]
    fn outcome_fills_after_settle() {
        let mut runner = LocalRunner::new();
        let (op, handle) = manual_op::<u8>();
        let out = runner.spawn(op).unwrap();

        runner.run_until_stalled();
        assert!(!out.is_done());

        handle.resolve(3);
        runner.run_until_stalled();
        assert_eq!(out.take(), Some(Ok(3)));
    }

    #[test]
    fn block_on_runs_spawned_work_too() {
        let mut runner = LocalRunner::new();
        let flag = runner.spawn(async { 1 }).unwrap();
        assert_eq!(runner.block_on(async { 2 }), 2);
        runner.run_until_stalled();
        assert_eq!(flag.take(), Some(1));
    }
}
