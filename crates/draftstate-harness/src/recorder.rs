#![forbid(unsafe_code)]

//! Notification recorder.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use draftstate_runtime::Selection;

/// Shared log of observed values. Clones append to the same log.
pub struct Recorder<T> {
    seen: Rc<RefCell<Vec<T>>>,
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self {
            seen: Rc::clone(&self.seen),
        }
    }
}

impl<T> Default for Recorder<T> {
    fn default() -> Self {
        Self {
            seen: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Recorder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.seen.borrow().iter()).finish()
    }
}

impl<T: Clone + 'static> Recorder<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the selection's current value, then every change it is
    /// notified of. Replaces any callback already installed.
    #[must_use]
    pub fn follow<S, D>(selection: &Selection<S, D, T>) -> Self {
        let recorder = Self::new();
        recorder.push(selection.get());
        let sink = recorder.clone();
        selection.on_change(move |value| sink.push(value.clone()));
        recorder
    }

    pub fn push(&self, value: T) {
        self.seen.borrow_mut().push(value);
    }

    /// Copy of everything recorded so far.
    #[must_use]
    pub fn values(&self) -> Vec<T> {
        self.seen.borrow().clone()
    }

    #[must_use]
    pub fn last(&self) -> Option<T> {
        self.seen.borrow().last().cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.borrow().is_empty()
    }

    /// Take the log, leaving it empty.
    pub fn drain(&self) -> Vec<T> {
        std::mem::take(&mut *self.seen.borrow_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use draftstate_runtime::define;

    #[derive(Debug, Clone, PartialEq)]
    struct Pair {
        left: i32,
        right: i32,
    }

    #[test]
    fn follow_records_initial_and_changes() {
        let store = define::<Pair>();
        store.setup(Pair { left: 0, right: 0 }).unwrap();
        let sel = store.select(|s| s.left).unwrap();
        let rec = Recorder::follow(&sel);

        let _ = store.update(|tx| tx.write(|s| s.left = 1)).unwrap();
        let _ = store.update(|tx| tx.write(|s| s.right = 1)).unwrap();
        let _ = store.update(|tx| tx.write(|s| s.left = 2)).unwrap();

        assert_eq!(rec.values(), vec![0, 1, 2]);
        assert_eq!(rec.last(), Some(2));
        assert_eq!(rec.drain().len(), 3);
        assert!(rec.is_empty());
    }

    #[test]
    fn clones_share_the_log() {
        let rec = Recorder::<&str>::new();
        rec.clone().push("a");
        assert_eq!(rec.len(), 1);
        assert_eq!(format!("{rec:?}"), "[\"a\"]");
    }
}
