#![forbid(unsafe_code)]

//! Ordered set of observers and the per-commit broadcast.
//!
//! # Invariants
//!
//! 1. Observers are visited in registration order.
//! 2. One broadcast pass sees one snapshot; a commit that happens while a
//!    pass is running (an observer callback updating the store) is queued and
//!    broadcast after the pass, so no observer ever sees an older snapshot
//!    after a newer one.
//! 3. An observer removed during a pass is not visited for the rest of it.
//! 4. `unregister` is idempotent.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Stable handle for one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl ObserverId {
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Something that re-evaluates itself against each committed snapshot.
pub trait Observe<S> {
    /// Recompute against `snapshot`. Returns true if the observer fired.
    fn observe(&self, snapshot: &Rc<S>) -> bool;
}

struct Slot<S> {
    id: ObserverId,
    attached: Cell<bool>,
    observer: Rc<dyn Observe<S>>,
}

/// Ends a broadcast pass even if an observer panics: the dispatch flag is
/// reset and a snapshot queued by the aborted pass is dropped.
struct DispatchGuard<'a, S> {
    dispatching: &'a Cell<bool>,
    queued: &'a RefCell<Option<Rc<S>>>,
}

impl<S> Drop for DispatchGuard<'_, S> {
    fn drop(&mut self) {
        if self.queued.take().is_some() {
            tracing::trace!("queued broadcast dropped with its pass");
        }
        self.dispatching.set(false);
    }
}

pub struct SubscriptionRegistry<S> {
    slots: RefCell<Vec<Rc<Slot<S>>>>,
    next_id: Cell<u64>,
    dispatching: Cell<bool>,
    queued: RefCell<Option<Rc<S>>>,
}

impl<S> Default for SubscriptionRegistry<S> {
    fn default() -> Self {
        Self {
            slots: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
            dispatching: Cell::new(false),
            queued: RefCell::new(None),
        }
    }
}

impl<S> fmt::Debug for SubscriptionRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("observers", &self.len())
            .field("dispatching", &self.dispatching.get())
            .finish()
    }
}

impl<S> SubscriptionRegistry<S> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, observer: Rc<dyn Observe<S>>) -> ObserverId {
        let id = ObserverId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.slots.borrow_mut().push(Rc::new(Slot {
            id,
            attached: Cell::new(true),
            observer,
        }));
        id
    }

    /// Remove an observer. Returns false if it was already gone.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut slots = self.slots.borrow_mut();
        match slots.iter().position(|slot| slot.id == id) {
            Some(idx) => {
                slots.remove(idx).attached.set(false);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn contains(&self, id: ObserverId) -> bool {
        self.slots.borrow().iter().any(|slot| slot.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }

    #[must_use]
    pub fn is_dispatching(&self) -> bool {
        self.dispatching.get()
    }

    /// Broadcast `snapshot` to every observer. Returns how many fired.
    ///
    /// Called re-entrantly (from inside an observer), the snapshot is queued
    /// and the outer pass broadcasts it once the current pass finishes; the
    /// nested call returns 0.
    pub fn notify_all(&self, snapshot: &Rc<S>) -> usize {
        if self.dispatching.replace(true) {
            tracing::trace!("broadcast queued behind running pass");
            *self.queued.borrow_mut() = Some(Rc::clone(snapshot));
            return 0;
        }
        let _guard = DispatchGuard {
            dispatching: &self.dispatching,
            queued: &self.queued,
        };

        let mut current = Rc::clone(snapshot);
        let mut fired = 0;
        loop {
            let slots: Vec<Rc<Slot<S>>> = self.slots.borrow().clone();
            for slot in &slots {
                if slot.attached.get() && slot.observer.observe(&current) {
                    tracing::trace!(observer = slot.id.0, "observer fired");
                    fired += 1;
                }
            }
            let next = self.queued.borrow_mut().take();
            match next {
                Some(next) => current = next,
                None => break,
            }
        }
        fired
    }
}
