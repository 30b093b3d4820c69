#![forbid(unsafe_code)]

//! Observer handles: a projection of the state kept current across commits.
//!
//! A [`Selection`] is what UI glue holds for as long as the consumer is
//! mounted. It registers on creation and unregisters on drop (or on an
//! explicit [`detach`](Selection::detach)).
//!
//! # Invariants
//!
//! 1. The stored value changes only when the fresh projection is not
//!    shallow-equal to it.
//! 2. `version()` and the change callback move together, once per commit
//!    that changed the stored value.
//! 3. A dependency change refreshes the stored value without touching
//!    `version()` or the callback.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use draftstate_core::shallow::ShallowEq;
use draftstate_core::{Result, StateError};

use crate::registry::{ObserverId, Observe};
use crate::store::Shared;

pub(crate) type SelectFn<S, D, T> = Box<dyn Fn(&Rc<S>, &D) -> T>;

type ChangeFn<T> = Box<dyn FnMut(&T)>;

pub(crate) struct ObserverEntry<S, D, T> {
    select: SelectFn<S, D, T>,
    deps: RefCell<D>,
    last: RefCell<T>,
    version: Cell<u64>,
    on_change: RefCell<Option<ChangeFn<T>>>,
}

impl<S, D, T: Clone> ObserverEntry<S, D, T> {
    pub(crate) fn new(select: SelectFn<S, D, T>, deps: D, snapshot: &Rc<S>) -> Self {
        let initial = select(snapshot, &deps);
        Self {
            select,
            deps: RefCell::new(deps),
            last: RefCell::new(initial),
            version: Cell::new(0),
            on_change: RefCell::new(None),
        }
    }

    fn fire(&self, value: &T) {
        // Take the callback out so it may re-enter this selection.
        let callback = self.on_change.borrow_mut().take();
        if let Some(mut callback) = callback {
            callback(value);
            let mut slot = self.on_change.borrow_mut();
            if slot.is_none() {
                *slot = Some(callback);
            }
        }
    }
}

impl<S, D, T: ShallowEq + Clone> Observe<S> for ObserverEntry<S, D, T> {
    fn observe(&self, snapshot: &Rc<S>) -> bool {
        let next = (self.select)(snapshot, &self.deps.borrow());
        if next.shallow_eq(&self.last.borrow()) {
            return false;
        }
        *self.last.borrow_mut() = next.clone();
        self.version.set(self.version.get() + 1);
        self.fire(&next);
        true
    }
}

/// A registered projection of a store's state.
pub struct Selection<S, D, T> {
    entry: Rc<ObserverEntry<S, D, T>>,
    id: ObserverId,
    store: Weak<Shared<S>>,
    attached: Cell<bool>,
}

impl<S, D, T: fmt::Debug> fmt::Debug for Selection<S, D, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selection")
            .field("id", &self.id)
            .field("value", &self.entry.last.borrow())
            .field("version", &self.entry.version.get())
            .field("attached", &self.attached.get())
            .finish()
    }
}

impl<S, D, T> Selection<S, D, T> {
    pub(crate) fn new(
        entry: Rc<ObserverEntry<S, D, T>>,
        id: ObserverId,
        store: Weak<Shared<S>>,
    ) -> Self {
        Self {
            entry,
            id,
            store,
            attached: Cell::new(true),
        }
    }

    #[must_use]
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Latest selected value.
    #[must_use]
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.entry.last.borrow().clone()
    }

    /// Borrow the latest selected value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.entry.last.borrow())
    }

    /// Number of commits that changed this selection.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.entry.version.get()
    }

    /// Install the callback fired when a commit changes the selection.
    pub fn on_change(&self, callback: impl FnMut(&T) + 'static) {
        *self.entry.on_change.borrow_mut() = Some(Box::new(callback));
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attached.get()
    }

    /// Unregister. Safe to call more than once; returns whether this call
    /// removed the registration.
    pub fn detach(&self) -> bool {
        if !self.attached.replace(false) {
            return false;
        }
        self.store
            .upgrade()
            .is_some_and(|store| store.registry.unregister(self.id))
    }
}

impl<S, D: PartialEq, T: ShallowEq> Selection<S, D, T> {
    /// Replace the dependency value.
    ///
    /// When `deps` differs from the previous value the projection is
    /// recomputed against the current snapshot and stored if it is not
    /// shallow-equal. This is not a notification: `version()` does not move
    /// and the change callback does not run. Returns whether the stored
    /// value changed.
    pub fn set_deps(&self, deps: D) -> Result<bool> {
        if *self.entry.deps.borrow() == deps {
            return Ok(false);
        }
        *self.entry.deps.borrow_mut() = deps;

        let store = self.store.upgrade().ok_or(StateError::Uninitialized)?;
        let snapshot = store
            .current
            .borrow()
            .clone()
            .ok_or(StateError::Uninitialized)?;
        let next = (self.entry.select)(&snapshot, &self.entry.deps.borrow());
        if next.shallow_eq(&self.entry.last.borrow()) {
            return Ok(false);
        }
        *self.entry.last.borrow_mut() = next;
        Ok(true)
    }
}

impl<S, D, T> Drop for Selection<S, D, T> {
    fn drop(&mut self) {
        self.detach();
    }
}
