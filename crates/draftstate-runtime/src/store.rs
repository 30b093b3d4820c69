#![forbid(unsafe_code)]

//! The state container façade.
//!
//! A [`Store`] owns exactly one committed snapshot, one live draft, one
//! active-transaction flag, and one observer registry. Cloning a `Store`
//! creates another handle to the same container.
//!
//! # Example
//!
//! ```
//! use draftstate_runtime::define;
//!
//! #[derive(Clone, PartialEq)]
//! struct Counter {
//!     a: i32,
//! }
//!
//! let store = define::<Counter>();
//! store.setup(Counter { a: 1 }).unwrap();
//!
//! let seen = store.select(|s| s.a).unwrap();
//! let _ = store.update(|tx| tx.write(|s| s.a += 1)).unwrap();
//! assert_eq!(seen.get(), 2);
//! assert_eq!(store.get_with(|s| s.a).unwrap(), 2);
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use draftstate_core::shallow::ShallowEq;
use draftstate_core::{AsyncStatus, DraftSlot, Result, SetupNotify, StateError, StoreConfig};

use crate::commit::commit;
use crate::registry::{ObserverId, Observe, SubscriptionRegistry};
use crate::schedule::{Schedule, TickQueue};
use crate::selection::{ObserverEntry, Selection};
use crate::sequencer::{self, Child, IntoUpdate, Staged, Update};
use crate::tx::Tx;

/// Counters for one store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Commit attempts, including `setup` and no-op commits.
    pub commits: u64,
    /// Commits that produced a new snapshot.
    pub changed_commits: u64,
    /// Observer callbacks fired.
    pub notifications: u64,
    /// Top-level transactions started.
    pub transactions: u64,
    /// Updates folded into an already active transaction.
    pub nested_updates: u64,
}

pub(crate) struct Shared<S> {
    pub(crate) config: StoreConfig,
    pub(crate) current: RefCell<Option<Rc<S>>>,
    pub(crate) slot: RefCell<DraftSlot<S>>,
    /// A top-level transaction is running.
    pub(crate) active: Cell<bool>,
    /// Set by a pending operation (or nested update) that left the staged
    /// body suspended during the current poll.
    pub(crate) suspended: Rc<Cell<bool>>,
    /// Nested staged updates not yet run to completion; the enclosing drive
    /// finishes any whose handle was dropped or never polled.
    pub(crate) children: RefCell<Vec<Rc<Child>>>,
    pub(crate) next_child: Cell<u64>,
    pub(crate) registry: SubscriptionRegistry<S>,
    pub(crate) schedule: Rc<dyn Schedule>,
    stats: Cell<StoreStats>,
}

impl<S: Clone + PartialEq + 'static> Shared<S> {
    fn new(config: StoreConfig, schedule: Rc<dyn Schedule>) -> Self {
        Self {
            config,
            current: RefCell::new(None),
            slot: RefCell::new(DraftSlot::new()),
            active: Cell::new(false),
            suspended: Rc::new(Cell::new(false)),
            children: RefCell::new(Vec::new()),
            next_child: Cell::new(0),
            registry: SubscriptionRegistry::new(),
            schedule,
            stats: Cell::new(StoreStats::default()),
        }
    }

    pub(crate) fn snapshot(&self) -> Result<Rc<S>> {
        self.current.borrow().clone().ok_or(StateError::Uninitialized)
    }

    pub(crate) fn ensure_ready(&self) -> Result<()> {
        if self.current.borrow().is_some() {
            Ok(())
        } else {
            Err(StateError::Uninitialized)
        }
    }

    pub(crate) fn record(&self, f: impl FnOnce(&mut StoreStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    pub(crate) fn broadcast(&self, snapshot: &Rc<S>) {
        let fired = tracing::trace_span!("broadcast", store = %self.config.label)
            .in_scope(|| self.registry.notify_all(snapshot));
        if fired > 0 {
            self.record(|stats| stats.notifications += fired as u64);
        }
    }
}

/// Reactive state container.
pub struct Store<S> {
    pub(crate) shared: Rc<Shared<S>>,
}

impl<S> Clone for Store<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<S> fmt::Debug for Store<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("label", &self.shared.config.label)
            .field("ready", &self.shared.current.borrow().is_some())
            .field("active", &self.shared.active.get())
            .field("observers", &self.shared.registry.len())
            .field("stats", &self.shared.stats.get())
            .finish()
    }
}

/// A fresh, unconfigured container for one state shape.
#[must_use]
pub fn define<S: Clone + PartialEq + 'static>() -> Store<S> {
    Store::new()
}

impl<S: Clone + PartialEq + 'static> Default for Store<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Clone + PartialEq + 'static> Store<S> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    #[must_use]
    pub fn with_config(config: StoreConfig) -> Self {
        Self::with_schedule(config, Rc::new(TickQueue::new()))
    }

    /// Build a store whose deferred notifications run on `schedule`.
    #[must_use]
    pub fn with_schedule(config: StoreConfig, schedule: Rc<dyn Schedule>) -> Self {
        Self {
            shared: Rc::new(Shared::new(config, schedule)),
        }
    }

    pub(crate) fn from_shared(shared: Rc<Shared<S>>) -> Self {
        Self { shared }
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.shared.current.borrow().is_some()
    }

    /// Whether a top-level transaction is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.shared.active.get()
    }

    #[must_use]
    pub fn stats(&self) -> StoreStats {
        self.shared.stats.get()
    }

    /// Install `state` as the committed snapshot and open a draft over it.
    ///
    /// The first call makes the store ready. Later calls replace the snapshot
    /// like a commit that changed everything; existing observers hear about
    /// it through the scheduler (or inline, per [`SetupNotify`]).
    pub fn setup(&self, state: S) -> Result<()> {
        let snapshot = Rc::new(state);
        let first = {
            let mut slot = self
                .shared
                .slot
                .try_borrow_mut()
                .map_err(|_| StateError::DraftBusy)?;
            let _ = slot.finish();
            slot.open(&snapshot);
            self.shared.current.replace(Some(Rc::clone(&snapshot))).is_none()
        };
        self.shared.record(|stats| {
            stats.commits += 1;
            stats.changed_commits += 1;
        });
        tracing::debug!(store = %self.shared.config.label, first, "setup");

        if self.shared.registry.is_empty() {
            return Ok(());
        }
        match self.shared.config.setup_notify {
            SetupNotify::Immediate => self.shared.broadcast(&snapshot),
            SetupNotify::Deferred => {
                let weak = Rc::downgrade(&self.shared);
                self.shared.schedule.defer(Box::new(move || {
                    let Some(shared) = weak.upgrade() else { return };
                    // Observers see whatever is current when the tick runs.
                    if let Ok(snapshot) = shared.snapshot() {
                        shared.broadcast(&snapshot);
                    }
                }));
            }
        }
        Ok(())
    }

    /// Current snapshot, without subscribing.
    pub fn get(&self) -> Result<Rc<S>> {
        self.shared.snapshot()
    }

    /// Project the current snapshot, without subscribing.
    pub fn get_with<T>(&self, select: impl FnOnce(&S) -> T) -> Result<T> {
        let snapshot = self.shared.snapshot()?;
        Ok(select(&snapshot))
    }

    /// Run `updater` as a transaction, or fold it into the active one.
    ///
    /// A flat updater (returning `()` or `Result<()>`) has finished when this
    /// returns; the returned [`Update`] is already resolved. A top-level flat
    /// updater that fails is rolled back: its writes are discarded and no
    /// commit happens. A staged updater (returning [`Staged`]) runs when the
    /// returned `Update` is polled.
    pub fn update<U, O>(&self, updater: U) -> Result<Update>
    where
        U: FnOnce(Tx<S>) -> O,
        O: IntoUpdate,
    {
        sequencer::run(&self.shared, updater)
    }

    /// Drive `op` as a staged update, writing its status through `place`.
    ///
    /// Observers of the placed field see `Loading` once the operation is
    /// issued and `Success`/`Failure` once it settles. A failing operation
    /// is recorded, not propagated.
    pub fn track<R, E, F, P>(&self, op: F, place: P) -> Result<Update>
    where
        R: 'static,
        E: 'static,
        F: Future<Output = std::result::Result<R, E>> + 'static,
        P: Fn(&mut S, AsyncStatus<R, E>) + 'static,
    {
        self.update(move |tx| Staged::new(async move { tx.track(op, place).await }))
    }

    /// Checkpoint: commit the live draft now. Returns whether it changed.
    pub fn commit(&self) -> Result<bool> {
        commit(&self.shared)
    }

    /// Subscribe to a projection of the state.
    pub fn select<T, F>(&self, select: F) -> Result<Selection<S, (), T>>
    where
        T: ShallowEq + Clone + 'static,
        F: Fn(&S) -> T + 'static,
    {
        self.select_with((), move |s, ()| select(s))
    }

    /// Subscribe to a projection that also depends on caller-held `deps`.
    ///
    /// See [`Selection::set_deps`].
    pub fn select_with<D, T, F>(&self, deps: D, select: F) -> Result<Selection<S, D, T>>
    where
        D: 'static,
        T: ShallowEq + Clone + 'static,
        F: Fn(&S, &D) -> T + 'static,
    {
        let snapshot = self.shared.snapshot()?;
        let entry = Rc::new(ObserverEntry::new(
            Box::new(move |s: &Rc<S>, d: &D| select(s, d)),
            deps,
            &snapshot,
        ));
        let id = self
            .shared
            .registry
            .register(Rc::clone(&entry) as Rc<dyn Observe<S>>);
        Ok(Selection::new(entry, id, Rc::downgrade(&self.shared)))
    }

    /// Subscribe to the whole snapshot.
    pub fn watch(&self) -> Result<Selection<S, (), Rc<S>>> {
        let snapshot = self.shared.snapshot()?;
        let entry = Rc::new(ObserverEntry::new(
            Box::new(|s: &Rc<S>, (): &()| Rc::clone(s)),
            (),
            &snapshot,
        ));
        let id = self
            .shared
            .registry
            .register(Rc::clone(&entry) as Rc<dyn Observe<S>>);
        Ok(Selection::new(entry, id, Rc::downgrade(&self.shared)))
    }

    /// Register a custom observer.
    pub fn attach(&self, observer: Rc<dyn Observe<S>>) -> Result<ObserverId> {
        self.shared.ensure_ready()?;
        Ok(self.shared.registry.register(observer))
    }

    /// Remove an observer registered with [`attach`](Self::attach).
    pub fn detach(&self, id: ObserverId) -> bool {
        self.shared.registry.unregister(id)
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Run tasks the store's scheduler is holding (deferred notifications).
    pub fn flush_deferred(&self) -> usize {
        self.shared.schedule.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::Immediate;
    use draftstate_core::StoreConfig;

    #[derive(Debug, Clone, PartialEq)]
    struct Counter {
        a: i32,
        b: i32,
    }

    fn counter() -> Counter {
        Counter { a: 1, b: 0 }
    }

    #[test]
    fn operations_before_setup_are_uninitialized() {
        let store = define::<Counter>();
        assert!(!store.is_ready());
        assert!(store.get().unwrap_err().is_uninitialized());
        assert!(store.get_with(|s| s.a).unwrap_err().is_uninitialized());
        assert!(store.update(|_tx| ()).unwrap_err().is_uninitialized());
        assert!(store.commit().unwrap_err().is_uninitialized());
        assert!(store.select(|s| s.a).unwrap_err().is_uninitialized());
        assert!(store.watch().unwrap_err().is_uninitialized());
        assert!(!store.is_active());
    }

    #[test]
    fn get_defaults_to_identity() {
        let store = define::<Counter>();
        store.setup(counter()).unwrap();
        assert_eq!(*store.get().unwrap(), counter());
        assert_eq!(store.get_with(|s| s.a + 10).unwrap(), 11);
        // Reads never commit.
        assert_eq!(store.stats().commits, 1);
    }

    #[test]
    fn flat_update_commits_once() {
        let store = define::<Counter>();
        store.setup(counter()).unwrap();
        let sel = store.select(|s| s.a).unwrap();

        let update = store.update(|tx| tx.write(|s| s.a += 1)).unwrap();
        assert!(update.is_resolved());
        assert_eq!(sel.get(), 2);
        assert_eq!(sel.version(), 1);
        assert_eq!(store.stats().commits, 2);
    }

    #[test]
    fn identical_write_does_not_notify_or_change_identity() {
        let store = define::<Counter>();
        store.setup(counter()).unwrap();
        let before = store.get().unwrap();
        let sel = store.watch().unwrap();

        let _ = store.update(|tx| tx.write(|s| s.a = 1)).unwrap();

        assert!(Rc::ptr_eq(&before, &store.get().unwrap()));
        assert_eq!(sel.version(), 0);
        assert_eq!(store.stats().notifications, 0);
    }

    #[test]
    fn repeated_setup_defers_notification() {
        let store = define::<Counter>();
        store.setup(counter()).unwrap();
        let sel = store.select(|s| s.a).unwrap();

        store.setup(Counter { a: 9, b: 0 }).unwrap();
        assert_eq!(sel.get(), 1, "notification is deferred to the next tick");
        assert_eq!(store.get_with(|s| s.a).unwrap(), 9);

        assert_eq!(store.flush_deferred(), 1);
        assert_eq!(sel.get(), 9);
        assert_eq!(sel.version(), 1);
    }

    #[test]
    fn repeated_setup_immediate_mode() {
        let config = StoreConfig::default().with_setup_notify(SetupNotify::Immediate);
        let store = Store::with_config(config);
        store.setup(counter()).unwrap();
        let sel = store.select(|s| s.a).unwrap();

        store.setup(Counter { a: 4, b: 0 }).unwrap();
        assert_eq!(sel.get(), 4);
        assert_eq!(store.flush_deferred(), 0);
    }

    #[test]
    fn setup_without_observers_needs_no_tick() {
        let store = define::<Counter>();
        store.setup(counter()).unwrap();
        store.setup(Counter { a: 2, b: 2 }).unwrap();
        assert_eq!(store.flush_deferred(), 0);
        assert_eq!(store.get_with(|s| s.b).unwrap(), 2);
    }

    #[test]
    fn setup_revokes_drafts_pinned_before_it() {
        let store = define::<Counter>();
        store.setup(counter()).unwrap();
        let stash = Rc::new(RefCell::new(None));
        let s = Rc::clone(&stash);
        let _ = store
            .update(move |tx| -> Result<()> {
                *s.borrow_mut() = Some(tx.draft()?);
                Ok(())
            })
            .unwrap();
        store.setup(counter()).unwrap();
        let draft = stash.borrow_mut().take().unwrap();
        assert!(draft.write(|s| s.a = 3).unwrap_err().is_revoked());
    }

    #[test]
    fn custom_schedule_runs_inline() {
        let store = Store::with_schedule(StoreConfig::default(), Rc::new(Immediate));
        store.setup(counter()).unwrap();
        let sel = store.select(|s| s.b).unwrap();
        store.setup(Counter { a: 1, b: 5 }).unwrap();
        assert_eq!(sel.get(), 5);
    }

    struct CountingObserver {
        hits: Cell<u32>,
    }

    impl Observe<Counter> for CountingObserver {
        fn observe(&self, _snapshot: &Rc<Counter>) -> bool {
            self.hits.set(self.hits.get() + 1);
            true
        }
    }

    #[test]
    fn attach_and_detach_custom_observer() {
        let store = define::<Counter>();
        let observer = Rc::new(CountingObserver { hits: Cell::new(0) });
        assert!(
            store
                .attach(Rc::clone(&observer) as Rc<dyn Observe<Counter>>)
                .unwrap_err()
                .is_uninitialized()
        );

        store.setup(counter()).unwrap();
        let id = store
            .attach(Rc::clone(&observer) as Rc<dyn Observe<Counter>>)
            .unwrap();
        assert_eq!(store.observer_count(), 1);

        let _ = store.update(|tx| tx.write(|s| s.b = 1)).unwrap();
        assert_eq!(observer.hits.get(), 1);

        assert!(store.detach(id));
        assert!(!store.detach(id));
        let _ = store.update(|tx| tx.write(|s| s.b = 2)).unwrap();
        assert_eq!(observer.hits.get(), 1);
    }

    #[test]
    fn debug_lists_label_and_state() {
        let store = Store::<Counter>::with_config(StoreConfig::default().with_label("cart"));
        let dbg = format!("{store:?}");
        assert!(dbg.contains("cart"));
        assert!(dbg.contains("ready: false"));
    }
}
