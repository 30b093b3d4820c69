#![forbid(unsafe_code)]

//! Mutation context handed to updaters.
//!
//! A [`Tx`] always writes through the store's *live* draft, so a staged
//! updater can keep using it across suspension points even though every
//! checkpoint replaces the draft. It is valid for the lifetime of the update
//! that issued it; a clone smuggled out and used afterwards fails with
//! `RevokedDraftAccess`.
//!
//! A [`DraftRef`] is the stricter handle: it is pinned to the draft that was
//! live when it was taken and is revoked by the next commit.

use std::cell::Cell;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use draftstate_core::{AsyncStatus, Result, RevokedOrigin, StateError};

use crate::pending::Pending;
use crate::sequencer::{self, IntoUpdate, Update};
use crate::store::{Shared, Store};

/// Liveness flag shared by every clone of one update's `Tx`.
#[derive(Debug, Clone, Default)]
pub(crate) struct Lease(Rc<Cell<bool>>);

impl Lease {
    pub(crate) fn new() -> Self {
        Self(Rc::new(Cell::new(true)))
    }

    pub(crate) fn revoke(&self) {
        self.0.set(false);
    }

    pub(crate) fn is_live(&self) -> bool {
        self.0.get()
    }
}

/// Transaction context: the live draft plus the store that owns it.
pub struct Tx<S> {
    shared: Rc<Shared<S>>,
    lease: Lease,
}

impl<S> Clone for Tx<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
            lease: self.lease.clone(),
        }
    }
}

impl<S> fmt::Debug for Tx<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tx")
            .field("store", &self.shared.config.label)
            .field("live", &self.lease.is_live())
            .finish()
    }
}

impl<S: Clone + PartialEq + 'static> Tx<S> {
    pub(crate) fn new(shared: Rc<Shared<S>>, lease: Lease) -> Self {
        Self { shared, lease }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.lease.is_live() {
            Ok(())
        } else {
            Err(StateError::revoked(RevokedOrigin::TransactionEnded))
        }
    }

    /// Whether the owning update is still running.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.lease.is_live()
    }

    /// Read the live draft (uncommitted writes included).
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> Result<R> {
        self.ensure_live()?;
        let slot = self
            .shared
            .slot
            .try_borrow()
            .map_err(|_| StateError::DraftBusy)?;
        slot.read(f)
    }

    /// Write through the live draft.
    pub fn write<R>(&self, f: impl FnOnce(&mut S) -> R) -> Result<R> {
        self.ensure_live()?;
        let mut slot = self
            .shared
            .slot
            .try_borrow_mut()
            .map_err(|_| StateError::DraftBusy)?;
        slot.write(f)
    }

    /// Pin a handle to the draft that is live right now.
    pub fn draft(&self) -> Result<DraftRef<S>> {
        self.ensure_live()?;
        let generation = self.shared.slot.borrow().generation();
        Ok(DraftRef {
            shared: Rc::clone(&self.shared),
            generation,
        })
    }

    /// Turn `op` into a suspension point of the current staged update.
    ///
    /// Awaiting the result commits the live draft, then waits for `op`.
    /// Fails with `RevokedDraftAccess` once the owning update has ended, so
    /// a smuggled `Tx` cannot force a commit.
    pub fn pending<F: Future>(&self, op: F) -> Result<Pending<S, F>> {
        self.ensure_live()?;
        Ok(Pending::new(
            Rc::clone(&self.shared),
            self.lease.clone(),
            op,
        ))
    }

    /// Write `Loading`, suspend on `op`, then write its settled status.
    ///
    /// A failed `op` is recorded as [`AsyncStatus::Failure`]; only draft
    /// errors are returned.
    pub async fn track<R, E, F>(
        &self,
        op: F,
        place: impl Fn(&mut S, AsyncStatus<R, E>),
    ) -> Result<()>
    where
        F: Future<Output = std::result::Result<R, E>>,
    {
        self.write(|s| place(s, AsyncStatus::Loading))?;
        let status = AsyncStatus::settle(self.pending(op)?.await);
        self.write(|s| place(s, status))
    }

    /// Issue an update from inside this one. It joins the active transaction.
    pub fn update<U, O>(&self, updater: U) -> Result<Update>
    where
        U: FnOnce(Tx<S>) -> O,
        O: IntoUpdate,
    {
        sequencer::run(&self.shared, updater)
    }

    /// Handle to the owning store.
    #[must_use]
    pub fn store(&self) -> Store<S> {
        Store::from_shared(Rc::clone(&self.shared))
    }
}

/// A draft handle pinned to one generation.
pub struct DraftRef<S> {
    shared: Rc<Shared<S>>,
    generation: u64,
}

impl<S> fmt::Debug for DraftRef<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DraftRef")
            .field("generation", &self.generation)
            .finish()
    }
}

impl<S: Clone + PartialEq + 'static> DraftRef<S> {
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a commit has finalized this draft.
    #[must_use]
    pub fn is_revoked(&self) -> bool {
        let slot = self.shared.slot.borrow();
        !slot.is_open() || slot.generation() != self.generation
    }

    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> Result<R> {
        let slot = self
            .shared
            .slot
            .try_borrow()
            .map_err(|_| StateError::DraftBusy)?;
        slot.read_at(self.generation, f)
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut S) -> R) -> Result<R> {
        let mut slot = self
            .shared
            .slot
            .try_borrow_mut()
            .map_err(|_| StateError::DraftBusy)?;
        slot.write_at(self.generation, f)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use draftstate_core::{Result, RevokedOrigin, StateError};

    use super::Tx;
    use crate::store::{Store, define};

    #[derive(Debug, Clone, PartialEq)]
    struct Counter {
        a: i32,
    }

    fn ready() -> Store<Counter> {
        let store = define::<Counter>();
        store.setup(Counter { a: 1 }).unwrap();
        store
    }

    #[test]
    fn read_sees_uncommitted_writes() {
        let store = ready();
        let _ = store
            .update(|tx| -> Result<()> {
                tx.write(|s| s.a = 5)?;
                assert_eq!(tx.read(|s| s.a)?, 5);
                assert_eq!(store.get_with(|s| s.a)?, 1);
                Ok(())
            })
            .unwrap();
        assert_eq!(store.get_with(|s| s.a).unwrap(), 5);
    }

    #[test]
    fn retained_tx_is_revoked_after_its_update() {
        let store = ready();
        let stash: Rc<RefCell<Option<Tx<Counter>>>> = Rc::new(RefCell::new(None));
        let s = Rc::clone(&stash);
        let _ = store
            .update(move |tx| {
                *s.borrow_mut() = Some(tx.clone());
                tx.write(|s| s.a += 1)
            })
            .unwrap();

        let tx = stash.borrow_mut().take().unwrap();
        assert!(!tx.is_live());
        let err = tx.write(|s| s.a += 1).unwrap_err();
        assert!(matches!(
            err,
            StateError::RevokedDraftAccess {
                origin: RevokedOrigin::TransactionEnded
            }
        ));
        assert_eq!(store.get_with(|s| s.a).unwrap(), 2);
    }

    #[test]
    fn draft_ref_is_revoked_by_commit() {
        let store = ready();
        let stash = Rc::new(RefCell::new(None));
        let s = Rc::clone(&stash);
        let _ = store
            .update(move |tx| -> Result<()> {
                let draft = tx.draft()?;
                draft.write(|s| s.a = 2)?;
                assert!(!draft.is_revoked());
                *s.borrow_mut() = Some(draft);
                Ok(())
            })
            .unwrap();

        let draft = stash.borrow_mut().take().unwrap();
        assert!(draft.is_revoked());
        assert!(draft.write(|s| s.a = 3).unwrap_err().is_revoked());
        assert!(draft.read(|s| s.a).unwrap_err().is_revoked());
        assert_eq!(store.get_with(|s| s.a).unwrap(), 2);
    }

    #[test]
    fn manual_commit_revokes_draft_mid_transaction() {
        let store = ready();
        let _ = store
            .update(|tx| -> Result<()> {
                let draft = tx.draft()?;
                draft.write(|s| s.a = 7)?;
                assert!(tx.store().commit()?);
                assert!(draft.write(|s| s.a = 8).unwrap_err().is_revoked());
                // The context still follows the live draft.
                tx.write(|s| s.a = 9)
            })
            .unwrap();
        assert_eq!(store.get_with(|s| s.a).unwrap(), 9);
    }

    #[test]
    fn debug_output() {
        let store = ready();
        let _ = store
            .update(|tx| {
                assert!(format!("{tx:?}").contains("live: true"));
                let draft = tx.draft().unwrap();
                assert!(format!("{draft:?}").contains("generation"));
            })
            .unwrap();
    }

    #[test]
    fn retained_tx_cannot_open_a_suspension_point() {
        let store = ready();
        let watch = store.watch().unwrap();
        let stash: Rc<RefCell<Option<Tx<Counter>>>> = Rc::new(RefCell::new(None));
        let s = Rc::clone(&stash);
        let _ = store
            .update(move |tx| {
                *s.borrow_mut() = Some(tx.clone());
            })
            .unwrap();
        let commits = store.stats().commits;

        // Someone else's transaction has live writes in the draft.
        store.shared.slot.borrow_mut().write(|s| s.a = 40).unwrap();

        let tx = stash.borrow_mut().take().unwrap();
        let Err(err) = tx.pending(async { 1 }) else {
            panic!("a revoked Tx opened a suspension point");
        };
        assert!(err.is_revoked());
        assert_eq!(store.stats().commits, commits);
        assert_eq!(watch.version(), 0);
        assert_eq!(store.get_with(|s| s.a).unwrap(), 1);
    }

    #[test]
    fn suspension_point_polled_after_its_update_skips_the_checkpoint() {
        let store = ready();
        let stash = Rc::new(RefCell::new(None));
        let s = Rc::clone(&stash);
        let _ = store
            .update(move |tx| -> Result<()> {
                *s.borrow_mut() = Some(tx.pending(async { 5 })?);
                Ok(())
            })
            .unwrap();
        let commits = store.stats().commits;

        store.shared.slot.borrow_mut().write(|s| s.a = 40).unwrap();
        let pending = stash.borrow_mut().take().unwrap();
        assert_eq!(futures::executor::block_on(pending), 5);
        assert_eq!(store.stats().commits, commits);
        assert_eq!(store.get_with(|s| s.a).unwrap(), 1);
    }
}
