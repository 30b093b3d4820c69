#![forbid(unsafe_code)]

//! Copy-on-write drafts over immutable snapshots.
//!
//! A [`Draft`] is the mutable working view over the *next* snapshot. It is
//! opened over a committed `Rc<S>` and only clones the state on the first
//! write (`Rc::make_mut`). Finalizing a draft returns the original `Rc` when
//! nothing changed, so snapshot identity is stable across no-op edits.
//! Substructure sharing inside `S` is left to the state type itself; with the
//! `hamt` feature the `im` collections make that clone O(1).
//!
//! [`DraftSlot`] owns the single live draft of a store and stamps each opened
//! draft with a generation number. Finalizing leaves a tombstone at that
//! generation: handles pinned to it are permanently revoked.
//!
//! # Invariants
//!
//! 1. At most one live draft per slot.
//! 2. `finish()` returns the base `Rc` iff the working value equals it.
//! 3. Generations increase strictly; a finalized generation never reopens.

use std::rc::Rc;

use crate::error::{Result, RevokedOrigin, StateError};

/// Mutable working copy of a snapshot.
#[derive(Debug)]
pub struct Draft<S> {
    base: Rc<S>,
    working: Rc<S>,
}

impl<S: Clone + PartialEq> Draft<S> {
    /// Open a draft over `snapshot` without copying it.
    #[must_use]
    pub fn begin(snapshot: &Rc<S>) -> Self {
        Self {
            base: Rc::clone(snapshot),
            working: Rc::clone(snapshot),
        }
    }

    /// Non-finalizing read of the working value.
    #[must_use]
    pub fn peek(&self) -> &S {
        &self.working
    }

    /// Apply a write. The first write detaches the working copy from the base.
    pub fn write<R>(&mut self, f: impl FnOnce(&mut S) -> R) -> R {
        f(Rc::make_mut(&mut self.working))
    }

    /// Whether any write has detached the working copy.
    #[must_use]
    pub fn is_touched(&self) -> bool {
        !Rc::ptr_eq(&self.base, &self.working)
    }

    /// Finalize into a snapshot, consuming the draft.
    #[must_use]
    pub fn finish(self) -> Rc<S> {
        if !self.is_touched() || *self.working == *self.base {
            self.base
        } else {
            self.working
        }
    }
}

/// Owner of a store's single live draft.
#[derive(Debug)]
pub struct DraftSlot<S> {
    live: Option<Draft<S>>,
    generation: u64,
}

impl<S> Default for DraftSlot<S> {
    fn default() -> Self {
        Self {
            live: None,
            generation: 0,
        }
    }
}

impl<S: Clone + PartialEq> DraftSlot<S> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a fresh draft over `snapshot`, discarding any live one.
    pub fn open(&mut self, snapshot: &Rc<S>) -> u64 {
        self.generation += 1;
        self.live = Some(Draft::begin(snapshot));
        self.generation
    }

    /// Finalize the live draft. The current generation becomes a tombstone.
    pub fn finish(&mut self) -> Option<Rc<S>> {
        self.live.take().map(Draft::finish)
    }

    /// Generation of the live draft, or of the last tombstone.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.live.is_some()
    }

    /// Read the live draft.
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> Result<R> {
        let draft = self.live.as_ref().ok_or(StateError::Uninitialized)?;
        Ok(f(draft.peek()))
    }

    /// Write through the live draft, whatever its generation.
    pub fn write<R>(&mut self, f: impl FnOnce(&mut S) -> R) -> Result<R> {
        let draft = self.live.as_mut().ok_or(StateError::Uninitialized)?;
        Ok(draft.write(f))
    }

    /// Write through the draft opened at `generation`.
    ///
    /// Fails with `RevokedDraftAccess` once that draft has been finalized.
    pub fn write_at<R>(&mut self, generation: u64, f: impl FnOnce(&mut S) -> R) -> Result<R> {
        match self.live.as_mut() {
            Some(draft) if generation == self.generation => Ok(draft.write(f)),
            _ => Err(StateError::revoked(RevokedOrigin::Committed { generation })),
        }
    }

    /// Read through the draft opened at `generation`.
    pub fn read_at<R>(&self, generation: u64, f: impl FnOnce(&S) -> R) -> Result<R> {
        match self.live.as_ref() {
            Some(draft) if generation == self.generation => Ok(f(draft.peek())),
            _ => Err(StateError::revoked(RevokedOrigin::Committed { generation })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Counter {
        a: i32,
        label: Rc<str>,
    }

    fn snapshot() -> Rc<Counter> {
        Rc::new(Counter {
            a: 1,
            label: Rc::from("x"),
        })
    }

    #[test]
    fn untouched_draft_returns_same_snapshot() {
        let base = snapshot();
        let draft = Draft::begin(&base);
        assert!(!draft.is_touched());
        assert!(Rc::ptr_eq(&draft.finish(), &base));
    }

    #[test]
    fn equal_write_collapses_to_base() {
        let base = snapshot();
        let mut draft = Draft::begin(&base);
        draft.write(|s| s.a = 1);
        assert!(draft.is_touched());
        assert!(Rc::ptr_eq(&draft.finish(), &base));
    }

    #[test]
    fn changed_write_produces_new_snapshot_and_keeps_base() {
        let base = snapshot();
        let mut draft = Draft::begin(&base);
        draft.write(|s| s.a += 1);
        assert_eq!(draft.peek().a, 2);

        let next = draft.finish();
        assert!(!Rc::ptr_eq(&next, &base));
        assert_eq!(base.a, 1);
        assert_eq!(next.a, 2);
        // Untouched substructure is shared.
        assert!(Rc::ptr_eq(&next.label, &base.label));
    }

    #[test]
    fn slot_generations_increase() {
        let base = snapshot();
        let mut slot = DraftSlot::new();
        assert!(!slot.is_open());
        assert_eq!(slot.open(&base), 1);
        let _ = slot.finish();
        assert!(!slot.is_open());
        assert_eq!(slot.open(&base), 2);
        assert_eq!(slot.generation(), 2);
    }

    #[test]
    fn stale_generation_is_revoked() {
        let base = snapshot();
        let mut slot = DraftSlot::new();
        let first = slot.open(&base);
        slot.write_at(first, |s| s.a = 5).unwrap();

        let committed = slot.finish().unwrap();
        assert_eq!(committed.a, 5);

        // Tombstone: nothing live at `first`.
        let err = slot.write_at(first, |s| s.a = 6).unwrap_err();
        assert!(matches!(
            err,
            StateError::RevokedDraftAccess {
                origin: RevokedOrigin::Committed { generation: 1 }
            }
        ));

        // Reopening does not resurrect the old generation.
        slot.open(&committed);
        assert!(slot.write_at(first, |s| s.a = 7).is_err());
        assert!(slot.read_at(first, |s| s.a).is_err());
        assert_eq!(slot.read(|s| s.a).unwrap(), 5);
    }

    #[test]
    fn closed_slot_reports_uninitialized() {
        let mut slot: DraftSlot<Counter> = DraftSlot::new();
        assert!(slot.read(|s| s.a).unwrap_err().is_uninitialized());
        assert!(slot.write(|s| s.a = 1).unwrap_err().is_uninitialized());
        assert!(slot.finish().is_none());
    }
}
