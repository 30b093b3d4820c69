#![forbid(unsafe_code)]

//! Commit: finalize the live draft, swap the snapshot if it changed, reopen,
//! broadcast.
//!
//! The draft is finalized on every commit, changed or not, so a fresh draft
//! is always opened afterwards and every handle pinned to the old generation
//! is revoked.

use std::rc::Rc;

use draftstate_core::{Result, StateError};

use crate::store::Shared;

/// Run one commit against `shared`. Returns whether the snapshot changed.
pub(crate) fn commit<S: Clone + PartialEq + 'static>(shared: &Shared<S>) -> Result<bool> {
    let (changed, generation) = {
        let mut slot = shared
            .slot
            .try_borrow_mut()
            .map_err(|_| StateError::DraftBusy)?;
        let mut current = shared.current.borrow_mut();
        let Some(previous) = current.as_ref() else {
            return Err(StateError::Uninitialized);
        };
        let candidate = slot.finish().ok_or(StateError::Uninitialized)?;
        let changed = !Rc::ptr_eq(&candidate, previous);
        let generation = slot.open(&candidate);
        if changed {
            *current = Some(Rc::clone(&candidate));
        }
        (changed.then_some(candidate), generation)
    };

    tracing::debug!(
        store = %shared.config.label,
        generation,
        changed = changed.is_some(),
        "commit"
    );

    shared.record(|stats| {
        stats.commits += 1;
        if changed.is_some() {
            stats.changed_commits += 1;
        }
    });

    match changed {
        Some(snapshot) => {
            shared.broadcast(&snapshot);
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Throw the live draft away: reopen it over the committed snapshot without
/// swapping or broadcasting. Returns the new draft generation.
pub(crate) fn rollback<S: Clone + PartialEq + 'static>(shared: &Shared<S>) -> Result<u64> {
    let mut slot = shared
        .slot
        .try_borrow_mut()
        .map_err(|_| StateError::DraftBusy)?;
    let current = shared.snapshot()?;
    let generation = slot.open(&current);
    tracing::debug!(store = %shared.config.label, generation, "rollback");
    Ok(generation)
}
