#![forbid(unsafe_code)]

//! The update scheduler.
//!
//! `run` decides whether an update opens a transaction or joins the active
//! one, and whether it is flat or staged:
//!
//! | active? | flat                         | staged                                  |
//! |---------|------------------------------|-----------------------------------------|
//! | no      | run, release, commit once    | drive: commit per suspension, then once |
//! | no, err | run, roll back, no commit    | (same as above; the error follows)      |
//! | yes     | run, no commit               | drive: same as top-level, own commits   |
//!
//! A staged body is an `async` block. Its suspension points are
//! [`Pending`](crate::Pending) futures, which commit before they wait, and
//! nested [`Update`] handles. The drive tells a legal suspension from an
//! arbitrary parked future through the store's `suspended` flag, which only
//! those two set.
//!
//! # Invariants
//!
//! 1. At most one top-level transaction per store; `active` is released on
//!    completion, cancellation (drop), and unwinding.
//! 2. A staged drive performs exactly one final commit, after its body
//!    completes, and before its error (if any) is returned.
//! 3. Every `Tx` issued for an update is revoked when that update ends.
//! 4. Writes a top-level update made since its last commit are discarded
//!    when it aborts instead of completing.
//! 5. A drive does not complete before the nested staged updates issued
//!    during it have, whether or not their handles were awaited.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use draftstate_core::{Result, StateError};
use futures::future::LocalBoxFuture;
use futures::FutureExt;

use crate::commit::{commit, rollback};
use crate::store::Shared;
use crate::tx::{Lease, Tx};

/// What an updater handed back.
pub enum UpdateBody {
    /// The updater already did all of its work.
    Flat(Result<()>),
    /// The updater described a multi-step transaction.
    Staged(LocalBoxFuture<'static, Result<()>>),
}

impl fmt::Debug for UpdateBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flat(outcome) => f.debug_tuple("Flat").field(outcome).finish(),
            Self::Staged(_) => f.write_str("Staged(..)"),
        }
    }
}

/// Return types accepted from an updater closure.
pub trait IntoUpdate {
    fn into_update(self) -> UpdateBody;
}

impl IntoUpdate for () {
    fn into_update(self) -> UpdateBody {
        UpdateBody::Flat(Ok(()))
    }
}

impl IntoUpdate for Result<()> {
    fn into_update(self) -> UpdateBody {
        UpdateBody::Flat(self)
    }
}

/// A staged transaction body.
#[must_use = "a staged body runs only when its update is polled"]
pub struct Staged(LocalBoxFuture<'static, Result<()>>);

impl Staged {
    pub fn new<F>(body: F) -> Self
    where
        F: Future<Output = Result<()>> + 'static,
    {
        Self(body.boxed_local())
    }
}

impl fmt::Debug for Staged {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Staged(..)")
    }
}

impl IntoUpdate for Staged {
    fn into_update(self) -> UpdateBody {
        UpdateBody::Staged(self.0)
    }
}

/// Shorthand for [`Staged::new`].
pub fn staged<F>(body: F) -> Staged
where
    F: Future<Output = Result<()>> + 'static,
{
    Staged::new(body)
}

/// Completion handle for one update.
///
/// Flat updates hand back an already resolved handle. A top-level staged
/// update runs as this future is polled; dropping it cancels the rest of the
/// body, throws away writes made since the last checkpoint, and ends the
/// transaction without a final commit.
///
/// A nested staged update is owned by the transaction it joined. Awaiting
/// the handle runs it in place; a handle that is dropped or left unpolled is
/// finished by the enclosing drive before that drive's final commit.
#[must_use = "a staged update does nothing unless polled"]
pub struct Update {
    state: Handle,
}

enum Handle {
    Resolved,
    Owned(LocalBoxFuture<'static, Result<()>>),
    Child(Rc<Child>),
}

impl Update {
    /// A handle with nothing left to do.
    #[must_use]
    pub fn resolved() -> Self {
        Self {
            state: Handle::Resolved,
        }
    }

    fn owned<S: Clone + PartialEq + 'static>(drive: Drive<S>) -> Self {
        Self {
            state: Handle::Owned(drive.boxed_local()),
        }
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self.state, Handle::Resolved)
    }
}

impl fmt::Debug for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Update")
            .field("resolved", &self.is_resolved())
            .field("nested", &matches!(self.state, Handle::Child(_)))
            .finish()
    }
}

impl Future for Update {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let polled = match &mut self.state {
            Handle::Resolved => return Poll::Ready(Ok(())),
            Handle::Owned(drive) => drive.as_mut().poll(cx),
            Handle::Child(child) => child.poll_handle(cx),
        };
        if polled.is_ready() {
            self.state = Handle::Resolved;
        }
        polled
    }
}

impl Drop for Update {
    fn drop(&mut self) {
        if let Handle::Child(child) = &self.state {
            child.detach();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Driver {
    Unclaimed,
    /// The `Update` handle is being awaited.
    Handle,
    /// An enclosing drive adopted it.
    Enclosing,
}

/// A nested staged update, shared between its handle and the store.
pub(crate) struct Child {
    seq: u64,
    drive: RefCell<Option<LocalBoxFuture<'static, Result<()>>>>,
    driver: Cell<Driver>,
    done: Cell<bool>,
    detached: Cell<bool>,
    /// Result of an adopted run, kept for a handle that is still alive.
    outcome: RefCell<Option<Result<()>>>,
    waiters: RefCell<Vec<Waker>>,
    suspended: Rc<Cell<bool>>,
}

enum Adopted {
    Skipped,
    Waiting,
    /// Finished; carries the outcome when no handle is left to take it.
    Finished(Option<Result<()>>),
}

impl Child {
    fn is_done(&self) -> bool {
        self.done.get()
    }

    /// Poll the drive once. `None` while it is already being polled further
    /// up the stack, or once it is done.
    fn step(&self, cx: &mut Context<'_>) -> Option<Poll<Result<()>>> {
        let mut drive = self.drive.borrow_mut().take()?;
        let polled = drive.as_mut().poll(cx);
        if polled.is_ready() {
            self.done.set(true);
        } else {
            *self.drive.borrow_mut() = Some(drive);
        }
        Some(polled)
    }

    fn poll_handle(&self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        if let Some(outcome) = self.outcome.take() {
            return Poll::Ready(outcome);
        }
        if self.driver.get() != Driver::Enclosing {
            self.driver.set(Driver::Handle);
            if let Some(polled) = self.step(cx) {
                return polled;
            }
        }
        if self.done.get() {
            return Poll::Ready(Ok(()));
        }
        // Someone else is running it; waiting on a nested update is a legal
        // suspension of whatever body awaits this handle.
        self.waiters.borrow_mut().push(cx.waker().clone());
        self.suspended.set(true);
        Poll::Pending
    }

    fn poll_adopted(&self, cx: &mut Context<'_>) -> Adopted {
        if self.done.get() || (self.driver.get() == Driver::Handle && !self.detached.get()) {
            return Adopted::Skipped;
        }
        self.driver.set(Driver::Enclosing);
        match self.step(cx) {
            None => Adopted::Skipped,
            Some(Poll::Pending) => Adopted::Waiting,
            Some(Poll::Ready(outcome)) => {
                let unclaimed = if self.detached.get() {
                    Some(outcome)
                } else {
                    *self.outcome.borrow_mut() = Some(outcome);
                    None
                };
                for waker in self.waiters.take() {
                    waker.wake();
                }
                Adopted::Finished(unclaimed)
            }
        }
    }

    fn detach(&self) {
        self.detached.set(true);
        if self.driver.get() == Driver::Handle {
            self.driver.set(Driver::Unclaimed);
        }
    }
}

/// Run every nested staged update registered at or after `since` that no
/// live handle is awaiting. Pending while one of them is suspended.
fn adopt_children<S>(
    shared: &Shared<S>,
    since: u64,
    cx: &mut Context<'_>,
    failure: &mut Option<StateError>,
) -> Poll<()> {
    let mut next = 0;
    loop {
        let child = match shared.children.borrow().get(next) {
            Some(child) => Rc::clone(child),
            None => break,
        };
        next += 1;
        if child.seq < since {
            continue;
        }
        match child.poll_adopted(cx) {
            Adopted::Skipped | Adopted::Finished(None | Some(Ok(()))) => {}
            Adopted::Finished(Some(Err(err))) => {
                tracing::warn!(
                    store = %shared.config.label,
                    error = %err,
                    "detached nested update failed"
                );
                if failure.is_none() {
                    *failure = Some(err);
                }
            }
            Adopted::Waiting => return Poll::Pending,
        }
    }
    shared.children.borrow_mut().retain(|child| !child.is_done());
    Poll::Ready(())
}

fn has_unfinished_children<S>(shared: &Shared<S>, since: u64) -> bool {
    shared
        .children
        .borrow()
        .iter()
        .any(|child| child.seq >= since && !child.is_done())
}

/// Ownership of one update's transaction slot and `Tx` lease.
///
/// `release` is the normal end of an update. Dropped without it (a panic in
/// the updater, a cancelled drive), a top-level hold rolls the draft back to
/// the committed snapshot so the aborted writes never reach a later commit.
struct Hold<S: Clone + PartialEq + 'static> {
    shared: Rc<Shared<S>>,
    lease: Lease,
    top_level: bool,
    released: bool,
}

impl<S: Clone + PartialEq + 'static> Hold<S> {
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.lease.revoke();
        if self.top_level {
            self.shared.active.set(false);
        }
    }

    /// End the update without a commit, discarding its uncommitted writes.
    fn abandon(&mut self) {
        if self.released {
            return;
        }
        if self.top_level {
            if let Err(err) = rollback(&self.shared) {
                tracing::warn!(
                    store = %self.shared.config.label,
                    error = %err,
                    "could not roll back abandoned transaction"
                );
            }
            let orphans = std::mem::take(&mut *self.shared.children.borrow_mut());
            if !orphans.is_empty() {
                tracing::debug!(
                    store = %self.shared.config.label,
                    count = orphans.len(),
                    "nested staged updates discarded"
                );
            }
            drop(orphans);
        }
        self.release();
    }
}

impl<S: Clone + PartialEq + 'static> Drop for Hold<S> {
    fn drop(&mut self) {
        self.abandon();
    }
}

struct Drive<S: Clone + PartialEq + 'static> {
    body: Option<LocalBoxFuture<'static, Result<()>>>,
    /// Body result, held while adopted children finish.
    outcome: Option<Result<()>>,
    adopted_failure: Option<StateError>,
    since: u64,
    steps: u32,
    final_commit: bool,
    hold: Hold<S>,
}

impl<S: Clone + PartialEq + 'static> Drive<S> {
    fn new(body: LocalBoxFuture<'static, Result<()>>, hold: Hold<S>, since: u64) -> Self {
        Self {
            body: Some(body),
            outcome: None,
            adopted_failure: None,
            since,
            steps: 0,
            final_commit: true,
            hold,
        }
    }

    /// Finishes the nested staged updates a committed flat update left behind.
    fn adopting(hold: Hold<S>, since: u64) -> Self {
        Self {
            body: None,
            outcome: Some(Ok(())),
            adopted_failure: None,
            since,
            steps: 0,
            final_commit: false,
            hold,
        }
    }
}

impl<S: Clone + PartialEq + 'static> Future for Drive<S> {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let shared = Rc::clone(&this.hold.shared);
        let label = &shared.config.label;

        if let Some(body) = this.body.as_mut() {
            let outer = shared.suspended.replace(false);
            let polled = body.as_mut().poll(cx);
            if polled.is_pending() && shared.suspended.get() {
                // Leave the flag set: a drive awaiting this one is suspended too.
                this.steps += 1;
                tracing::debug!(
                    store = %label,
                    step = this.steps,
                    top_level = this.hold.top_level,
                    "staged update suspended"
                );
                return Poll::Pending;
            }
            shared.suspended.set(outer);
            this.body = None;

            let Poll::Ready(outcome) = polled else {
                this.hold.abandon();
                tracing::warn!(
                    store = %label,
                    step = this.steps,
                    "staged update parked on a future that is not a pending operation"
                );
                return Poll::Ready(Err(StateError::InvalidSuspensionValue));
            };
            this.outcome = Some(outcome);
        }

        let outer = shared.suspended.replace(false);
        if adopt_children(&shared, this.since, cx, &mut this.adopted_failure).is_pending() {
            return Poll::Pending;
        }
        shared.suspended.set(outer);
        this.hold.release();

        let outcome = match (this.outcome.take(), this.adopted_failure.take()) {
            (Some(Ok(())) | None, Some(err)) => Err(err),
            (outcome, _) => outcome.unwrap_or(Ok(())),
        };
        if !this.final_commit {
            return Poll::Ready(outcome);
        }

        let committed = commit(&shared);
        tracing::debug!(
            store = %label,
            steps = this.steps,
            top_level = this.hold.top_level,
            ok = outcome.is_ok(),
            "staged update complete"
        );
        Poll::Ready(outcome.and(committed.map(drop)))
    }
}

/// Run `updater` against `shared`, opening a transaction if none is active.
pub(crate) fn run<S, U, O>(shared: &Rc<Shared<S>>, updater: U) -> Result<Update>
where
    S: Clone + PartialEq + 'static,
    U: FnOnce(Tx<S>) -> O,
    O: IntoUpdate,
{
    shared.ensure_ready()?;

    let top_level = !shared.active.get();
    if top_level {
        shared.active.set(true);
        shared.record(|stats| stats.transactions += 1);
    } else {
        shared.record(|stats| stats.nested_updates += 1);
    }
    let since = shared.next_child.get();
    let mut hold = Hold {
        shared: Rc::clone(shared),
        lease: Lease::new(),
        top_level,
        released: false,
    };
    let tx = Tx::new(Rc::clone(shared), hold.lease.clone());

    match updater(tx).into_update() {
        UpdateBody::Flat(outcome) if !top_level => {
            hold.release();
            tracing::trace!(store = %shared.config.label, "nested flat update folded");
            outcome.map(|()| Update::resolved())
        }
        UpdateBody::Flat(Err(err)) => {
            hold.abandon();
            tracing::debug!(
                store = %shared.config.label,
                error = %err,
                "flat update failed; draft rolled back"
            );
            Err(err)
        }
        UpdateBody::Flat(Ok(())) => {
            hold.release();
            commit(shared)?;
            if has_unfinished_children(shared, since) {
                return Ok(Update::owned(Drive::adopting(hold, since)));
            }
            Ok(Update::resolved())
        }
        UpdateBody::Staged(body) if top_level => Ok(Update::owned(Drive::new(body, hold, since))),
        UpdateBody::Staged(body) => {
            let seq = shared.next_child.get();
            shared.next_child.set(seq + 1);
            let child = Rc::new(Child {
                seq,
                drive: RefCell::new(Some(Drive::new(body, hold, seq + 1).boxed_local())),
                driver: Cell::new(Driver::Unclaimed),
                done: Cell::new(false),
                detached: Cell::new(false),
                outcome: RefCell::new(None),
                waiters: RefCell::new(Vec::new()),
                suspended: Rc::clone(&shared.suspended),
            });
            shared.children.borrow_mut().push(Rc::clone(&child));
            Ok(Update {
                state: Handle::Child(child),
            })
        }
    }
}
