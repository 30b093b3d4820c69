#![forbid(unsafe_code)]

//! Suspension points of a staged update.
//!
//! [`Pending`] wraps the asynchronous operation a staged body waits on. The
//! first time it is polled it commits the live draft, so everything written
//! before the suspension point becomes visible before the operation settles.
//! While the operation is outstanding it marks the store as legally
//! suspended, which is how the sequencer tells a real suspension point from
//! an arbitrary future parked inside the body.

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use pin_project::pin_project;

use crate::commit::commit;
use crate::store::Shared;
use crate::tx::Lease;

/// Future returned by [`Tx::pending`](crate::Tx::pending).
#[pin_project]
#[must_use = "a pending operation does nothing until awaited"]
pub struct Pending<S, F> {
    shared: Rc<Shared<S>>,
    lease: Lease,
    #[pin]
    op: F,
    checkpointed: bool,
}

impl<S, F> Pending<S, F> {
    pub(crate) fn new(shared: Rc<Shared<S>>, lease: Lease, op: F) -> Self {
        Self {
            shared,
            lease,
            op,
            checkpointed: false,
        }
    }
}

impl<S: Clone + PartialEq + 'static, F: Future> Future for Pending<S, F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        if !*this.checkpointed {
            *this.checkpointed = true;
            if !this.lease.is_live() {
                // The update that created this point is gone; its draft is
                // no longer ours to commit.
                tracing::warn!(
                    store = %this.shared.config.label,
                    "suspension point outlived its update; checkpoint skipped"
                );
            } else if let Err(err) = commit(this.shared) {
                tracing::warn!(
                    store = %this.shared.config.label,
                    error = %err,
                    "checkpoint commit before suspension failed"
                );
            }
        }
        match this.op.poll(cx) {
            Poll::Ready(output) => Poll::Ready(output),
            Poll::Pending => {
                this.shared.suspended.set(true);
                Poll::Pending
            }
        }
    }
}
