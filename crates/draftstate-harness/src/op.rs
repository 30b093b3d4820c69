#![forbid(unsafe_code)]

//! Pending operations settled by the test.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use draftstate_core::StateError;
use futures::channel::oneshot;
use thiserror::Error;

/// How a manual operation failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpError {
    #[error("{0}")]
    Rejected(String),
    #[error("operation abandoned before it settled")]
    Abandoned,
}

/// An unhandled rejection leaving a staged updater through `?`.
impl From<OpError> for StateError {
    fn from(error: OpError) -> Self {
        StateError::rejected(error)
    }
}

/// The future half of [`manual_op`].
#[derive(Debug)]
#[must_use = "an operation does nothing until awaited"]
pub struct ManualOp<T> {
    rx: oneshot::Receiver<Result<T, OpError>>,
}

impl<T> Future for ManualOp<T> {
    type Output = Result<T, OpError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(OpError::Abandoned)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// The settling half of [`manual_op`]. Dropping it abandons the operation.
#[derive(Debug)]
pub struct OpHandle<T> {
    tx: oneshot::Sender<Result<T, OpError>>,
}

impl<T> OpHandle<T> {
    /// Settle with `value`. Returns false if the operation was dropped.
    pub fn resolve(self, value: T) -> bool {
        self.tx.send(Ok(value)).is_ok()
    }

    /// Settle with a rejection carrying `reason`.
    pub fn reject(self, reason: impl Into<String>) -> bool {
        self.tx.send(Err(OpError::Rejected(reason.into()))).is_ok()
    }

    /// Whether the future half is still waiting.
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        !self.tx.is_canceled()
    }
}

/// A pending operation plus the handle that settles it.
pub fn manual_op<T>() -> (ManualOp<T>, OpHandle<T>) {
    let (tx, rx) = oneshot::channel();
    (ManualOp { rx }, OpHandle { tx })
}
