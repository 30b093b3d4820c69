#![forbid(unsafe_code)]

//! Error type shared by every draftstate crate.
//!
//! Precondition failures (`Uninitialized`, `RevokedDraftAccess`, `DraftBusy`)
//! surface synchronously at the call site. `PendingOperationFailure` is the
//! form an unhandled rejection takes once it escapes a staged updater.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StateError>;

/// Why a draft handle stopped accepting writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokedOrigin {
    /// The draft at this generation was finalized by a commit.
    Committed { generation: u64 },
    /// The transaction context outlived the update that issued it.
    TransactionEnded,
}

impl fmt::Display for RevokedOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Committed { generation } => {
                write!(f, "draft generation {generation} was finalized")
            }
            Self::TransactionEnded => f.write_str("owning transaction has ended"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("store used before `setup`")]
    Uninitialized,

    #[error("write through a revoked draft: {origin}")]
    RevokedDraftAccess { origin: RevokedOrigin },

    #[error("pending operation failed: {0}")]
    PendingOperationFailure(#[source] Box<dyn StdError + 'static>),

    #[error("staged update suspended on a future that is not a pending operation")]
    InvalidSuspensionValue,

    #[error("draft is already borrowed by an enclosing write")]
    DraftBusy,
}

impl StateError {
    /// Wrap a pending-operation rejection so it can leave an updater with `?`.
    #[must_use]
    pub fn rejected(error: impl Into<Box<dyn StdError + 'static>>) -> Self {
        Self::PendingOperationFailure(error.into())
    }

    #[must_use]
    pub const fn revoked(origin: RevokedOrigin) -> Self {
        Self::RevokedDraftAccess { origin }
    }

    #[must_use]
    pub const fn is_uninitialized(&self) -> bool {
        matches!(self, Self::Uninitialized)
    }

    #[must_use]
    pub const fn is_revoked(&self) -> bool {
        matches!(self, Self::RevokedDraftAccess { .. })
    }

    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::PendingOperationFailure(_))
    }
}
