#![forbid(unsafe_code)]

//! Transactional updates and change-filtered observers over a snapshot.
//!
//! - [`Store`]: the container. Holds the committed snapshot, the live draft,
//!   the active-transaction flag, and the observer registry.
//! - [`Tx`]: mutation context handed to updaters; writes go to the live draft.
//! - [`Update`]: completion handle. Resolved for flat updates, a future for
//!   staged ones.
//! - [`Selection`]: RAII observer handle over a projection of the state.
//!
//! # Architecture
//!
//! Everything is single-threaded (`Rc`/`RefCell`/`Cell`). A commit finalizes
//! the live draft, swaps the snapshot only if its identity changed, opens a
//! fresh draft, and broadcasts to observers in registration order. A staged
//! updater is an `async` block; each [`Tx::pending`] it awaits commits before
//! waiting, and the drive commits once more when the block completes.
//!
//! # Invariants
//!
//! 1. Snapshot identity changes if and only if a commit changed content.
//! 2. An observer is notified only when its projection is not shallow-equal
//!    to the last value it saw.
//! 3. At most one top-level transaction is active per store; updates issued
//!    while one is active join it.
//! 4. A staged transaction with N suspension points attempts N + 1 commits.
//! 5. Draft handles pinned to a finalized draft fail with
//!    `RevokedDraftAccess`.

mod commit;
pub mod pending;
pub mod registry;
pub mod schedule;
pub mod selection;
pub mod sequencer;
pub mod store;
pub mod tx;

pub use pending::Pending;
pub use registry::{ObserverId, Observe, SubscriptionRegistry};
pub use schedule::{Immediate, Schedule, Task, TickQueue};
pub use selection::Selection;
pub use sequencer::{IntoUpdate, Staged, Update, UpdateBody, staged};
pub use store::{Store, StoreStats, define};
pub use tx::{DraftRef, Tx};

pub use draftstate_core::{
    AsyncStatus, Result, RevokedOrigin, Same, SetupNotify, ShallowEq, StateError, StoreConfig,
};
