#![forbid(unsafe_code)]

//! Core: copy-on-write drafts, shallow equality, errors, and configuration.
//!
//! Nothing in this crate schedules work or logs; the runtime crate builds the
//! transaction scheduler on top of these pieces.

pub mod config;
pub mod draft;
pub mod error;
pub mod shallow;
pub mod status;

pub use config::{SetupNotify, StoreConfig};
pub use draft::{Draft, DraftSlot};
pub use error::{Result, RevokedOrigin, StateError};
pub use shallow::{Same, ShallowEq};
pub use status::AsyncStatus;

/// Persistent collections for structural sharing inside snapshots.
#[cfg(feature = "hamt")]
pub mod persistent {
    pub use im::{HashMap, HashSet, OrdMap, OrdSet, Vector};
}
