#![forbid(unsafe_code)]

//! draftstate public facade crate.
//!
//! A reactive state container: observers read derived selections and are
//! notified only when their selection changes; mutations run as flat or
//! staged transactions against a copy-on-write draft.
//!
//! ```
//! use draftstate::prelude::*;
//!
//! #[derive(Clone, PartialEq)]
//! struct Cart {
//!     items: u32,
//! }
//!
//! let store = define::<Cart>();
//! store.setup(Cart { items: 0 }).unwrap();
//! let items = store.select(|s| s.items).unwrap();
//!
//! let _ = store.update(|tx| tx.write(|s| s.items += 2)).unwrap();
//! assert_eq!(items.get(), 2);
//! ```

pub use draftstate_core::impl_shallow_eq;
pub use draftstate_runtime::{
    AsyncStatus, DraftRef, IntoUpdate, Observe, Result, Selection, Staged, StateError, Store,
    StoreConfig, Tx, Update, define, staged,
};

pub mod prelude {
    pub use draftstate_core as core;
    pub use draftstate_runtime as runtime;

    pub use draftstate_core::{AsyncStatus, Result, Same, ShallowEq, StateError, StoreConfig};
    pub use draftstate_runtime::{Selection, Staged, Store, Tx, Update, define, staged};
}
