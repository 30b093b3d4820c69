#![forbid(unsafe_code)]

//! Deterministic test tooling for draftstate stores.
//!
//! - [`manual_op`]: a pending operation the test settles by hand.
//! - [`Recorder`]: collects the values an observer was notified with.
//! - [`LocalRunner`]: single-threaded executor that runs staged updates until
//!   they stall on an unsettled operation.
//! - [`init_tracing`]: idempotent `tracing` subscriber for test output.

pub mod op;
pub mod recorder;
pub mod runner;
pub mod trace;

pub use op::{ManualOp, OpError, OpHandle, manual_op};
pub use recorder::Recorder;
pub use runner::{LocalRunner, Outcome};
pub use trace::{LOG_ENV, init_tracing};
