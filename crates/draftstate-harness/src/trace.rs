#![forbid(unsafe_code)]

//! Tracing output for tests.
//!
//! ```bash
//! DRAFTSTATE_LOG=draftstate_runtime=debug cargo test -- --nocapture
//! ```

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter directive variable. Defaults to `warn` when unset or invalid.
pub const LOG_ENV: &str = "DRAFTSTATE_LOG";

/// Install a test-writer `fmt` subscriber. Later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_test_writer().compact())
        .try_init();
}
