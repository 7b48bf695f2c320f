//! Tracing subscriber setup for test binaries.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Filter directives are read from this variable, e.g. `UNDERSTUDY_LOG=understudy_core=debug`.
pub const LOG_ENV: &str = "UNDERSTUDY_LOG";

static INIT: Once = Once::new();

/// Installs a fmt subscriber writing to the test output. Safe to call repeatedly.
pub fn init() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
        // Another subscriber may already be installed by the host runner.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
