//! Logging initialization

use tracing_subscriber::EnvFilter;

/// Initialize tracing with standard configuration
///
/// Filtering follows `RUST_LOG`, defaulting to `info`. Panics if a global
/// subscriber is already installed.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(default_filter())
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .init();
}

/// Like [`init_tracing`], but leaves an already installed subscriber alone
pub fn try_init_tracing() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(default_filter())
        .with_target(false)
        .try_init()
        .is_ok()
}

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
