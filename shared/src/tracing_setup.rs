//! Process-wide structured logging setup, shared by every binary in the workspace.

use tracing_subscriber::{fmt::time::UtcTime, EnvFilter};

/// Initializes the global tracing subscriber with the given filter directive string (e.g.
/// `"warn,market=debug"`). Panics if called more than once per process.
pub fn initialize(filter: &str) {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_timer(UtcTime::rfc_3339())
        .init();
}
