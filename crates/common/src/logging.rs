//! Logging utilities for sentinel pool components.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize tracing with sensible defaults.
///
/// Uses the RUST_LOG environment variable to control log levels.
/// Default level is INFO. Panics if a global subscriber is already set.
pub fn init() {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter("info"))
        .init();
}

/// Initialize tracing with JSON formatting (useful for structured logging).
pub fn init_json() {
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(filter("info"))
        .init();
}

/// Try to initialize tracing with the given default level.
///
/// Returns an error instead of panicking when a subscriber is already
/// installed, so tests can call it repeatedly. Output goes through the
/// test harness capture.
pub fn try_init(default_level: &str) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_test_writer())
        .with(filter(default_level))
        .try_init()
}
