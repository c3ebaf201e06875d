//! Diagnostic logging setup

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Filter directive for the given verbosity, scoped to this crate.
///
/// `RUST_LOG` wins when it is set.
pub fn filter_directive(level: &str) -> String {
    std::env::var("RUST_LOG").unwrap_or_else(|_| format!("field_cache={}", level.trim()))
}

/// Install a global `tracing` subscriber writing to stdout.
///
/// Returns `false` if a subscriber was already installed, in which case the
/// existing one is left untouched.
pub fn init_tracing(level: &str) -> bool {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter_directive(level)))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
