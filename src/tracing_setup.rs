//! Initializes structured logging once, at process start.

use tracing_subscriber::EnvFilter;

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs a `tracing` subscriber that writes human-readable lines to
/// stderr, filtered by `RUST_LOG` (defaulting to `info` when unset).
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_target(false)
        .init();
}
