//! Tracing initialization for binaries and tests

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured logging with an env-filter.
///
/// Respects `RUST_LOG`; defaults to info-level output for the engine
/// crates. Repeated calls after the first are no-ops, so tests can
/// call this freely.
pub fn init() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "engine_core=info,storage=info,checkpoint=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
