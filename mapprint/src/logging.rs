//! Logging setup for embedders.
//!
//! The library logs through `tracing` everywhere; this helper wires a
//! stdout subscriber for binaries and tests that want output without
//! assembling their own. Configurable via the `RUST_LOG` environment
//! variable, defaulting to `info`.

use tracing_subscriber::EnvFilter;

/// Initializes a stdout tracing subscriber.
///
/// Safe to call more than once; only the first call installs the global
/// subscriber.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();
}
