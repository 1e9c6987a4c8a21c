//! Logging setup
//!
//! Human-readable `tracing` output on stderr. `RUST_LOG` takes precedence;
//! otherwise the crate logs at INFO, or DEBUG when verbose.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cluster_debug={default_level}")));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .compact()
        .try_init();
}

/// Console logging for tests
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
