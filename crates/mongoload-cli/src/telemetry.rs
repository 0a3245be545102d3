//! Logging setup for the command line

use tracing_subscriber::EnvFilter;

/// Install the global `fmt` subscriber.
///
/// The filter comes from `RUST_LOG` and falls back to `info`, or `debug` when
/// `verbose` is set.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    tracing::debug!("Logging initialized");
}
