//! Shared plumbing for the depth feed workspace: environment-driven
//! configuration, the fixed reconnect delay and logging setup.

mod backoff;
mod config;

pub use backoff::FixedBackoff;
pub use config::{ConfigError, FeedConfig, FeedEnvironment};

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// The filter is read from `RUST_LOG` and falls back to `info`. Calling this
/// more than once is harmless; later calls are ignored.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
