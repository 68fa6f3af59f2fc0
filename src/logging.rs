//! Subscriber setup for binaries; the library itself only emits events.

use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{Result, SearchError};

/// Installs a global `fmt` subscriber filtered by `level` (any `EnvFilter`
/// directive, e.g. `info` or `pges::search=debug`).
pub fn init_logging(level: &str) -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(level)
                .map_err(|e| SearchError::InvalidArgument(format!("invalid log level: {e}")))?,
        )
        .with_target(true)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|_| SearchError::InvalidArgument("logging already initialized".into()))
}
