//! Tracing setup for the worker process. One call at startup; everything
//! downstream uses `tracing`'s macros and relies on this subscriber being
//! installed first.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a `tracing_subscriber` with an `EnvFilter` read from `RUST_LOG`
/// (defaulting to `info`). Safe to call once per process; a second call
/// is a no-op rather than a panic, since tests may share a process.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
