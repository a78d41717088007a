//! Worker pool and freshness trigger for the content pipeline: process
//! lifecycle, per-`JobKind` dispatch, rate limiting, graceful shutdown.
//! The binary entrypoint lives in `main.rs`; everything else here is
//! library code so it can be exercised from tests without a process.

pub mod context;
pub mod freshness;
pub mod handlers;
pub mod jobs;
pub mod payloads;
pub mod rate_limit;
