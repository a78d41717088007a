//! Durable, database-backed job queue for the content pipeline.
//!
//! The queue gives every stage of the pipeline the same guarantees: a job
//! enqueued once is dequeued at most by one worker at a time (lease-based
//! claims, invalidated by a reaper on expiry), retried with exponential
//! backoff on transient failure, and deduplicated by an idempotency key so
//! re-running a trigger doesn't double-enqueue work already in flight.
//!
//! ```rust
//! use pipeline_queue::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct FetchFeedJob {
//!     source_id: String,
//! }
//!
//! #[async_trait::async_trait]
//! impl Job for FetchFeedJob {
//!     type Context = ();
//!     type Result = ();
//!
//!     const JOB_TYPE: &'static str = "feed_fetch";
//!
//!     async fn execute(&self, _ctx: Self::Context) -> Result<Self::Result, JobError> {
//!         Ok(())
//!     }
//!
//!     fn idempotency_key(&self) -> Option<String> {
//!         Some(self.source_id.clone())
//!     }
//! }
//! ```

pub mod adapter;
pub mod backend;
pub mod codec;
pub mod error;
pub mod job;
pub mod observability;
pub mod types;

pub use adapter::{QueueAdapter, QueueConfig, WorkerHandle};
pub use backend::QueueBackend;
pub use codec::json::JsonCodec;
pub use codec::{CodecRegistry, JobCodec};
pub use error::{JobError, QueueError, QueueResult};
pub use job::{Job, JobHandler, JobRegistry};
pub use observability::{LiveMetrics, ObservabilityLayer};
pub use types::{
    JobEvent, JobId, JobKind, JobMessage, JobRecord, JobStatus, LeasedJob, LeaseToken, Priority,
    QueueCapabilities, QueueCtx, QueueStats,
};

#[cfg(feature = "postgres")]
pub use backend::postgres::PostgresBackend;

#[cfg(feature = "postgres")]
pub use backend::sweep::PostgresSweeper;

pub use backend::memory::{LeaseReaper, MemoryBackend};

/// Prelude for crates that implement jobs and run the worker pool.
pub mod prelude {
    pub use crate::{Job, QueueAdapter, QueueBackend};
    pub use crate::{JobError, JobId, JobKind, QueueCtx, QueueResult};
    pub use crate::{CodecRegistry, JobCodec, JsonCodec};
    pub use crate::JobRegistry;
    pub use crate::{LiveMetrics, ObservabilityLayer};
    pub use async_trait::async_trait;
}
