pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "postgres")]
pub mod sweep;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{types::LeaseToken, JobId, JobMessage, LeasedJob, QueueCapabilities, QueueCtx, QueueResult, QueueStats};

/// Backend trait for queue storage primitives. Five operations: enqueue,
/// dequeue, complete, fail, and stats. Everything else (retry backoff,
/// dispatch, concurrency) lives above this trait in [`crate::adapter`].
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Enqueue a job. If `message.idempotency_key` is set and a
    /// non-terminal job with the same queue/job_type/key already exists,
    /// returns that job's id instead of creating a new one.
    async fn enqueue(&self, ctx: QueueCtx, message: JobMessage) -> QueueResult<JobId>;

    /// Lease-based dequeue of the next eligible job across `queues`,
    /// ordered by priority (ascending) then `created_at` (ascending).
    /// Returns `None` when nothing is eligible right now.
    async fn dequeue(&self, ctx: QueueCtx, queues: &[&str]) -> QueueResult<Option<LeasedJob>>;

    /// Acknowledge job completion. Requires the lease token handed out by
    /// `dequeue`; a stale token (lease already reaped) is rejected.
    async fn complete(
        &self,
        ctx: QueueCtx,
        job_id: JobId,
        lease_token: LeaseToken,
        result_ref: Option<String>,
    ) -> QueueResult<()>;

    /// Acknowledge job failure. `retry_at` is computed by the adapter's
    /// backoff policy; `None` means the job is permanently failed.
    async fn fail(
        &self,
        ctx: QueueCtx,
        job_id: JobId,
        lease_token: LeaseToken,
        error: String,
        retry_at: Option<DateTime<Utc>>,
    ) -> QueueResult<()>;

    /// Point-in-time counts across all jobs in the given queues, by status.
    async fn stats(&self, ctx: QueueCtx, queues: &[&str]) -> QueueResult<QueueStats>;

    /// Get backend capabilities
    fn capabilities(&self) -> QueueCapabilities;
}
