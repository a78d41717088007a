//! Durable relational state: sources, raw/processed items, daily
//! analyses, predictions and their comparisons, plus the job queue table
//! shared with [`pipeline_queue`]. `Store` is the single entry point —
//! every other crate reaches the database through it, never through a
//! raw `PgPool` of its own.

pub mod analyses;
pub mod models;
pub mod predictions;
pub mod processed_items;
pub mod raw_items;
mod schema;
pub mod sources;

pub use analyses::DailyAnalysisRepository;
pub use predictions::{PredictionComparisonRepository, PredictionRepository};
pub use processed_items::ProcessedItemRepository;
pub use raw_items::RawItemRepository;
pub use sources::SourceRepository;

use chrono::{DateTime, Utc};
use pipeline_core::{AppError, Config};
use pipeline_queue::{
    JobId, JobMessage, LeaseToken, LeasedJob, PostgresBackend, QueueBackend, QueueCtx, QueueStats,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

/// Durable store handle. Cheap to clone: both the pool and the queue
/// backend are themselves `Clone` wrappers around a shared connection
/// pool.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
    queue: PostgresBackend,
}

impl Store {
    /// Connect using `config.store_url`, run both this crate's migration
    /// and the queue crate's, and return a ready handle.
    pub async fn connect(config: &Config) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.worker_concurrency.max(4) as u32 + 4)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&config.store_url)
            .await
            .map_err(|e| AppError::store(format!("connect failed: {e}")))?;

        sqlx::query(schema::MIGRATION_SQL)
            .execute(&pool)
            .await
            .map_err(|e| AppError::store(format!("migration failed: {e}")))?;

        let queue = PostgresBackend::from_pool(pool.clone())
            .with_lease_duration(config.job_visibility_timeout);
        queue
            .migrate()
            .await
            .map_err(|e| AppError::store(format!("queue migration failed: {e}")))?;

        Ok(Self { pool, queue })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn sources(&self) -> SourceRepository {
        SourceRepository::new(self.pool.clone())
    }

    pub fn raw_items(&self) -> RawItemRepository {
        RawItemRepository::new(self.pool.clone())
    }

    pub fn processed_items(&self) -> ProcessedItemRepository {
        ProcessedItemRepository::new(self.pool.clone())
    }

    pub fn daily_analyses(&self) -> DailyAnalysisRepository {
        DailyAnalysisRepository::new(self.pool.clone())
    }

    pub fn predictions(&self) -> PredictionRepository {
        PredictionRepository::new(self.pool.clone())
    }

    pub fn prediction_comparisons(&self) -> PredictionComparisonRepository {
        PredictionComparisonRepository::new(self.pool.clone())
    }

    /// §6.1's four required queue operations, delegated straight to the
    /// Postgres backend so there is exactly one `jobs` table and one
    /// implementation of its claim/retry semantics.
    pub async fn enqueue_job(&self, ctx: QueueCtx, message: JobMessage) -> Result<JobId, AppError> {
        self.queue
            .enqueue(ctx, message)
            .await
            .map_err(|e| AppError::store(format!("enqueue_job failed: {e}")))
    }

    pub async fn dequeue_job(
        &self,
        ctx: QueueCtx,
        queues: &[&str],
    ) -> Result<Option<LeasedJob>, AppError> {
        self.queue
            .dequeue(ctx, queues)
            .await
            .map_err(|e| AppError::store(format!("dequeue_job failed: {e}")))
    }

    pub async fn complete_job(
        &self,
        ctx: QueueCtx,
        job_id: JobId,
        lease_token: LeaseToken,
    ) -> Result<(), AppError> {
        self.queue
            .complete(ctx, job_id, lease_token, None)
            .await
            .map_err(|e| AppError::store(format!("complete_job failed: {e}")))
    }

    pub async fn fail_job(
        &self,
        ctx: QueueCtx,
        job_id: JobId,
        lease_token: LeaseToken,
        error: String,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        self.queue
            .fail(ctx, job_id, lease_token, error, retry_at)
            .await
            .map_err(|e| AppError::store(format!("fail_job failed: {e}")))
    }

    pub async fn queue_stats(&self, ctx: QueueCtx, queues: &[&str]) -> Result<QueueStats, AppError> {
        self.queue
            .stats(ctx, queues)
            .await
            .map_err(|e| AppError::store(format!("queue_stats failed: {e}")))
    }
}
