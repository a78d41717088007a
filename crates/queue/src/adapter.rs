use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    backend::QueueBackend, codec::CodecRegistry, job::JobRegistry,
    observability::ObservabilityLayer, Job, JobId, QueueCtx, QueueError, QueueResult,
};

/// Configuration for queue adapter
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of concurrent workers per queue
    pub max_workers: usize,
    /// Worker idle timeout before shutdown
    pub worker_idle_timeout: Duration,
    /// Lease duration for jobs
    pub lease_duration: Duration,
    /// Maximum retry backoff duration
    pub max_retry_backoff: Duration,
    /// Base retry backoff duration
    pub base_retry_backoff: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 10,
            worker_idle_timeout: Duration::from_secs(60),
            lease_duration: Duration::from_secs(300),
            max_retry_backoff: Duration::from_secs(3600),
            base_retry_backoff: Duration::from_secs(60),
        }
    }
}

/// Handle for managing worker lifecycle
pub struct WorkerHandle {
    shutdown_tx: oneshot::Sender<()>,
    join_handle: JoinHandle<QueueResult<()>>,
}

impl WorkerHandle {
    /// Signal shutdown and wait (up to the worker's own grace window) for
    /// the in-flight job, if any, to finish before returning.
    pub async fn shutdown(self) -> QueueResult<()> {
        let _ = self.shutdown_tx.send(());
        self.join_handle
            .await
            .map_err(|e| QueueError::Internal(format!("worker join error: {e}")))?
    }
}

/// Queue adapter: wires a [`QueueBackend`] to a [`JobRegistry`] and spawns
/// the worker pool that pulls from it.
pub struct QueueAdapter<B: QueueBackend + ?Sized> {
    backend: Arc<B>,
    codec_registry: Arc<CodecRegistry>,
    job_registry: Arc<RwLock<JobRegistry>>,
    observability: Arc<ObservabilityLayer>,
    config: QueueConfig,
}

impl<B: QueueBackend + Send + Sync + 'static> QueueAdapter<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
            codec_registry: Arc::new(CodecRegistry::new()),
            job_registry: Arc::new(RwLock::new(JobRegistry::new())),
            observability: Arc::new(ObservabilityLayer::new()),
            config: QueueConfig::default(),
        }
    }

    pub fn with_config(backend: B, config: QueueConfig) -> Self {
        Self {
            backend: Arc::new(backend),
            codec_registry: Arc::new(CodecRegistry::new()),
            job_registry: Arc::new(RwLock::new(JobRegistry::new())),
            observability: Arc::new(ObservabilityLayer::new()),
            config,
        }
    }

    pub fn with_codec_registry(mut self, registry: CodecRegistry) -> Self {
        self.codec_registry = Arc::new(registry);
        self
    }

    pub fn with_observability(mut self, observability: ObservabilityLayer) -> Self {
        self.observability = Arc::new(observability);
        self
    }

    /// Register a job type for processing
    pub async fn register_job<J: Job>(&self) -> QueueResult<()> {
        let mut registry = self.job_registry.write().await;
        registry.register::<J>()?;
        info!(job_type = J::JOB_TYPE, "registered job type");
        Ok(())
    }

    /// Enqueue a job for processing
    #[instrument(skip(self, job), fields(job_type = J::JOB_TYPE))]
    pub async fn enqueue<J: Job>(&self, ctx: QueueCtx, job: J) -> QueueResult<JobId> {
        let message = self.codec_registry.encode_job(&job, &ctx)?;
        let job_id = self.backend.enqueue(ctx.clone(), message).await?;
        self.observability.record_job_enqueued(&ctx, &job_id, J::JOB_TYPE).await;
        info!(%job_id, job_type = J::JOB_TYPE, "enqueued job");
        Ok(job_id)
    }

    /// Execute a job immediately, bypassing durable storage. Used for
    /// tests and for the freshness trigger's lightweight checks.
    #[instrument(skip(self, job, context), fields(job_type = J::JOB_TYPE))]
    pub async fn execute_now<J: Job>(&self, _ctx: QueueCtx, job: J, context: J::Context) -> QueueResult<J::Result> {
        info!(job_type = J::JOB_TYPE, "executing job immediately");

        let timeout_duration = Duration::from_secs(300);
        let result = tokio::time::timeout(timeout_duration, job.execute(context))
            .await
            .map_err(|_| QueueError::Internal("job execution timeout".to_string()))?
            .map_err(QueueError::JobFailed)?;

        info!(job_type = J::JOB_TYPE, "job executed successfully");
        Ok(result)
    }

    /// Start a worker pulling from `queues` with a shared execution context.
    #[instrument(skip(self, context), fields(queues = ?queues))]
    pub async fn start_workers<C>(&self, ctx: QueueCtx, context: C, queues: Vec<String>) -> QueueResult<WorkerHandle>
    where
        C: Clone + Send + Sync + 'static,
    {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let adapter_clone: QueueAdapter<dyn QueueBackend + Send + Sync> = QueueAdapter {
            backend: self.backend.clone() as Arc<dyn QueueBackend + Send + Sync>,
            codec_registry: self.codec_registry.clone(),
            job_registry: self.job_registry.clone(),
            observability: self.observability.clone(),
            config: self.config.clone(),
        };

        let worker = Worker {
            adapter: Arc::new(adapter_clone),
            ctx: ctx.clone(),
            context: Arc::new(context),
            queues,
            shutdown_rx: Some(shutdown_rx),
        };

        let join_handle = tokio::spawn(async move { worker.run().await });

        info!("started worker");

        Ok(WorkerHandle {
            shutdown_tx,
            join_handle,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn codec_registry(&self) -> &CodecRegistry {
        &self.codec_registry
    }

    pub fn observability(&self) -> &ObservabilityLayer {
        &self.observability
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }
}

impl<B: QueueBackend> Clone for QueueAdapter<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            codec_registry: self.codec_registry.clone(),
            job_registry: self.job_registry.clone(),
            observability: self.observability.clone(),
            config: self.config.clone(),
        }
    }
}

/// A single concurrent executor pulling from `queues`. The worker pool is
/// just N of these, spawned by [`QueueAdapter::start_workers`] calls.
struct Worker<C> {
    adapter: Arc<QueueAdapter<dyn QueueBackend + Send + Sync>>,
    ctx: QueueCtx,
    context: Arc<C>,
    queues: Vec<String>,
    shutdown_rx: Option<oneshot::Receiver<()>>,
}

impl<C: Send + Sync + 'static> Worker<C> {
    async fn run(mut self) -> QueueResult<()> {
        let mut shutdown_rx = self.shutdown_rx.take().unwrap();
        let queue_refs: Vec<&str> = self.queues.iter().map(|s| s.as_str()).collect();

        info!(queues = ?self.queues, "worker started");

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("worker shutdown requested");
                    break;
                }

                result = self.process_next_job(&queue_refs) => {
                    match result {
                        Ok(true) => {}
                        Ok(false) => tokio::time::sleep(Duration::from_millis(100)).await,
                        Err(e) => {
                            error!(error = %e, "error processing job");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }

        info!("worker stopped");
        Ok(())
    }

    /// Dequeue and execute at most one job. Returns `false` when nothing
    /// was eligible, so the caller can back off before polling again.
    async fn process_next_job(&self, queues: &[&str]) -> QueueResult<bool> {
        let leased_job = match self.adapter.backend.dequeue(self.ctx.clone(), queues).await? {
            Some(job) => job,
            None => return Ok(false),
        };

        let job_id = leased_job.record.job_id.clone();
        let job_type = leased_job.record.message.job_type.clone();

        debug!(%job_id, job_type = %job_type, "processing job");

        let registry = self.adapter.job_registry.read().await;
        let result = registry
            .execute_job(&leased_job.record.message, self.context.clone())
            .await;

        match result {
            Ok(result_ref) => {
                self.adapter
                    .backend
                    .complete(self.ctx.clone(), job_id.clone(), leased_job.lease_token, result_ref)
                    .await?;

                self.adapter.observability.record_job_completed(&self.ctx, &job_id, &job_type).await;
                info!(%job_id, "job completed successfully");
            }

            Err(job_error) => {
                let is_retryable = job_error.is_retryable();
                let retry_at = if is_retryable && leased_job.record.attempt < leased_job.record.message.max_retries {
                    Some(self.calculate_retry_time(leased_job.record.attempt))
                } else {
                    None
                };

                self.adapter
                    .backend
                    .fail(
                        self.ctx.clone(),
                        job_id.clone(),
                        leased_job.lease_token,
                        job_error.to_string(),
                        retry_at,
                    )
                    .await?;

                if retry_at.is_some() {
                    self.adapter.observability.record_job_retrying(&self.ctx, &job_id, &job_type).await;
                    warn!(%job_id, error = %job_error, "job failed, will retry");
                } else {
                    self.adapter.observability.record_job_failed(&self.ctx, &job_id, &job_type).await;
                    error!(%job_id, error = %job_error, "job failed permanently");
                }
            }
        }

        Ok(true)
    }

    /// Exponential backoff from the adapter's configured base, capped at
    /// `max_retry_backoff`.
    fn calculate_retry_time(&self, attempt: u32) -> chrono::DateTime<chrono::Utc> {
        let backoff_seconds = std::cmp::min(
            self.adapter.config.base_retry_backoff.as_secs() * 2_u64.pow(attempt.saturating_sub(1)),
            self.adapter.config.max_retry_backoff.as_secs(),
        );

        chrono::Utc::now() + chrono::Duration::seconds(backoff_seconds as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::{Job, JobError};
    use async_trait::async_trait;

    #[derive(Clone)]
    struct TestContext {
        value: String,
    }

    #[derive(Clone, serde::Serialize, serde::Deserialize)]
    struct TestJob {
        data: String,
    }

    #[async_trait]
    impl Job for TestJob {
        type Context = TestContext;
        type Result = String;

        const JOB_TYPE: &'static str = "test_job";
        const MAX_RETRIES: u32 = 3;

        async fn execute(&self, ctx: Self::Context) -> Result<Self::Result, JobError> {
            Ok(format!("Processed: {} with context: {}", self.data, ctx.value))
        }
    }

    #[tokio::test]
    async fn adapter_has_sensible_defaults() {
        let adapter = QueueAdapter::new(MemoryBackend::new());
        assert_eq!(adapter.config().max_workers, 10);
    }

    #[tokio::test]
    async fn registers_job_type() {
        let adapter = QueueAdapter::new(MemoryBackend::new());
        assert!(adapter.register_job::<TestJob>().await.is_ok());
    }

    #[tokio::test]
    async fn enqueues_registered_job() {
        let adapter = QueueAdapter::new(MemoryBackend::new());
        adapter.register_job::<TestJob>().await.unwrap();

        let job = TestJob { data: "test".to_string() };
        let result = adapter.enqueue(QueueCtx::new(), job).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn execute_now_bypasses_storage() {
        let adapter = QueueAdapter::new(MemoryBackend::new());
        let job = TestJob { data: "test".to_string() };
        let ctx = TestContext { value: "ctx".to_string() };

        let result = adapter.execute_now(QueueCtx::new(), job, ctx).await.unwrap();
        assert_eq!(result, "Processed: test with context: ctx");
    }
}
