//! One `Job` impl per `JobKind` payload, each a thin wrapper around the
//! matching handler in [`crate::handlers`] plus the bookkeeping
//! `QueueAdapter` needs: dispatch string, dedup key, per-kind deadline.
//! The domain logic itself never lives here.

use async_trait::async_trait;

use pipeline_queue::{Job, JobError, JobKind, Priority};

use crate::context::WorkerCtx;
use crate::handlers;
use crate::payloads::{
    ContentProcessPayload, DailyAnalysisPayload, FeedFetchPayload, GeneratePredictionsPayload,
    PredictionComparePayload, TranscribeAudioPayload, WorkerHeartbeatPayload,
};

/// Runs `fut` under `kind`'s own deadline, turning a timeout into a
/// retryable `JobError` rather than a hang.
async fn within_deadline<T>(
    kind: JobKind,
    fut: impl std::future::Future<Output = Result<T, JobError>>,
) -> Result<T, JobError> {
    tokio::time::timeout(kind.default_deadline(), fut)
        .await
        .unwrap_or_else(|_| Err(JobError::retryable(format!("{kind} exceeded its deadline"))))
}

#[async_trait]
impl Job for FeedFetchPayload {
    type Context = WorkerCtx;
    type Result = ();

    const JOB_TYPE: &'static str = "feed_fetch";

    async fn execute(&self, ctx: Self::Context) -> Result<Self::Result, JobError> {
        within_deadline(JobKind::FeedFetch, handlers::feed_fetch(&ctx, self)).await
    }

    fn idempotency_key(&self) -> Option<String> {
        Some(self.source_ref.to_string())
    }
}

#[async_trait]
impl Job for ContentProcessPayload {
    type Context = WorkerCtx;
    type Result = ();

    const JOB_TYPE: &'static str = "content_process";

    async fn execute(&self, ctx: Self::Context) -> Result<Self::Result, JobError> {
        within_deadline(JobKind::ContentProcess, handlers::content_process(&ctx, self)).await
    }

    fn idempotency_key(&self) -> Option<String> {
        Some(self.raw_ref.to_string())
    }
}

#[async_trait]
impl Job for TranscribeAudioPayload {
    type Context = WorkerCtx;
    type Result = ();

    const JOB_TYPE: &'static str = "transcribe_audio";

    async fn execute(&self, ctx: Self::Context) -> Result<Self::Result, JobError> {
        within_deadline(JobKind::TranscribeAudio, handlers::transcribe_audio(&ctx, self)).await
    }

    fn idempotency_key(&self) -> Option<String> {
        Some(self.raw_ref.to_string())
    }
}

#[async_trait]
impl Job for DailyAnalysisPayload {
    type Context = WorkerCtx;
    type Result = ();

    const JOB_TYPE: &'static str = "daily_analysis";

    async fn execute(&self, ctx: Self::Context) -> Result<Self::Result, JobError> {
        within_deadline(JobKind::DailyAnalysis, handlers::daily_analysis(&ctx, self)).await
    }

    fn idempotency_key(&self) -> Option<String> {
        Some(self.date.to_string())
    }
}

#[async_trait]
impl Job for GeneratePredictionsPayload {
    type Context = WorkerCtx;
    type Result = ();

    const JOB_TYPE: &'static str = "generate_predictions";
    const PRIORITY: Priority = Priority::new(4);

    async fn execute(&self, ctx: Self::Context) -> Result<Self::Result, JobError> {
        within_deadline(JobKind::GeneratePredictions, handlers::generate_predictions(&ctx, self)).await
    }

    fn idempotency_key(&self) -> Option<String> {
        Some(self.analysis_ref.to_string())
    }

    /// The synthesizer's handoff wants a short settling gap (spec.md
    /// §4.6's default 60s) before predictions are drafted from a
    /// just-written analysis.
    fn delay(&self) -> chrono::Duration {
        chrono::Duration::seconds(60)
    }
}

#[async_trait]
impl Job for PredictionComparePayload {
    type Context = WorkerCtx;
    type Result = ();

    const JOB_TYPE: &'static str = "prediction_compare";

    async fn execute(&self, ctx: Self::Context) -> Result<Self::Result, JobError> {
        within_deadline(JobKind::PredictionCompare, handlers::prediction_compare(&ctx, self)).await
    }

    fn idempotency_key(&self) -> Option<String> {
        Some(self.prediction_ref.to_string())
    }
}

#[async_trait]
impl Job for WorkerHeartbeatPayload {
    type Context = WorkerCtx;
    type Result = ();

    const JOB_TYPE: &'static str = "worker_heartbeat";

    async fn execute(&self, _ctx: Self::Context) -> Result<Self::Result, JobError> {
        tracing::debug!(worker_id = %self.worker_id, "heartbeat");
        Ok(())
    }
}
