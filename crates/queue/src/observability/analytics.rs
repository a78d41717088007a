use chrono::Utc;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::{JobEvent, JobId, QueueCtx};

/// Observability layer: structured event stream plus live counters.
#[derive(Clone)]
pub struct ObservabilityLayer {
    event_broadcaster: broadcast::Sender<JobEvent>,
    metrics: Arc<super::LiveMetrics>,
}

impl ObservabilityLayer {
    pub fn new() -> Self {
        let (event_broadcaster, _) = broadcast::channel(10000);

        Self {
            event_broadcaster,
            metrics: Arc::new(super::LiveMetrics::new()),
        }
    }

    pub async fn record_job_enqueued(&self, _ctx: &QueueCtx, job_id: &JobId, job_type: &str) {
        let event = JobEvent::Enqueued {
            job_id: job_id.clone(),
            queue: "default".to_string(),
            job_type: job_type.to_string(),
            at: Utc::now(),
        };

        let _ = self.event_broadcaster.send(event);
        self.metrics.increment_jobs_enqueued(job_type);
        debug!(%job_id, job_type, "recorded job enqueued");
    }

    pub async fn record_job_completed(&self, _ctx: &QueueCtx, job_id: &JobId, job_type: &str) {
        let event = JobEvent::Completed {
            job_id: job_id.clone(),
            at: Utc::now(),
        };

        let _ = self.event_broadcaster.send(event);
        self.metrics.increment_jobs_completed(job_type);
        debug!(%job_id, job_type, "recorded job completed");
    }

    pub async fn record_job_failed(&self, _ctx: &QueueCtx, job_id: &JobId, job_type: &str) {
        let event = JobEvent::Failed {
            job_id: job_id.clone(),
            error: "job execution failed".to_string(),
            at: Utc::now(),
        };

        let _ = self.event_broadcaster.send(event);
        self.metrics.increment_jobs_failed(job_type);
        debug!(%job_id, job_type, "recorded job failed");
    }

    pub async fn record_job_retrying(&self, _ctx: &QueueCtx, job_id: &JobId, job_type: &str) {
        let retry_at = Utc::now() + chrono::Duration::seconds(60);
        let event = JobEvent::Retrying {
            job_id: job_id.clone(),
            retry_at,
            error: "job failed, retrying".to_string(),
            at: Utc::now(),
        };

        let _ = self.event_broadcaster.send(event);
        self.metrics.increment_jobs_retried(job_type);
        debug!(%job_id, job_type, "recorded job retrying");
    }

    pub fn event_stream(&self) -> broadcast::Receiver<JobEvent> {
        self.event_broadcaster.subscribe()
    }

    pub fn metrics(&self) -> &super::LiveMetrics {
        &self.metrics
    }
}

impl Default for ObservabilityLayer {
    fn default() -> Self {
        Self::new()
    }
}

/// Derived rates over the live counters; a cheap stand-in for a real
/// time-windowed rate calculation.
pub struct PerformanceAnalytics {
    observability: Arc<ObservabilityLayer>,
}

impl PerformanceAnalytics {
    pub fn new(observability: Arc<ObservabilityLayer>) -> Self {
        Self { observability }
    }

    pub fn success_rate(&self) -> f64 {
        let completed = self.observability.metrics.jobs_completed() as f64;
        let failed = self.observability.metrics.jobs_failed() as f64;
        let total = completed + failed;

        if total == 0.0 {
            100.0
        } else {
            (completed / total) * 100.0
        }
    }

    pub fn retry_rate(&self) -> f64 {
        let retried = self.observability.metrics.jobs_retried() as f64;
        let enqueued = self.observability.metrics.jobs_enqueued() as f64;

        if enqueued == 0.0 {
            0.0
        } else {
            (retried / enqueued) * 100.0
        }
    }
}
