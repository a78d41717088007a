use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::{backend::memory::storage::MemoryBackend, JobEvent, JobStatus, QueueResult};

/// Lease expiry sweep: the mandatory background process that reclaims
/// jobs whose worker died or hung past its visibility timeout without
/// acking completion or failure.
pub struct LeaseReaper {
    backend: Arc<MemoryBackend>,
    interval: Duration,
}

impl LeaseReaper {
    pub fn new(backend: Arc<MemoryBackend>) -> Self {
        Self {
            backend,
            interval: Duration::from_secs(30),
        }
    }

    pub fn with_interval(backend: Arc<MemoryBackend>, interval: Duration) -> Self {
        Self { backend, interval }
    }

    /// Run the sweep loop forever. Intended to be spawned as its own task
    /// alongside the worker pool.
    pub async fn start(self) -> QueueResult<()> {
        let mut ticker = interval(self.interval);
        info!(interval_secs = self.interval.as_secs(), "starting lease sweep");

        loop {
            ticker.tick().await;
            match self.reap_expired_leases().await {
                Ok(n) if n > 0 => info!(reclaimed = n, "reclaimed expired leases"),
                Ok(_) => debug!("sweep found no expired leases"),
                Err(e) => warn!(error = %e, "lease sweep failed"),
            }
        }
    }

    /// Run a single sweep pass, returning how many jobs were reclaimed.
    pub async fn reap_expired_leases(&self) -> QueueResult<usize> {
        let now = Utc::now();

        let expired: Vec<_> = {
            let jobs = self.backend.jobs.read();
            jobs.iter()
                .filter_map(|(job_id, record)| match &record.status {
                    JobStatus::Processing { lease_until } if *lease_until < now => {
                        Some((job_id.clone(), record.clone()))
                    }
                    _ => None,
                })
                .collect()
        };

        let mut reclaimed = 0;
        for (job_id, mut record) in expired {
            debug!(%job_id, "reclaiming expired lease");

            let new_status = if record.attempt >= record.message.max_retries {
                JobStatus::Failed {
                    failed_at: now,
                    error: "lease expired after max retries".to_string(),
                }
            } else {
                JobStatus::Retrying { retry_at: now }
            };

            record.status = new_status.clone();
            record.lease_token = None;
            record.lease_until = None;
            record.updated_at = now;
            record.set_error("lease expired".to_string());

            let queue_name = record.message.queue.clone();
            self.backend.jobs.write().insert(job_id.clone(), record.clone());

            if matches!(new_status, JobStatus::Retrying { .. }) {
                let mut queues = self.backend.queues.write();
                queues.entry(queue_name).or_default().push_back(job_id.clone());
            }

            let event = match new_status {
                JobStatus::Retrying { retry_at } => JobEvent::Retrying {
                    job_id: job_id.clone(),
                    retry_at,
                    error: "lease expired".to_string(),
                    at: now,
                },
                JobStatus::Failed { error, .. } => JobEvent::Failed {
                    job_id: job_id.clone(),
                    error,
                    at: now,
                },
                _ => continue,
            };

            let _ = self.backend.event_broadcaster.send(event);
            reclaimed += 1;
        }

        Ok(reclaimed)
    }
}

/// Test helpers for deterministic sweep testing
impl MemoryBackend {
    pub async fn force_lease_expiry(&self, job_id: crate::JobId) -> QueueResult<()> {
        let mut jobs = self.jobs.write();
        if let Some(record) = jobs.get_mut(&job_id) {
            if let JobStatus::Processing { ref mut lease_until } = record.status {
                *lease_until = Utc::now() - chrono::Duration::seconds(1);
                record.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    pub async fn run_reaper_tick(&self) -> QueueResult<()> {
        let reaper = LeaseReaper::new(Arc::new(self.clone()));
        reaper.reap_expired_leases().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::QueueBackend;
    use crate::{JobMessage, Priority, QueueCtx};

    fn test_message() -> JobMessage {
        JobMessage {
            job_type: "test_job".to_string(),
            payload_bytes: b"test_payload".to_vec(),
            codec: "json".to_string(),
            queue: "default".to_string(),
            priority: Priority::default(),
            max_retries: 3,
            run_at: chrono::Utc::now(),
            idempotency_key: None,
        }
    }

    #[tokio::test]
    async fn expired_lease_becomes_eligible_again() {
        let backend = Arc::new(MemoryBackend::new());
        let job_id = backend.enqueue(QueueCtx::new(), test_message()).await.unwrap();
        let _leased = backend.dequeue(QueueCtx::new(), &["default"]).await.unwrap().unwrap();

        backend.force_lease_expiry(job_id.clone()).await.unwrap();

        let reaper = LeaseReaper::new(backend.clone());
        let reclaimed = reaper.reap_expired_leases().await.unwrap();
        assert_eq!(reclaimed, 1);

        let retry_leased = backend.dequeue(QueueCtx::new(), &["default"]).await.unwrap();
        assert!(retry_leased.is_some());
        assert_eq!(retry_leased.unwrap().record.attempt, 2);
    }

    #[tokio::test]
    async fn expired_lease_past_max_retries_fails() {
        let backend = Arc::new(MemoryBackend::new());
        let mut message = test_message();
        message.max_retries = 1;

        let job_id = backend.enqueue(QueueCtx::new(), message).await.unwrap();
        let _leased = backend.dequeue(QueueCtx::new(), &["default"]).await.unwrap().unwrap();

        {
            let mut jobs = backend.jobs.write();
            jobs.get_mut(&job_id).unwrap().attempt = 1;
        }

        backend.force_lease_expiry(job_id.clone()).await.unwrap();

        let reaper = LeaseReaper::new(backend.clone());
        let reclaimed = reaper.reap_expired_leases().await.unwrap();
        assert_eq!(reclaimed, 1);

        let stats = backend.stats(QueueCtx::new(), &["default"]).await.unwrap();
        assert_eq!(stats.failed, 1);
    }
}
