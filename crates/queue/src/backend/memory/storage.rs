use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::{
    backend::QueueBackend, types::LeaseToken, JobEvent, JobId, JobMessage, JobRecord, JobStatus,
    LeasedJob, QueueCapabilities, QueueCtx, QueueError, QueueResult, QueueStats,
};

type QueueMap = HashMap<String, VecDeque<JobId>>;
type IdempotencyMap = HashMap<(String, String, String), JobId>;

/// In-memory backend for testing and single-process development. Holds
/// the same lease/idempotency/retry semantics as the Postgres backend so
/// either can stand in for the other behind [`QueueBackend`].
pub struct MemoryBackend {
    pub(crate) jobs: Arc<RwLock<HashMap<JobId, JobRecord>>>,

    /// queue_name -> job_ids (priority then FIFO ordered)
    pub(crate) queues: Arc<RwLock<QueueMap>>,

    /// (queue, job_type, key) -> job_id
    pub(crate) idempotency: Arc<RwLock<IdempotencyMap>>,

    pub(crate) event_broadcaster: broadcast::Sender<JobEvent>,

    default_lease: chrono::Duration,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_lease_duration(std::time::Duration::from_secs(300))
    }

    pub fn with_lease_duration(lease: std::time::Duration) -> Self {
        let (event_broadcaster, _) = broadcast::channel(1000);
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            queues: Arc::new(RwLock::new(HashMap::new())),
            idempotency: Arc::new(RwLock::new(HashMap::new())),
            event_broadcaster,
            default_lease: chrono::Duration::from_std(lease).unwrap_or(chrono::Duration::seconds(300)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_broadcaster.subscribe()
    }

    fn insert_sorted(&self, queue: &mut VecDeque<JobId>, job_id: JobId, record: &JobRecord) {
        let jobs = self.jobs.read();
        let insert_pos = queue
            .iter()
            .position(|existing_id| {
                jobs.get(existing_id)
                    .map(|existing| {
                        (record.message.priority, record.created_at)
                            < (existing.message.priority, existing.created_at)
                    })
                    .unwrap_or(true)
            })
            .unwrap_or(queue.len());
        drop(jobs);
        queue.insert(insert_pos, job_id);
    }
}

#[async_trait]
impl QueueBackend for MemoryBackend {
    async fn enqueue(&self, _ctx: QueueCtx, message: JobMessage) -> QueueResult<JobId> {
        if let Some(ref key) = message.idempotency_key {
            let scope = (message.queue.clone(), message.job_type.clone(), key.clone());

            let existing = self.idempotency.read().get(&scope).cloned();
            if let Some(existing_job_id) = existing {
                let jobs = self.jobs.read();
                if let Some(existing_record) = jobs.get(&existing_job_id) {
                    if !existing_record.status.is_terminal() {
                        return Ok(existing_job_id);
                    }
                }
            }
        }

        let job_id = JobId::new();
        let now = Utc::now();
        let record = JobRecord::new(job_id.clone(), message.clone());

        self.jobs.write().insert(job_id.clone(), record.clone());

        {
            let mut queues = self.queues.write();
            let queue = queues.entry(message.queue.clone()).or_default();
            self.insert_sorted(queue, job_id.clone(), &record);
        }

        if let Some(ref key) = message.idempotency_key {
            let scope = (message.queue.clone(), message.job_type.clone(), key.clone());
            self.idempotency.write().insert(scope, job_id.clone());
        }

        let _ = self.event_broadcaster.send(JobEvent::Enqueued {
            job_id: job_id.clone(),
            queue: message.queue.clone(),
            job_type: message.job_type.clone(),
            at: now,
        });

        Ok(job_id)
    }

    async fn dequeue(&self, _ctx: QueueCtx, queue_names: &[&str]) -> QueueResult<Option<LeasedJob>> {
        let now = Utc::now();

        for queue_name in queue_names {
            let job_id = {
                let mut queues = self.queues.write();
                let Some(queue) = queues.get_mut(*queue_name) else {
                    continue;
                };

                let jobs = self.jobs.read();
                let position = queue
                    .iter()
                    .position(|id| jobs.get(id).map(|r| r.is_eligible(now)).unwrap_or(false));
                drop(jobs);

                match position {
                    Some(index) => queue.remove(index),
                    None => None,
                }
            };

            let Some(job_id) = job_id else { continue };

            let mut jobs = self.jobs.write();
            let Some(record) = jobs.get_mut(&job_id) else {
                continue;
            };

            let lease_token = LeaseToken::new();
            let lease_until = now + self.default_lease;
            record.attempt += 1;
            record.start_processing(lease_token.clone(), lease_until);
            let leased_record = record.clone();
            drop(jobs);

            let _ = self.event_broadcaster.send(JobEvent::Leased {
                job_id: job_id.clone(),
                lease_until,
                at: now,
            });

            return Ok(Some(LeasedJob::new(leased_record, lease_token, lease_until)));
        }

        Ok(None)
    }

    async fn complete(
        &self,
        _ctx: QueueCtx,
        job_id: JobId,
        lease_token: LeaseToken,
        _result_ref: Option<String>,
    ) -> QueueResult<()> {
        let now = Utc::now();
        let mut jobs = self.jobs.write();

        let record = jobs
            .get_mut(&job_id)
            .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;

        if record.status.is_terminal() {
            return Err(QueueError::JobAlreadyTerminal);
        }

        if record.lease_token.as_ref() != Some(&lease_token) {
            return Err(QueueError::InvalidLeaseToken);
        }

        if let Some(lease_until) = record.lease_until {
            if now > lease_until {
                return Err(QueueError::LeaseExpired);
            }
        }

        record.complete();

        let _ = self.event_broadcaster.send(JobEvent::Completed {
            job_id: job_id.clone(),
            at: now,
        });

        Ok(())
    }

    async fn fail(
        &self,
        _ctx: QueueCtx,
        job_id: JobId,
        lease_token: LeaseToken,
        error: String,
        retry_at: Option<DateTime<Utc>>,
    ) -> QueueResult<()> {
        let now = Utc::now();
        let mut jobs = self.jobs.write();

        let record = jobs
            .get_mut(&job_id)
            .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;

        if record.status.is_terminal() {
            return Err(QueueError::JobAlreadyTerminal);
        }

        if record.lease_token.as_ref() != Some(&lease_token) {
            return Err(QueueError::InvalidLeaseToken);
        }

        if let Some(lease_until) = record.lease_until {
            if now > lease_until {
                return Err(QueueError::LeaseExpired);
            }
        }

        if record.attempt >= record.message.max_retries || retry_at.is_none() {
            record.fail(error.clone());

            let _ = self.event_broadcaster.send(JobEvent::Failed {
                job_id: job_id.clone(),
                error,
                at: now,
            });
            return Ok(());
        }

        let retry_time = retry_at.unwrap();
        record.schedule_retry(retry_time);
        record.set_error(error.clone());
        let queue_name = record.message.queue.clone();
        let retry_record = record.clone();
        drop(jobs);

        {
            let mut queues = self.queues.write();
            let queue = queues.entry(queue_name).or_default();
            self.insert_sorted(queue, job_id.clone(), &retry_record);
        }

        let _ = self.event_broadcaster.send(JobEvent::Retrying {
            job_id: job_id.clone(),
            retry_at: retry_time,
            error,
            at: now,
        });

        Ok(())
    }

    async fn stats(&self, _ctx: QueueCtx, queue_names: &[&str]) -> QueueResult<QueueStats> {
        let jobs = self.jobs.read();
        let queues = self.queues.read();

        let relevant_ids: std::collections::HashSet<&JobId> = queue_names
            .iter()
            .filter_map(|name| queues.get(*name))
            .flatten()
            .collect();

        let mut stats = QueueStats::default();
        for (job_id, record) in jobs.iter() {
            let in_scope = queue_names.is_empty()
                || relevant_ids.contains(job_id)
                || queue_names.contains(&record.message.queue.as_str());
            if !in_scope {
                continue;
            }
            match &record.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Processing { .. } => stats.processing += 1,
                JobStatus::Retrying { .. } => stats.retrying += 1,
                JobStatus::Completed { .. } => stats.completed += 1,
                JobStatus::Failed { .. } => stats.failed += 1,
            }
        }

        Ok(stats)
    }

    fn capabilities(&self) -> QueueCapabilities {
        QueueCapabilities::all()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryBackend {
    fn clone(&self) -> Self {
        Self {
            jobs: self.jobs.clone(),
            queues: self.queues.clone(),
            idempotency: self.idempotency.clone(),
            event_broadcaster: self.event_broadcaster.clone(),
            default_lease: self.default_lease,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Priority;

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
    async fn enqueue_then_dequeue_returns_same_job() {
        let backend = MemoryBackend::new();
        let job_id = backend.enqueue(QueueCtx::new(), test_message()).await.unwrap();

        let leased = backend
            .dequeue(QueueCtx::new(), &["default"])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(leased.record.job_id, job_id);
        assert_eq!(leased.record.attempt, 1);
    }

    #[tokio::test]
    async fn idempotent_enqueue_returns_existing_id() {
        let backend = MemoryBackend::new();
        let mut message = test_message();
        message.idempotency_key = Some("dedup-key".to_string());

        let first = backend.enqueue(QueueCtx::new(), message.clone()).await.unwrap();
        let second = backend.enqueue(QueueCtx::new(), message).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn idempotency_releases_after_terminal_completion() {
        let backend = MemoryBackend::new();
        let mut message = test_message();
        message.idempotency_key = Some("dedup-key".to_string());

        let first = backend.enqueue(QueueCtx::new(), message.clone()).await.unwrap();
        let leased = backend
            .dequeue(QueueCtx::new(), &["default"])
            .await
            .unwrap()
            .unwrap();
        backend
            .complete(QueueCtx::new(), first.clone(), leased.lease_token, None)
            .await
            .unwrap();

        let second = backend.enqueue(QueueCtx::new(), message).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn priority_orders_ahead_of_fifo() {
        let backend = MemoryBackend::new();
        let mut low = test_message();
        low.priority = Priority::new(8);
        let mut urgent = test_message();
        urgent.priority = Priority::new(1);

        let low_id = backend.enqueue(QueueCtx::new(), low).await.unwrap();
        let urgent_id = backend.enqueue(QueueCtx::new(), urgent).await.unwrap();

        let first = backend
            .dequeue(QueueCtx::new(), &["default"])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.record.job_id, urgent_id);

        let second = backend
            .dequeue(QueueCtx::new(), &["default"])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.record.job_id, low_id);
    }

    #[tokio::test]
    async fn fail_without_retry_at_is_terminal() {
        let backend = MemoryBackend::new();
        let job_id = backend.enqueue(QueueCtx::new(), test_message()).await.unwrap();
        let leased = backend
            .dequeue(QueueCtx::new(), &["default"])
            .await
            .unwrap()
            .unwrap();

        backend
            .fail(
                QueueCtx::new(),
                job_id.clone(),
                leased.lease_token,
                "boom".to_string(),
                None,
            )
            .await
            .unwrap();

        let stats = backend.stats(QueueCtx::new(), &["default"]).await.unwrap();
        assert_eq!(stats.failed, 1);
    }
}
