//! Black-box conformance suite for any [`QueueBackend`]. Run here against
//! `MemoryBackend`; the Postgres backend is exercised by its own
//! `DATABASE_URL`-gated integration suite in `pipeline-store`, since a
//! live database isn't available in this environment.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use tokio_stream::StreamExt;

use pipeline_queue::backend::memory::MemoryBackend;
use pipeline_queue::{JobEvent, JobMessage, JobStatus, Priority, QueueBackend, QueueCtx, QueueError};

fn test_message() -> JobMessage {
    JobMessage {
        job_type: "test_job".to_string(),
        payload_bytes: b"test_payload".to_vec(),
        codec: "json".to_string(),
        queue: "default".to_string(),
        priority: Priority::default(),
        max_retries: 3,
        run_at: Utc::now(),
        idempotency_key: None,
    }
}

fn message_with_priority(priority: Priority) -> JobMessage {
    JobMessage {
        priority,
        ..test_message()
    }
}

async fn next_event(stream: &mut tokio_stream::wrappers::BroadcastStream<JobEvent>) -> JobEvent {
    tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await
        .expect("timeout waiting for event")
        .expect("stream ended")
        .expect("event receive error")
}

/// Dequeue hands out a lease atomically: the record flips to `Processing`
/// and carries a non-empty, still-valid lease token.
#[tokio::test]
async fn dequeue_leases_atomically() {
    let backend = MemoryBackend::new();
    let ctx = QueueCtx::new();

    let job_id = backend.enqueue(ctx.clone(), test_message()).await.unwrap();
    let leased = backend.dequeue(ctx, &["default"]).await.unwrap().unwrap();

    assert_eq!(leased.record.job_id, job_id);
    assert!(!leased.lease_token.as_str().is_empty());
    assert!(matches!(leased.record.status, JobStatus::Processing { .. }));
    assert!(leased.lease_remaining(Utc::now()) > chrono::Duration::zero());
}

/// Only the lease holder can acknowledge completion; a stale/foreign
/// token is rejected rather than silently accepted.
#[tokio::test]
async fn only_lease_holder_can_complete() {
    let backend = MemoryBackend::new();
    let ctx = QueueCtx::new();

    backend.enqueue(ctx.clone(), test_message()).await.unwrap();
    let leased = backend.dequeue(ctx.clone(), &["default"]).await.unwrap().unwrap();

    let foreign_token = pipeline_queue::LeaseToken::from_string("not-the-real-token".into());
    let result = backend
        .complete(ctx, leased.record.job_id, foreign_token, None)
        .await;

    assert!(matches!(result, Err(QueueError::InvalidLeaseToken)));
}

/// Two concurrent dequeues never return the same job: once leased, a job
/// is gone from the eligible set until its lease expires or it's reaped.
#[tokio::test]
async fn dequeue_is_exclusive_across_callers() {
    let backend = MemoryBackend::new();
    let ctx = QueueCtx::new();

    backend.enqueue(ctx.clone(), test_message()).await.unwrap();

    let first = backend.dequeue(ctx.clone(), &["default"]).await.unwrap();
    let second = backend.dequeue(ctx, &["default"]).await.unwrap();

    assert!(first.is_some());
    assert!(second.is_none());
}

/// Completing twice with the same token is rejected on the second call
/// — a job never double-completes.
#[tokio::test]
async fn completion_is_at_most_once() {
    let backend = MemoryBackend::new();
    let ctx = QueueCtx::new();

    backend.enqueue(ctx.clone(), test_message()).await.unwrap();
    let leased = backend.dequeue(ctx.clone(), &["default"]).await.unwrap().unwrap();

    backend
        .complete(ctx.clone(), leased.record.job_id.clone(), leased.lease_token.clone(), None)
        .await
        .unwrap();

    let result = backend
        .complete(ctx, leased.record.job_id, leased.lease_token, None)
        .await;

    assert!(matches!(result, Err(QueueError::JobAlreadyTerminal)));
}

/// `fail` with a future `retry_at` schedules a retry rather than a
/// terminal failure, and the job is not eligible again before then.
#[tokio::test]
async fn retryable_failure_schedules_retry_not_terminal() {
    let backend = MemoryBackend::new();
    let ctx = QueueCtx::new();

    backend.enqueue(ctx.clone(), test_message()).await.unwrap();
    let leased = backend.dequeue(ctx.clone(), &["default"]).await.unwrap().unwrap();
    let retry_at = Utc::now() + chrono::Duration::seconds(60);

    backend
        .fail(
            ctx.clone(),
            leased.record.job_id.clone(),
            leased.lease_token,
            "transient error".to_string(),
            Some(retry_at),
        )
        .await
        .unwrap();

    let stats = backend.stats(ctx.clone(), &["default"]).await.unwrap();
    assert_eq!(stats.retrying, 1);

    let early = backend.dequeue(ctx, &["default"]).await.unwrap();
    assert!(early.is_none(), "job must not be eligible before retry_at");
}

/// `fail` with no `retry_at` (attempts exhausted) is a terminal failure.
#[tokio::test]
async fn failure_without_retry_at_is_terminal() {
    let backend = MemoryBackend::new();
    let ctx = QueueCtx::new();

    backend.enqueue(ctx.clone(), test_message()).await.unwrap();
    let leased = backend.dequeue(ctx.clone(), &["default"]).await.unwrap().unwrap();

    backend
        .fail(ctx.clone(), leased.record.job_id, leased.lease_token, "fatal".to_string(), None)
        .await
        .unwrap();

    let stats = backend.stats(ctx, &["default"]).await.unwrap();
    assert_eq!(stats.failed, 1);
}

/// Enqueuing twice with the same idempotency key while the first job is
/// still non-terminal returns the existing job id rather than inserting
/// a second row (spec §4.1's dedup table, §8 invariant 7).
#[tokio::test]
async fn idempotency_key_dedups_non_terminal_jobs() {
    let backend = MemoryBackend::new();
    let ctx = QueueCtx::new();
    let mut message = test_message();
    message.idempotency_key = Some("S1".to_string());

    let first = backend.enqueue(ctx.clone(), message.clone()).await.unwrap();
    let second = backend.enqueue(ctx, message).await.unwrap();

    assert_eq!(first, second);
}

/// A different queue or job_type is a different dedup scope even with
/// the same idempotency key string.
#[tokio::test]
async fn idempotency_key_is_scoped_by_queue_and_job_type() {
    let backend = MemoryBackend::new();
    let ctx = QueueCtx::new();
    let mut base = test_message();
    base.idempotency_key = Some("same-key".to_string());

    let id1 = backend.enqueue(ctx.clone(), base.clone()).await.unwrap();

    let mut different_type = base.clone();
    different_type.job_type = "other_job".to_string();
    let id2 = backend.enqueue(ctx.clone(), different_type).await.unwrap();

    let mut different_queue = base;
    different_queue.queue = "other_queue".to_string();
    let id3 = backend.enqueue(ctx, different_queue).await.unwrap();

    let ids: HashSet<_> = [id1, id2, id3].into_iter().collect();
    assert_eq!(ids.len(), 3);
}

/// Dequeue orders ascending by priority (lower number = more urgent),
/// ties broken by FIFO (earliest `created_at` first).
#[tokio::test]
async fn dequeue_orders_by_priority_then_fifo() {
    let backend = MemoryBackend::new();
    let ctx = QueueCtx::new();

    let low = backend
        .enqueue(ctx.clone(), message_with_priority(Priority::new(8)))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let high_first = backend
        .enqueue(ctx.clone(), message_with_priority(Priority::new(1)))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let high_second = backend
        .enqueue(ctx.clone(), message_with_priority(Priority::new(1)))
        .await
        .unwrap();

    let first = backend.dequeue(ctx.clone(), &["default"]).await.unwrap().unwrap();
    let second = backend.dequeue(ctx.clone(), &["default"]).await.unwrap().unwrap();
    let third = backend.dequeue(ctx, &["default"]).await.unwrap().unwrap();

    assert_eq!(first.record.job_id, high_first);
    assert_eq!(second.record.job_id, high_second);
    assert_eq!(third.record.job_id, low);
}

/// Enqueue/lease/complete each publish a corresponding event on the
/// backend's broadcast stream, in order.
#[tokio::test]
async fn lifecycle_emits_ordered_events() {
    let backend = MemoryBackend::new();
    let ctx = QueueCtx::new();
    let mut stream = tokio_stream::wrappers::BroadcastStream::new(backend.subscribe());

    let job_id = backend.enqueue(ctx.clone(), test_message()).await.unwrap();
    assert!(matches!(
        next_event(&mut stream).await,
        JobEvent::Enqueued { job_id: id, .. } if id == job_id
    ));

    let leased = backend.dequeue(ctx.clone(), &["default"]).await.unwrap().unwrap();
    assert!(matches!(
        next_event(&mut stream).await,
        JobEvent::Leased { job_id: id, .. } if id == job_id
    ));

    backend
        .complete(ctx, job_id.clone(), leased.lease_token, None)
        .await
        .unwrap();
    assert!(matches!(
        next_event(&mut stream).await,
        JobEvent::Completed { job_id: id, .. } if id == job_id
    ));
}
