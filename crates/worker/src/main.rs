//! Process entrypoint: load configuration, connect the store, build the
//! shared capability clients, start the worker pool, the lease-expiry
//! sweeper, and the freshness trigger, then wait for a shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use pipeline_adapters::{build_transcription_service, FetchCache, FetchContext, FETCH_CACHE_TTL};
use pipeline_core::{init_tracing, AppError, Config};
use pipeline_queue::{PostgresBackend, PostgresSweeper, QueueAdapter, QueueConfig, QueueCtx};
use pipeline_store::Store;
use pipeline_worker::context::WorkerCtx;
use pipeline_worker::payloads::{
    ContentProcessPayload, DailyAnalysisPayload, FeedFetchPayload, GeneratePredictionsPayload,
    PredictionComparePayload, TranscribeAudioPayload, WorkerHeartbeatPayload,
};
use pipeline_worker::rate_limit::RateLimiters;
use pipeline_worker::{freshness, payloads};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    init_tracing();

    let config = Config::from_env()?;
    let store = Store::connect(&config).await?;

    let llm = pipeline_llm::build_client(&config);
    let transcription = build_transcription_service(&config);

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| AppError::config(format!("failed to build http client: {e}")))?;
    let cache: Arc<FetchCache> = Arc::new(FetchCache::new(FETCH_CACHE_TTL));
    let fetch = FetchContext::new(http, cache, transcription.clone());

    let backend = PostgresBackend::from_pool(store.pool().clone()).with_lease_duration(config.job_visibility_timeout);

    let queue_config = QueueConfig {
        max_workers: config.worker_concurrency,
        lease_duration: config.job_visibility_timeout,
        ..QueueConfig::default()
    };
    let queue = QueueAdapter::with_config(backend.clone(), queue_config);

    let queue_error = |e: pipeline_queue::QueueError| AppError::store(e.to_string());

    queue.register_job::<FeedFetchPayload>().await.map_err(queue_error)?;
    queue.register_job::<ContentProcessPayload>().await.map_err(queue_error)?;
    queue.register_job::<TranscribeAudioPayload>().await.map_err(queue_error)?;
    queue.register_job::<DailyAnalysisPayload>().await.map_err(queue_error)?;
    queue.register_job::<GeneratePredictionsPayload>().await.map_err(queue_error)?;
    queue.register_job::<PredictionComparePayload>().await.map_err(queue_error)?;
    queue.register_job::<WorkerHeartbeatPayload>().await.map_err(queue_error)?;

    let ctx = WorkerCtx {
        store: store.clone(),
        llm,
        fetch,
        transcription,
        rate_limiters: Arc::new(RateLimiters::new()),
        queue: queue.clone(),
    };

    let mut handles = Vec::with_capacity(config.worker_concurrency);
    for _ in 0..config.worker_concurrency {
        let handle = queue
            .start_workers(QueueCtx::new(), ctx.clone(), vec![payloads::QUEUE_NAME.to_string()])
            .await
            .map_err(queue_error)?;
        handles.push(handle);
    }
    tracing::info!(count = handles.len(), "worker pool started");

    let heartbeat_queue = queue.clone();
    let worker_id = uuid::Uuid::new_v4().to_string();
    let heartbeat_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            let payload = WorkerHeartbeatPayload { worker_id: worker_id.clone() };
            if let Err(e) = heartbeat_queue.enqueue(QueueCtx::new(), payload).await {
                tracing::warn!(error = %e, "failed to enqueue worker heartbeat");
            }
        }
    });

    let sweeper = PostgresSweeper::new(backend.clone());
    let sweeper_handle = tokio::spawn(async move {
        if let Err(e) = sweeper.start().await {
            tracing::error!(error = %e, "lease sweeper exited");
        }
    });

    let freshness_store = store.clone();
    let freshness_tick = config.freshness_tick;
    let freshness_handle = tokio::spawn(async move {
        freshness::run(freshness_store, freshness_tick).await;
    });

    tokio::signal::ctrl_c().await.map_err(|e| AppError::config(format!("failed to listen for ctrl_c: {e}")))?;
    tracing::info!("shutdown signal received, draining workers");

    freshness_handle.abort();
    sweeper_handle.abort();
    heartbeat_handle.abort();

    for handle in handles {
        match tokio::time::timeout(Duration::from_secs(30), handle.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "worker shutdown reported an error"),
            Err(_) => tracing::warn!("worker did not shut down within its grace window"),
        }
    }

    tracing::info!("shutdown complete");
    Ok(())
}
