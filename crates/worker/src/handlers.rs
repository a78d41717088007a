//! One function per `JobKind`: fetch the durable state a handler needs,
//! run the matching domain crate, persist, and enqueue whatever handoff
//! the pipeline's dataflow calls for next. None of this branches on
//! queue internals — that's `jobs.rs`'s job.

use chrono::Utc;
use serde_json::Value;

use pipeline_adapters::aggregate::AggregateAdapter;
use pipeline_adapters::rate_limit::RateLimitDescriptor;
use pipeline_adapters::{build_adapter, SourceAdapter};
use pipeline_core::AppError;
use pipeline_queue::{JobError, QueueCtx};
use pipeline_store::models::SourceKind;

use crate::context::WorkerCtx;
use crate::payloads::{
    ContentProcessPayload, DailyAnalysisPayload, FeedFetchPayload, GeneratePredictionsPayload,
    PredictionComparePayload, TranscribeAudioPayload,
};

fn job_error(e: AppError) -> JobError {
    if e.is_retryable() {
        JobError::retryable(e.to_string())
    } else {
        JobError::permanent(e.to_string())
    }
}

fn adapter_error(e: pipeline_adapters::AdapterError) -> JobError {
    if e.is_retryable() {
        JobError::retryable(e.to_string())
    } else {
        JobError::permanent(e.to_string())
    }
}

/// Enqueuing a handoff is an infrastructure hiccup, not a domain
/// failure — surface it as retryable so the *triggering* job (which
/// already did its own work) gets another attempt rather than silently
/// dropping the handoff.
fn enqueue_error(e: pipeline_queue::QueueError) -> JobError {
    JobError::retryable(e.to_string())
}

pub async fn feed_fetch(ctx: &WorkerCtx, payload: &FeedFetchPayload) -> Result<(), JobError> {
    let source = ctx
        .store
        .sources()
        .find_by_id(payload.source_ref)
        .await
        .map_err(job_error)?
        .ok_or_else(|| JobError::permanent(format!("source {} not found", payload.source_ref)))?;

    if !source.active {
        return Ok(());
    }

    let descriptor = RateLimitDescriptor::from_config(&source.config);
    ctx.rate_limiters.acquire(source.id, descriptor).await;

    let items = if source.kind == SourceKind::Aggregate {
        AggregateAdapter::new().fetch_latest(&source, &ctx.fetch).await.map_err(adapter_error)?
    } else {
        let adapter = build_adapter(source.kind).map_err(adapter_error)?;
        adapter.fetch_latest(&source, &ctx.fetch).await.map_err(adapter_error)?
    };

    for item in items {
        if !item.has_minimum_content() {
            continue;
        }

        let (raw, inserted) = ctx
            .store
            .raw_items()
            .upsert(source.id, &item.external_id, &item.title, item.description.as_deref(), &item.body, item.published_at, item.metadata.clone())
            .await
            .map_err(job_error)?;

        if !inserted {
            continue;
        }

        let needs_transcript = item.metadata.get("needs_transcript").and_then(Value::as_bool).unwrap_or(false);
        let audio_url = item.metadata.get("audio_url").and_then(Value::as_str).map(str::to_string);

        match (needs_transcript, audio_url) {
            (true, Some(audio_url)) => {
                let job = TranscribeAudioPayload { raw_ref: raw.id, audio_url };
                ctx.queue.enqueue(QueueCtx::new(), job).await.map_err(enqueue_error)?;
            }
            _ => {
                let job = ContentProcessPayload { raw_ref: raw.id };
                ctx.queue.enqueue(QueueCtx::new(), job).await.map_err(enqueue_error)?;
            }
        }
    }

    ctx.store.sources().mark_fetched(source.id, Utc::now()).await.map_err(job_error)?;
    Ok(())
}

pub async fn transcribe_audio(ctx: &WorkerCtx, payload: &TranscribeAudioPayload) -> Result<(), JobError> {
    let text = ctx.transcription.transcribe(&payload.audio_url).await.map_err(adapter_error)?;

    ctx.store.raw_items().set_body(payload.raw_ref, &text).await.map_err(job_error)?;

    let job = ContentProcessPayload { raw_ref: payload.raw_ref };
    ctx.queue.enqueue(QueueCtx::new(), job).await.map_err(enqueue_error)?;
    Ok(())
}

pub async fn content_process(ctx: &WorkerCtx, payload: &ContentProcessPayload) -> Result<(), JobError> {
    let raw = ctx
        .store
        .raw_items()
        .find_by_id(payload.raw_ref)
        .await
        .map_err(job_error)?
        .ok_or_else(|| JobError::permanent(format!("raw item {} not found", payload.raw_ref)))?;

    pipeline_processor::process_raw_item(&ctx.store, ctx.llm.as_ref(), &raw).await?;
    Ok(())
}

pub async fn daily_analysis(ctx: &WorkerCtx, payload: &DailyAnalysisPayload) -> Result<(), JobError> {
    let analysis = pipeline_synthesizer::synthesize_daily(&ctx.store, ctx.llm.as_ref(), payload.date).await?;

    let job = GeneratePredictionsPayload { analysis_ref: analysis.id };
    ctx.queue.enqueue(QueueCtx::new(), job).await.map_err(enqueue_error)?;
    Ok(())
}

pub async fn generate_predictions(ctx: &WorkerCtx, payload: &GeneratePredictionsPayload) -> Result<(), JobError> {
    let analysis = ctx
        .store
        .daily_analyses()
        .find_by_id(payload.analysis_ref)
        .await
        .map_err(job_error)?
        .ok_or_else(|| JobError::permanent(format!("daily analysis {} not found", payload.analysis_ref)))?;

    pipeline_predictor::generate_predictions(&ctx.store, ctx.llm.as_ref(), &analysis).await?;
    Ok(())
}

pub async fn prediction_compare(ctx: &WorkerCtx, payload: &PredictionComparePayload) -> Result<(), JobError> {
    let prediction = ctx
        .store
        .predictions()
        .find_by_id(payload.prediction_ref)
        .await
        .map_err(job_error)?
        .ok_or_else(|| JobError::permanent(format!("prediction {} not found", payload.prediction_ref)))?;

    let analysis = ctx
        .store
        .daily_analyses()
        .find_by_id(payload.analysis_ref)
        .await
        .map_err(job_error)?
        .ok_or_else(|| JobError::permanent(format!("daily analysis {} not found", payload.analysis_ref)))?;

    pipeline_evaluator::compare_prediction(&ctx.store, &prediction, &analysis).await?;
    Ok(())
}
