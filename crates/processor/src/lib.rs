//! C5: Content Processor. Normalizes one RawItem's text, runs it through
//! the [`LlmClient`] capability boundary (real or lexical, the caller
//! never branches on which), and persists the result as a ProcessedItem.
//! Aggregate RawItems get a dedicated consensus pass instead of being
//! treated as one undifferentiated document — see [`aggregate`].

pub mod aggregate;
pub mod normalize;

use pipeline_core::AppError;
use pipeline_llm::LlmClient;
use pipeline_queue::JobError;
use pipeline_store::models::{ProcessedItem, ProcessingStatus, RawItem};
use pipeline_store::Store;

fn job_error(e: AppError) -> JobError {
    if e.is_retryable() {
        JobError::retryable(e.to_string())
    } else {
        JobError::permanent(e.to_string())
    }
}

/// Processes one RawItem end to end: normalize, extract (aggregate-aware),
/// upsert the ProcessedItem, and flip the RawItem to `Completed`.
///
/// A RawItem already past `Completed` is treated as done, not re-run —
/// invariant 4 caps this at one ProcessedItem per RawItem, and repeats
/// are expected whenever a job is retried after its handler partially
/// succeeded.
pub async fn process_raw_item(
    store: &Store,
    llm: &dyn LlmClient,
    raw: &RawItem,
) -> Result<ProcessedItem, JobError> {
    if raw.processing_status == ProcessingStatus::Completed {
        if let Some(existing) = store
            .processed_items()
            .find_by_raw_ref(raw.id)
            .await
            .map_err(job_error)?
        {
            return Ok(existing);
        }
    }

    let normalized_text = normalize::normalize(&raw.title, raw.description.as_deref(), &raw.body);
    let is_aggregated = raw.metadata.get("is_aggregated").and_then(serde_json::Value::as_bool).unwrap_or(false);

    let (extraction, processing_metadata) = if is_aggregated {
        let (extraction, consensus) = aggregate::analyze_aggregate(llm, &normalized_text, &raw.metadata)
            .await
            .map_err(|e| JobError::retryable(e.to_string()))?;
        let metadata = serde_json::json!({
            "used_fallback": extraction.used_fallback,
            "is_aggregated": true,
            "member_count": consensus.member_count,
            "agreement_score": consensus.agreement_score,
            "divergent_views": consensus.divergent_views,
            "common_themes": consensus.common_themes,
        });
        (extraction, metadata)
    } else {
        let extraction = llm
            .extract_content(&normalized_text)
            .await
            .map_err(|e| JobError::retryable(e.to_string()))?;
        let metadata = serde_json::json!({
            "used_fallback": extraction.used_fallback,
            "is_aggregated": false,
        });
        (extraction, metadata)
    };

    let processed = store
        .processed_items()
        .upsert(
            raw.id,
            &normalized_text,
            serde_json::json!(extraction.topics),
            extraction.sentiment as f64,
            serde_json::json!(extraction.entities),
            &extraction.summary,
            processing_metadata,
        )
        .await
        .map_err(job_error)?;

    store
        .raw_items()
        .set_status(raw.id, ProcessingStatus::Completed)
        .await
        .map_err(job_error)?;

    Ok(processed)
}
