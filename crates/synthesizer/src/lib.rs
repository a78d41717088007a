//! C6: Daily Synthesizer. Gathers one day's ProcessedItems, asks the
//! [`LlmClient`] for a summary-of-summaries (lexical fallback otherwise),
//! and upserts the day's `DailyAnalysis`. A day with too little signal
//! is a retryable failure, not a degenerate analysis — spec.md treats
//! sparse days as "try again once more data lands" rather than as
//! something worth recording with low confidence.

mod window;

use pipeline_core::AppError;
use pipeline_llm::{DailySynthesisInput, ItemSignal, LlmClient};
use pipeline_queue::JobError;
use pipeline_store::models::{DailyAnalysis, MarketSentiment};
use pipeline_store::Store;

/// Minimum distinct ProcessedItems a day needs before synthesis runs.
const MIN_ITEMS: usize = 5;
/// Cap on how many items (most recent first) feed one day's synthesis.
const MAX_ITEMS: i64 = 50;

fn job_error(e: AppError) -> JobError {
    if e.is_retryable() {
        JobError::retryable(e.to_string())
    } else {
        JobError::permanent(e.to_string())
    }
}

/// Runs one day's synthesis end to end and upserts the result.
pub async fn synthesize_daily(
    store: &Store,
    llm: &dyn LlmClient,
    date: chrono::NaiveDate,
) -> Result<DailyAnalysis, JobError> {
    let (window_start, window_end) = window::bounds(date);

    let raw_items = store
        .raw_items()
        .published_within_window(window_start, window_end, MAX_ITEMS)
        .await
        .map_err(job_error)?;

    if raw_items.len() < MIN_ITEMS {
        return Err(JobError::retryable(format!(
            "only {} items in window for {date}, need at least {MIN_ITEMS}",
            raw_items.len()
        )));
    }

    let raw_ids: Vec<uuid::Uuid> = raw_items.iter().map(|r| r.id).collect();
    let processed = store.processed_items().find_by_raw_refs(&raw_ids).await.map_err(job_error)?;

    if processed.len() < MIN_ITEMS {
        return Err(JobError::retryable(format!(
            "only {} processed items available for {date}, need at least {MIN_ITEMS}",
            processed.len()
        )));
    }

    let items: Vec<ItemSignal> = processed
        .iter()
        .map(|p| ItemSignal {
            topics: serde_json::from_value(p.topics.clone()).unwrap_or_default(),
            sentiment: p.sentiment_score as f32,
            summary: p.summary.clone(),
        })
        .collect();

    let output = llm
        .synthesize_daily(DailySynthesisInput { items })
        .await
        .map_err(|e| JobError::retryable(e.to_string()))?;

    let market_sentiment = MarketSentiment::from_str(&output.market_sentiment)
        .unwrap_or_else(|| MarketSentiment::from_score(0.0));

    let analysis = store
        .daily_analyses()
        .upsert(
            date,
            market_sentiment,
            serde_json::json!(output.key_themes),
            &output.summary,
            output.ai_blob,
            output.confidence as f64,
            processed.len() as i32,
        )
        .await
        .map_err(job_error)?;

    Ok(analysis)
}
