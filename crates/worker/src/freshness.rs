//! C9: Freshness Trigger. A periodic tick (`Config::freshness_tick`,
//! default 300s per spec.md §6.3) that looks for durable state past its
//! own staleness window — a source overdue for a fetch, a missing or
//! aging daily analysis, predictions that haven't been refreshed, a
//! prediction whose horizon has elapsed with no comparison yet — and
//! enqueues the job that would refresh it. Every check goes through
//! `Store::enqueue_job` directly rather than the generic `Job` path, so
//! it can set a staleness-scaled priority by hand instead of inheriting
//! a job type's fixed default.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use pipeline_core::AppError;
use pipeline_queue::{JobKind, Priority, QueueCtx};
use pipeline_store::models::{Horizon, Source};
use pipeline_store::Store;

use crate::payloads::{
    build_message, DailyAnalysisPayload, FeedFetchPayload, GeneratePredictionsPayload, PredictionComparePayload,
};

const SOURCE_DEFAULT_TTL: ChronoDuration = ChronoDuration::hours(4);
const ANALYSIS_STALE_AFTER: ChronoDuration = ChronoDuration::hours(12);
const PREDICTIONS_STALE_AFTER: ChronoDuration = ChronoDuration::hours(6);

/// Per-source override for how stale a fetch may get, mirroring the
/// `update_frequency` mapping adapters use for their own fetch-cache TTL
/// (spec.md §6.2), but defaulting to 4h rather than 24h when unset —
/// this is the trigger's own budget, not the cache's absorption window.
fn source_ttl(config: &Value) -> ChronoDuration {
    match config.get("update_frequency").and_then(Value::as_str) {
        Some("realtime") => ChronoDuration::minutes(5),
        Some("hourly") => ChronoDuration::hours(1),
        Some("weekly") => ChronoDuration::days(7),
        Some("daily") => ChronoDuration::hours(24),
        _ => SOURCE_DEFAULT_TTL,
    }
}

/// How long past its due date a prediction's horizon has to be scored
/// against, per spec.md §3's horizon set.
fn horizon_duration(horizon: Horizon) -> ChronoDuration {
    match horizon {
        Horizon::OneWeek => ChronoDuration::days(7),
        Horizon::OneMonth => ChronoDuration::days(30),
        Horizon::ThreeMonths => ChronoDuration::days(90),
        Horizon::SixMonths => ChronoDuration::days(180),
        Horizon::OneYear => ChronoDuration::days(365),
    }
}

/// `Some(overdue)` when `source` is past its TTL; `overdue` is how far
/// past. A source never fetched is always stale.
fn staleness(source: &Source, now: DateTime<Utc>) -> Option<ChronoDuration> {
    let ttl = source_ttl(&source.config);
    let elapsed = match source.last_fetched_at {
        Some(last) => now - last,
        None => ttl + ChronoDuration::seconds(1),
    };
    (elapsed > ttl).then(|| elapsed - ttl)
}

/// More overdue gets a lower (more urgent) priority number, so a source
/// that's 2x its TTL past due doesn't wait behind one that's barely late.
fn staleness_priority(overdue: ChronoDuration, ttl: ChronoDuration) -> Priority {
    let ttl_secs = ttl.num_seconds().max(1) as f64;
    let ratio = overdue.num_seconds() as f64 / ttl_secs;
    if ratio >= 2.0 {
        Priority::new(2)
    } else if ratio >= 1.0 {
        Priority::new(3)
    } else {
        Priority::new(5)
    }
}

async fn check_sources(store: &Store, now: DateTime<Utc>) -> Result<(), AppError> {
    for source in store.sources().active_sources().await? {
        let Some(overdue) = staleness(&source, now) else { continue };
        let ttl = source_ttl(&source.config);
        let priority = staleness_priority(overdue, ttl);

        let payload = FeedFetchPayload { source_ref: source.id };
        let message = build_message(JobKind::FeedFetch, &payload, Some(source.id.to_string()), priority, None)
            .map_err(|e| AppError::source(format!("failed to build feed_fetch message: {e}")))?;

        store.enqueue_job(QueueCtx::new(), message).await?;
        debug!(source_ref = %source.id, overdue_secs = overdue.num_seconds(), "enqueued stale source fetch");
    }
    Ok(())
}

async fn check_daily_analysis(store: &Store, today: NaiveDate) -> Result<(), AppError> {
    let existing = store.daily_analyses().find_by_date(today).await?;

    let stale = match &existing {
        None => true,
        Some(analysis) => Utc::now() - analysis.created_at > ANALYSIS_STALE_AFTER,
    };

    if stale {
        let payload = DailyAnalysisPayload { date: today };
        let message = build_message(JobKind::DailyAnalysis, &payload, Some(today.to_string()), Priority::new(5), None)
            .map_err(|e| AppError::source(format!("failed to build daily_analysis message: {e}")))?;
        store.enqueue_job(QueueCtx::new(), message).await?;
        debug!(%today, "enqueued daily analysis");
    }
    Ok(())
}

async fn check_predictions(store: &Store) -> Result<(), AppError> {
    let Some(latest) = store.daily_analyses().latest().await? else { return Ok(()) };
    let predictions = store.predictions().find_by_analysis(latest.id).await?;

    let stale =
        predictions.is_empty() || predictions.iter().all(|p| Utc::now() - p.created_at > PREDICTIONS_STALE_AFTER);

    if stale {
        let payload = GeneratePredictionsPayload { analysis_ref: latest.id };
        let message =
            build_message(JobKind::GeneratePredictions, &payload, Some(latest.id.to_string()), Priority::new(5), None)
                .map_err(|e| AppError::source(format!("failed to build generate_predictions message: {e}")))?;
        store.enqueue_job(QueueCtx::new(), message).await?;
        debug!(analysis_ref = %latest.id, "enqueued prediction generation");
    }
    Ok(())
}

async fn check_due_comparisons(store: &Store) -> Result<(), AppError> {
    let Some(latest) = store.daily_analyses().latest().await? else { return Ok(()) };
    let now = Utc::now();

    for prediction in store.predictions().without_comparison().await? {
        if now - prediction.created_at < horizon_duration(prediction.horizon) {
            continue;
        }

        let payload = PredictionComparePayload { prediction_ref: prediction.id, analysis_ref: latest.id };
        let message = build_message(
            JobKind::PredictionCompare,
            &payload,
            Some(prediction.id.to_string()),
            Priority::new(5),
            None,
        )
        .map_err(|e| AppError::source(format!("failed to build prediction_compare message: {e}")))?;

        store.enqueue_job(QueueCtx::new(), message).await?;
        debug!(prediction_ref = %prediction.id, "enqueued prediction comparison");
    }
    Ok(())
}

/// One full pass over everything the trigger watches. Each check is
/// independent — one failing (a transient store error, say) doesn't
/// stop the others from running this tick.
async fn run_once(store: &Store) {
    let now = Utc::now();

    if let Err(e) = check_sources(store, now).await {
        warn!(error = %e, "freshness: source staleness check failed");
    }
    if let Err(e) = check_daily_analysis(store, now.date_naive()).await {
        warn!(error = %e, "freshness: daily analysis staleness check failed");
    }
    if let Err(e) = check_predictions(store).await {
        warn!(error = %e, "freshness: prediction staleness check failed");
    }
    if let Err(e) = check_due_comparisons(store).await {
        warn!(error = %e, "freshness: due comparison check failed");
    }
}

/// Runs the freshness trigger forever on `tick`. Intended to be spawned
/// as its own task alongside the worker pool.
pub async fn run(store: Store, tick: std::time::Duration) {
    let mut ticker = tokio::time::interval(tick);
    tracing::info!(tick_secs = tick.as_secs(), "starting freshness trigger");

    loop {
        ticker.tick().await;
        run_once(&store).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_fetched_source_is_always_stale() {
        let source = Source {
            id: uuid::Uuid::new_v4(),
            name: "test".to_string(),
            kind: pipeline_store::models::SourceKind::Syndicated,
            url: "https://example.com".to_string(),
            active: true,
            config: serde_json::json!({}),
            last_fetched_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(staleness(&source, Utc::now()).is_some());
    }

    #[test]
    fn recently_fetched_source_is_not_stale() {
        let source = Source {
            id: uuid::Uuid::new_v4(),
            name: "test".to_string(),
            kind: pipeline_store::models::SourceKind::Syndicated,
            url: "https://example.com".to_string(),
            active: true,
            config: serde_json::json!({ "update_frequency": "hourly" }),
            last_fetched_at: Some(Utc::now()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(staleness(&source, Utc::now()).is_none());
    }

    #[test]
    fn staleness_priority_escalates_with_overdue_ratio() {
        let ttl = ChronoDuration::hours(1);
        assert_eq!(staleness_priority(ChronoDuration::minutes(10), ttl), Priority::new(5));
        assert_eq!(staleness_priority(ChronoDuration::hours(1), ttl), Priority::new(3));
        assert_eq!(staleness_priority(ChronoDuration::hours(3), ttl), Priority::new(2));
    }
}
