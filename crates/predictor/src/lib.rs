//! C7: Predictor. For a DailyAnalysis, drafts one Prediction per horizon
//! in the configured default set, each confidence-capped at the
//! analysis's own confidence so a prediction is never more certain than
//! the reasoning it's drawn from.

use pipeline_core::AppError;
use pipeline_llm::{LlmClient, PredictionInput};
use pipeline_queue::JobError;
use pipeline_store::models::{DailyAnalysis, Horizon, Prediction, PredictionKind};
use pipeline_store::Store;

fn job_error(e: AppError) -> JobError {
    if e.is_retryable() {
        JobError::retryable(e.to_string())
    } else {
        JobError::permanent(e.to_string())
    }
}

/// Horizon-to-kind mapping: spec.md leaves "kind" unspecified per
/// horizon, so each horizon in the default set gets a distinct,
/// deterministic kind rather than all horizons sharing one.
fn kind_for_horizon(horizon: Horizon) -> PredictionKind {
    match horizon {
        Horizon::OneWeek => PredictionKind::MarketDirection,
        Horizon::OneMonth => PredictionKind::SectorPerformance,
        Horizon::ThreeMonths => PredictionKind::EconomicIndicator,
        Horizon::SixMonths | Horizon::OneYear => PredictionKind::GeopoliticalEvent,
    }
}

fn themes(analysis: &DailyAnalysis) -> Vec<String> {
    serde_json::from_value(analysis.key_themes.clone()).unwrap_or_default()
}

/// Drafts and persists one Prediction per horizon in `Horizon::default_set`.
pub async fn generate_predictions(
    store: &Store,
    llm: &dyn LlmClient,
    analysis: &DailyAnalysis,
) -> Result<Vec<Prediction>, JobError> {
    let themes = themes(analysis);
    let mut predictions = Vec::with_capacity(Horizon::default_set().len());

    for &horizon in Horizon::default_set() {
        let input = PredictionInput {
            horizon: horizon.as_str().to_string(),
            analysis_sentiment_label: analysis.market_sentiment.as_str().to_string(),
            analysis_confidence: analysis.confidence as f32,
            themes: themes.clone(),
        };

        let output = llm
            .draft_prediction(input)
            .await
            .map_err(|e| JobError::retryable(e.to_string()))?;

        let confidence = (output.confidence as f64).min(analysis.confidence);

        let prediction = store
            .predictions()
            .create(
                analysis.id,
                kind_for_horizon(horizon),
                &output.text,
                confidence,
                horizon,
                serde_json::json!({
                    "basis": output.basis,
                    "used_fallback": output.used_fallback,
                    "source_sentiment_label": analysis.market_sentiment.as_str(),
                }),
            )
            .await
            .map_err(job_error)?;

        predictions.push(prediction);
    }

    Ok(predictions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_default_horizon_maps_to_a_distinct_kind() {
        let kinds: Vec<PredictionKind> = Horizon::default_set().iter().map(|&h| kind_for_horizon(h)).collect();
        let mut unique = kinds.clone();
        unique.sort_by_key(|k| k.as_str());
        unique.dedup_by_key(|k| k.as_str());
        assert_eq!(kinds.len(), unique.len());
    }
}
