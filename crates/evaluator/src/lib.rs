//! C8: Evaluator. Scores one Prediction against a later DailyAnalysis
//! using rules specific to the prediction's kind, and writes the
//! PredictionComparison. Insufficient inputs get `accuracy = 0.5` and an
//! explanation rather than a hard failure — a comparison the pipeline
//! can't confidently make is still worth recording as such.

use pipeline_core::AppError;
use pipeline_queue::JobError;
use pipeline_store::models::{DailyAnalysis, MarketSentiment, Prediction, PredictionComparison, PredictionKind};
use pipeline_store::Store;

const INSUFFICIENT_ACCURACY: f64 = 0.5;

fn job_error(e: AppError) -> JobError {
    if e.is_retryable() {
        JobError::retryable(e.to_string())
    } else {
        JobError::permanent(e.to_string())
    }
}

fn source_sentiment_label(prediction: &Prediction) -> Option<MarketSentiment> {
    prediction.data.get("source_sentiment_label").and_then(serde_json::Value::as_str).and_then(MarketSentiment::from_str)
}

fn basis_themes(prediction: &Prediction) -> Vec<String> {
    prediction
        .data
        .get("basis")
        .and_then(serde_json::Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn key_themes(analysis: &DailyAnalysis) -> Vec<String> {
    serde_json::from_value(analysis.key_themes.clone()).unwrap_or_default()
}

/// Direction match for `market_direction`: exact sentiment match scores
/// 1.0, opposite (bullish vs bearish) scores 0.0, anything touching
/// neutral scores 0.5.
fn direction_match_accuracy(predicted: MarketSentiment, actual: MarketSentiment) -> f64 {
    match (predicted, actual) {
        (a, b) if a == b => 1.0,
        (MarketSentiment::Neutral, _) | (_, MarketSentiment::Neutral) => 0.5,
        _ => 0.0,
    }
}

/// Magnitude closeness for `sector_performance`/`economic_indicator`:
/// how close the prediction's confidence was to the later analysis's
/// own confidence, treating confidence as a proxy for expected-move size.
fn magnitude_closeness(prediction_confidence: f64, later_confidence: f64) -> f64 {
    (1.0 - (prediction_confidence - later_confidence).abs()).clamp(0.0, 1.0)
}

/// Occurrence check for `geopolitical_event`: what fraction of the
/// prediction's basis themes actually resurfaced in the later analysis.
fn occurrence_accuracy(basis: &[String], later_themes: &[String]) -> f64 {
    if basis.is_empty() {
        return INSUFFICIENT_ACCURACY;
    }
    let hits = basis.iter().filter(|t| later_themes.contains(t)).count();
    hits as f64 / basis.len() as f64
}

fn evaluate(prediction: &Prediction, later_analysis: &DailyAnalysis) -> (f64, String) {
    match prediction.kind {
        PredictionKind::MarketDirection => match source_sentiment_label(prediction) {
            Some(predicted) => {
                let accuracy = direction_match_accuracy(predicted, later_analysis.market_sentiment);
                let explanation = format!(
                    "predicted {} vs actual {}",
                    predicted.as_str(),
                    later_analysis.market_sentiment.as_str()
                );
                (accuracy, explanation)
            }
            None => (INSUFFICIENT_ACCURACY, "prediction carries no source sentiment label to compare".to_string()),
        },
        PredictionKind::SectorPerformance | PredictionKind::EconomicIndicator => {
            let accuracy = magnitude_closeness(prediction.confidence, later_analysis.confidence);
            let explanation = format!(
                "magnitude closeness between predicted confidence {:.2} and observed confidence {:.2}",
                prediction.confidence, later_analysis.confidence
            );
            (accuracy, explanation)
        }
        PredictionKind::GeopoliticalEvent => {
            let basis = basis_themes(prediction);
            let later_themes = key_themes(later_analysis);
            if basis.is_empty() {
                (INSUFFICIENT_ACCURACY, "prediction carries no basis themes to check for occurrence".to_string())
            } else {
                let accuracy = occurrence_accuracy(&basis, &later_themes);
                let explanation = format!(
                    "{} of {} basis themes resurfaced in the later analysis",
                    basis.iter().filter(|t| later_themes.contains(t)).count(),
                    basis.len()
                );
                (accuracy, explanation)
            }
        }
    }
}

/// Scores `prediction` against `later_analysis` and persists the result.
pub async fn compare_prediction(
    store: &Store,
    prediction: &Prediction,
    later_analysis: &DailyAnalysis,
) -> Result<PredictionComparison, JobError> {
    let (accuracy, outcome_description) = evaluate(prediction, later_analysis);

    store
        .prediction_comparisons()
        .create(prediction.id, later_analysis.id, accuracy, &outcome_description)
        .await
        .map_err(job_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn prediction(kind: PredictionKind, confidence: f64, data: serde_json::Value) -> Prediction {
        Prediction {
            id: Uuid::new_v4(),
            analysis_ref: Uuid::new_v4(),
            kind,
            text: "text".to_string(),
            confidence,
            horizon: pipeline_store::models::Horizon::OneWeek,
            data,
            created_at: chrono::Utc::now(),
        }
    }

    fn analysis(market_sentiment: MarketSentiment, confidence: f64, key_themes: Vec<&str>) -> DailyAnalysis {
        DailyAnalysis {
            id: Uuid::new_v4(),
            date: chrono::Utc::now().date_naive(),
            market_sentiment,
            key_themes: serde_json::json!(key_themes),
            summary: "summary".to_string(),
            ai_blob: serde_json::json!({}),
            confidence,
            sources_analyzed: 10,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn direction_match_scores_exact_match_as_1() {
        let p = prediction(
            PredictionKind::MarketDirection,
            0.7,
            serde_json::json!({ "source_sentiment_label": "bullish" }),
        );
        let a = analysis(MarketSentiment::Bullish, 0.6, vec![]);
        let (accuracy, _) = evaluate(&p, &a);
        assert_eq!(accuracy, 1.0);
    }

    #[test]
    fn direction_match_scores_opposite_as_0() {
        let p = prediction(
            PredictionKind::MarketDirection,
            0.7,
            serde_json::json!({ "source_sentiment_label": "bullish" }),
        );
        let a = analysis(MarketSentiment::Bearish, 0.6, vec![]);
        let (accuracy, _) = evaluate(&p, &a);
        assert_eq!(accuracy, 0.0);
    }

    #[test]
    fn missing_sentiment_label_is_insufficient() {
        let p = prediction(PredictionKind::MarketDirection, 0.7, serde_json::json!({}));
        let a = analysis(MarketSentiment::Bullish, 0.6, vec![]);
        let (accuracy, _) = evaluate(&p, &a);
        assert_eq!(accuracy, INSUFFICIENT_ACCURACY);
    }

    #[test]
    fn magnitude_closeness_rewards_similar_confidence() {
        let p = prediction(PredictionKind::SectorPerformance, 0.6, serde_json::json!({}));
        let a = analysis(MarketSentiment::Neutral, 0.62, vec![]);
        let (accuracy, _) = evaluate(&p, &a);
        assert!(accuracy > 0.9);
    }

    #[test]
    fn occurrence_checks_basis_overlap() {
        let p = prediction(
            PredictionKind::GeopoliticalEvent,
            0.5,
            serde_json::json!({ "basis": ["tariffs", "sanctions"] }),
        );
        let a = analysis(MarketSentiment::Neutral, 0.5, vec!["tariffs", "inflation"]);
        let (accuracy, _) = evaluate(&p, &a);
        assert_eq!(accuracy, 0.5);
    }

    #[test]
    fn empty_basis_is_insufficient() {
        let p = prediction(PredictionKind::GeopoliticalEvent, 0.5, serde_json::json!({}));
        let a = analysis(MarketSentiment::Neutral, 0.5, vec![]);
        let (accuracy, _) = evaluate(&p, &a);
        assert_eq!(accuracy, INSUFFICIENT_ACCURACY);
    }
}
