use pipeline_core::AppError;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{Horizon, Prediction, PredictionComparison, PredictionKind};

#[derive(Debug, Clone)]
pub struct PredictionRepository {
    pool: PgPool,
}

impl PredictionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upserts by `(analysis_ref, horizon)` — the natural key for one
    /// horizon's prediction off one analysis. A re-run of
    /// `generate_predictions` (after a retry, or re-triggered by the
    /// freshness check) replaces the existing row's content rather than
    /// appending a duplicate, per the idempotence law.
    pub async fn create(
        &self,
        analysis_ref: Uuid,
        kind: PredictionKind,
        text: &str,
        confidence: f64,
        horizon: Horizon,
        data: serde_json::Value,
    ) -> Result<Prediction, AppError> {
        let row = sqlx::query(
            "INSERT INTO predictions (analysis_ref, kind, text, confidence, horizon, data_json) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (analysis_ref, horizon) DO UPDATE SET \
                kind = EXCLUDED.kind, text = EXCLUDED.text, confidence = EXCLUDED.confidence, \
                data_json = EXCLUDED.data_json \
             RETURNING id, analysis_ref, kind, text, confidence, horizon, data_json, created_at",
        )
        .bind(analysis_ref)
        .bind(kind.as_str())
        .bind(text)
        .bind(confidence)
        .bind(horizon.as_str())
        .bind(&data)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::store(format!("create prediction failed: {e}")))?;

        row_to_prediction(&row)
    }

    pub async fn find_by_analysis(&self, analysis_ref: Uuid) -> Result<Vec<Prediction>, AppError> {
        let rows = sqlx::query(
            "SELECT id, analysis_ref, kind, text, confidence, horizon, data_json, created_at \
             FROM predictions WHERE analysis_ref = $1",
        )
        .bind(analysis_ref)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::store(format!("list predictions failed: {e}")))?;

        rows.iter().map(row_to_prediction).collect()
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Prediction>, AppError> {
        let row = sqlx::query(
            "SELECT id, analysis_ref, kind, text, confidence, horizon, data_json, created_at \
             FROM predictions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::store(format!("find prediction failed: {e}")))?;

        row.as_ref().map(row_to_prediction).transpose()
    }

    /// Predictions due for scoring: their horizon has elapsed relative to
    /// the creating analysis's date but no comparison row exists yet.
    /// Horizon-to-duration mapping and the "due" check live in the
    /// predictor/evaluator glue; this just returns the candidate set.
    pub async fn without_comparison(&self) -> Result<Vec<Prediction>, AppError> {
        let rows = sqlx::query(
            "SELECT p.id, p.analysis_ref, p.kind, p.text, p.confidence, p.horizon, p.data_json, p.created_at \
             FROM predictions p \
             LEFT JOIN prediction_comparisons c ON c.prediction_ref = p.id \
             WHERE c.id IS NULL",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::store(format!("list unscored predictions failed: {e}")))?;

        rows.iter().map(row_to_prediction).collect()
    }
}

#[derive(Debug, Clone)]
pub struct PredictionComparisonRepository {
    pool: PgPool,
}

impl PredictionComparisonRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Keyed by `prediction_ref` — a prediction is scored once.
    /// spec.md's DataModel calls `PredictionComparison` "immutable once
    /// written", so a replayed `prediction_compare` job (invariant
    /// breach, §7 — "treated as success") lands on the conflict branch
    /// and gets back the row that was already written, rather than
    /// overwriting it or erroring.
    pub async fn create(
        &self,
        prediction_ref: Uuid,
        analysis_ref: Uuid,
        accuracy: f64,
        outcome_description: &str,
    ) -> Result<PredictionComparison, AppError> {
        let row = sqlx::query(
            "INSERT INTO prediction_comparisons (prediction_ref, analysis_ref, accuracy, outcome_description) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (prediction_ref) DO NOTHING \
             RETURNING id, prediction_ref, analysis_ref, accuracy, outcome_description, created_at",
        )
        .bind(prediction_ref)
        .bind(analysis_ref)
        .bind(accuracy)
        .bind(outcome_description)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::store(format!("create prediction_comparison failed: {e}")))?;

        let row = match row {
            Some(row) => row,
            None => sqlx::query(
                "SELECT id, prediction_ref, analysis_ref, accuracy, outcome_description, created_at \
                 FROM prediction_comparisons WHERE prediction_ref = $1",
            )
            .bind(prediction_ref)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::store(format!("fetch existing prediction_comparison failed: {e}")))?,
        };

        Ok(PredictionComparison {
            id: row.try_get("id").map_err(db_err)?,
            prediction_ref: row.try_get("prediction_ref").map_err(db_err)?,
            analysis_ref: row.try_get("analysis_ref").map_err(db_err)?,
            accuracy: row.try_get("accuracy").map_err(db_err)?,
            outcome_description: row.try_get("outcome_description").map_err(db_err)?,
            created_at: row.try_get("created_at").map_err(db_err)?,
        })
    }
}

fn row_to_prediction(row: &sqlx::postgres::PgRow) -> Result<Prediction, AppError> {
    let kind_str: String = row.try_get("kind").map_err(db_err)?;
    let kind = PredictionKind::from_str(&kind_str)
        .ok_or_else(|| AppError::store(format!("unknown prediction kind: {kind_str}")))?;

    let horizon_str: String = row.try_get("horizon").map_err(db_err)?;
    let horizon = Horizon::from_str(&horizon_str)
        .ok_or_else(|| AppError::store(format!("unknown horizon: {horizon_str}")))?;

    Ok(Prediction {
        id: row.try_get("id").map_err(db_err)?,
        analysis_ref: row.try_get("analysis_ref").map_err(db_err)?,
        kind,
        text: row.try_get("text").map_err(db_err)?,
        confidence: row.try_get("confidence").map_err(db_err)?,
        horizon,
        data: row.try_get("data_json").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn db_err(e: sqlx::Error) -> AppError {
    AppError::store(format!("decode prediction row failed: {e}"))
}
