use chrono::NaiveDate;
use pipeline_core::AppError;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{DailyAnalysis, MarketSentiment};

#[derive(Debug, Clone)]
pub struct DailyAnalysisRepository {
    pool: PgPool,
}

impl DailyAnalysisRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert by `date`. A regeneration (`force`) replaces the row
    /// atomically rather than appending a second analysis for the same
    /// day, preserving invariant 5 (exactly one DailyAnalysis per date).
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert(
        &self,
        date: NaiveDate,
        market_sentiment: MarketSentiment,
        key_themes: serde_json::Value,
        summary: &str,
        ai_blob: serde_json::Value,
        confidence: f64,
        sources_analyzed: i32,
    ) -> Result<DailyAnalysis, AppError> {
        let row = sqlx::query(
            "INSERT INTO daily_analyses \
             (date, market_sentiment, key_themes_json, summary, ai_blob_json, confidence, sources_analyzed) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (date) DO UPDATE SET \
                market_sentiment = EXCLUDED.market_sentiment, \
                key_themes_json = EXCLUDED.key_themes_json, \
                summary = EXCLUDED.summary, \
                ai_blob_json = EXCLUDED.ai_blob_json, \
                confidence = EXCLUDED.confidence, \
                sources_analyzed = EXCLUDED.sources_analyzed \
             RETURNING id, date, market_sentiment, key_themes_json, summary, ai_blob_json, \
                       confidence, sources_analyzed, created_at",
        )
        .bind(date)
        .bind(market_sentiment.as_str())
        .bind(&key_themes)
        .bind(summary)
        .bind(&ai_blob)
        .bind(confidence)
        .bind(sources_analyzed)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::store(format!("upsert daily_analysis failed: {e}")))?;

        row_to_analysis(&row)
    }

    pub async fn find_by_date(&self, date: NaiveDate) -> Result<Option<DailyAnalysis>, AppError> {
        let row = sqlx::query(
            "SELECT id, date, market_sentiment, key_themes_json, summary, ai_blob_json, \
                    confidence, sources_analyzed, created_at \
             FROM daily_analyses WHERE date = $1",
        )
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::store(format!("find daily_analysis failed: {e}")))?;

        row.as_ref().map(row_to_analysis).transpose()
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<DailyAnalysis>, AppError> {
        let row = sqlx::query(
            "SELECT id, date, market_sentiment, key_themes_json, summary, ai_blob_json, \
                    confidence, sources_analyzed, created_at \
             FROM daily_analyses WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::store(format!("find daily_analysis by id failed: {e}")))?;

        row.as_ref().map(row_to_analysis).transpose()
    }

    pub async fn latest(&self) -> Result<Option<DailyAnalysis>, AppError> {
        let row = sqlx::query(
            "SELECT id, date, market_sentiment, key_themes_json, summary, ai_blob_json, \
                    confidence, sources_analyzed, created_at \
             FROM daily_analyses ORDER BY date DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::store(format!("latest daily_analysis failed: {e}")))?;

        row.as_ref().map(row_to_analysis).transpose()
    }
}

fn row_to_analysis(row: &sqlx::postgres::PgRow) -> Result<DailyAnalysis, AppError> {
    let sentiment_str: String = row.try_get("market_sentiment").map_err(db_err)?;
    let market_sentiment = MarketSentiment::from_str(&sentiment_str)
        .ok_or_else(|| AppError::store(format!("unknown market_sentiment: {sentiment_str}")))?;

    Ok(DailyAnalysis {
        id: row.try_get("id").map_err(db_err)?,
        date: row.try_get("date").map_err(db_err)?,
        market_sentiment,
        key_themes: row.try_get("key_themes_json").map_err(db_err)?,
        summary: row.try_get("summary").map_err(db_err)?,
        ai_blob: row.try_get("ai_blob_json").map_err(db_err)?,
        confidence: row.try_get("confidence").map_err(db_err)?,
        sources_analyzed: row.try_get("sources_analyzed").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn db_err(e: sqlx::Error) -> AppError {
    AppError::store(format!("decode daily_analysis row failed: {e}"))
}
