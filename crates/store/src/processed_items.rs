use pipeline_core::AppError;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::ProcessedItem;

#[derive(Debug, Clone)]
pub struct ProcessedItemRepository {
    pool: PgPool,
}

impl ProcessedItemRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert the analytic view of a RawItem. The unique index on
    /// `raw_ref` enforces invariant 4 (at most one ProcessedItem per
    /// RawItem) at the database layer; a conflict here is treated as
    /// success since the item was already processed.
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert(
        &self,
        raw_ref: Uuid,
        normalized_text: &str,
        topics: serde_json::Value,
        sentiment_score: f64,
        entities: serde_json::Value,
        summary: &str,
        processing_metadata: serde_json::Value,
    ) -> Result<ProcessedItem, AppError> {
        let row = sqlx::query(
            "INSERT INTO processed_items \
             (raw_ref, normalized_text, topics_json, sentiment_score, entities_json, summary, processing_metadata_json) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (raw_ref) DO UPDATE SET \
                normalized_text = EXCLUDED.normalized_text, \
                topics_json = EXCLUDED.topics_json, \
                sentiment_score = EXCLUDED.sentiment_score, \
                entities_json = EXCLUDED.entities_json, \
                summary = EXCLUDED.summary, \
                processing_metadata_json = EXCLUDED.processing_metadata_json \
             RETURNING id, raw_ref, normalized_text, topics_json, sentiment_score, entities_json, \
                       summary, processing_metadata_json, created_at",
        )
        .bind(raw_ref)
        .bind(normalized_text)
        .bind(&topics)
        .bind(sentiment_score)
        .bind(&entities)
        .bind(summary)
        .bind(&processing_metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::store(format!("upsert processed_item failed: {e}")))?;

        row_to_processed_item(&row)
    }

    pub async fn find_by_raw_ref(&self, raw_ref: Uuid) -> Result<Option<ProcessedItem>, AppError> {
        let row = sqlx::query(
            "SELECT id, raw_ref, normalized_text, topics_json, sentiment_score, entities_json, \
                    summary, processing_metadata_json, created_at \
             FROM processed_items WHERE raw_ref = $1",
        )
        .bind(raw_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::store(format!("find processed_item failed: {e}")))?;

        row.as_ref().map(row_to_processed_item).transpose()
    }

    /// ProcessedItems whose RawItem id is in `raw_refs`, for synthesis
    /// input assembly.
    pub async fn find_by_raw_refs(&self, raw_refs: &[Uuid]) -> Result<Vec<ProcessedItem>, AppError> {
        let rows = sqlx::query(
            "SELECT id, raw_ref, normalized_text, topics_json, sentiment_score, entities_json, \
                    summary, processing_metadata_json, created_at \
             FROM processed_items WHERE raw_ref = ANY($1)",
        )
        .bind(raw_refs)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::store(format!("list processed_items failed: {e}")))?;

        rows.iter().map(row_to_processed_item).collect()
    }
}

fn row_to_processed_item(row: &sqlx::postgres::PgRow) -> Result<ProcessedItem, AppError> {
    Ok(ProcessedItem {
        id: row.try_get("id").map_err(db_err)?,
        raw_ref: row.try_get("raw_ref").map_err(db_err)?,
        normalized_text: row.try_get("normalized_text").map_err(db_err)?,
        topics: row.try_get("topics_json").map_err(db_err)?,
        sentiment_score: row.try_get("sentiment_score").map_err(db_err)?,
        entities: row.try_get("entities_json").map_err(db_err)?,
        summary: row.try_get("summary").map_err(db_err)?,
        processing_metadata: row.try_get("processing_metadata_json").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn db_err(e: sqlx::Error) -> AppError {
    AppError::store(format!("decode processed_item row failed: {e}"))
}
