use chrono::{DateTime, Utc};
use pipeline_core::AppError;
use sqlx::Row;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{ProcessingStatus, RawItem};

#[derive(Debug, Clone)]
pub struct RawItemRepository {
    pool: PgPool,
}

impl RawItemRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new raw item, or return the existing one for the same
    /// `(source_ref, external_id)` pair. Treating the unique-constraint
    /// collision as success (rather than propagating it) implements the
    /// "invariant breach" error class: the work was already done.
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert(
        &self,
        source_ref: Uuid,
        external_id: &str,
        title: &str,
        description: Option<&str>,
        body: &str,
        published_at: DateTime<Utc>,
        metadata: serde_json::Value,
    ) -> Result<(RawItem, bool), AppError> {
        let row = sqlx::query(
            "INSERT INTO raw_items \
             (source_ref, external_id, title, description, body, published_at, metadata_json) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (source_ref, external_id) DO NOTHING \
             RETURNING id, source_ref, external_id, title, description, body, published_at, \
                       metadata_json, processing_status, created_at",
        )
        .bind(source_ref)
        .bind(external_id)
        .bind(title)
        .bind(description)
        .bind(body)
        .bind(published_at)
        .bind(&metadata)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::store(format!("insert raw_item failed: {e}")))?;

        match row {
            Some(row) => Ok((row_to_raw_item(&row)?, true)),
            None => {
                let existing = self.find_by_source_external(source_ref, external_id).await?;
                let existing = existing
                    .ok_or_else(|| AppError::store("conflicting raw_item vanished after insert race".into()))?;
                Ok((existing, false))
            }
        }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<RawItem>, AppError> {
        let row = sqlx::query(
            "SELECT id, source_ref, external_id, title, description, body, published_at, \
                    metadata_json, processing_status, created_at \
             FROM raw_items WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::store(format!("find raw_item by id failed: {e}")))?;

        row.as_ref().map(row_to_raw_item).transpose()
    }

    pub async fn find_by_source_external(
        &self,
        source_ref: Uuid,
        external_id: &str,
    ) -> Result<Option<RawItem>, AppError> {
        let row = sqlx::query(
            "SELECT id, source_ref, external_id, title, description, body, published_at, \
                    metadata_json, processing_status, created_at \
             FROM raw_items WHERE source_ref = $1 AND external_id = $2",
        )
        .bind(source_ref)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::store(format!("find raw_item failed: {e}")))?;

        row.as_ref().map(row_to_raw_item).transpose()
    }

    pub async fn set_body(&self, id: Uuid, body: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE raw_items SET body = $1 WHERE id = $2")
            .bind(body)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::store(format!("set_body failed: {e}")))?;
        Ok(())
    }

    pub async fn set_status(&self, id: Uuid, status: ProcessingStatus) -> Result<(), AppError> {
        sqlx::query("UPDATE raw_items SET processing_status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::store(format!("set_status failed: {e}")))?;
        Ok(())
    }

    /// RawItems published within the 24h window ending at `date`'s
    /// end-of-day, capped at `limit` by recency. Used by the daily
    /// synthesizer to gather its input set.
    pub async fn published_within_window(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<RawItem>, AppError> {
        let rows = sqlx::query(
            "SELECT id, source_ref, external_id, title, description, body, published_at, \
                    metadata_json, processing_status, created_at \
             FROM raw_items \
             WHERE published_at >= $1 AND published_at < $2 \
             ORDER BY published_at DESC \
             LIMIT $3",
        )
        .bind(window_start)
        .bind(window_end)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::store(format!("window query failed: {e}")))?;

        rows.iter().map(row_to_raw_item).collect()
    }
}

fn row_to_raw_item(row: &sqlx::postgres::PgRow) -> Result<RawItem, AppError> {
    let status_str: String = row.try_get("processing_status").map_err(db_err)?;
    let processing_status = ProcessingStatus::from_str(&status_str)
        .ok_or_else(|| AppError::store(format!("unknown processing_status: {status_str}")))?;

    Ok(RawItem {
        id: row.try_get("id").map_err(db_err)?,
        source_ref: row.try_get("source_ref").map_err(db_err)?,
        external_id: row.try_get("external_id").map_err(db_err)?,
        title: row.try_get("title").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
        body: row.try_get("body").map_err(db_err)?,
        published_at: row.try_get("published_at").map_err(db_err)?,
        metadata: row.try_get("metadata_json").map_err(db_err)?,
        processing_status,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn db_err(e: sqlx::Error) -> AppError {
    AppError::store(format!("decode raw_item row failed: {e}"))
}
