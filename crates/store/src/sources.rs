use pipeline_core::AppError;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{Source, SourceKind};

#[derive(Debug, Clone)]
pub struct SourceRepository {
    pool: PgPool,
}

impl SourceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        name: &str,
        kind: SourceKind,
        url: &str,
        config: serde_json::Value,
    ) -> Result<Source, AppError> {
        let row = sqlx::query(
            "INSERT INTO sources (name, kind, url, config_json) VALUES ($1, $2, $3, $4) \
             RETURNING id, name, kind, url, active, config_json, last_fetched_at, created_at, updated_at",
        )
        .bind(name)
        .bind(kind.as_str())
        .bind(url)
        .bind(&config)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::store(format!("create source failed: {e}")))?;

        row_to_source(&row)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Source>, AppError> {
        let row = sqlx::query(
            "SELECT id, name, kind, url, active, config_json, last_fetched_at, created_at, updated_at \
             FROM sources WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::store(format!("find source failed: {e}")))?;

        row.as_ref().map(row_to_source).transpose()
    }

    /// All sources eligible for a freshness check: active, ordered so the
    /// most stale (`last_fetched_at` oldest, nulls first) come first.
    pub async fn active_sources(&self) -> Result<Vec<Source>, AppError> {
        let rows = sqlx::query(
            "SELECT id, name, kind, url, active, config_json, last_fetched_at, created_at, updated_at \
             FROM sources WHERE active = true \
             ORDER BY last_fetched_at ASC NULLS FIRST",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::store(format!("list active sources failed: {e}")))?;

        rows.iter().map(row_to_source).collect()
    }

    pub async fn mark_fetched(&self, id: Uuid, at: chrono::DateTime<chrono::Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE sources SET last_fetched_at = $1, updated_at = $1 WHERE id = $2")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::store(format!("mark_fetched failed: {e}")))?;
        Ok(())
    }

    /// Replaces `config_json` wholesale. Source configuration (§6.2) is
    /// admin-managed data, not deployment configuration, so it lives here
    /// rather than in `pipeline_core::Config`.
    pub async fn update_config(&self, id: Uuid, config: serde_json::Value) -> Result<(), AppError> {
        sqlx::query("UPDATE sources SET config_json = $1, updated_at = now() WHERE id = $2")
            .bind(&config)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::store(format!("update_config failed: {e}")))?;
        Ok(())
    }

    /// Soft-disable/enable. Sources are never deleted while referenced by
    /// RawItems (spec.md §3's Source lifecycle), so this is the only way
    /// to stop a source from being picked up by the freshness trigger.
    pub async fn set_active(&self, id: Uuid, active: bool) -> Result<(), AppError> {
        sqlx::query("UPDATE sources SET active = $1, updated_at = now() WHERE id = $2")
            .bind(active)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::store(format!("set_active failed: {e}")))?;
        Ok(())
    }
}

fn row_to_source(row: &sqlx::postgres::PgRow) -> Result<Source, AppError> {
    let kind_str: String = row
        .try_get("kind")
        .map_err(|e| AppError::store(format!("decode source row failed: {e}")))?;
    let kind = SourceKind::from_str(&kind_str)
        .ok_or_else(|| AppError::store(format!("unknown source kind: {kind_str}")))?;

    Ok(Source {
        id: row.try_get("id").map_err(db_err)?,
        name: row.try_get("name").map_err(db_err)?,
        kind,
        url: row.try_get("url").map_err(db_err)?,
        active: row.try_get("active").map_err(db_err)?,
        config: row.try_get("config_json").map_err(db_err)?,
        last_fetched_at: row.try_get("last_fetched_at").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

fn db_err(e: sqlx::Error) -> AppError {
    AppError::store(format!("decode source row failed: {e}"))
}
