//! Durable backend on top of Postgres. Holds the same lease/idempotency/
//! retry semantics as [`super::memory::MemoryBackend`]; claims are made
//! atomic with `SELECT ... FOR UPDATE SKIP LOCKED` inside a transaction so
//! two concurrent `dequeue` calls never return the same job id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::time::Duration;

use crate::{
    backend::QueueBackend, types::LeaseToken, JobId, JobMessage, JobRecord, JobStatus, LeasedJob,
    Priority, QueueCapabilities, QueueCtx, QueueError, QueueResult, QueueStats,
};

const MIGRATION_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id              TEXT PRIMARY KEY,
    queue           TEXT NOT NULL,
    job_type        TEXT NOT NULL,
    payload_bytes   BYTEA NOT NULL,
    codec           TEXT NOT NULL,
    priority        SMALLINT NOT NULL,
    status          TEXT NOT NULL,
    attempt         INTEGER NOT NULL DEFAULT 0,
    max_retries     INTEGER NOT NULL,
    run_at          TIMESTAMPTZ NOT NULL,
    retry_at        TIMESTAMPTZ,
    lease_token     TEXT,
    lease_until     TIMESTAMPTZ,
    idempotency_key TEXT,
    last_error      TEXT,
    completed_at    TIMESTAMPTZ,
    failed_at       TIMESTAMPTZ,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS jobs_dequeue_idx ON jobs (queue, status, priority, created_at);
CREATE UNIQUE INDEX IF NOT EXISTS jobs_dedup_idx
    ON jobs (queue, job_type, idempotency_key)
    WHERE idempotency_key IS NOT NULL AND status NOT IN ('completed', 'failed');
"#;

/// Postgres-backed [`QueueBackend`]. Construct with [`PostgresBackend::connect`]
/// or hand it an existing pool via [`PostgresBackend::from_pool`].
#[derive(Clone)]
pub struct PostgresBackend {
    pool: PgPool,
    default_lease: chrono::Duration,
}

impl PostgresBackend {
    /// Connect to `database_url`, run the embedded migration, and return a
    /// ready backend.
    pub async fn connect(database_url: &str) -> QueueResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await
            .map_err(|e| QueueError::Internal(format!("postgres connect failed: {e}")))?;

        let backend = Self::from_pool(pool);
        backend.migrate().await?;
        Ok(backend)
    }

    /// Wrap an existing pool, skipping migration (caller already ran it, or
    /// manages migrations externally).
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            default_lease: chrono::Duration::seconds(600),
        }
    }

    pub fn with_lease_duration(mut self, lease: std::time::Duration) -> Self {
        self.default_lease = chrono::Duration::from_std(lease).unwrap_or(self.default_lease);
        self
    }

    pub async fn migrate(&self) -> QueueResult<()> {
        sqlx::query(MIGRATION_SQL)
            .execute(&self.pool)
            .await
            .map_err(|e| QueueError::Internal(format!("migration failed: {e}")))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn row_to_record(row: &sqlx::postgres::PgRow) -> QueueResult<JobRecord> {
    let status_name: String = row.try_get("status").map_err(db_err)?;
    let retry_at: Option<DateTime<Utc>> = row.try_get("retry_at").map_err(db_err)?;
    let lease_until: Option<DateTime<Utc>> = row.try_get("lease_until").map_err(db_err)?;
    let completed_at: Option<DateTime<Utc>> = row.try_get("completed_at").map_err(db_err)?;
    let failed_at: Option<DateTime<Utc>> = row.try_get("failed_at").map_err(db_err)?;
    let last_error: Option<String> = row.try_get("last_error").map_err(db_err)?;

    let status = match status_name.as_str() {
        "pending" => JobStatus::Pending,
        "processing" => JobStatus::Processing {
            lease_until: lease_until
                .ok_or_else(|| QueueError::Internal("processing row missing lease_until".into()))?,
        },
        "retrying" => JobStatus::Retrying {
            retry_at: retry_at
                .ok_or_else(|| QueueError::Internal("retrying row missing retry_at".into()))?,
        },
        "completed" => JobStatus::Completed {
            completed_at: completed_at
                .ok_or_else(|| QueueError::Internal("completed row missing completed_at".into()))?,
        },
        "failed" => JobStatus::Failed {
            failed_at: failed_at
                .ok_or_else(|| QueueError::Internal("failed row missing failed_at".into()))?,
            error: last_error.clone().unwrap_or_default(),
        },
        other => return Err(QueueError::Internal(format!("unknown job status: {other}"))),
    };

    let priority_raw: i16 = row.try_get("priority").map_err(db_err)?;
    let message = JobMessage {
        job_type: row.try_get("job_type").map_err(db_err)?,
        payload_bytes: row.try_get("payload_bytes").map_err(db_err)?,
        codec: row.try_get("codec").map_err(db_err)?,
        queue: row.try_get("queue").map_err(db_err)?,
        priority: Priority::new(priority_raw.clamp(0, u8::MAX as i16) as u8),
        max_retries: row.try_get::<i32, _>("max_retries").map_err(db_err)? as u32,
        run_at: row.try_get("run_at").map_err(db_err)?,
        idempotency_key: row.try_get("idempotency_key").map_err(db_err)?,
    };

    let job_id: String = row.try_get("id").map_err(db_err)?;
    let lease_token: Option<String> = row.try_get("lease_token").map_err(db_err)?;

    Ok(JobRecord {
        job_id: JobId::from_string(job_id),
        message,
        status,
        attempt: row.try_get::<i32, _>("attempt").map_err(db_err)? as u32,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
        last_error,
        lease_token: lease_token.map(LeaseToken::from_string),
        lease_until,
    })
}

fn db_err(e: sqlx::Error) -> QueueError {
    QueueError::Internal(format!("postgres row decode failed: {e}"))
}

#[async_trait]
impl QueueBackend for PostgresBackend {
    async fn enqueue(&self, _ctx: QueueCtx, message: JobMessage) -> QueueResult<JobId> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| QueueError::Internal(format!("begin tx failed: {e}")))?;

        if let Some(ref key) = message.idempotency_key {
            let existing: Option<(String,)> = sqlx::query_as(
                "SELECT id FROM jobs WHERE queue = $1 AND job_type = $2 AND idempotency_key = $3 \
                 AND status NOT IN ('completed', 'failed')",
            )
            .bind(&message.queue)
            .bind(&message.job_type)
            .bind(key)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| QueueError::Internal(format!("idempotency lookup failed: {e}")))?;

            if let Some((existing_id,)) = existing {
                tx.commit()
                    .await
                    .map_err(|e| QueueError::Internal(format!("commit failed: {e}")))?;
                return Ok(JobId::from_string(existing_id));
            }
        }

        let job_id = JobId::new();
        sqlx::query(
            "INSERT INTO jobs \
             (id, queue, job_type, payload_bytes, codec, priority, status, attempt, \
              max_retries, run_at, idempotency_key) \
             VALUES ($1, $2, $3, $4, $5, $6, 'pending', 0, $7, $8, $9)",
        )
        .bind(job_id.as_str())
        .bind(&message.queue)
        .bind(&message.job_type)
        .bind(&message.payload_bytes)
        .bind(&message.codec)
        .bind(message.priority.get() as i16)
        .bind(message.max_retries as i32)
        .bind(message.run_at)
        .bind(&message.idempotency_key)
        .execute(&mut *tx)
        .await
        .map_err(|e| QueueError::Internal(format!("insert job failed: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| QueueError::Internal(format!("commit failed: {e}")))?;

        Ok(job_id)
    }

    async fn dequeue(&self, _ctx: QueueCtx, queues: &[&str]) -> QueueResult<Option<LeasedJob>> {
        if queues.is_empty() {
            return Ok(None);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| QueueError::Internal(format!("begin tx failed: {e}")))?;

        let now = Utc::now();
        let row = sqlx::query(
            "SELECT * FROM jobs \
             WHERE queue = ANY($1) \
               AND ((status = 'pending' AND run_at <= $2) \
                 OR (status = 'retrying' AND retry_at <= $2)) \
             ORDER BY priority ASC, created_at ASC \
             LIMIT 1 \
             FOR UPDATE SKIP LOCKED",
        )
        .bind(queues)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| QueueError::Internal(format!("dequeue select failed: {e}")))?;

        let Some(row) = row else {
            tx.commit()
                .await
                .map_err(|e| QueueError::Internal(format!("commit failed: {e}")))?;
            return Ok(None);
        };

        let mut record = row_to_record(&row)?;
        let lease_token = LeaseToken::new();
        let lease_until = now + self.default_lease;
        let attempt = record.attempt + 1;

        sqlx::query(
            "UPDATE jobs SET status = 'processing', attempt = $1, lease_token = $2, \
             lease_until = $3, retry_at = NULL, updated_at = $4 WHERE id = $5",
        )
        .bind(attempt as i32)
        .bind(lease_token.as_str())
        .bind(lease_until)
        .bind(now)
        .bind(record.job_id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| QueueError::Internal(format!("dequeue update failed: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| QueueError::Internal(format!("commit failed: {e}")))?;

        record.attempt = attempt;
        record.start_processing(lease_token.clone(), lease_until);

        Ok(Some(LeasedJob::new(record, lease_token, lease_until)))
    }

    async fn complete(
        &self,
        _ctx: QueueCtx,
        job_id: JobId,
        lease_token: LeaseToken,
        _result_ref: Option<String>,
    ) -> QueueResult<()> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE jobs SET status = 'completed', completed_at = $1, lease_token = NULL, \
             lease_until = NULL, updated_at = $1 \
             WHERE id = $2 AND lease_token = $3 AND status NOT IN ('completed', 'failed')",
        )
        .bind(now)
        .bind(job_id.as_str())
        .bind(lease_token.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Internal(format!("complete failed: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(self.classify_ack_miss(&job_id).await);
        }

        Ok(())
    }

    async fn fail(
        &self,
        _ctx: QueueCtx,
        job_id: JobId,
        lease_token: LeaseToken,
        error: String,
        retry_at: Option<DateTime<Utc>>,
    ) -> QueueResult<()> {
        let now = Utc::now();

        let query = match retry_at {
            Some(retry_time) => sqlx::query(
                "UPDATE jobs SET status = 'retrying', retry_at = $1, \
                 last_error = $2, lease_token = NULL, lease_until = NULL, updated_at = $3 \
                 WHERE id = $4 AND lease_token = $5 AND status NOT IN ('completed', 'failed')",
            )
            .bind(retry_time)
            .bind(&error)
            .bind(now)
            .bind(job_id.as_str())
            .bind(lease_token.as_str()),
            None => sqlx::query(
                "UPDATE jobs SET status = 'failed', failed_at = $1, last_error = $2, \
                 lease_token = NULL, lease_until = NULL, updated_at = $1 \
                 WHERE id = $3 AND lease_token = $4 AND status NOT IN ('completed', 'failed')",
            )
            .bind(now)
            .bind(&error)
            .bind(job_id.as_str())
            .bind(lease_token.as_str()),
        };

        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| QueueError::Internal(format!("fail failed: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(self.classify_ack_miss(&job_id).await);
        }

        Ok(())
    }

    async fn stats(&self, _ctx: QueueCtx, queues: &[&str]) -> QueueResult<QueueStats> {
        let rows = if queues.is_empty() {
            sqlx::query("SELECT status, count(*) AS n FROM jobs GROUP BY status")
                .fetch_all(&self.pool)
                .await
        } else {
            sqlx::query("SELECT status, count(*) AS n FROM jobs WHERE queue = ANY($1) GROUP BY status")
                .bind(queues)
                .fetch_all(&self.pool)
                .await
        }
        .map_err(|e| QueueError::Internal(format!("stats query failed: {e}")))?;

        let mut stats = QueueStats::default();
        for row in rows {
            let status: String = row.try_get("status").map_err(db_err)?;
            let count: i64 = row.try_get("n").map_err(db_err)?;
            let count = count as u64;
            match status.as_str() {
                "pending" => stats.pending = count,
                "processing" => stats.processing = count,
                "retrying" => stats.retrying = count,
                "completed" => stats.completed = count,
                "failed" => stats.failed = count,
                _ => {}
            }
        }

        Ok(stats)
    }

    fn capabilities(&self) -> QueueCapabilities {
        QueueCapabilities::all()
    }
}

impl PostgresBackend {
    /// Reclaim jobs stuck in `processing` past their lease — the
    /// mandatory sweep from spec §4.1: a worker that crashed or hung
    /// mid-handler leaves a row whose lease has expired, and nothing
    /// else in this backend will ever look at it again otherwise, since
    /// `dequeue` only considers `pending`/`retrying` rows. Mirrors
    /// [`super::memory::LeaseReaper`]'s retry/fail decision.
    pub async fn reap_expired_leases(&self) -> QueueResult<usize> {
        let now = Utc::now();

        let expired = sqlx::query(
            "SELECT id, attempt, max_retries FROM jobs \
             WHERE status = 'processing' AND lease_until < $1 \
             FOR UPDATE SKIP LOCKED",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| QueueError::Internal(format!("sweep select failed: {e}")))?;

        let mut reclaimed = 0;
        for row in expired {
            let job_id: String = row.try_get("id").map_err(db_err)?;
            let attempt: i32 = row.try_get("attempt").map_err(db_err)?;
            let max_retries: i32 = row.try_get("max_retries").map_err(db_err)?;

            if attempt >= max_retries {
                sqlx::query(
                    "UPDATE jobs SET status = 'failed', failed_at = $1, \
                     last_error = 'worker_timeout', lease_token = NULL, \
                     lease_until = NULL, updated_at = $1 \
                     WHERE id = $2 AND status = 'processing'",
                )
                .bind(now)
                .bind(&job_id)
                .execute(&self.pool)
                .await
                .map_err(|e| QueueError::Internal(format!("sweep fail failed: {e}")))?;
            } else {
                sqlx::query(
                    "UPDATE jobs SET status = 'retrying', retry_at = $1, \
                     last_error = 'worker_timeout', lease_token = NULL, \
                     lease_until = NULL, updated_at = $1 \
                     WHERE id = $2 AND status = 'processing'",
                )
                .bind(now)
                .bind(&job_id)
                .execute(&self.pool)
                .await
                .map_err(|e| QueueError::Internal(format!("sweep retry failed: {e}")))?;
            }

            reclaimed += 1;
        }

        Ok(reclaimed)
    }

    /// `complete`/`fail` touched zero rows: figure out why so the caller
    /// gets a precise error instead of a generic "not found".
    async fn classify_ack_miss(&self, job_id: &JobId) -> QueueError {
        let row = sqlx::query("SELECT status FROM jobs WHERE id = $1")
            .bind(job_id.as_str())
            .fetch_optional(&self.pool)
            .await;

        match row {
            Ok(Some(row)) => match row.try_get::<String, _>("status") {
                Ok(status) if status == "completed" || status == "failed" => {
                    QueueError::JobAlreadyTerminal
                }
                _ => QueueError::InvalidLeaseToken,
            },
            Ok(None) => QueueError::JobNotFound(job_id.to_string()),
            Err(e) => QueueError::Internal(format!("ack miss lookup failed: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Exercises row decoding against a hand-built row shape is not
    /// practical without a live database; these tests stick to the parts
    /// that don't need a connection. Full coverage lives in the crate's
    /// integration suite, gated behind a `DATABASE_URL` env var.
    #[test]
    fn migration_sql_is_idempotent_looking() {
        assert!(MIGRATION_SQL.contains("CREATE TABLE IF NOT EXISTS jobs"));
        assert!(MIGRATION_SQL.contains("CREATE UNIQUE INDEX IF NOT EXISTS jobs_dedup_idx"));
    }
}
