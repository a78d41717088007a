//! Payload shapes carried in a `JobMessage`'s `payload_bytes`, one per
//! `JobKind`. Plain structs serialized through `JsonCodec`'s identity
//! pass-through (`codec: "json"`), so building a job here is just
//! `serde_json::to_vec` plus the handful of `JobMessage` builder calls.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pipeline_queue::{JobKind, JobMessage, Priority};

/// Same queue name `CodecRegistry::encode_job` hardcodes for jobs
/// enqueued through `QueueAdapter::enqueue`, so a worker pool started on
/// `["default"]` picks up both kinds of enqueue.
pub const QUEUE_NAME: &str = "default";
pub const CODEC_JSON: &str = "json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedFetchPayload {
    pub source_ref: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentProcessPayload {
    pub raw_ref: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscribeAudioPayload {
    pub raw_ref: Uuid,
    pub audio_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyAnalysisPayload {
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratePredictionsPayload {
    pub analysis_ref: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionComparePayload {
    pub prediction_ref: Uuid,
    pub analysis_ref: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHeartbeatPayload {
    pub worker_id: String,
}

/// Builds a `JobMessage` for `kind` carrying `payload`, applying `kind`'s
/// own dedup field as the idempotency key when `dedup_key` is given. Used
/// by the freshness trigger, which (unlike a handler enqueuing a normal
/// handoff through `QueueAdapter::enqueue`) needs to set priority by hand
/// to reflect how overdue the check is.
pub fn build_message<T: Serialize>(
    kind: JobKind,
    payload: &T,
    dedup_key: Option<String>,
    priority: Priority,
    run_at: Option<DateTime<Utc>>,
) -> serde_json::Result<JobMessage> {
    let bytes = serde_json::to_vec(payload)?;
    let mut message = JobMessage::new(kind.as_str().to_string(), bytes, CODEC_JSON.to_string(), QUEUE_NAME.to_string())
        .with_priority(priority)
        .with_run_at(run_at.unwrap_or_else(Utc::now));

    if let Some(key) = dedup_key {
        message = message.with_idempotency_key(key);
    }

    Ok(message)
}
