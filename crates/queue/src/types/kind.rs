use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The fixed set of job kinds the pipeline dispatches. Closed on purpose:
/// this queue is the backbone of one pipeline, not a general workflow engine,
/// so new stages get a new variant here rather than a string the backend
/// can't validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    FeedFetch,
    ContentProcess,
    TranscribeAudio,
    DailyAnalysis,
    GeneratePredictions,
    PredictionCompare,
    WorkerHeartbeat,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FeedFetch => "feed_fetch",
            Self::ContentProcess => "content_process",
            Self::TranscribeAudio => "transcribe_audio",
            Self::DailyAnalysis => "daily_analysis",
            Self::GeneratePredictions => "generate_predictions",
            Self::PredictionCompare => "prediction_compare",
            Self::WorkerHeartbeat => "worker_heartbeat",
        }
    }

    pub fn all() -> &'static [JobKind] {
        &[
            Self::FeedFetch,
            Self::ContentProcess,
            Self::TranscribeAudio,
            Self::DailyAnalysis,
            Self::GeneratePredictions,
            Self::PredictionCompare,
            Self::WorkerHeartbeat,
        ]
    }

    /// The JSON pointer-ish field name used to derive this kind's dedup key
    /// from its payload, per the enqueue-time deduplication table. `None`
    /// means this kind is never deduplicated.
    pub fn dedup_field(&self) -> Option<&'static str> {
        match self {
            Self::FeedFetch => Some("source_ref"),
            Self::ContentProcess => Some("raw_ref"),
            Self::DailyAnalysis => Some("date"),
            Self::GeneratePredictions => Some("analysis_ref"),
            Self::PredictionCompare => Some("prediction_ref"),
            Self::TranscribeAudio => Some("raw_ref"),
            Self::WorkerHeartbeat => None,
        }
    }

    /// Per-job execution deadline. Most jobs get the default 10 minutes;
    /// audio transcription is long-running and gets 30.
    pub fn default_deadline(&self) -> std::time::Duration {
        match self {
            Self::TranscribeAudio => std::time::Duration::from_secs(30 * 60),
            _ => std::time::Duration::from_secs(10 * 60),
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "feed_fetch" => Ok(Self::FeedFetch),
            "content_process" => Ok(Self::ContentProcess),
            "transcribe_audio" => Ok(Self::TranscribeAudio),
            "daily_analysis" => Ok(Self::DailyAnalysis),
            "generate_predictions" => Ok(Self::GeneratePredictions),
            "prediction_compare" => Ok(Self::PredictionCompare),
            "worker_heartbeat" => Ok(Self::WorkerHeartbeat),
            other => Err(format!("unknown job kind: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_str() {
        for kind in JobKind::all() {
            assert_eq!(JobKind::from_str(kind.as_str()).unwrap(), *kind);
        }
    }

    #[test]
    fn dedup_fields_match_spec_table() {
        assert_eq!(JobKind::FeedFetch.dedup_field(), Some("source_ref"));
        assert_eq!(JobKind::ContentProcess.dedup_field(), Some("raw_ref"));
        assert_eq!(JobKind::DailyAnalysis.dedup_field(), Some("date"));
        assert_eq!(JobKind::GeneratePredictions.dedup_field(), Some("analysis_ref"));
        assert_eq!(JobKind::PredictionCompare.dedup_field(), Some("prediction_ref"));
        assert_eq!(JobKind::TranscribeAudio.dedup_field(), Some("raw_ref"));
        assert_eq!(JobKind::WorkerHeartbeat.dedup_field(), None);
    }
}
