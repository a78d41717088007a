//! C11: the transcription capability used by the Audio adapter and the
//! `transcribe_audio` handler. A capability boundary like `pipeline-llm`'s
//! `LlmClient` — one trait, a real implementation, and a stub that makes
//! the absence of a configured backend an explicit, handled state rather
//! than a missing feature.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AdapterError, AdapterResult};

#[async_trait]
pub trait TranscriptionService: Send + Sync {
    /// Transcribe the audio at `audio_url` to text. Out-of-process
    /// tolerated: the handler awaits this under the job's own 30-minute
    /// deadline, not a tighter one imposed here.
    async fn transcribe(&self, audio_url: &str) -> AdapterResult<String>;
}

#[derive(Debug, Serialize)]
struct TranscriptionRequest<'a> {
    audio_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Calls an external transcription API (whisper-like or vendor-hosted)
/// over HTTP. `source.config.transcript_source` only selects *that* a
/// backend is used; the endpoint itself is deployment configuration, so
/// it comes from `TRANSCRIPTION_API_URL`/`TRANSCRIPTION_API_KEY`.
pub struct ExternalApiTranscription {
    http: Client,
    api_url: String,
    api_key: String,
}

impl ExternalApiTranscription {
    pub fn new(api_url: String, api_key: String) -> AdapterResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(25 * 60))
            .build()
            .map_err(|e| AdapterError::Network(format!("failed to build http client: {e}")))?;

        Ok(Self { http, api_url, api_key })
    }
}

#[async_trait]
impl TranscriptionService for ExternalApiTranscription {
    async fn transcribe(&self, audio_url: &str) -> AdapterResult<String> {
        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&TranscriptionRequest { audio_url })
            .send()
            .await
            .map_err(|e| AdapterError::Network(format!("transcription request failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AdapterError::Auth(format!("transcription api rejected credentials: {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Network(format!("transcription api returned {status}: {body}")));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::Parse(format!("unparseable transcription response: {e}")))?;

        Ok(parsed.text)
    }
}

/// Used when no transcription backend is configured. The Audio adapter
/// still enqueues `transcribe_audio` per spec (it never blocks the
/// fetch on transcription); this stub just means that job will always
/// come back empty rather than hang waiting on a vendor that isn't there.
pub struct NoopTranscription;

#[async_trait]
impl TranscriptionService for NoopTranscription {
    async fn transcribe(&self, _audio_url: &str) -> AdapterResult<String> {
        Ok(String::new())
    }
}

pub fn build_transcription_service(config: &pipeline_core::Config) -> std::sync::Arc<dyn TranscriptionService> {
    if config.has_transcription() {
        let url = config.transcription_api_url.clone().unwrap_or_default();
        let key = config.transcription_api_key.clone().unwrap_or_default();
        match ExternalApiTranscription::new(url, key) {
            Ok(service) => return std::sync::Arc::new(service),
            Err(e) => tracing::warn!(error = %e, "failed to build transcription client, using no-op stub"),
        }
    }
    std::sync::Arc::new(NoopTranscription)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_transcription_returns_empty_string() {
        let service = NoopTranscription;
        assert_eq!(service.transcribe("https://example.com/ep.mp3").await.unwrap(), "");
    }
}
