//! Audio feeds (podcasts): parse via `feed-rs`, extract the enclosure
//! audio URL, and apply duration filters, per spec.md §4.4's "Audio"
//! bullet. When `extract_transcript` is set and the feed carries no
//! usable body text, items are flagged in metadata so the
//! `feed_fetch` handler can enqueue a follow-up `transcribe_audio` job
//! — this adapter never calls the transcription capability itself, it
//! only decides whether a transcript is worth asking for.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use pipeline_store::models::Source;

use crate::error::{AdapterError, AdapterResult};
use crate::types::{CommonSourceConfig, FetchedItem};
use crate::{FetchContext, SourceAdapter};

const DEFAULT_MIN_DURATION_SECS: i64 = 60;
const DEFAULT_MAX_DURATION_SECS: i64 = 7200;

pub struct AudioAdapter;

impl AudioAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AudioAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for AudioAdapter {
    async fn fetch_latest(&self, source: &Source, ctx: &FetchContext) -> AdapterResult<Vec<FetchedItem>> {
        let cache_key = format!("audio:{}", source.id);
        if let Some(cached) = ctx.cache.get(&cache_key).await {
            return Ok((*cached).clone());
        }

        let common = CommonSourceConfig::from_config(&source.config);
        let extract_transcript = source.config.get("extract_transcript").and_then(|v| v.as_bool()).unwrap_or(false);
        let min_duration = source
            .config
            .get("min_duration")
            .and_then(|v| v.as_i64())
            .unwrap_or(DEFAULT_MIN_DURATION_SECS);
        let max_duration = source
            .config
            .get("max_duration")
            .and_then(|v| v.as_i64())
            .unwrap_or(DEFAULT_MAX_DURATION_SECS);

        let response = ctx
            .http
            .get(&source.url)
            .send()
            .await
            .map_err(|e| AdapterError::Network(format!("feed fetch failed: {e}")))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED || response.status() == reqwest::StatusCode::FORBIDDEN {
            return Err(AdapterError::Auth(format!("feed returned {}", response.status())));
        }
        if !response.status().is_success() {
            return Err(AdapterError::Network(format!("feed returned {}", response.status())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AdapterError::Network(format!("feed body read failed: {e}")))?;

        let feed = feed_rs::parser::parse(bytes.as_ref())
            .map_err(|e| AdapterError::Parse(format!("feed parse failed: {e}")))?;

        let mut items = Vec::new();
        for entry in feed.entries {
            let published_at = entry.published.or(entry.updated).unwrap_or_else(Utc::now);

            if let Some(watermark) = source.last_fetched_at {
                if published_at <= watermark {
                    continue;
                }
            }

            let audio_url = entry
                .media
                .iter()
                .flat_map(|m| m.content.iter())
                .find(|c| c.content_type.as_ref().map(|t| t.to_string().starts_with("audio")).unwrap_or(true))
                .and_then(|c| c.url.as_ref())
                .map(|u| u.to_string());

            let Some(audio_url) = audio_url else {
                continue;
            };

            let duration_secs = entry
                .media
                .iter()
                .flat_map(|m| m.content.iter())
                .find_map(|c| c.duration.map(|d| d.as_secs() as i64));

            if let Some(duration) = duration_secs {
                if duration < min_duration || duration > max_duration {
                    continue;
                }
            }

            let title = entry.title.map(|t| t.content).unwrap_or_default();
            let description = entry.summary.map(|t| t.content);
            let body = entry.content.and_then(|c| c.body).unwrap_or_default();

            let needs_transcript = extract_transcript && body.trim().is_empty();

            let item = FetchedItem {
                external_id: entry.id,
                title,
                description,
                body,
                published_at,
                metadata: json!({
                    "audio_url": audio_url,
                    "duration_secs": duration_secs,
                    "needs_transcript": needs_transcript,
                }),
            };

            if common.passes_keyword_filters(&item) {
                items.push(item);
            }
        }

        items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        if let Some(max_items) = common.max_items {
            items.truncate(max_items);
        }

        ctx.cache
            .set_with_tags(cache_key, Arc::new(items.clone()), &[format!("source:{}", source.id)])
            .await;

        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_need_for_transcript_when_body_empty_and_requested() {
        let item = FetchedItem {
            external_id: "ep-1".to_string(),
            title: "Episode 1".to_string(),
            description: Some("desc".to_string()),
            body: String::new(),
            published_at: Utc::now(),
            metadata: json!({ "needs_transcript": true }),
        };
        assert!(item.metadata.get("needs_transcript").unwrap().as_bool().unwrap());
    }
}
