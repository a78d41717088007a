//! Video channels (e.g. YouTube-style): requires an API key, resolves
//! the channel to its uploads listing, fetches recent videos, and
//! applies duration/view-count/sort filters, per spec.md §4.4's
//! "Video" bullet. Unlike the other kinds this one can't degrade to a
//! best-effort stub — without a key there is no channel to resolve —
//! so a missing key is a terminal `Config` error rather than an empty
//! result.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use pipeline_store::models::Source;

use crate::error::{AdapterError, AdapterResult};
use crate::types::{CommonSourceConfig, FetchedItem};
use crate::{FetchContext, SourceAdapter};

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

#[derive(Debug, Deserialize)]
struct ChannelListResponse {
    items: Vec<ChannelResource>,
}

#[derive(Debug, Deserialize)]
struct ChannelResource {
    #[serde(rename = "contentDetails")]
    content_details: ChannelContentDetails,
}

#[derive(Debug, Deserialize)]
struct ChannelContentDetails {
    #[serde(rename = "relatedPlaylists")]
    related_playlists: RelatedPlaylists,
}

#[derive(Debug, Deserialize)]
struct RelatedPlaylists {
    uploads: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistItemsResponse {
    items: Vec<PlaylistItem>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    snippet: PlaylistItemSnippet,
}

#[derive(Debug, Deserialize)]
struct PlaylistItemSnippet {
    title: String,
    description: String,
    #[serde(rename = "publishedAt")]
    published_at: DateTime<Utc>,
    #[serde(rename = "resourceId")]
    resource_id: ResourceId,
    tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ResourceId {
    #[serde(rename = "videoId")]
    video_id: String,
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    items: Vec<VideoResource>,
}

#[derive(Debug, Deserialize)]
struct VideoResource {
    id: String,
    #[serde(rename = "contentDetails")]
    content_details: VideoContentDetails,
    statistics: Option<VideoStatistics>,
}

#[derive(Debug, Deserialize)]
struct VideoContentDetails {
    duration: String,
}

#[derive(Debug, Deserialize)]
struct VideoStatistics {
    #[serde(rename = "viewCount")]
    view_count: Option<String>,
}

pub struct VideoAdapter;

impl VideoAdapter {
    pub fn new() -> Self {
        Self
    }

    fn resolve_api_key(source: &Source) -> AdapterResult<String> {
        source
            .config
            .get("api_key")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| std::env::var("VIDEO_API_KEY").ok())
            .ok_or_else(|| AdapterError::Config("video source requires an api_key (source config or VIDEO_API_KEY)".to_string()))
    }

    /// Parses an ISO-8601 duration like `PT1H2M3S` into seconds. YouTube's
    /// `contentDetails.duration` is always this shape.
    fn parse_iso8601_duration(raw: &str) -> Option<i64> {
        let rest = raw.strip_prefix("PT")?;
        let mut total = 0i64;
        let mut number = String::new();
        for ch in rest.chars() {
            match ch {
                '0'..='9' => number.push(ch),
                'H' => {
                    total += number.parse::<i64>().ok()? * 3600;
                    number.clear();
                }
                'M' => {
                    total += number.parse::<i64>().ok()? * 60;
                    number.clear();
                }
                'S' => {
                    total += number.parse::<i64>().ok()?;
                    number.clear();
                }
                _ => return None,
            }
        }
        Some(total)
    }
}

impl Default for VideoAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for VideoAdapter {
    async fn fetch_latest(&self, source: &Source, ctx: &FetchContext) -> AdapterResult<Vec<FetchedItem>> {
        let cache_key = format!("video:{}", source.id);
        if let Some(cached) = ctx.cache.get(&cache_key).await {
            return Ok((*cached).clone());
        }

        let api_key = Self::resolve_api_key(source)?;
        let common = CommonSourceConfig::from_config(&source.config);
        let min_views = source.config.get("min_views").and_then(|v| v.as_u64());
        let channel_id = source
            .config
            .get("channel_id")
            .and_then(|v| v.as_str())
            .unwrap_or(&source.url);

        let channel_response: ChannelListResponse = ctx
            .http
            .get(format!("{API_BASE}/channels"))
            .query(&[("part", "contentDetails"), ("id", channel_id), ("key", &api_key)])
            .send()
            .await
            .map_err(|e| AdapterError::Network(format!("channel lookup failed: {e}")))?
            .error_for_status()
            .map_err(|e| Self::map_status_error(e))?
            .json()
            .await
            .map_err(|e| AdapterError::Parse(format!("unparseable channel response: {e}")))?;

        let uploads_playlist = channel_response
            .items
            .into_iter()
            .next()
            .map(|c| c.content_details.related_playlists.uploads)
            .ok_or_else(|| AdapterError::Config(format!("no channel found for {channel_id}")))?;

        let playlist_response: PlaylistItemsResponse = ctx
            .http
            .get(format!("{API_BASE}/playlistItems"))
            .query(&[
                ("part", "snippet"),
                ("playlistId", uploads_playlist.as_str()),
                ("maxResults", "25"),
                ("key", api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AdapterError::Network(format!("playlist fetch failed: {e}")))?
            .error_for_status()
            .map_err(Self::map_status_error)?
            .json()
            .await
            .map_err(|e| AdapterError::Parse(format!("unparseable playlist response: {e}")))?;

        let video_ids: Vec<String> = playlist_response
            .items
            .iter()
            .map(|i| i.snippet.resource_id.video_id.clone())
            .collect();

        if video_ids.is_empty() {
            return Ok(Vec::new());
        }

        let video_response: VideoListResponse = ctx
            .http
            .get(format!("{API_BASE}/videos"))
            .query(&[
                ("part", "contentDetails,statistics"),
                ("id", video_ids.join(",").as_str()),
                ("key", api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AdapterError::Network(format!("video details fetch failed: {e}")))?
            .error_for_status()
            .map_err(Self::map_status_error)?
            .json()
            .await
            .map_err(|e| AdapterError::Parse(format!("unparseable video response: {e}")))?;

        let details: std::collections::HashMap<String, VideoResource> =
            video_response.items.into_iter().map(|v| (v.id.clone(), v)).collect();

        let mut items = Vec::new();
        for entry in playlist_response.items {
            let video_id = entry.snippet.resource_id.video_id.clone();

            if let Some(watermark) = source.last_fetched_at {
                if entry.snippet.published_at <= watermark {
                    continue;
                }
            }

            let detail = details.get(&video_id);
            let duration_secs = detail.and_then(|d| Self::parse_iso8601_duration(&d.content_details.duration));
            let view_count = detail
                .and_then(|d| d.statistics.as_ref())
                .and_then(|s| s.view_count.as_ref())
                .and_then(|v| v.parse::<u64>().ok());

            if let Some(min) = min_views {
                if view_count.unwrap_or(0) < min {
                    continue;
                }
            }

            let item = FetchedItem {
                external_id: video_id.clone(),
                title: entry.snippet.title,
                description: Some(entry.snippet.description),
                body: String::new(),
                published_at: entry.snippet.published_at,
                metadata: json!({
                    "video_url": format!("https://www.youtube.com/watch?v={video_id}"),
                    "duration_secs": duration_secs,
                    "view_count": view_count,
                    "tags": entry.snippet.tags,
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

impl VideoAdapter {
    fn map_status_error(e: reqwest::Error) -> AdapterError {
        match e.status() {
            Some(reqwest::StatusCode::UNAUTHORIZED) | Some(reqwest::StatusCode::FORBIDDEN) => {
                AdapterError::Auth(format!("video api rejected credentials: {e}"))
            }
            _ => AdapterError::Network(format!("video api request failed: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iso8601_duration() {
        assert_eq!(VideoAdapter::parse_iso8601_duration("PT1H2M3S"), Some(3723));
        assert_eq!(VideoAdapter::parse_iso8601_duration("PT45S"), Some(45));
        assert_eq!(VideoAdapter::parse_iso8601_duration("PT10M"), Some(600));
    }

    #[test]
    fn resolve_api_key_errors_when_absent() {
        let source = Source {
            id: uuid::Uuid::new_v4(),
            name: "test".to_string(),
            kind: pipeline_store::models::SourceKind::Video,
            url: "UCabc123".to_string(),
            active: true,
            config: json!({}),
            last_fetched_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        std::env::remove_var("VIDEO_API_KEY");
        assert!(VideoAdapter::resolve_api_key(&source).is_err());
    }
}
