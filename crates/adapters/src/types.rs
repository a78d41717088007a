use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One candidate item yielded by an adapter before it's checked against
/// `validate` and persisted as a RawItem. Carries everything
/// `raw_items` needs except `id`/`source_ref`/`processing_status`,
/// which the handler fills in at insert time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedItem {
    pub external_id: String,
    pub title: String,
    pub description: Option<String>,
    pub body: String,
    pub published_at: DateTime<Utc>,
    pub metadata: Value,
}

impl FetchedItem {
    /// Minimum-content check: a title and either a body or description.
    /// Shared by every adapter's `validate`.
    pub fn has_minimum_content(&self) -> bool {
        !self.external_id.trim().is_empty()
            && !self.title.trim().is_empty()
            && (!self.body.trim().is_empty() || self.description.as_deref().unwrap_or("").trim().len() > 0)
    }

    pub fn is_aggregated(&self) -> bool {
        self.metadata
            .get("is_aggregated")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Common options every source kind's `config` column accepts, per
/// spec.md §6.2.
#[derive(Debug, Clone, Default)]
pub struct CommonSourceConfig {
    pub filter_keywords: Vec<String>,
    pub exclude_keywords: Vec<String>,
    pub max_items: Option<usize>,
}

impl CommonSourceConfig {
    pub fn from_config(config: &Value) -> Self {
        Self {
            filter_keywords: string_array(config, "filter_keywords"),
            exclude_keywords: string_array(config, "exclude_keywords"),
            max_items: config.get("max_items").and_then(Value::as_u64).map(|n| n as usize),
        }
    }

    /// Keyword include/exclude filter applied to a candidate item's
    /// title + body before it's returned from `fetch_latest`.
    pub fn passes_keyword_filters(&self, item: &FetchedItem) -> bool {
        let haystack = format!("{} {}", item.title, item.body).to_lowercase();

        if !self.filter_keywords.is_empty()
            && !self.filter_keywords.iter().any(|kw| haystack.contains(&kw.to_lowercase()))
        {
            return false;
        }

        if self.exclude_keywords.iter().any(|kw| haystack.contains(&kw.to_lowercase())) {
            return false;
        }

        true
    }
}

pub fn string_array(config: &Value, key: &str) -> Vec<String> {
    config
        .get(key)
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

/// Maps `update_frequency` to the fetch-cache TTL, per spec.md §6.2.
pub fn update_frequency_ttl(update_frequency: Option<&str>) -> Duration {
    match update_frequency {
        Some("realtime") => Duration::from_secs(5 * 60),
        Some("hourly") => Duration::from_secs(60 * 60),
        Some("weekly") => Duration::from_secs(7 * 24 * 60 * 60),
        _ => Duration::from_secs(24 * 60 * 60),
    }
}
