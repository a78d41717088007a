//! Aggregate sources: fan out to a set of sub-sources in parallel,
//! tag each yielded item with its originating kind and weight,
//! deduplicate near-identical items published close together, and
//! cluster the remainder into synthetic multi-source items, per
//! spec.md §4.4's "Aggregate" bullet.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::Value;
use uuid::Uuid;

use pipeline_store::models::{Source, SourceKind};

use crate::error::AdapterResult;
use crate::types::FetchedItem;
use crate::{build_adapter, FetchContext, SourceAdapter};

/// Two items within this window are candidates for title-similarity
/// dedup; beyond it they're treated as independent even if similar.
const DEDUP_WINDOW: chrono::Duration = chrono::Duration::hours(1);
const DEDUP_SIMILARITY_THRESHOLD: f64 = 0.85;
const MIN_CLUSTER_SIZE: usize = 2;

#[derive(Debug, Clone)]
struct SubSourceConfig {
    kind: SourceKind,
    url: String,
    weight: f64,
    config: Value,
}

impl SubSourceConfig {
    fn from_value(value: &Value) -> Option<Self> {
        let kind = match value.get("kind").and_then(Value::as_str)? {
            "syndicated" => SourceKind::Syndicated,
            "audio" => SourceKind::Audio,
            "video" => SourceKind::Video,
            "generic-endpoint" => SourceKind::GenericEndpoint,
            _ => return None,
        };
        let url = value.get("url").and_then(Value::as_str)?.to_string();
        let weight = value.get("weight").and_then(Value::as_f64).unwrap_or(1.0);
        let config = value.get("config").cloned().unwrap_or(Value::Null);

        Some(Self { kind, url, weight, config })
    }
}

pub struct AggregateAdapter;

impl AggregateAdapter {
    pub fn new() -> Self {
        Self
    }

    fn title_similarity(a: &str, b: &str) -> f64 {
        let a = a.to_lowercase();
        let b = b.to_lowercase();
        strsim::normalized_levenshtein(&a, &b)
    }

    /// Drops items that are near-duplicates of an already-kept item
    /// published within `DEDUP_WINDOW`. Among a duplicate pair, the
    /// higher-weight source wins; ties go to the longer body.
    fn dedup(mut items: Vec<FetchedItem>) -> Vec<FetchedItem> {
        items.sort_by(|a, b| {
            let weight_a = a.metadata.get("weight").and_then(Value::as_f64).unwrap_or(1.0);
            let weight_b = b.metadata.get("weight").and_then(Value::as_f64).unwrap_or(1.0);
            weight_b
                .partial_cmp(&weight_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.body.len().cmp(&a.body.len()))
        });

        let mut kept: Vec<FetchedItem> = Vec::new();
        'outer: for item in items {
            for existing in &kept {
                let close_in_time = (item.published_at - existing.published_at).abs() <= DEDUP_WINDOW;
                if close_in_time && Self::title_similarity(&item.title, &existing.title) >= DEDUP_SIMILARITY_THRESHOLD {
                    continue 'outer;
                }
            }
            kept.push(item);
        }
        kept
    }

    /// Extracts lowercase candidate key terms from a title: words
    /// longer than 3 characters, plus any entity-like names already
    /// present in metadata.
    fn key_terms(item: &FetchedItem) -> Vec<String> {
        let mut terms: Vec<String> = item
            .title
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|w| w.len() > 3)
            .collect();

        if let Some(entities) = item.metadata.get("entities").and_then(Value::as_array) {
            for entity in entities {
                if let Some(name) = entity.as_str() {
                    terms.push(name.to_lowercase());
                }
            }
        }

        terms
    }

    /// Groups items sharing at least one key term into synthetic
    /// aggregated items, for clusters of size >= `MIN_CLUSTER_SIZE`.
    /// Items that don't cluster with anything pass through unchanged.
    fn cluster(items: Vec<FetchedItem>) -> Vec<FetchedItem> {
        let mut remaining: Vec<(FetchedItem, Vec<String>)> =
            items.into_iter().map(|item| { let terms = Self::key_terms(&item); (item, terms) }).collect();

        let mut output = Vec::new();
        while let Some((seed, seed_terms)) = remaining.pop() {
            if seed_terms.is_empty() {
                output.push(seed);
                continue;
            }

            let mut cluster_members = vec![seed];
            let mut i = 0;
            while i < remaining.len() {
                let shares_term = remaining[i].1.iter().any(|t| seed_terms.contains(t));
                if shares_term {
                    let (member, _) = remaining.remove(i);
                    cluster_members.push(member);
                } else {
                    i += 1;
                }
            }

            if cluster_members.len() >= MIN_CLUSTER_SIZE {
                output.push(Self::synthesize_cluster(cluster_members));
            } else {
                output.extend(cluster_members);
            }
        }

        output
    }

    fn synthesize_cluster(members: Vec<FetchedItem>) -> FetchedItem {
        let newest = members.iter().map(|m| m.published_at).max().unwrap_or_else(Utc::now);
        let title = members.first().map(|m| m.title.clone()).unwrap_or_default();
        let body = members
            .iter()
            .map(|m| format!("[{}] {}", m.metadata.get("source_kind").and_then(Value::as_str).unwrap_or("unknown"), m.body))
            .collect::<Vec<_>>()
            .join("\n\n");
        let sources: Vec<Value> = members
            .iter()
            .map(|m| {
                serde_json::json!({
                    "external_id": m.external_id,
                    "source_kind": m.metadata.get("source_kind"),
                    "weight": m.metadata.get("weight").and_then(Value::as_f64).unwrap_or(1.0),
                    "title": m.title,
                })
            })
            .collect();

        FetchedItem {
            external_id: format!("cluster-{}", Uuid::new_v4()),
            title,
            description: members.first().and_then(|m| m.description.clone()),
            body,
            published_at: newest,
            metadata: serde_json::json!({
                "is_aggregated": true,
                "cluster_size": members.len(),
                "cluster_sources": sources,
            }),
        }
    }

    fn sub_source(parent: &Source, sub: &SubSourceConfig) -> Source {
        Source {
            id: parent.id,
            name: format!("{}:{}", parent.name, sub.kind.as_str()),
            kind: sub.kind,
            url: sub.url.clone(),
            active: true,
            config: sub.config.clone(),
            last_fetched_at: parent.last_fetched_at,
            created_at: parent.created_at,
            updated_at: parent.updated_at,
        }
    }
}

impl Default for AggregateAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for AggregateAdapter {
    async fn fetch_latest(&self, source: &Source, ctx: &FetchContext) -> AdapterResult<Vec<FetchedItem>> {
        let sub_sources: Vec<SubSourceConfig> = source
            .config
            .get("sub_sources")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(SubSourceConfig::from_value).collect())
            .unwrap_or_default();

        if sub_sources.is_empty() {
            return Ok(Vec::new());
        }

        let fetches = sub_sources.iter().map(|sub| {
            let sub_source = Self::sub_source(source, sub);
            let weight = sub.weight;
            let kind = sub.kind;
            async move {
                let adapter = match build_adapter(kind) {
                    Ok(adapter) => adapter,
                    Err(e) => {
                        tracing::warn!(error = %e, kind = kind.as_str(), "skipping aggregate sub-source, no adapter");
                        return Vec::new();
                    }
                };

                match adapter.fetch_latest(&sub_source, ctx).await {
                    Ok(items) => items
                        .into_iter()
                        .map(|mut item| {
                            if let Value::Object(map) = &mut item.metadata {
                                map.insert("source_kind".to_string(), Value::String(kind.as_str().to_string()));
                                map.insert("weight".to_string(), serde_json::json!(weight));
                            }
                            item
                        })
                        .collect(),
                    Err(e) => {
                        tracing::warn!(error = %e, kind = kind.as_str(), "aggregate sub-source fetch failed");
                        Vec::new()
                    }
                }
            }
        });

        let fetched: Vec<Vec<FetchedItem>> = join_all(fetches).await;
        let all_items: Vec<FetchedItem> = fetched.into_iter().flatten().collect();

        let deduped = Self::dedup(all_items);
        let clustered = Self::cluster(deduped);

        let mut items = clustered;
        items.sort_by(|a, b| b.published_at.cmp(&a.published_at));

        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str, body: &str, published_at: DateTime<Utc>, kind: &str, weight: f64) -> FetchedItem {
        FetchedItem {
            external_id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            description: None,
            body: body.to_string(),
            published_at,
            metadata: serde_json::json!({ "source_kind": kind, "weight": weight }),
        }
    }

    #[test]
    fn dedup_keeps_higher_weight_duplicate() {
        let now = Utc::now();
        let low = item("Fed raises rates again", "short", now, "syndicated", 1.0);
        let high = item("Fed raises rates again today", "a much longer and more detailed body", now, "generic-endpoint", 2.0);
        let kept = AggregateAdapter::dedup(vec![low, high.clone()]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].metadata.get("weight").unwrap().as_f64().unwrap(), 2.0);
    }

    #[test]
    fn dedup_keeps_distinct_items() {
        let now = Utc::now();
        let a = item("Fed raises rates", "body a", now, "syndicated", 1.0);
        let b = item("Completely unrelated headline", "body b", now, "syndicated", 1.0);
        assert_eq!(AggregateAdapter::dedup(vec![a, b]).len(), 2);
    }

    #[test]
    fn cluster_groups_shared_key_terms() {
        let now = Utc::now();
        let a = item("Earnings beat expectations", "body", now, "syndicated", 1.0);
        let b = item("Earnings miss forecasts", "body", now, "generic-endpoint", 1.0);
        let clustered = AggregateAdapter::cluster(vec![a, b]);
        assert_eq!(clustered.len(), 1);
        assert!(clustered[0].metadata.get("is_aggregated").unwrap().as_bool().unwrap());
    }

    #[test]
    fn cluster_leaves_singletons_unchanged() {
        let now = Utc::now();
        let a = item("Totally unique headline", "body", now, "syndicated", 1.0);
        let clustered = AggregateAdapter::cluster(vec![a]);
        assert_eq!(clustered.len(), 1);
        assert!(!clustered[0].is_aggregated());
    }
}
