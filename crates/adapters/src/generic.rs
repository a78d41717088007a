//! Generic HTTP endpoints: issue a request shaped by `source.config`
//! (method, headers, auth), walk pagination, and map each result
//! object onto a [`FetchedItem`] via a configurable field mapping, per
//! spec.md §4.4's "GenericEndpoint" bullet.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::Value;

use pipeline_store::models::Source;

use crate::error::{AdapterError, AdapterResult};
use crate::types::{CommonSourceConfig, FetchedItem};
use crate::{FetchContext, SourceAdapter};

const DEFAULT_MAX_PAGES: u32 = 10;

#[derive(Debug, Clone, Copy)]
enum Pagination {
    None,
    Offset,
    Page,
    Cursor,
}

impl Pagination {
    fn from_config(config: &Value) -> Self {
        match config.get("pagination").and_then(Value::as_str) {
            Some("offset") => Self::Offset,
            Some("page") => Self::Page,
            Some("cursor") => Self::Cursor,
            _ => Self::None,
        }
    }
}

struct FieldMapping {
    id: Vec<String>,
    title: Vec<String>,
    description: Vec<String>,
    body: Vec<String>,
    published_at: Vec<String>,
    url: Vec<String>,
    author: Vec<String>,
    tags: Vec<String>,
}

impl FieldMapping {
    fn from_config(config: &Value) -> Self {
        let mapping = config.get("mapping");
        let field = |key: &str, defaults: &[&str]| -> Vec<String> {
            mapping
                .and_then(|m| m.get(key))
                .and_then(Value::as_str)
                .map(|s| vec![s.to_string()])
                .unwrap_or_else(|| defaults.iter().map(|s| s.to_string()).collect())
        };

        Self {
            id: field("id", &["id", "uuid", "guid"]),
            title: field("title", &["title", "name", "headline"]),
            description: field("description", &["description", "summary", "excerpt"]),
            body: field("body", &["body", "content", "text"]),
            published_at: field("published_at", &["published_at", "publishedAt", "date", "created_at"]),
            url: field("url", &["url", "link", "permalink"]),
            author: field("author", &["author", "author_name", "byline"]),
            tags: field("tags", &["tags", "categories", "keywords"]),
        }
    }
}

fn lookup_str<'a>(obj: &'a Value, candidates: &[String]) -> Option<&'a str> {
    candidates.iter().find_map(|key| obj.get(key).and_then(Value::as_str))
}

/// Navigates a dotted path like `data.items` down through nested
/// objects to find the array of result records.
fn navigate_data_path<'a>(root: &'a Value, data_path: Option<&str>) -> Option<&'a Value> {
    let Some(path) = data_path else { return Some(root) };
    let mut current = root;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

pub struct GenericEndpointAdapter;

impl GenericEndpointAdapter {
    pub fn new() -> Self {
        Self
    }

    fn apply_auth(
        request: reqwest::RequestBuilder,
        auth: Option<&Value>,
    ) -> AdapterResult<reqwest::RequestBuilder> {
        let Some(auth) = auth else { return Ok(request) };
        let kind = auth.get("type").and_then(Value::as_str).unwrap_or("none");

        match kind {
            "bearer" => {
                let token = auth
                    .get("token")
                    .and_then(Value::as_str)
                    .ok_or_else(|| AdapterError::Config("bearer auth requires a token".to_string()))?;
                Ok(request.bearer_auth(token))
            }
            "basic" => {
                let username = auth
                    .get("username")
                    .and_then(Value::as_str)
                    .ok_or_else(|| AdapterError::Config("basic auth requires a username".to_string()))?;
                let password = auth.get("password").and_then(Value::as_str);
                Ok(request.basic_auth(username, password))
            }
            "apikey" => {
                let header = auth.get("header").and_then(Value::as_str).unwrap_or("X-API-Key");
                let key = auth
                    .get("key")
                    .and_then(Value::as_str)
                    .ok_or_else(|| AdapterError::Config("apikey auth requires a key".to_string()))?;
                Ok(request.header(header, key))
            }
            "oauth2" => {
                let token = auth
                    .get("access_token")
                    .and_then(Value::as_str)
                    .ok_or_else(|| AdapterError::Config("oauth2 auth requires a pre-fetched access_token".to_string()))?;
                Ok(request.bearer_auth(token))
            }
            "none" => Ok(request),
            other => Err(AdapterError::Config(format!("unsupported auth type: {other}"))),
        }
    }

    fn map_item(record: &Value, mapping: &FieldMapping) -> Option<FetchedItem> {
        let external_id = lookup_str(record, &mapping.id)?.to_string();
        let title = lookup_str(record, &mapping.title).unwrap_or_default().to_string();
        let description = lookup_str(record, &mapping.description).map(str::to_string);
        let body = lookup_str(record, &mapping.body).unwrap_or_default().to_string();
        let published_at = lookup_str(record, &mapping.published_at)
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Some(FetchedItem {
            external_id,
            title,
            description,
            body,
            published_at,
            metadata: serde_json::json!({
                "url": lookup_str(record, &mapping.url),
                "author": lookup_str(record, &mapping.author),
                "tags": record.get("tags").cloned().or_else(|| lookup_str(record, &mapping.tags).map(Value::from)),
            }),
        })
    }
}

impl Default for GenericEndpointAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for GenericEndpointAdapter {
    async fn fetch_latest(&self, source: &Source, ctx: &FetchContext) -> AdapterResult<Vec<FetchedItem>> {
        let cache_key = format!("generic:{}", source.id);
        if let Some(cached) = ctx.cache.get(&cache_key).await {
            return Ok((*cached).clone());
        }

        let common = CommonSourceConfig::from_config(&source.config);
        let mapping = FieldMapping::from_config(&source.config);
        let data_path = source.config.get("data_path").and_then(Value::as_str);
        let pagination = Pagination::from_config(&source.config);
        let max_pages = source
            .config
            .get("max_pages")
            .and_then(Value::as_u64)
            .map(|n| n as u32)
            .unwrap_or(DEFAULT_MAX_PAGES);
        let method = source
            .config
            .get("method")
            .and_then(Value::as_str)
            .and_then(|m| Method::from_bytes(m.as_bytes()).ok())
            .unwrap_or(Method::GET);
        let headers = source.config.get("headers").and_then(Value::as_object);
        let auth = source.config.get("auth");

        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        'pages: for page in 0..max_pages {
            let mut request = ctx.http.request(method.clone(), &source.url);

            if let Some(headers) = headers {
                for (key, value) in headers {
                    if let Some(value) = value.as_str() {
                        request = request.header(key, value);
                    }
                }
            }
            request = Self::apply_auth(request, auth)?;

            request = match pagination {
                Pagination::None => request,
                Pagination::Offset => request.query(&[("offset", (page * 25).to_string())]),
                Pagination::Page => request.query(&[("page", (page + 1).to_string())]),
                Pagination::Cursor => match &cursor {
                    Some(c) => request.query(&[("cursor", c.as_str())]),
                    None if page == 0 => request,
                    None => break 'pages,
                },
            };

            let response = request
                .send()
                .await
                .map_err(|e| AdapterError::Network(format!("endpoint request failed: {e}")))?;

            let status = response.status();
            if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
                return Err(AdapterError::Auth(format!("endpoint returned {status}")));
            }
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(AdapterError::RateLimited(format!("endpoint returned {status}")));
            }
            if !status.is_success() {
                return Err(AdapterError::Network(format!("endpoint returned {status}")));
            }

            let body: Value = response
                .json()
                .await
                .map_err(|e| AdapterError::Parse(format!("unparseable endpoint response: {e}")))?;

            let records = navigate_data_path(&body, data_path)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            if records.is_empty() {
                break;
            }

            for record in &records {
                let Some(item) = Self::map_item(record, &mapping) else { continue };

                if let Some(watermark) = source.last_fetched_at {
                    if item.published_at <= watermark {
                        continue;
                    }
                }

                if common.passes_keyword_filters(&item) {
                    items.push(item);
                }
            }

            cursor = body.get("next_cursor").and_then(Value::as_str).map(str::to_string);
            if matches!(pagination, Pagination::Cursor) && cursor.is_none() {
                break;
            }
            if matches!(pagination, Pagination::None) {
                break;
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
    fn navigate_data_path_walks_nested_objects() {
        let root = serde_json::json!({ "data": { "items": [1, 2, 3] } });
        let found = navigate_data_path(&root, Some("data.items")).unwrap();
        assert_eq!(found.as_array().unwrap().len(), 3);
    }

    #[test]
    fn navigate_data_path_none_returns_root() {
        let root = serde_json::json!([1, 2, 3]);
        assert_eq!(navigate_data_path(&root, None).unwrap(), &root);
    }

    #[test]
    fn map_item_uses_common_field_fallbacks() {
        let mapping = FieldMapping::from_config(&serde_json::json!({}));
        let record = serde_json::json!({
            "id": "abc",
            "title": "Hello",
            "body": "World",
            "published_at": "2026-01-01T00:00:00Z",
        });
        let item = GenericEndpointAdapter::map_item(&record, &mapping).unwrap();
        assert_eq!(item.external_id, "abc");
        assert_eq!(item.title, "Hello");
        assert_eq!(item.body, "World");
    }

    #[test]
    fn map_item_returns_none_without_id() {
        let mapping = FieldMapping::from_config(&serde_json::json!({}));
        let record = serde_json::json!({ "title": "Hello" });
        assert!(GenericEndpointAdapter::map_item(&record, &mapping).is_none());
    }
}
