//! Process-local cache for the content pipeline: short TTL, tag-based
//! invalidation, never the source of truth. Every caller treats a miss
//! as "go to the Store or the adapter" — this crate exists purely to
//! absorb repeat reads within a single worker process, not to replace
//! persistence.
//!
//! Not shared across processes: a multi-worker deployment sees one cache
//! per process, so invalidating a tag on one worker has no effect on
//! the others. That's acceptable because nothing here is authoritative.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use moka::future::Cache as MokaCache;
use tracing::debug;

/// Default entry lifetime, matching the adapter fetch cache window.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

/// A short-TTL cache over `String` keys with tag-based bulk invalidation.
///
/// `V` is cloned out on every `get`, so callers should wrap anything
/// expensive to clone in an `Arc` before storing it.
pub struct Cache<V: Clone + Send + Sync + 'static> {
    entries: MokaCache<String, V>,
    tag_to_keys: Arc<DashMap<String, HashSet<String>>>,
    key_to_tags: Arc<DashMap<String, HashSet<String>>>,
}

impl<V: Clone + Send + Sync + 'static> Cache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: MokaCache::builder().time_to_live(ttl).build(),
            tag_to_keys: Arc::new(DashMap::new()),
            key_to_tags: Arc::new(DashMap::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        self.entries.get(key).await
    }

    /// Insert with no tags; only removable by TTL expiry or direct key
    /// invalidation.
    pub async fn set(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        self.entries.insert(key, value).await;
    }

    /// Insert tagged under each of `tags`, so a later `invalidate_tag`
    /// call drops this entry along with everything else sharing the tag.
    pub async fn set_with_tags(&self, key: impl Into<String>, value: V, tags: &[String]) {
        let key = key.into();
        self.entries.insert(key.clone(), value).await;

        if tags.is_empty() {
            return;
        }

        self.key_to_tags
            .entry(key.clone())
            .or_default()
            .extend(tags.iter().cloned());

        for tag in tags {
            self.tag_to_keys.entry(tag.clone()).or_default().insert(key.clone());
        }
    }

    pub async fn invalidate(&self, key: &str) {
        self.entries.invalidate(key).await;
        self.forget_key_tags(key);
    }

    /// Invalidate every entry tagged `tag`, e.g. `source:<id>` when that
    /// source's config changes.
    pub async fn invalidate_tag(&self, tag: &str) {
        let Some((_, keys)) = self.tag_to_keys.remove(tag) else {
            return;
        };

        debug!(tag, count = keys.len(), "invalidating cache entries by tag");

        for key in keys {
            self.entries.invalidate(&key).await;
            self.forget_key_tags(&key);
        }
    }

    fn forget_key_tags(&self, key: &str) {
        if let Some((_, tags)) = self.key_to_tags.remove(key) {
            for tag in tags {
                if let Some(mut keys) = self.tag_to_keys.get_mut(&tag) {
                    keys.remove(key);
                }
            }
        }
    }

    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }
}

impl<V: Clone + Send + Sync + 'static> Default for Cache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_after_set_returns_value() {
        let cache: Cache<String> = Cache::default();
        cache.set("k1", "v1".to_string()).await;
        assert_eq!(cache.get("k1").await, Some("v1".to_string()));
    }

    #[tokio::test]
    async fn miss_returns_none() {
        let cache: Cache<String> = Cache::default();
        assert_eq!(cache.get("missing").await, None);
    }

    #[tokio::test]
    async fn invalidate_tag_drops_all_tagged_entries() {
        let cache: Cache<i32> = Cache::default();
        cache
            .set_with_tags("a", 1, &["source:1".to_string()])
            .await;
        cache
            .set_with_tags("b", 2, &["source:1".to_string(), "source:2".to_string()])
            .await;
        cache.set_with_tags("c", 3, &["source:2".to_string()]).await;

        cache.invalidate_tag("source:1").await;

        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.get("b").await, None);
        assert_eq!(cache.get("c").await, Some(3));
    }

    #[tokio::test]
    async fn invalidating_one_tag_leaves_other_tags_keys_intact() {
        let cache: Cache<i32> = Cache::default();
        cache.set_with_tags("a", 1, &["source:1".to_string()]).await;
        cache.invalidate_tag("source:2").await;
        assert_eq!(cache.get("a").await, Some(1));
    }

    #[tokio::test]
    async fn direct_invalidate_removes_single_key_and_its_tag_membership() {
        let cache: Cache<i32> = Cache::default();
        cache
            .set_with_tags("a", 1, &["source:1".to_string()])
            .await;
        cache.invalidate("a").await;
        assert_eq!(cache.get("a").await, None);

        cache.set_with_tags("b", 2, &["source:1".to_string()]).await;
        cache.invalidate_tag("source:1").await;
        assert_eq!(cache.get("b").await, None);
    }

    #[tokio::test]
    async fn short_ttl_expires_entries() {
        let cache: Cache<i32> = Cache::new(Duration::from_millis(20));
        cache.set("k", 1).await;
        assert_eq!(cache.get("k").await, Some(1));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.get("k").await, None);
    }
}
