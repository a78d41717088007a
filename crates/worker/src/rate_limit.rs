//! Token-bucket enforcement for `RateLimitDescriptor` (C10, spec.md
//! §4.2): one bucket per source, built lazily the first time that
//! source is fetched and reused after that. A job that can't get a
//! token waits in place — it is never re-enqueued and its attempt
//! count is never touched, since the job hasn't actually failed, it's
//! just not its turn yet.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use governor::{Quota, RateLimiter};
use uuid::Uuid;

use pipeline_adapters::rate_limit::RateLimitDescriptor;

type DirectRateLimiter = RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

/// Per-source rate limiter registry. Sources with no `rate_limit`
/// descriptor in their config never get an entry and are never throttled.
#[derive(Default)]
pub struct RateLimiters {
    buckets: DashMap<Uuid, Arc<DirectRateLimiter>>,
}

impl RateLimiters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until a token is available for `source_id`, given its
    /// current `descriptor`. A source with no descriptor never blocks.
    pub async fn acquire(&self, source_id: Uuid, descriptor: Option<RateLimitDescriptor>) {
        let Some(descriptor) = descriptor else { return };

        let limiter = self
            .buckets
            .entry(source_id)
            .or_insert_with(|| Arc::new(build_limiter(descriptor)))
            .clone();

        limiter.until_ready().await;
    }
}

fn build_limiter(descriptor: RateLimitDescriptor) -> DirectRateLimiter {
    let per_request_ms = (descriptor.period_ms / descriptor.requests as u64).max(1);
    let requests = NonZeroU32::new(descriptor.requests).unwrap_or_else(|| NonZeroU32::new(1).unwrap());
    let quota = Quota::with_period(Duration::from_millis(per_request_ms))
        .unwrap_or_else(|| Quota::per_second(requests))
        .allow_burst(requests);

    RateLimiter::direct(quota)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unrestricted_source_never_blocks() {
        let limiters = RateLimiters::new();
        limiters.acquire(Uuid::new_v4(), None).await;
    }

    #[tokio::test]
    async fn burst_within_quota_does_not_block() {
        let limiters = RateLimiters::new();
        let descriptor = RateLimitDescriptor { requests: 5, period_ms: 60_000 };
        let source_id = Uuid::new_v4();
        for _ in 0..5 {
            limiters.acquire(source_id, Some(descriptor)).await;
        }
    }
}
