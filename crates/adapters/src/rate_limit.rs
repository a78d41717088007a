//! Shared shape for the `rate_limit{requests, period_ms}` descriptor
//! adapters declare in `source.config`, per spec.md §6.2/§4.4. Adapters
//! only carry the descriptor; the worker pool (C10) is what actually
//! acquires a token before calling an adapter, per spec.md §4.2 — that
//! keeps one token bucket implementation shared across every adapter
//! kind instead of duplicating it per adapter.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitDescriptor {
    pub requests: u32,
    pub period_ms: u64,
}

impl RateLimitDescriptor {
    pub fn from_config(config: &Value) -> Option<Self> {
        let rate_limit = config.get("rate_limit")?;
        let requests = rate_limit.get("requests")?.as_u64()? as u32;
        let period_ms = rate_limit.get("period_ms")?.as_u64()?;

        if requests == 0 || period_ms == 0 {
            return None;
        }

        Some(Self { requests, period_ms })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rate_limit_descriptor() {
        let config = serde_json::json!({ "rate_limit": { "requests": 10, "period_ms": 60000 } });
        let descriptor = RateLimitDescriptor::from_config(&config).unwrap();
        assert_eq!(descriptor.requests, 10);
        assert_eq!(descriptor.period_ms, 60000);
    }

    #[test]
    fn missing_rate_limit_is_none() {
        let config = serde_json::json!({});
        assert!(RateLimitDescriptor::from_config(&config).is_none());
    }

    #[test]
    fn zero_requests_is_none() {
        let config = serde_json::json!({ "rate_limit": { "requests": 0, "period_ms": 1000 } });
        assert!(RateLimitDescriptor::from_config(&config).is_none());
    }
}
