use serde::{Deserialize, Serialize};

/// Backend capabilities - explicit feature detection. Both the memory and
/// Postgres backends advertise the same capability set; this exists so a
/// caller can assert on it rather than assume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCapabilities {
    /// Support for delayed job execution (run_at > now)
    pub delayed: bool,

    /// Support for job priority ordering
    pub priority: bool,

    /// Support for idempotency keys
    pub idempotency: bool,
}

impl Default for QueueCapabilities {
    fn default() -> Self {
        Self {
            delayed: true,
            priority: true,
            idempotency: true,
        }
    }
}

impl QueueCapabilities {
    /// Create capabilities with all features enabled
    pub fn all() -> Self {
        Self {
            delayed: true,
            priority: true,
            idempotency: true,
        }
    }

    /// Create minimal capabilities (basic enqueue/dequeue only)
    pub fn minimal() -> Self {
        Self {
            delayed: false,
            priority: false,
            idempotency: false,
        }
    }

    /// Check if a specific feature is supported
    pub fn supports(&self, feature: &str) -> bool {
        match feature {
            "delayed" => self.delayed,
            "priority" => self.priority,
            "idempotency" => self.idempotency,
            _ => false,
        }
    }

    /// Get list of supported features
    pub fn supported_features(&self) -> Vec<&'static str> {
        let mut features = Vec::new();

        if self.delayed {
            features.push("delayed");
        }
        if self.priority {
            features.push("priority");
        }
        if self.idempotency {
            features.push("idempotency");
        }

        features
    }
}
