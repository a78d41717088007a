use thiserror::Error;

/// Adapter failure modes, per spec.md §4.4: network and parse errors are
/// retried by the queue; auth failures are terminal.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("auth error: {0}")]
    Auth(String),

    #[error("invalid source config: {0}")]
    Config(String),
}

impl AdapterError {
    /// Whether the queue should retry a job that failed this way.
    /// `Auth` and `Config` are permanent; everything else is transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Auth(_) | Self::Config(_))
    }
}

pub type AdapterResult<T> = Result<T, AdapterError>;
