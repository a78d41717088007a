//! Crate-wide application error. Distinct from [`pipeline_queue::JobError`]
//! (which classifies a single job execution outcome as retryable or not):
//! this covers the infrastructure layer underneath a job handler — config,
//! the store, a source adapter, the cache — before it ever reaches the
//! queue's retry logic.

use thiserror::Error;

pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("source adapter error: {0}")]
    Source(String),

    #[error("language model error: {0}")]
    Llm(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    pub fn source(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    pub fn llm(msg: impl Into<String>) -> Self {
        Self::Llm(msg.into())
    }

    /// Whether a caller should retry the operation that produced this
    /// error. Config errors never resolve themselves on retry; everything
    /// else is presumed transient (network, store contention) unless the
    /// call site knows better.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_are_not_retryable() {
        assert!(!AppError::config("missing STORE_URL").is_retryable());
    }

    #[test]
    fn store_errors_are_retryable() {
        assert!(AppError::store("connection reset").is_retryable());
    }
}
