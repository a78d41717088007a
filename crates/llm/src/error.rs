use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm request failed: {0}")]
    Request(String),

    #[error("llm returned an unparseable response: {0}")]
    BadResponse(String),

    #[error("llm capability not configured")]
    NotConfigured,
}

pub type LlmResult<T> = Result<T, LlmError>;
