//! Language-model capability boundary for the pipeline: one trait,
//! [`LlmClient`], with two implementations — [`RemoteLlmClient`] for a
//! real chat-completion endpoint, [`LexicalClient`] for a deterministic
//! rule-based stand-in. Callers in `pipeline-processor`,
//! `pipeline-synthesizer`, and `pipeline-predictor` depend only on the
//! trait, so neither the presence of a vendor key nor that vendor's
//! request shape leaks into handler code.

pub mod error;
pub mod lexical;
pub mod remote;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;

pub use error::{LlmError, LlmResult};
pub use lexical::LexicalClient;
pub use remote::{RemoteLlmClient, RemoteLlmConfig};
pub use types::{
    ContentExtraction, DailySynthesisInput, DailySynthesisOutput, Entities, ItemSignal,
    PredictionInput, PredictionOutput,
};

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Extract `{topics, sentiment, entities, summary}` from one raw
    /// item's normalized text.
    async fn extract_content(&self, text: &str) -> LlmResult<ContentExtraction>;

    /// Summarize a day's processed items into one dated analysis.
    async fn synthesize_daily(&self, input: DailySynthesisInput) -> LlmResult<DailySynthesisOutput>;

    /// Draft one prediction for a given horizon from an analysis.
    async fn draft_prediction(&self, input: PredictionInput) -> LlmResult<PredictionOutput>;
}

/// Build the client appropriate to `config`: a real HTTP-backed client
/// when `MODEL_API_KEY` is set, the lexical fallback otherwise. Callers
/// never need to branch on this themselves.
pub fn build_client(config: &pipeline_core::Config) -> Arc<dyn LlmClient> {
    match &config.model_api_key {
        Some(api_key) => {
            let remote_config = RemoteLlmConfig {
                api_key: api_key.clone(),
                ..RemoteLlmConfig::default()
            };
            match RemoteLlmClient::new(remote_config) {
                Ok(client) => Arc::new(client),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to build remote llm client, using lexical fallback");
                    Arc::new(LexicalClient::new())
                }
            }
        }
        None => Arc::new(LexicalClient::new()),
    }
}
