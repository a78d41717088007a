//! Shared, process-wide resources every job handler and the freshness
//! trigger need: the store, the LLM/transcription capabilities, the
//! adapter fetch context, and the per-source rate limiter registry.
//! Bundled into one struct and cloned per executor task, per the same
//! "global clients are singletons passed via context" design note
//! `pipeline_adapters::FetchContext` follows.

use std::sync::Arc;

use pipeline_adapters::{FetchContext, TranscriptionService};
use pipeline_llm::LlmClient;
use pipeline_queue::{PostgresBackend, QueueAdapter};
use pipeline_store::Store;

use crate::rate_limit::RateLimiters;

#[derive(Clone)]
pub struct WorkerCtx {
    pub store: Store,
    pub llm: Arc<dyn LlmClient>,
    pub fetch: FetchContext,
    pub transcription: Arc<dyn TranscriptionService>,
    pub rate_limiters: Arc<RateLimiters>,
    /// Handle handlers use to enqueue the next stage's job. Cheap to
    /// clone (an `Arc`-backed wrapper around the same backend the pool
    /// itself dequeues from), so it travels in the context like every
    /// other shared resource here.
    pub queue: QueueAdapter<PostgresBackend>,
}
