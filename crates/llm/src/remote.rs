//! Real LLM client speaking a minimal OpenAI-compatible chat-completion
//! API. Structured output is requested by instructing the model to
//! reply with JSON matching a documented shape, then parsing that JSON
//! — providers in this class don't share a common function-calling
//! wire format the way OpenAI/Anthropic/Gemini chat completions don't,
//! so a JSON-in-prose contract is the common denominator.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::error::{LlmError, LlmResult};
use crate::lexical::LexicalClient;
use crate::types::{
    ContentExtraction, DailySynthesisInput, DailySynthesisOutput, Entities, PredictionInput,
    PredictionOutput,
};
use crate::LlmClient;

#[derive(Debug, Clone)]
pub struct RemoteLlmConfig {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
    pub max_retries: u32,
}

impl Default for RemoteLlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            max_tokens: 800,
            timeout_seconds: 30,
            max_retries: 2,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Real client backed by an HTTP chat-completion endpoint. Wraps a
/// [`LexicalClient`] and falls through to it whenever the remote call
/// fails after retries, rather than surfacing the error to the caller —
/// the capability boundary is meant to be invisible to handlers.
pub struct RemoteLlmClient {
    http: Client,
    config: RemoteLlmConfig,
    fallback: LexicalClient,
}

impl RemoteLlmClient {
    pub fn new(config: RemoteLlmConfig) -> LlmResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| LlmError::Request(format!("failed to build http client: {e}")))?;

        Ok(Self {
            http,
            config,
            fallback: LexicalClient::new(),
        })
    }

    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> LlmResult<String> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt.to_string(),
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let mut attempt = 0;
        loop {
            match self.chat_once(&request).await {
                Ok(content) => return Ok(content),
                Err(e) if attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt - 1));
                    warn!(attempt, ?delay, error = %e, "llm request failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn chat_once(&self, request: &ChatRequest) -> LlmResult<String> {
        let response = self
            .http
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Request(format!("http {status}: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::BadResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::BadResponse("no content in response".to_string()))
    }

    fn parse_extraction(raw: &str) -> LlmResult<ContentExtraction> {
        let value: serde_json::Value = extract_json(raw)?;
        Ok(ContentExtraction {
            topics: as_string_vec(&value["topics"]),
            sentiment: value["sentiment"].as_f64().unwrap_or(0.0) as f32,
            entities: Entities {
                companies: as_string_vec(&value["entities"]["companies"]),
                people: as_string_vec(&value["entities"]["people"]),
                locations: as_string_vec(&value["entities"]["locations"]),
                tickers: as_string_vec(&value["entities"]["tickers"]),
            },
            summary: value["summary"].as_str().unwrap_or_default().to_string(),
            used_fallback: false,
        })
    }

    fn parse_synthesis(raw: &str) -> LlmResult<DailySynthesisOutput> {
        let value: serde_json::Value = extract_json(raw)?;
        Ok(DailySynthesisOutput {
            market_sentiment: value["market_sentiment"].as_str().unwrap_or("neutral").to_string(),
            confidence: value["confidence"].as_f64().unwrap_or(0.0) as f32,
            key_themes: as_string_vec(&value["key_themes"]),
            summary: value["summary"].as_str().unwrap_or_default().to_string(),
            ai_blob: value["ai_blob"].clone(),
            used_fallback: false,
        })
    }

    fn parse_prediction(raw: &str) -> LlmResult<PredictionOutput> {
        let value: serde_json::Value = extract_json(raw)?;
        Ok(PredictionOutput {
            text: value["text"].as_str().unwrap_or_default().to_string(),
            confidence: value["confidence"].as_f64().unwrap_or(0.0) as f32,
            basis: as_string_vec(&value["basis"]),
            used_fallback: false,
        })
    }
}

fn as_string_vec(value: &serde_json::Value) -> Vec<String> {
    value
        .as_array()
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

/// The model is asked to reply with JSON only, but providers routinely
/// wrap it in prose or a fenced code block; pull out the first balanced
/// `{...}` span rather than requiring an exact match.
fn extract_json(raw: &str) -> LlmResult<serde_json::Value> {
    let start = raw.find('{').ok_or_else(|| LlmError::BadResponse("no json object in response".to_string()))?;
    let end = raw.rfind('}').ok_or_else(|| LlmError::BadResponse("no json object in response".to_string()))?;
    if end < start {
        return Err(LlmError::BadResponse("malformed json span".to_string()));
    }
    serde_json::from_str(&raw[start..=end]).map_err(|e| LlmError::BadResponse(e.to_string()))
}

#[async_trait]
impl LlmClient for RemoteLlmClient {
    async fn extract_content(&self, text: &str) -> LlmResult<ContentExtraction> {
        let system = "You extract structured signal from financial news text. Reply with JSON only: \
            {\"topics\": [...], \"sentiment\": <float -1..1>, \"entities\": {\"companies\": [...], \
            \"people\": [...], \"locations\": [...], \"tickers\": [...]}, \"summary\": \"...\"}.";

        match self.chat(system, text).await.and_then(|raw| Self::parse_extraction(&raw)) {
            Ok(extraction) => Ok(extraction),
            Err(e) => {
                warn!(error = %e, "llm extraction failed, using lexical fallback");
                self.fallback.extract_content(text).await
            }
        }
    }

    async fn synthesize_daily(&self, input: DailySynthesisInput) -> LlmResult<DailySynthesisOutput> {
        let system = "You synthesize a day of financial news item summaries into one analysis. \
            Reply with JSON only: {\"market_sentiment\": \"bullish\"|\"bearish\"|\"neutral\", \
            \"confidence\": <float 0..1>, \"key_themes\": [...], \"summary\": \"...\", \
            \"ai_blob\": {\"drivers\": [...], \"risks\": [...], \"opportunities\": [...]}}.";

        let user_prompt = json!(input).to_string();
        let items_for_fallback = input;

        match self
            .chat(system, &user_prompt)
            .await
            .and_then(|raw| Self::parse_synthesis(&raw))
        {
            Ok(out) => Ok(out),
            Err(e) => {
                warn!(error = %e, "llm synthesis failed, using lexical fallback");
                self.fallback.synthesize_daily(items_for_fallback).await
            }
        }
    }

    async fn draft_prediction(&self, input: PredictionInput) -> LlmResult<PredictionOutput> {
        let system = "You draft one dated market prediction from an analysis. Reply with JSON \
            only: {\"text\": \"...\", \"confidence\": <float 0..1, must not exceed the given \
            analysis_confidence>, \"basis\": [...]}.";

        let user_prompt = json!(input).to_string();
        let input_for_fallback = input;

        match self
            .chat(system, &user_prompt)
            .await
            .and_then(|raw| Self::parse_prediction(&raw))
        {
            Ok(mut out) => {
                out.confidence = out.confidence.min(input_for_fallback.analysis_confidence);
                Ok(out)
            }
            Err(e) => {
                warn!(error = %e, "llm prediction failed, using lexical fallback");
                self.fallback.draft_prediction(input_for_fallback).await
            }
        }
    }
}
