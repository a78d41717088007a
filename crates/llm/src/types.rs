use serde::{Deserialize, Serialize};

/// Entities categorized the way `ProcessedItem.entities_json` stores them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Entities {
    pub companies: Vec<String>,
    pub people: Vec<String>,
    pub locations: Vec<String>,
    pub tickers: Vec<String>,
}

/// Result of extracting structured signal from one raw item's text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentExtraction {
    pub topics: Vec<String>,
    pub sentiment: f32,
    pub entities: Entities,
    pub summary: String,
    /// Set when the lexical fallback produced this result, either
    /// because no real client is configured or the real call failed.
    pub used_fallback: bool,
}

/// One processed item's contribution to a daily synthesis prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSignal {
    pub topics: Vec<String>,
    pub sentiment: f32,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySynthesisInput {
    pub items: Vec<ItemSignal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySynthesisOutput {
    pub market_sentiment: String,
    pub confidence: f32,
    pub key_themes: Vec<String>,
    pub summary: String,
    pub ai_blob: serde_json::Value,
    pub used_fallback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionInput {
    pub horizon: String,
    pub analysis_sentiment_label: String,
    pub analysis_confidence: f32,
    pub themes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionOutput {
    pub text: String,
    pub confidence: f32,
    pub basis: Vec<String>,
    pub used_fallback: bool,
}
