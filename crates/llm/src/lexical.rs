//! Lexical fallback: a rule-based stand-in for the language model, used
//! when no provider is configured (`MODEL_API_KEY` unset) or the real
//! client's request ultimately fails. Never calls out to the network.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::error::LlmResult;
use crate::types::{
    ContentExtraction, DailySynthesisInput, DailySynthesisOutput, Entities, PredictionInput,
    PredictionOutput,
};
use crate::LlmClient;

const FINANCE_VOCABULARY: &[&str] = &[
    "inflation", "rate", "rates", "fed", "earnings", "revenue", "growth", "recession",
    "stock", "stocks", "market", "markets", "bond", "bonds", "yield", "tariff", "tariffs",
    "gdp", "unemployment", "jobs", "oil", "crude", "dollar", "currency", "merger",
    "acquisition", "ipo", "dividend", "default", "inflationary", "deflation",
    "supply", "demand", "trade", "export", "import", "sanctions", "regulation",
];

static POSITIVE_LEXICON: &[&str] = &[
    "surge", "surged", "rally", "rallied", "gain", "gains", "growth", "beat", "beats",
    "strong", "record", "upgrade", "upgraded", "optimism", "bullish", "recovery",
    "expand", "expansion", "profit", "profits", "boom", "soar", "soared",
];

static NEGATIVE_LEXICON: &[&str] = &[
    "slump", "slumped", "plunge", "plunged", "loss", "losses", "decline", "miss",
    "misses", "weak", "downgrade", "downgraded", "pessimism", "bearish", "recession",
    "contraction", "default", "crash", "layoffs", "tumble", "tumbled",
];

static TICKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z]{1,5}\b").unwrap());
static CURRENCY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$[0-9][0-9,\.]*(?:[BMK])?").unwrap());
static PERCENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[0-9]+(?:\.[0-9]+)?%").unwrap());

/// Words that look like tickers but aren't worth surfacing as entities.
const TICKER_STOPWORDS: &[&str] = &["A", "I", "THE", "CEO", "CFO", "US", "UK", "EU", "IPO", "GDP"];

pub struct LexicalClient;

impl LexicalClient {
    pub fn new() -> Self {
        Self
    }

    fn extract_topics(text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        let mut found: Vec<String> = FINANCE_VOCABULARY
            .iter()
            .filter(|word| lower.contains(*word))
            .map(|word| word.to_string())
            .collect();
        found.dedup();
        found
    }

    fn score_sentiment(text: &str) -> f32 {
        let lower = text.to_lowercase();
        let positive = POSITIVE_LEXICON.iter().filter(|w| lower.contains(*w)).count() as f32;
        let negative = NEGATIVE_LEXICON.iter().filter(|w| lower.contains(*w)).count() as f32;
        let total = positive + negative;

        if total == 0.0 {
            0.0
        } else {
            ((positive - negative) / total).clamp(-1.0, 1.0)
        }
    }

    fn extract_entities(text: &str) -> Entities {
        let mut tickers: Vec<String> = TICKER_RE
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .filter(|t| !TICKER_STOPWORDS.contains(&t.as_str()))
            .collect();
        tickers.sort();
        tickers.dedup();

        Entities {
            companies: Vec::new(),
            people: Vec::new(),
            locations: Vec::new(),
            tickers,
        }
    }

    fn summarize(text: &str) -> String {
        text.chars().take(300).collect()
    }
}

impl Default for LexicalClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for LexicalClient {
    async fn extract_content(&self, text: &str) -> LlmResult<ContentExtraction> {
        Ok(ContentExtraction {
            topics: Self::extract_topics(text),
            sentiment: Self::score_sentiment(text),
            entities: Self::extract_entities(text),
            summary: Self::summarize(text),
            used_fallback: true,
        })
    }

    async fn synthesize_daily(&self, input: DailySynthesisInput) -> LlmResult<DailySynthesisOutput> {
        if input.items.is_empty() {
            return Ok(DailySynthesisOutput {
                market_sentiment: "neutral".to_string(),
                confidence: 0.0,
                key_themes: Vec::new(),
                summary: String::new(),
                ai_blob: serde_json::json!({ "drivers": [], "risks": [], "opportunities": [] }),
                used_fallback: true,
            });
        }

        let mean_sentiment =
            input.items.iter().map(|i| i.sentiment).sum::<f32>() / input.items.len() as f32;

        let label = if mean_sentiment > 0.15 {
            "bullish"
        } else if mean_sentiment < -0.15 {
            "bearish"
        } else {
            "neutral"
        };

        let mut topic_counts: HashMap<String, usize> = HashMap::new();
        for item in &input.items {
            for topic in &item.topics {
                *topic_counts.entry(topic.clone()).or_insert(0) += 1;
            }
        }
        let mut themes: Vec<(String, usize)> = topic_counts.into_iter().collect();
        themes.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let key_themes: Vec<String> = themes.into_iter().take(5).map(|(t, _)| t).collect();

        let summary = format!(
            "{} items analyzed; aggregate sentiment {:.2} ({}). Dominant themes: {}.",
            input.items.len(),
            mean_sentiment,
            label,
            if key_themes.is_empty() {
                "none identified".to_string()
            } else {
                key_themes.join(", ")
            }
        );

        Ok(DailySynthesisOutput {
            market_sentiment: label.to_string(),
            confidence: (input.items.len() as f32 / 50.0).min(1.0),
            key_themes,
            summary,
            ai_blob: serde_json::json!({ "drivers": [], "risks": [], "opportunities": [] }),
            used_fallback: true,
        })
    }

    async fn draft_prediction(&self, input: PredictionInput) -> LlmResult<PredictionOutput> {
        let direction = match input.analysis_sentiment_label.as_str() {
            "bullish" => "improve",
            "bearish" => "deteriorate",
            _ => "hold steady",
        };

        let theme_clause = if input.themes.is_empty() {
            "current conditions".to_string()
        } else {
            input.themes.join(", ")
        };

        let text = format!(
            "Over the {} horizon, conditions are expected to {} given {}.",
            input.horizon, direction, theme_clause
        );

        Ok(PredictionOutput {
            text,
            confidence: (input.analysis_confidence * 0.8).clamp(0.0, 1.0),
            basis: input.themes,
            used_fallback: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn extract_content_finds_finance_vocabulary() {
        let client = LexicalClient::new();
        let result = client
            .extract_content("The Fed signaled inflation concerns as markets rallied on strong earnings.")
            .await
            .unwrap();

        assert!(result.used_fallback);
        assert!(result.topics.contains(&"inflation".to_string()));
        assert!(result.topics.contains(&"fed".to_string()));
        assert!(result.sentiment > 0.0);
    }

    #[tokio::test]
    async fn extract_content_finds_tickers() {
        let client = LexicalClient::new();
        let result = client
            .extract_content("AAPL and MSFT both gained today while TSLA slumped.")
            .await
            .unwrap();

        assert!(result.entities.tickers.contains(&"AAPL".to_string()));
        assert!(result.entities.tickers.contains(&"MSFT".to_string()));
        assert!(result.entities.tickers.contains(&"TSLA".to_string()));
    }

    #[tokio::test]
    async fn negative_lexicon_outweighs_positive() {
        let client = LexicalClient::new();
        let result = client
            .extract_content("Stocks plunged and losses mounted amid recession fears.")
            .await
            .unwrap();
        assert!(result.sentiment < 0.0);
    }

    #[tokio::test]
    async fn synthesize_daily_empty_input_is_neutral() {
        let client = LexicalClient::new();
        let out = client
            .synthesize_daily(DailySynthesisInput { items: vec![] })
            .await
            .unwrap();
        assert_eq!(out.market_sentiment, "neutral");
        assert_eq!(out.confidence, 0.0);
    }

    #[tokio::test]
    async fn synthesize_daily_aggregates_sentiment_and_themes() {
        let client = LexicalClient::new();
        let input = DailySynthesisInput {
            items: vec![
                crate::types::ItemSignal {
                    topics: vec!["earnings".to_string()],
                    sentiment: 0.6,
                    summary: "x".to_string(),
                },
                crate::types::ItemSignal {
                    topics: vec!["earnings".to_string(), "growth".to_string()],
                    sentiment: 0.4,
                    summary: "y".to_string(),
                },
            ],
        };
        let out = client.synthesize_daily(input).await.unwrap();
        assert_eq!(out.market_sentiment, "bullish");
        assert_eq!(out.key_themes.first(), Some(&"earnings".to_string()));
    }

    #[tokio::test]
    async fn draft_prediction_confidence_never_exceeds_analysis_confidence() {
        let client = LexicalClient::new();
        let out = client
            .draft_prediction(PredictionInput {
                horizon: "1m".to_string(),
                analysis_sentiment_label: "bullish".to_string(),
                analysis_confidence: 0.5,
                themes: vec!["growth".to_string()],
            })
            .await
            .unwrap();
        assert!(out.confidence <= 0.5);
    }
}
