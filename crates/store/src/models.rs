//! Row types for every table the core owns. These are plain data; query
//! methods live in the sibling repository modules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One of the five source kinds an adapter exists for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Syndicated,
    Audio,
    Video,
    GenericEndpoint,
    Aggregate,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Syndicated => "syndicated",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::GenericEndpoint => "generic-endpoint",
            Self::Aggregate => "aggregate",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "syndicated" => Some(Self::Syndicated),
            "audio" => Some(Self::Audio),
            "video" => Some(Self::Video),
            "generic-endpoint" => Some(Self::GenericEndpoint),
            "aggregate" => Some(Self::Aggregate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub name: String,
    pub kind: SourceKind,
    pub url: String,
    pub active: bool,
    pub config: Value,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawItem {
    pub id: Uuid,
    pub source_ref: Uuid,
    pub external_id: String,
    pub title: String,
    pub description: Option<String>,
    pub body: String,
    pub published_at: DateTime<Utc>,
    pub metadata: Value,
    pub processing_status: ProcessingStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedItem {
    pub id: Uuid,
    pub raw_ref: Uuid,
    pub normalized_text: String,
    pub topics: Value,
    pub sentiment_score: f64,
    pub entities: Value,
    pub summary: String,
    pub processing_metadata: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketSentiment {
    Bullish,
    Bearish,
    Neutral,
}

impl MarketSentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bullish => "bullish",
            Self::Bearish => "bearish",
            Self::Neutral => "neutral",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "bullish" => Some(Self::Bullish),
            "bearish" => Some(Self::Bearish),
            "neutral" => Some(Self::Neutral),
            _ => None,
        }
    }

    /// Thresholds from the daily synthesizer's lexical fallback: |score| ≤
    /// 0.15 is neutral, otherwise the sign of the weighted mean decides.
    pub fn from_score(score: f64) -> Self {
        if score > 0.15 {
            Self::Bullish
        } else if score < -0.15 {
            Self::Bearish
        } else {
            Self::Neutral
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyAnalysis {
    pub id: Uuid,
    pub date: chrono::NaiveDate,
    pub market_sentiment: MarketSentiment,
    pub key_themes: Value,
    pub summary: String,
    pub ai_blob: Value,
    pub confidence: f64,
    pub sources_analyzed: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionKind {
    MarketDirection,
    SectorPerformance,
    EconomicIndicator,
    GeopoliticalEvent,
}

impl PredictionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MarketDirection => "market_direction",
            Self::SectorPerformance => "sector_performance",
            Self::EconomicIndicator => "economic_indicator",
            Self::GeopoliticalEvent => "geopolitical_event",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "market_direction" => Some(Self::MarketDirection),
            "sector_performance" => Some(Self::SectorPerformance),
            "economic_indicator" => Some(Self::EconomicIndicator),
            "geopolitical_event" => Some(Self::GeopoliticalEvent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Horizon {
    OneWeek,
    OneMonth,
    ThreeMonths,
    SixMonths,
    OneYear,
}

impl Horizon {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneWeek => "1w",
            Self::OneMonth => "1m",
            Self::ThreeMonths => "3m",
            Self::SixMonths => "6m",
            Self::OneYear => "1y",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "1w" => Some(Self::OneWeek),
            "1m" => Some(Self::OneMonth),
            "3m" => Some(Self::ThreeMonths),
            "6m" => Some(Self::SixMonths),
            "1y" => Some(Self::OneYear),
            _ => None,
        }
    }

    /// Default horizon set the predictor emits one prediction per.
    pub fn default_set() -> &'static [Horizon] {
        &[Horizon::OneWeek, Horizon::OneMonth, Horizon::ThreeMonths]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub id: Uuid,
    pub analysis_ref: Uuid,
    pub kind: PredictionKind,
    pub text: String,
    pub confidence: f64,
    pub horizon: Horizon,
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionComparison {
    pub id: Uuid,
    pub prediction_ref: Uuid,
    pub analysis_ref: Uuid,
    pub accuracy: f64,
    pub outcome_description: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_kind_round_trips_through_str() {
        for kind in [
            SourceKind::Syndicated,
            SourceKind::Audio,
            SourceKind::Video,
            SourceKind::GenericEndpoint,
            SourceKind::Aggregate,
        ] {
            assert_eq!(SourceKind::from_str(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn market_sentiment_thresholds_match_synthesizer_fallback() {
        assert_eq!(MarketSentiment::from_score(0.2), MarketSentiment::Bullish);
        assert_eq!(MarketSentiment::from_score(-0.2), MarketSentiment::Bearish);
        assert_eq!(MarketSentiment::from_score(0.1), MarketSentiment::Neutral);
        assert_eq!(MarketSentiment::from_score(-0.15), MarketSentiment::Neutral);
    }

    #[test]
    fn horizon_default_set_matches_spec() {
        let set = Horizon::default_set();
        assert_eq!(
            set,
            [Horizon::OneWeek, Horizon::OneMonth, Horizon::ThreeMonths].as_slice()
        );
    }
}
