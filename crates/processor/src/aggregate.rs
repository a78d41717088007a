//! Aggregate-item analysis: a RawItem synthesized by the Aggregate
//! adapter's clustering (`metadata.is_aggregated = true`) carries several
//! sub-sources' signal folded into one body. Rather than treat it as one
//! undifferentiated document, split it back into its member segments,
//! run each through the same [`LlmClient`] extraction the single-item
//! path uses, and fold the per-member results into a weighted consensus.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use pipeline_llm::{ContentExtraction, Entities, LlmClient, LlmResult};

/// Matches the `\n\n[kind] ` boundary `AggregateAdapter::synthesize_cluster`
/// joins member bodies on, so each segment can be pulled back out.
static MEMBER_SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\n(?=\[[a-z-]+\] )").unwrap());

/// A title deviating from the weighted-mean sentiment by more than this
/// is called out as a divergent view rather than folded silently in.
const DIVERGENCE_THRESHOLD: f32 = 0.4;

/// A topic must appear in at least this fraction of members to count as
/// a common theme rather than a single source's idiosyncrasy.
const COMMON_THEME_FRACTION: f64 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateConsensus {
    pub member_count: usize,
    pub agreement_score: f64,
    pub divergent_views: Vec<String>,
    pub common_themes: Vec<String>,
}

struct Member {
    title: String,
    weight: f64,
    body: String,
}

fn parse_members(body: &str, cluster_sources: &[Value]) -> Vec<Member> {
    let segments: Vec<&str> = MEMBER_SPLIT_RE.split(body).collect();

    cluster_sources
        .iter()
        .enumerate()
        .map(|(i, src)| {
            let title = src.get("title").and_then(Value::as_str).unwrap_or_default().to_string();
            let weight = src.get("weight").and_then(Value::as_f64).unwrap_or(1.0);
            let body = segments.get(i).map(|s| s.to_string()).unwrap_or_default();
            Member { title, weight, body }
        })
        .collect()
}

/// Runs `extract_content` once per cluster member and folds the results
/// into one `ContentExtraction` plus a consensus summary. Falls back to
/// treating the whole body as a single document if `cluster_sources` is
/// missing or empty, since that's still a valid (if degenerate) cluster.
pub async fn analyze_aggregate(
    llm: &dyn LlmClient,
    normalized_body: &str,
    metadata: &Value,
) -> LlmResult<(ContentExtraction, AggregateConsensus)> {
    let cluster_sources: Vec<Value> = metadata
        .get("cluster_sources")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    if cluster_sources.is_empty() {
        let extraction = llm.extract_content(normalized_body).await?;
        let consensus = AggregateConsensus {
            member_count: 1,
            agreement_score: 1.0,
            divergent_views: Vec::new(),
            common_themes: extraction.topics.clone(),
        };
        return Ok((extraction, consensus));
    }

    let members = parse_members(normalized_body, &cluster_sources);

    let mut extractions = Vec::with_capacity(members.len());
    for member in &members {
        let text = if member.body.trim().is_empty() { member.title.as_str() } else { member.body.as_str() };
        extractions.push(llm.extract_content(text).await?);
    }

    let total_weight: f64 = members.iter().map(|m| m.weight).sum();
    let weighted_sentiment = if total_weight > 0.0 {
        members
            .iter()
            .zip(&extractions)
            .map(|(m, e)| m.weight * e.sentiment as f64)
            .sum::<f64>()
            / total_weight
    } else {
        0.0
    };

    let mean_abs_deviation = if !extractions.is_empty() {
        extractions.iter().map(|e| (e.sentiment as f64 - weighted_sentiment).abs()).sum::<f64>()
            / extractions.len() as f64
    } else {
        0.0
    };
    let agreement_score = (1.0 - mean_abs_deviation).clamp(0.0, 1.0);

    let divergent_views: Vec<String> = members
        .iter()
        .zip(&extractions)
        .filter(|(_, e)| (e.sentiment as f64 - weighted_sentiment).abs() as f32 > DIVERGENCE_THRESHOLD)
        .map(|(m, _)| m.title.clone())
        .collect();

    let mut topic_counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    for e in &extractions {
        for topic in &e.topics {
            *topic_counts.entry(topic.clone()).or_insert(0) += 1;
        }
    }
    let member_count = extractions.len().max(1);
    let mut common_themes: Vec<String> = topic_counts
        .into_iter()
        .filter(|(_, count)| *count as f64 / member_count as f64 >= COMMON_THEME_FRACTION)
        .map(|(topic, _)| topic)
        .collect();
    common_themes.sort();

    let all_topics: Vec<String> = {
        let mut t: Vec<String> = extractions.iter().flat_map(|e| e.topics.clone()).collect();
        t.sort();
        t.dedup();
        t
    };

    let entities = extractions.iter().fold(Entities::default(), |mut acc, e| {
        acc.companies.extend(e.entities.companies.iter().cloned());
        acc.people.extend(e.entities.people.iter().cloned());
        acc.locations.extend(e.entities.locations.iter().cloned());
        acc.tickers.extend(e.entities.tickers.iter().cloned());
        acc
    });
    let entities = dedup_entities(entities);

    let summary = format!(
        "{} related sources ({:.0}% agreement): {}",
        member_count,
        agreement_score * 100.0,
        members.iter().map(|m| m.title.as_str()).collect::<Vec<_>>().join("; ")
    );

    let used_fallback = extractions.iter().any(|e| e.used_fallback);

    let extraction = ContentExtraction {
        topics: all_topics,
        sentiment: weighted_sentiment as f32,
        entities,
        summary,
        used_fallback,
    };

    let consensus = AggregateConsensus { member_count, agreement_score, divergent_views, common_themes };

    Ok((extraction, consensus))
}

fn dedup_entities(mut e: Entities) -> Entities {
    for list in [&mut e.companies, &mut e.people, &mut e.locations, &mut e.tickers] {
        list.sort();
        list.dedup();
    }
    e
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pipeline_llm::{DailySynthesisInput, DailySynthesisOutput, PredictionInput, PredictionOutput};

    struct FixedSentimentClient(Vec<f32>);

    #[async_trait]
    impl LlmClient for FixedSentimentClient {
        async fn extract_content(&self, text: &str) -> LlmResult<ContentExtraction> {
            let idx = text.len() % self.0.len().max(1);
            Ok(ContentExtraction {
                topics: vec!["earnings".to_string()],
                sentiment: self.0[idx],
                entities: Entities::default(),
                summary: text.chars().take(20).collect(),
                used_fallback: true,
            })
        }

        async fn synthesize_daily(&self, _input: DailySynthesisInput) -> LlmResult<DailySynthesisOutput> {
            unimplemented!()
        }

        async fn draft_prediction(&self, _input: PredictionInput) -> LlmResult<PredictionOutput> {
            unimplemented!()
        }
    }

    fn body_and_sources() -> (String, Vec<Value>) {
        let body = "[syndicated] Earnings beat expectations today\n\n[generic-endpoint] Earnings miss forecasts elsewhere".to_string();
        let sources = vec![
            serde_json::json!({ "external_id": "a", "source_kind": "syndicated", "weight": 1.0, "title": "Earnings beat" }),
            serde_json::json!({ "external_id": "b", "source_kind": "generic-endpoint", "weight": 1.0, "title": "Earnings miss" }),
        ];
        (body, sources)
    }

    #[tokio::test]
    async fn splits_members_and_weights_sentiment() {
        let (body, sources) = body_and_sources();
        let metadata = serde_json::json!({ "is_aggregated": true, "cluster_sources": sources });
        let llm = FixedSentimentClient(vec![0.6, -0.6]);

        let (extraction, consensus) = analyze_aggregate(&llm, &body, &metadata).await.unwrap();

        assert_eq!(consensus.member_count, 2);
        assert!(extraction.sentiment.abs() < 0.1);
    }

    #[tokio::test]
    async fn falls_back_to_single_document_without_cluster_sources() {
        let llm = FixedSentimentClient(vec![0.3]);
        let metadata = serde_json::json!({ "is_aggregated": true });
        let (_, consensus) = analyze_aggregate(&llm, "solo body", &metadata).await.unwrap();
        assert_eq!(consensus.member_count, 1);
        assert_eq!(consensus.agreement_score, 1.0);
    }
}
