//! Retrieval Scoring
//!
//! Ranks candidate memory nodes by recency, importance and (when embeddings
//! exist) relevance. Each column is min-max normalized across the candidate
//! set before a `ScoringStrategy` combines the three values.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::components::memory::MemoryNode;

/// Weights and decay used when scoring a retrieval.
///
/// Per-agent weights multiply the global multipliers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrievalParams {
    pub recency_weight: f32,
    pub importance_weight: f32,
    pub relevance_weight: f32,
    pub recency_decay: f32,
    pub global_recency: f32,
    pub global_importance: f32,
    pub global_relevance: f32,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            recency_weight: 1.0,
            importance_weight: 1.0,
            relevance_weight: 1.0,
            recency_decay: 0.99,
            global_recency: 0.5,
            global_importance: 2.0,
            global_relevance: 3.0,
        }
    }
}

impl RetrievalParams {
    pub fn recency(&self) -> f32 {
        self.recency_weight * self.global_recency
    }

    pub fn importance(&self) -> f32 {
        self.importance_weight * self.global_importance
    }

    pub fn relevance(&self) -> f32 {
        self.relevance_weight * self.global_relevance
    }
}

/// Normalized score components of one candidate. `relevance` is `None` when
/// the query has no embedding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreComponents {
    pub recency: f32,
    pub importance: f32,
    pub relevance: Option<f32>,
}

/// Combines normalized components into a single score.
pub trait ScoringStrategy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn combine(&self, components: &ScoreComponents, params: &RetrievalParams) -> f32;
}

/// `w_rec * recency + w_imp * importance + w_rel * relevance`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearWeighted;

impl ScoringStrategy for LinearWeighted {
    fn name(&self) -> &'static str {
        "linear_weighted"
    }

    fn combine(&self, c: &ScoreComponents, params: &RetrievalParams) -> f32 {
        let mut score = params.recency() * c.recency + params.importance() * c.importance;
        if let Some(relevance) = c.relevance {
            score += params.relevance() * relevance;
        }
        score
    }
}

/// Softmax over the weighted components, then the attention-weighted mix of
/// the raw components.
#[derive(Debug, Clone, Copy)]
pub struct AttentionWeighted {
    pub temperature: f32,
}

impl Default for AttentionWeighted {
    fn default() -> Self {
        Self { temperature: 1.0 }
    }
}

impl ScoringStrategy for AttentionWeighted {
    fn name(&self) -> &'static str {
        "attention_weighted"
    }

    fn combine(&self, c: &ScoreComponents, params: &RetrievalParams) -> f32 {
        let temperature = self.temperature.max(f32::EPSILON);
        let mut values = vec![
            (c.recency, params.recency() * c.recency),
            (c.importance, params.importance() * c.importance),
        ];
        if let Some(relevance) = c.relevance {
            values.push((relevance, params.relevance() * relevance));
        }

        let max_logit = values
            .iter()
            .map(|(_, w)| w / temperature)
            .fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = values
            .iter()
            .map(|(_, w)| (w / temperature - max_logit).exp())
            .collect();
        let total: f32 = exps.iter().sum();

        values
            .iter()
            .zip(&exps)
            .map(|((raw, _), e)| raw * e / total)
            .sum()
    }
}

/// Ranks by recency alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecencyOnly;

impl ScoringStrategy for RecencyOnly {
    fn name(&self) -> &'static str {
        "recency_only"
    }

    fn combine(&self, c: &ScoreComponents, _params: &RetrievalParams) -> f32 {
        c.recency
    }
}

/// Selectable strategies, as named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    LinearWeighted,
    AttentionWeighted,
    RecencyOnly,
}

impl StrategyKind {
    pub fn build(self) -> Box<dyn ScoringStrategy> {
        match self {
            StrategyKind::LinearWeighted => Box::new(LinearWeighted),
            StrategyKind::AttentionWeighted => Box::new(AttentionWeighted::default()),
            StrategyKind::RecencyOnly => Box::new(RecencyOnly),
        }
    }
}

/// Min-max normalizes in place. A constant column becomes 0.5.
pub fn normalize(values: &mut [f32]) {
    let Some(min) = values.iter().copied().reduce(f32::min) else {
        return;
    };
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    for v in values.iter_mut() {
        *v = if range.abs() < f32::EPSILON {
            0.5
        } else {
            (*v - min) / range
        };
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// A retrieval candidate and the number of nodes stored after it.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub node: &'a MemoryNode,
    pub newer: usize,
}

/// Scores every candidate and returns the best `k`, highest first.
///
/// Ties break toward the higher sequence number.
pub fn rank<'a>(
    candidates: &[Candidate<'a>],
    query_embedding: Option<&[f32]>,
    params: &RetrievalParams,
    strategy: &dyn ScoringStrategy,
    k: usize,
) -> Vec<&'a MemoryNode> {
    if candidates.is_empty() || k == 0 {
        return Vec::new();
    }

    let mut recency: Vec<f32> = candidates
        .iter()
        .map(|c| params.recency_decay.powi(c.newer.min(i32::MAX as usize) as i32))
        .collect();
    let mut importance: Vec<f32> = candidates.iter().map(|c| c.node.poignancy).collect();
    let mut relevance: Option<Vec<f32>> = query_embedding.map(|query| {
        candidates
            .iter()
            .map(|c| {
                c.node
                    .embedding
                    .as_deref()
                    .map_or(0.0, |e| cosine_similarity(e, query))
            })
            .collect()
    });

    normalize(&mut recency);
    normalize(&mut importance);
    if let Some(rel) = relevance.as_mut() {
        normalize(rel);
    }

    let mut scored: Vec<(f32, &'a MemoryNode)> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let components = ScoreComponents {
                recency: recency[i],
                importance: importance[i],
                relevance: relevance.as_ref().map(|r| r[i]),
            };
            (strategy.combine(&components, params), c.node)
        })
        .collect();

    scored.sort_by(|(sa, na), (sb, nb)| sb.total_cmp(sa).then(nb.seq.cmp(&na.seq)));
    scored.into_iter().take(k).map(|(_, node)| node).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_range() {
        let mut v = vec![2.0, 4.0, 6.0];
        normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_normalize_constant_column() {
        let mut v = vec![3.0, 3.0];
        normalize(&mut v);
        assert_eq!(v, vec![0.5, 0.5]);

        let mut empty: Vec<f32> = Vec::new();
        normalize(&mut empty);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_linear_drops_missing_relevance() {
        let params = RetrievalParams::default();
        let c = ScoreComponents {
            recency: 1.0,
            importance: 0.5,
            relevance: None,
        };
        let expected = 0.5 * 1.0 + 2.0 * 0.5;
        assert!((LinearWeighted.combine(&c, &params) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_attention_stays_within_component_range() {
        let params = RetrievalParams::default();
        let c = ScoreComponents {
            recency: 0.2,
            importance: 0.9,
            relevance: Some(0.4),
        };
        let score = AttentionWeighted::default().combine(&c, &params);
        assert!(score >= 0.2 && score <= 0.9);
    }

    #[test]
    fn test_strategy_kind_names() {
        assert_eq!(StrategyKind::LinearWeighted.build().name(), "linear_weighted");
        assert_eq!(
            StrategyKind::AttentionWeighted.build().name(),
            "attention_weighted"
        );
        let parsed: StrategyKind = serde_json::from_str("\"recency_only\"").unwrap();
        assert_eq!(parsed, StrategyKind::RecencyOnly);
    }
}
