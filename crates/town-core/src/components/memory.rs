//! Associative Memory
//!
//! Each agent's long-term store of observations, thoughts and conversation
//! summaries. Nodes are append-only and immutable; retrieval ranks them with
//! a `ScoringStrategy` (see `crate::scoring`).

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use town_events::SimTime;

use crate::error::StateCorruptionError;
use crate::scoring::{self, Candidate, RetrievalParams, ScoringStrategy};

/// Generates a node ID for a sequence number.
pub fn node_id(seq: u64) -> String {
    format!("node_{}", seq)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    Observation,
    Thought,
    Chat,
}

/// Subject / predicate / object of an event or thought.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

/// Last `:`-separated component, lowercased.
fn short_term(value: &str) -> String {
    value
        .rsplit(':')
        .next()
        .unwrap_or(value)
        .trim()
        .to_lowercase()
}

impl Triple {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    /// Lowercase retrieval keywords: subject and object short names.
    pub fn keywords(&self) -> BTreeSet<String> {
        [&self.subject, &self.object]
            .into_iter()
            .map(|v| short_term(v))
            .filter(|v| !v.is_empty())
            .collect()
    }

    /// Lowercase query terms: subject, predicate and object.
    pub fn query_terms(&self) -> BTreeSet<String> {
        [&self.subject, &self.predicate, &self.object]
            .into_iter()
            .map(|v| short_term(v))
            .filter(|v| !v.is_empty())
            .collect()
    }
}

/// What a node was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filling {
    Utterance { speaker: String, text: String },
    Evidence { node: String },
}

/// A single immutable memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryNode {
    pub id: String,
    pub seq: u64,
    pub kind: MemoryKind,
    pub created: SimTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<SimTime>,
    pub triple: Triple,
    pub description: String,
    pub poignancy: f32,
    pub keywords: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filling: Vec<Filling>,
}

impl MemoryNode {
    pub fn is_expired(&self, now: SimTime) -> bool {
        self.expiration.is_some_and(|at| at <= now)
    }

    pub fn is_idle(&self) -> bool {
        self.description.contains("is idle")
    }

    /// Node ids cited as evidence.
    pub fn evidence(&self) -> impl Iterator<Item = &str> {
        self.filling.iter().filter_map(|f| match f {
            Filling::Evidence { node } => Some(node.as_str()),
            Filling::Utterance { .. } => None,
        })
    }
}

/// A memory about to be stored. The store assigns id and sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMemory {
    pub kind: MemoryKind,
    pub created: SimTime,
    pub expiration: Option<SimTime>,
    pub triple: Triple,
    pub description: String,
    pub poignancy: f32,
    pub keywords: BTreeSet<String>,
    pub embedding: Option<Vec<f32>>,
    pub filling: Vec<Filling>,
}

impl NewMemory {
    pub fn new(
        kind: MemoryKind,
        created: SimTime,
        triple: Triple,
        description: impl Into<String>,
        poignancy: f32,
    ) -> Self {
        let keywords = triple.keywords();
        Self {
            kind,
            created,
            expiration: None,
            triple,
            description: description.into(),
            poignancy: poignancy.max(0.0),
            keywords,
            embedding: None,
            filling: Vec::new(),
        }
    }

    pub fn observation(
        created: SimTime,
        triple: Triple,
        description: impl Into<String>,
        poignancy: f32,
    ) -> Self {
        Self::new(MemoryKind::Observation, created, triple, description, poignancy)
    }

    pub fn thought(
        created: SimTime,
        triple: Triple,
        description: impl Into<String>,
        poignancy: f32,
    ) -> Self {
        Self::new(MemoryKind::Thought, created, triple, description, poignancy)
    }

    pub fn chat(
        created: SimTime,
        triple: Triple,
        description: impl Into<String>,
        poignancy: f32,
    ) -> Self {
        Self::new(MemoryKind::Chat, created, triple, description, poignancy)
    }

    pub fn expires(mut self, at: SimTime) -> Self {
        self.expiration = Some(at);
        self
    }

    pub fn with_keywords<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.keywords.extend(
            extra
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty()),
        );
        self
    }

    pub fn with_embedding(mut self, embedding: Option<Vec<f32>>) -> Self {
        self.embedding = embedding;
        self
    }

    pub fn with_filling(mut self, filling: Vec<Filling>) -> Self {
        self.filling = filling;
        self
    }
}

/// What to look for in a retrieval.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryQuery {
    /// Lowercase keywords; empty means untargeted.
    pub terms: BTreeSet<String>,
    pub embedding: Option<Vec<f32>>,
    /// Kinds to consider; empty means all.
    pub kinds: Vec<MemoryKind>,
}

impl MemoryQuery {
    pub fn terms<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            terms: terms
                .into_iter()
                .map(|t| t.as_ref().trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
            ..Self::default()
        }
    }

    pub fn with_embedding(mut self, embedding: Option<Vec<f32>>) -> Self {
        self.embedding = embedding;
        self
    }

    pub fn of_kinds(mut self, kinds: &[MemoryKind]) -> Self {
        self.kinds = kinds.to_vec();
        self
    }

    fn admits(&self, node: &MemoryNode) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&node.kind)
    }
}

/// Component: an agent's long-term memory.
#[derive(Component, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssociativeMemory {
    /// Ordered by sequence number.
    nodes: Vec<MemoryNode>,
}

impl AssociativeMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn last_seq(&self) -> u64 {
        self.nodes.last().map_or(0, |n| n.seq)
    }

    /// Stores a new node and returns its id.
    pub fn add(&mut self, memory: NewMemory) -> String {
        let seq = self.last_seq() + 1;
        let id = node_id(seq);
        self.nodes.push(MemoryNode {
            id: id.clone(),
            seq,
            kind: memory.kind,
            created: memory.created,
            expiration: memory.expiration,
            triple: memory.triple,
            description: memory.description,
            poignancy: memory.poignancy,
            keywords: memory.keywords,
            embedding: memory.embedding,
            filling: memory.filling,
        });
        id
    }

    /// Appends a node loaded from storage, keeping its sequence number.
    pub fn restore(&mut self, node: MemoryNode) -> Result<(), StateCorruptionError> {
        let last = self.last_seq();
        if (!self.nodes.is_empty() && node.seq <= last) || node.seq == 0 {
            return Err(StateCorruptionError::NonMonotonicSequence {
                last,
                found: node.seq,
            });
        }
        self.nodes.push(node);
        Ok(())
    }

    /// Checks the sequence ordering of a deserialized store.
    pub fn validate(&self) -> Result<(), StateCorruptionError> {
        let mut last = 0;
        for node in &self.nodes {
            if node.seq <= last {
                return Err(StateCorruptionError::NonMonotonicSequence {
                    last,
                    found: node.seq,
                });
            }
            last = node.seq;
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&MemoryNode> {
        let seq: u64 = id.strip_prefix("node_")?.parse().ok()?;
        self.nodes
            .binary_search_by_key(&seq, |n| n.seq)
            .ok()
            .map(|i| &self.nodes[i])
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &MemoryNode> {
        self.nodes.iter()
    }

    pub fn latest(&self) -> Option<&MemoryNode> {
        self.nodes.last()
    }

    /// The newest observation whose subject is `subject`.
    pub fn latest_observation_of(&self, subject: &str) -> Option<&MemoryNode> {
        self.nodes
            .iter()
            .rev()
            .find(|n| n.kind == MemoryKind::Observation && n.triple.subject == subject)
    }

    /// The newest chat summary with `partner`.
    pub fn last_chat_with(&self, partner: &str) -> Option<&MemoryNode> {
        self.nodes
            .iter()
            .rev()
            .find(|n| n.kind == MemoryKind::Chat && n.triple.object == partner)
    }

    fn candidates(&self, now: SimTime, admit: impl Fn(&MemoryNode) -> bool) -> Vec<Candidate<'_>> {
        let total = self.nodes.len();
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.is_expired(now) && admit(n))
            .map(|(i, node)| Candidate {
                node,
                newer: total - 1 - i,
            })
            .collect()
    }

    /// The `k` best non-expired nodes sharing a keyword with the query, or the
    /// `k` most recent ones for an untargeted query.
    pub fn retrieve(
        &self,
        query: &MemoryQuery,
        now: SimTime,
        k: usize,
        params: &RetrievalParams,
        strategy: &dyn ScoringStrategy,
    ) -> Vec<&MemoryNode> {
        if query.terms.is_empty() {
            return self.recent(now, k, &query.kinds);
        }
        let candidates = self.candidates(now, |n| {
            query.admits(n) && !n.keywords.is_disjoint(&query.terms)
        });
        scoring::rank(&candidates, query.embedding.as_deref(), params, strategy, k)
    }

    /// Scores every non-expired, non-idle node against a free-text focal point.
    pub fn retrieve_focal(
        &self,
        focal_embedding: Option<&[f32]>,
        now: SimTime,
        k: usize,
        params: &RetrievalParams,
        strategy: &dyn ScoringStrategy,
    ) -> Vec<&MemoryNode> {
        let candidates = self.candidates(now, |n| !n.is_idle());
        scoring::rank(&candidates, focal_embedding, params, strategy, k)
    }

    /// The `k` most recent non-expired nodes of the given kinds, newest first.
    pub fn recent(&self, now: SimTime, k: usize, kinds: &[MemoryKind]) -> Vec<&MemoryNode> {
        self.nodes
            .iter()
            .rev()
            .filter(|n| !n.is_expired(now) && (kinds.is_empty() || kinds.contains(&n.kind)))
            .take(k)
            .collect()
    }
}
