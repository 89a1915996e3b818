//! Agent Components
//!
//! Identity and per-agent cognitive parameters.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::address::Address;
use crate::error::ConfigurationError;
use crate::scoring::RetrievalParams;

/// Unique identifier for an agent. Ordering defines pipeline order.
#[derive(Component, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who the agent is. `currently` is revised each simulated day.
#[derive(Component, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    #[serde(default)]
    pub age: u32,
    /// Core traits, e.g. "friendly, outgoing, hospitable".
    #[serde(default)]
    pub innate: String,
    /// Stable background.
    #[serde(default)]
    pub learned: String,
    /// Current concerns.
    #[serde(default)]
    pub currently: String,
    /// Daily habits, e.g. "goes to bed around 11pm".
    #[serde(default)]
    pub lifestyle: String,
    pub living_area: Address,
}

impl Persona {
    pub fn new(name: impl Into<String>, living_area: Address) -> Self {
        Self {
            name: name.into(),
            age: 0,
            innate: String::new(),
            learned: String::new(),
            currently: String::new(),
            lifestyle: String::new(),
            living_area,
        }
    }

    pub fn with_traits(mut self, innate: impl Into<String>) -> Self {
        self.innate = innate.into();
        self
    }

    pub fn with_currently(mut self, currently: impl Into<String>) -> Self {
        self.currently = currently.into();
        self
    }

    pub fn with_lifestyle(mut self, lifestyle: impl Into<String>) -> Self {
        self.lifestyle = lifestyle.into();
        self
    }

    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }

    /// The identity summary placed at the top of most prompts.
    pub fn identity(&self) -> String {
        let mut out = format!("Name: {}\n", self.name);
        if self.age > 0 {
            out.push_str(&format!("Age: {}\n", self.age));
        }
        for (label, value) in [
            ("Innate traits", &self.innate),
            ("Learned traits", &self.learned),
            ("Currently", &self.currently),
            ("Lifestyle", &self.lifestyle),
        ] {
            if !value.is_empty() {
                out.push_str(&format!("{}: {}\n", label, value));
            }
        }
        out.push_str(&format!("Living area: {}\n", self.living_area));
        out
    }
}

/// Tunable cognition knobs, fixed per agent at bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CognitiveParams {
    /// Perception radius in tiles.
    pub vision_radius: u32,
    /// Events perceived per step.
    pub attention_bandwidth: usize,
    /// Memories retrieved per perceived event.
    pub retention: usize,
    pub recency_weight: f32,
    pub importance_weight: f32,
    pub relevance_weight: f32,
    pub recency_decay: f32,
    /// Reflection fires when the accumulated poignancy reaches this.
    pub importance_trigger_max: f32,
    /// Memories considered by a reflection.
    pub daily_reflection_size: usize,
}

impl Default for CognitiveParams {
    fn default() -> Self {
        Self {
            vision_radius: 4,
            attention_bandwidth: 3,
            retention: 5,
            recency_weight: 1.0,
            importance_weight: 1.0,
            relevance_weight: 1.0,
            recency_decay: 0.99,
            importance_trigger_max: 150.0,
            daily_reflection_size: 5,
        }
    }
}

impl CognitiveParams {
    pub fn validate(&self, agent: &str) -> Result<(), ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::InvalidAgent {
            agent: agent.to_string(),
            reason,
        };
        if !(self.recency_decay > 0.0 && self.recency_decay < 1.0) {
            return Err(invalid(format!(
                "recency_decay must be in (0, 1), got {}",
                self.recency_decay
            )));
        }
        if self.importance_trigger_max <= 0.0 {
            return Err(invalid("importance_trigger_max must be positive".into()));
        }
        if self.attention_bandwidth == 0 {
            return Err(invalid("attention_bandwidth must be at least 1".into()));
        }
        for (name, w) in [
            ("recency_weight", self.recency_weight),
            ("importance_weight", self.importance_weight),
            ("relevance_weight", self.relevance_weight),
        ] {
            if w < 0.0 || !w.is_finite() {
                return Err(invalid(format!("{} must be non-negative", name)));
            }
        }
        Ok(())
    }

    /// Retrieval parameters combining these weights with global multipliers.
    pub fn retrieval(&self, global: &RetrievalParams) -> RetrievalParams {
        RetrievalParams {
            recency_weight: self.recency_weight,
            importance_weight: self.importance_weight,
            relevance_weight: self.relevance_weight,
            recency_decay: self.recency_decay,
            ..*global
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_validate() {
        assert!(CognitiveParams::default().validate("ada").is_ok());
    }

    #[test]
    fn test_decay_out_of_range_rejected() {
        let params = CognitiveParams {
            recency_decay: 1.0,
            ..CognitiveParams::default()
        };
        let err = params.validate("ada").unwrap_err();
        assert!(err.to_string().contains("recency_decay"));
    }

    #[test]
    fn test_retrieval_keeps_global_multipliers() {
        let params = CognitiveParams {
            recency_weight: 2.0,
            ..CognitiveParams::default()
        };
        let global = RetrievalParams {
            global_relevance: 5.0,
            ..RetrievalParams::default()
        };
        let merged = params.retrieval(&global);
        assert_eq!(merged.recency_weight, 2.0);
        assert_eq!(merged.global_relevance, 5.0);
    }

    #[test]
    fn test_identity_lists_filled_fields() {
        let persona = Persona::new("Isabella Rodriguez", "town:Cafe:cafe".parse().unwrap())
            .with_traits("friendly")
            .with_currently("planning a party");
        let identity = persona.identity();
        assert!(identity.contains("Innate traits: friendly"));
        assert!(!identity.contains("Lifestyle"));
        assert_eq!(persona.first_name(), "Isabella");
    }
}
