//! Configuration loading for the simulation.
//!
//! Every setting has a default; a TOML file only needs the values it changes.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use town_events::SimTime;

use crate::error::ConfigurationError;
use crate::scoring::{RetrievalParams, StrategyKind};

/// Complete simulation configuration.
#[derive(Resource, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub clock: ClockConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub planning: PlanningConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub perception: PerceptionConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Simulated time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Simulated seconds per step
    pub seconds_per_step: u64,
    /// Day number of the first step (1-based)
    pub start_day: u32,
    pub start_hour: u32,
    pub start_minute: u32,
    /// Seed for tie-breaking between equally good target tiles
    pub seed: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            seconds_per_step: 10,
            start_day: 1,
            start_hour: 0,
            start_minute: 0,
            seed: 42,
        }
    }
}

impl ClockConfig {
    pub fn start_time(&self) -> SimTime {
        SimTime::new(self.start_day, self.start_hour, self.start_minute)
    }
}

/// Generation capability limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Upper bound on a single generation call
    pub timeout_ms: u64,
    /// Attempts per prompt before the fallback is taken
    pub max_attempts: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_attempts: 3,
        }
    }
}

/// Memory retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub strategy: StrategyKind,
    pub global_recency: f32,
    pub global_importance: f32,
    pub global_relevance: f32,
    /// Observations and chats recalled per perceived event
    pub event_k: usize,
    /// Thoughts recalled per perceived event
    pub thought_k: usize,
    /// Memories recalled for a focal point (reflection, identity revision)
    pub focal_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::LinearWeighted,
            global_recency: 0.5,
            global_importance: 2.0,
            global_relevance: 3.0,
            event_k: 5,
            thought_k: 5,
            focal_k: 30,
        }
    }
}

impl RetrievalConfig {
    /// Global multipliers with neutral per-agent weights.
    pub fn global(&self) -> RetrievalParams {
        RetrievalParams {
            global_recency: self.global_recency,
            global_importance: self.global_importance,
            global_relevance: self.global_relevance,
            ..RetrievalParams::default()
        }
    }
}

/// Daily and step planning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningConfig {
    /// Minimum step length (minutes) worth decomposing, indexed by depth
    pub decompose_min_minutes: Vec<u32>,
    pub max_decompose_depth: u8,
    /// Steps during which two agents who just talked will not talk again
    pub chat_cooldown_steps: u32,
    /// Wake-up hour used when the generator gives no usable answer
    pub fallback_wake_hour: u32,
    /// Minute of the day for the daily reflection; none disables it
    pub daily_reflection_minute: Option<u32>,
    /// Lifetime of plan and reflection thoughts
    pub thought_expiration_days: u64,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            decompose_min_minutes: vec![60, 30],
            max_decompose_depth: 2,
            chat_cooldown_steps: 60,
            fallback_wake_hour: 7,
            daily_reflection_minute: None,
            thought_expiration_days: 30,
        }
    }
}

impl PlanningConfig {
    /// Whether a step of `minutes` at `depth` should be broken down further.
    pub fn should_decompose(&self, depth: u8, minutes: u32) -> bool {
        if depth >= self.max_decompose_depth {
            return false;
        }
        self.decompose_min_minutes
            .get(usize::from(depth))
            .or(self.decompose_min_minutes.last())
            .is_some_and(|min| minutes >= *min)
    }
}

/// Conversation limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Hard cap on utterances per conversation
    pub max_turns: usize,
    pub utterances_per_step: usize,
    /// Simulated minutes after which a conversation ends regardless
    pub max_duration_minutes: u32,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_turns: 8,
            utterances_per_step: 1,
            max_duration_minutes: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerceptionConfig {
    /// Poignancy stored when the generator cannot rate a memory
    pub fallback_poignancy: f32,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            fallback_poignancy: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Frame log file name inside the output directory
    pub frames_file: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            frames_file: "frames.jsonl".to_string(),
        }
    }
}

impl SimConfig {
    /// Loads and validates configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigurationError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigurationError> {
        let config: SimConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let invalid = |field: &'static str, reason: &str| ConfigurationError::InvalidSetting {
            field,
            reason: reason.to_string(),
        };
        let clock = &self.clock;
        if clock.seconds_per_step == 0 {
            return Err(invalid("clock.seconds_per_step", "must be positive"));
        }
        if clock.start_day == 0 {
            return Err(invalid("clock.start_day", "days are numbered from 1"));
        }
        if clock.start_hour > 23 || clock.start_minute > 59 {
            return Err(invalid("clock.start_hour", "start time must be a valid clock time"));
        }
        if self.generation.max_attempts == 0 {
            return Err(invalid("generation.max_attempts", "must be at least 1"));
        }
        if self.generation.timeout_ms == 0 {
            return Err(invalid("generation.timeout_ms", "must be positive"));
        }
        let retrieval = &self.retrieval;
        for (field, value) in [
            ("retrieval.global_recency", retrieval.global_recency),
            ("retrieval.global_importance", retrieval.global_importance),
            ("retrieval.global_relevance", retrieval.global_relevance),
        ] {
            if value < 0.0 || !value.is_finite() {
                return Err(invalid(field, "must be a non-negative number"));
            }
        }
        if self.planning.decompose_min_minutes.contains(&0) {
            return Err(invalid("planning.decompose_min_minutes", "thresholds must be positive"));
        }
        if self.planning.fallback_wake_hour > 23 {
            return Err(invalid("planning.fallback_wake_hour", "must be an hour 0-23"));
        }
        if self
            .planning
            .daily_reflection_minute
            .is_some_and(|m| m >= town_events::MINUTES_PER_DAY)
        {
            return Err(invalid("planning.daily_reflection_minute", "must fall within the day"));
        }
        if self.conversation.max_turns == 0 {
            return Err(invalid("conversation.max_turns", "must be at least 1"));
        }
        if self.conversation.max_duration_minutes == 0 {
            return Err(invalid("conversation.max_duration_minutes", "must be at least 1"));
        }
        if self.conversation.utterances_per_step == 0 {
            return Err(invalid("conversation.utterances_per_step", "must be at least 1"));
        }
        if self.perception.fallback_poignancy < 0.0 {
            return Err(invalid("perception.fallback_poignancy", "must be non-negative"));
        }
        if self.output.frames_file.trim().is_empty() {
            return Err(invalid("output.frames_file", "must not be empty"));
        }
        Ok(())
    }
}

/// Generates a default configuration file content.
pub fn default_config_toml() -> String {
    r#"# Agent Town Configuration

[clock]
# Simulated seconds advanced per step
seconds_per_step = 10
start_day = 1
start_hour = 0
start_minute = 0
seed = 42

[generation]
timeout_ms = 30000
max_attempts = 3

[retrieval]
# linear_weighted, attention_weighted or recency_only
strategy = "linear_weighted"
global_recency = 0.5
global_importance = 2.0
global_relevance = 3.0
event_k = 5
thought_k = 5
focal_k = 30

[planning]
decompose_min_minutes = [60, 30]
max_decompose_depth = 2
chat_cooldown_steps = 60
fallback_wake_hour = 7
# daily_reflection_minute = 1320
thought_expiration_days = 30

[conversation]
max_turns = 8
utterances_per_step = 1
max_duration_minutes = 30

[perception]
fallback_poignancy = 3.0

[output]
frames_file = "frames.jsonl"
"#
    .to_string()
}
