//! Generation Capability
//!
//! Text generation and embedding are external, fallible capabilities. The
//! pipeline talks to them through the `Capabilities` resource, which
//! validates output, repairs constrained choices and retries a bounded number
//! of times before the caller takes its fallback.

pub mod offline;
pub mod prompts;
pub mod timeout;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod scripted;

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::GenerationError;

pub use offline::{HashingEmbedder, OfflineGenerator};
pub use timeout::TimeoutGenerator;

/// What a prompt asks for. Used by generators and for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    WakeUpHour,
    DailyRequirements,
    HourlySchedule,
    TaskDecomposition,
    ActionSector,
    ActionArena,
    ActionObject,
    ActionEmoji,
    EventTriple,
    Poignancy,
    DecideToTalk,
    DecideToReact,
    Utterance,
    ConversationSummary,
    Insights,
    PlanningThought,
    ConversationMemo,
    IdentityRevision,
    WhisperThought,
}

/// Output constraints a generator is asked to honor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constraint {
    OneOf(Vec<String>),
}

/// A rendered prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub kind: PromptKind,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<Constraint>,
    /// The salient arguments the text was rendered from, in template order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub focus: Vec<String>,
}

impl Prompt {
    pub fn new(kind: PromptKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            constraint: None,
            focus: Vec::new(),
        }
    }

    pub fn one_of(mut self, options: Vec<String>) -> Self {
        self.constraint = Some(Constraint::OneOf(options));
        self
    }

    pub fn with_focus<I, S>(mut self, focus: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.focus = focus.into_iter().map(Into::into).collect();
        self
    }

    pub fn options(&self) -> &[String] {
        match &self.constraint {
            Some(Constraint::OneOf(options)) => options,
            None => &[],
        }
    }

    pub fn focus_at(&self, index: usize) -> &str {
        self.focus.get(index).map_or("", String::as_str)
    }
}

/// Produces text for a prompt.
pub trait Generator: Send + Sync {
    fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError>;
}

/// Produces an embedding vector for a text.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, GenerationError>;
}

/// Matches free-form output against allowed options.
///
/// Accepts an exact (case-insensitive, quote-stripped) match first, then the
/// longest option mentioned anywhere in the output.
pub fn repair_choice(output: &str, options: &[String]) -> Option<String> {
    let cleaned = output
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.' || c.is_whitespace())
        .to_lowercase();
    if cleaned.is_empty() {
        return None;
    }
    if let Some(exact) = options.iter().find(|o| o.to_lowercase() == cleaned) {
        return Some(exact.clone());
    }
    options
        .iter()
        .filter(|o| !o.is_empty() && cleaned.contains(&o.to_lowercase()))
        .max_by_key(|o| o.len())
        .cloned()
}

/// Resource: the generation and embedding capabilities in use.
#[derive(Resource, Clone)]
pub struct Capabilities {
    generator: Arc<dyn Generator>,
    embedder: Option<Arc<dyn Embedder>>,
    max_attempts: u32,
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("embedder", &self.embedder.is_some())
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl Capabilities {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            generator,
            embedder: None,
            max_attempts: 3,
        }
    }

    /// Offline generator and hashing embedder.
    pub fn offline() -> Self {
        Self::new(Arc::new(OfflineGenerator::new())).with_embedder(Arc::new(HashingEmbedder::default()))
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn has_embedder(&self) -> bool {
        self.embedder.is_some()
    }

    /// Generates and parses, retrying malformed or failed output.
    pub fn ask_parsed<T>(
        &self,
        prompt: &Prompt,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Result<T, GenerationError> {
        let mut last_error = GenerationError::Unavailable("no attempt made".into());
        for attempt in 1..=self.max_attempts {
            match self.generator.generate(prompt) {
                Ok(output) => match parse(&output) {
                    Some(value) => return Ok(value),
                    None => {
                        debug!("Malformed {:?} output on attempt {}: {:?}", prompt.kind, attempt, output);
                        last_error = GenerationError::Malformed {
                            kind: prompt.kind,
                            output,
                        };
                    }
                },
                Err(err) => {
                    debug!("{:?} generation failed on attempt {}: {}", prompt.kind, attempt, err);
                    let retry = err.is_retryable();
                    last_error = err;
                    if !retry {
                        break;
                    }
                }
            }
        }
        Err(last_error)
    }

    /// Non-empty trimmed text.
    pub fn ask_text(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        self.ask_parsed(prompt, |out| {
            let trimmed = out.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
    }

    /// One of the prompt's `OneOf` options.
    pub fn ask_choice(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        let options = prompt.options().to_vec();
        if options.is_empty() {
            return Err(GenerationError::Malformed {
                kind: prompt.kind,
                output: "no options offered".into(),
            });
        }
        self.ask_parsed(prompt, |out| repair_choice(out, &options))
    }

    /// Embedding for `text`, or `None` when unavailable.
    pub fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        match embedder.embed(text) {
            Ok(vector) => Some(vector),
            Err(err) => {
                warn!("Embedding failed, relevance dropped: {}", err);
                None
            }
        }
    }
}
