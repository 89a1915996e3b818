//! Scripted generator for tests.
//!
//! Queued responses per prompt kind are served first; anything unscripted
//! falls through to the `OfflineGenerator`. Every prompt is recorded.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{Generator, OfflineGenerator, Prompt, PromptKind};
use crate::error::GenerationError;

#[derive(Debug, Default)]
struct Script {
    queued: BTreeMap<PromptKind, VecDeque<Result<String, GenerationError>>>,
    failing: BTreeSet<PromptKind>,
    calls: Vec<Prompt>,
}

/// Cloning shares the script, so a test can keep a handle after handing the
/// generator to a simulation.
#[derive(Debug, Clone, Default)]
pub struct ScriptedGenerator {
    script: Arc<Mutex<Script>>,
    fallback: OfflineGenerator,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queues one response for the next prompt of `kind`.
    pub fn push(&self, kind: PromptKind, response: impl Into<String>) -> &Self {
        self.lock()
            .queued
            .entry(kind)
            .or_default()
            .push_back(Ok(response.into()));
        self
    }

    pub fn push_error(&self, kind: PromptKind, error: GenerationError) -> &Self {
        self.lock().queued.entry(kind).or_default().push_back(Err(error));
        self
    }

    /// Every prompt of `kind` fails as unavailable until `recover`.
    pub fn fail(&self, kind: PromptKind) -> &Self {
        self.lock().failing.insert(kind);
        self
    }

    pub fn recover(&self, kind: PromptKind) -> &Self {
        self.lock().failing.remove(&kind);
        self
    }

    pub fn calls(&self) -> Vec<Prompt> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, kind: PromptKind) -> usize {
        self.lock().calls.iter().filter(|p| p.kind == kind).count()
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        let mut script = self.lock();
        script.calls.push(prompt.clone());
        if script.failing.contains(&prompt.kind) {
            return Err(GenerationError::Unavailable(format!(
                "{:?} scripted to fail",
                prompt.kind
            )));
        }
        if let Some(next) = script.queued.get_mut(&prompt.kind).and_then(VecDeque::pop_front) {
            return next;
        }
        drop(script);
        self.fallback.generate(prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_then_fallback() {
        let gen = ScriptedGenerator::new();
        gen.push(PromptKind::DecideToTalk, "no");
        let p = Prompt::new(PromptKind::DecideToTalk, "x");
        assert_eq!(gen.generate(&p).unwrap(), "no");
        assert_eq!(gen.generate(&p).unwrap(), "yes");
        assert_eq!(gen.call_count(PromptKind::DecideToTalk), 2);
    }

    #[test]
    fn test_fail_and_recover() {
        let gen = ScriptedGenerator::new();
        gen.fail(PromptKind::Poignancy);
        let p = Prompt::new(PromptKind::Poignancy, "x").with_focus(["reading"]);
        assert!(gen.generate(&p).is_err());
        gen.recover(PromptKind::Poignancy);
        assert!(gen.generate(&p).is_ok());
    }

    #[test]
    fn test_clones_share_script() {
        let gen = ScriptedGenerator::new();
        let handle = gen.clone();
        gen.generate(&Prompt::new(PromptKind::ActionEmoji, "x")).unwrap();
        assert_eq!(handle.calls().len(), 1);
    }
}
