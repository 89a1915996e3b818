//! Offline capabilities.
//!
//! A deterministic rule-based generator and a feature-hashing embedder, so the
//! simulation runs without any external service. Output depends only on the
//! prompt, which keeps whole runs reproducible.

use super::{Embedder, Generator, Prompt, PromptKind};
use crate::error::GenerationError;

/// FNV-1a, stable across platforms and releases.
fn fnv1a(text: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in text.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

fn overlap(option: &str, text: &str) -> usize {
    let words: Vec<String> = tokens(text).collect();
    tokens(option).filter(|t| words.contains(t)).count()
}

/// Rule-based stand-in for a language model.
#[derive(Debug, Clone, Default)]
pub struct OfflineGenerator;

impl OfflineGenerator {
    pub fn new() -> Self {
        Self
    }

    fn schedule(wake_hour: u32) -> String {
        (0..24)
            .map(|hour| {
                let activity = match hour {
                    h if h < wake_hour || h >= 23 => "sleeping",
                    h if h == wake_hour => "waking up and completing the morning routine",
                    h if h == wake_hour + 1 => "eating breakfast",
                    12 => "having lunch",
                    18 => "having dinner",
                    h if h >= 20 => "relaxing at home",
                    h if h >= 19 => "chatting with neighbors",
                    _ => "working on the day's tasks",
                };
                format!("{:02}:00 {}", hour, activity)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Option sharing the most words with the activity, else the preferred
    /// option, else the first.
    fn choose(prompt: &Prompt) -> String {
        let options = prompt.options();
        let activity = prompt.focus_at(0);
        let preferred = prompt.focus_at(1);
        let best = options
            .iter()
            .map(|o| (overlap(o, activity), o))
            .filter(|(score, _)| *score > 0)
            .max_by(|(a, oa), (b, ob)| a.cmp(b).then(ob.cmp(oa)))
            .map(|(_, o)| o.clone());
        best.or_else(|| options.iter().find(|o| o.as_str() == preferred).cloned())
            .or_else(|| options.first().cloned())
            .unwrap_or_default()
    }

    fn emoji(description: &str) -> &'static str {
        let d = description.to_lowercase();
        if d.contains("sleep") {
            "😴"
        } else if d.contains("breakfast") || d.contains("lunch") || d.contains("dinner") || d.contains("eat") {
            "🍽️"
        } else if d.contains("convers") || d.contains("chat") {
            "💬"
        } else if d.contains("work") {
            "💼"
        } else if d.contains("read") {
            "📖"
        } else if d.contains("wait") {
            "⌛"
        } else {
            "🙂"
        }
    }

    fn poignancy(description: &str) -> u32 {
        let d = description.to_lowercase();
        if d.contains("idle") || d.contains("sleep") {
            1
        } else if d.contains("convers") || d.contains("chat") || d.contains("party") {
            4
        } else {
            2 + (fnv1a(&d) % 3) as u32
        }
    }

    fn utterance(prompt: &Prompt) -> String {
        let partner = prompt.focus_at(1);
        let turn: usize = prompt.focus_at(2).parse().unwrap_or(0);
        let first = partner.split_whitespace().next().unwrap_or(partner);
        match turn {
            0 => format!("Hi {}, how is your day going?", first),
            1 => "Pretty good, thanks! Busy as usual.".to_string(),
            2 => "Glad to hear it. I should get going soon.".to_string(),
            _ => format!("See you later, {}! {}", first, super::prompts::END_MARKER),
        }
    }
}

impl Generator for OfflineGenerator {
    fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        let name = prompt.focus_at(0);
        let output = match prompt.kind {
            PromptKind::WakeUpHour => (6 + fnv1a(name) % 3).to_string(),
            PromptKind::DailyRequirements => [
                "wake up and complete the morning routine",
                "work on the day's tasks",
                "have meals at the usual times",
                "catch up with neighbors",
            ]
            .join("\n"),
            PromptKind::HourlySchedule => {
                let wake: u32 = prompt.focus_at(1).parse().unwrap_or(7);
                Self::schedule(wake)
            }
            PromptKind::TaskDecomposition => {
                let activity = prompt.focus_at(0);
                format!(
                    "getting ready for {} | 1\n{} | 4\nwrapping up {} | 1",
                    activity, activity, activity
                )
            }
            PromptKind::ActionSector | PromptKind::ActionArena | PromptKind::ActionObject => {
                Self::choose(prompt)
            }
            PromptKind::ActionEmoji => Self::emoji(name).to_string(),
            PromptKind::EventTriple => {
                format!("{} | is | {}", prompt.focus_at(0), prompt.focus_at(1))
            }
            PromptKind::Poignancy => Self::poignancy(name).to_string(),
            PromptKind::DecideToTalk => "yes".to_string(),
            PromptKind::DecideToReact => "continue".to_string(),
            PromptKind::Utterance => Self::utterance(prompt),
            PromptKind::ConversationSummary => {
                format!("{} chatted with {} about their day", name, prompt.focus_at(1))
            }
            PromptKind::Insights => {
                let count: usize = prompt.focus_at(1).parse().unwrap_or(0);
                let cited: Vec<String> = (1..=count.min(3)).map(|i| i.to_string()).collect();
                format!(
                    "{} keeps a steady daily routine (because of {})",
                    name,
                    cited.join(", ")
                )
            }
            PromptKind::PlanningThought => {
                format!("{} should keep in touch with {}", name, prompt.focus_at(1))
            }
            PromptKind::ConversationMemo => {
                format!("{} enjoyed talking with {}", name, prompt.focus_at(1))
            }
            PromptKind::IdentityRevision => {
                if name.is_empty() {
                    format!("{} is going about the usual routine", prompt.focus_at(1))
                } else {
                    name.to_string()
                }
            }
            PromptKind::WhisperThought => name.to_string(),
        };
        Ok(output)
    }
}

/// Bag-of-words feature hashing into a fixed number of dimensions.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    pub dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self { dimensions: 64 }
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, GenerationError> {
        if self.dimensions == 0 {
            return Err(GenerationError::Unavailable("zero-dimension embedder".into()));
        }
        let mut vector = vec![0.0f32; self.dimensions];
        for token in tokens(text) {
            let hash = fnv1a(&token);
            let slot = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::prompts;
    use crate::scoring::cosine_similarity;

    #[test]
    fn test_schedule_has_24_hours() {
        let out = OfflineGenerator::schedule(7);
        let parsed = prompts::parse_schedule(&out).unwrap();
        assert_eq!(parsed.len(), 24);
        assert_eq!(parsed[6], "sleeping");
        assert_eq!(parsed[7], "waking up and completing the morning routine");
        assert_eq!(parsed[23], "sleeping");
    }

    #[test]
    fn test_choose_prefers_overlap_then_preferred() {
        let options = vec!["Hobbs Cafe".to_string(), "Lin House".to_string()];
        let p = Prompt::new(PromptKind::ActionSector, "")
            .with_focus(["getting coffee at the cafe", "Lin House"])
            .one_of(options.clone());
        assert_eq!(OfflineGenerator::choose(&p), "Hobbs Cafe");

        let p = Prompt::new(PromptKind::ActionSector, "")
            .with_focus(["sleeping", "Lin House"])
            .one_of(options);
        assert_eq!(OfflineGenerator::choose(&p), "Lin House");
    }

    #[test]
    fn test_generation_is_deterministic() {
        let gen = OfflineGenerator::new();
        let p = Prompt::new(PromptKind::WakeUpHour, "x").with_focus(["Ada Lin"]);
        assert_eq!(gen.generate(&p).unwrap(), gen.generate(&p).unwrap());
        let hour: u32 = gen.generate(&p).unwrap().parse().unwrap();
        assert!((6..=8).contains(&hour));
    }

    #[test]
    fn test_utterance_ends_after_four_turns() {
        let gen = OfflineGenerator::new();
        let p = Prompt::new(PromptKind::Utterance, "").with_focus(["Ada", "Bo Chen", "3"]);
        let (_, ended) = prompts::parse_utterance(&gen.generate(&p).unwrap()).unwrap();
        assert!(ended);
        let p = Prompt::new(PromptKind::Utterance, "").with_focus(["Ada", "Bo Chen", "0"]);
        let (text, ended) = prompts::parse_utterance(&gen.generate(&p).unwrap()).unwrap();
        assert!(!ended);
        assert!(text.contains("Bo"));
    }

    #[test]
    fn test_hashing_embedder_similarity() {
        let emb = HashingEmbedder::default();
        let a = emb.embed("Isabella is brewing coffee").unwrap();
        let b = emb.embed("isabella brewing coffee").unwrap();
        let c = emb.embed("Klaus reads a research paper").unwrap();
        assert_eq!(a.len(), 64);
        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
    }
}
