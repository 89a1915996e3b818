//! Prompt templates and output parsers.
//!
//! Templates are deliberately small; each returns a `Prompt` whose `focus`
//! carries the template arguments in order.

use super::{Prompt, PromptKind};
use crate::components::{Persona, Triple};

fn header(persona: &Persona) -> String {
    persona.identity()
}

fn numbered(statements: &[String]) -> String {
    statements
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}\n", i + 1, s))
        .collect()
}

pub fn wake_up_hour(persona: &Persona) -> Prompt {
    let text = format!(
        "{}\nIn an hour from 0 to 23, when does {} wake up today? Answer with the hour only.",
        header(persona),
        persona.first_name()
    );
    Prompt::new(PromptKind::WakeUpHour, text).with_focus([persona.name.as_str()])
}

pub fn daily_requirements(persona: &Persona, wake_hour: u32, day: u32) -> Prompt {
    let text = format!(
        "{}\nToday is day {}. {} wakes up at {}:00.\nList {}'s broad goals for today, one per line.",
        header(persona),
        day,
        persona.first_name(),
        wake_hour,
        persona.first_name()
    );
    Prompt::new(PromptKind::DailyRequirements, text)
        .with_focus([persona.name.clone(), wake_hour.to_string()])
}

pub fn hourly_schedule(persona: &Persona, requirements: &[String], wake_hour: u32) -> Prompt {
    let text = format!(
        "{}\nDaily goals:\n{}\nWrite {}'s activity for each hour from 00:00 to 23:00, one line per hour, \
         formatted \"HH:00 activity\". Before {}:00 the activity is sleeping.",
        header(persona),
        numbered(requirements),
        persona.first_name(),
        wake_hour
    );
    Prompt::new(PromptKind::HourlySchedule, text)
        .with_focus([persona.name.clone(), wake_hour.to_string()])
}

pub fn task_decomposition(persona: &Persona, description: &str, start: &str, minutes: u32) -> Prompt {
    let text = format!(
        "{}\nAt {} {} starts \"{}\" for {} minutes.\nBreak it into smaller subtasks, one per line, \
         formatted \"subtask | minutes\". The minutes must add up to {}.",
        header(persona),
        start,
        persona.first_name(),
        description,
        minutes,
        minutes
    );
    Prompt::new(PromptKind::TaskDecomposition, text)
        .with_focus([description.to_string(), minutes.to_string()])
}

/// Sector, arena or object choice for an activity.
pub fn action_location(
    kind: PromptKind,
    persona: &Persona,
    description: &str,
    within: &str,
    options: Vec<String>,
    preferred: &str,
) -> Prompt {
    let level = match kind {
        PromptKind::ActionSector => "area",
        PromptKind::ActionArena => "room",
        _ => "object",
    };
    let text = format!(
        "{}\n{} is going to be {}.\nInside {}, which {} should {} use? Options: {}.\n\
         Answer with one option exactly.",
        header(persona),
        persona.first_name(),
        description,
        within,
        level,
        persona.first_name(),
        options.join(", ")
    );
    Prompt::new(kind, text)
        .with_focus([description.to_string(), preferred.to_string()])
        .one_of(options)
}

pub fn action_emoji(description: &str) -> Prompt {
    let text = format!("Give one or two emoji that represent \"{}\".", description);
    Prompt::new(PromptKind::ActionEmoji, text).with_focus([description])
}

pub fn event_triple(subject: &str, description: &str) -> Prompt {
    let text = format!(
        "Convert the activity into (subject | predicate | object).\nActivity: {} is {}\nAnswer: {} |",
        subject, description, subject
    );
    Prompt::new(PromptKind::EventTriple, text).with_focus([subject, description])
}

/// Importance rating of an event, chat or thought on a 1-10 scale.
pub fn poignancy(persona: &Persona, what: &str, description: &str) -> Prompt {
    let text = format!(
        "{}\nOn a scale of 1 (mundane, e.g. brushing teeth) to 10 (extremely poignant, e.g. a breakup), \
         rate how poignant this {} is for {}:\n{}\nRating:",
        header(persona),
        what,
        persona.first_name(),
        description
    );
    Prompt::new(PromptKind::Poignancy, text).with_focus([description, what])
}

pub fn decide_to_talk(
    persona: &Persona,
    target_name: &str,
    target_activity: &str,
    own_activity: &str,
    context: &[String],
) -> Prompt {
    let text = format!(
        "{}\nContext:\n{}\n{} is {}. {} sees {}, who is {}.\nShould {} start a conversation with {}? \
         Answer yes or no.",
        header(persona),
        numbered(context),
        persona.first_name(),
        own_activity,
        persona.first_name(),
        target_name,
        target_activity,
        persona.first_name(),
        target_name
    );
    Prompt::new(PromptKind::DecideToTalk, text)
        .with_focus([persona.name.as_str(), target_name, target_activity])
        .one_of(vec!["yes".into(), "no".into()])
}

pub fn decide_to_react(
    persona: &Persona,
    target_name: &str,
    target_activity: &str,
    own_activity: &str,
) -> Prompt {
    let text = format!(
        "{}\n{} is on the way to {}. {} is already there, {}.\nShould {} wait for {} to finish, \
         or continue? Answer wait or continue.",
        header(persona),
        persona.first_name(),
        own_activity,
        target_name,
        target_activity,
        persona.first_name(),
        target_name
    );
    Prompt::new(PromptKind::DecideToReact, text)
        .with_focus([persona.name.as_str(), target_name, target_activity])
        .one_of(vec!["wait".into(), "continue".into()])
}

/// Marker a speaker appends to end the conversation.
pub const END_MARKER: &str = "[END]";

pub fn utterance(
    persona: &Persona,
    partner_name: &str,
    context: &[String],
    transcript: &[String],
) -> Prompt {
    let history = if transcript.is_empty() {
        "(nothing said yet)\n".to_string()
    } else {
        transcript.iter().map(|l| format!("- {}\n", l)).collect()
    };
    let text = format!(
        "{}\nWhat {} remembers about {}:\n{}\nConversation so far:\n{}\nWrite {}'s next line. \
         Append {} if the conversation should end.",
        header(persona),
        persona.first_name(),
        partner_name,
        numbered(context),
        history,
        persona.first_name(),
        END_MARKER
    );
    Prompt::new(PromptKind::Utterance, text).with_focus([
        persona.name.clone(),
        partner_name.to_string(),
        transcript.len().to_string(),
    ])
}

pub fn conversation_summary(persona: &Persona, partner_name: &str, transcript: &[String]) -> Prompt {
    let text = format!(
        "Conversation:\n{}\nSummarize in one sentence what {} and {} talked about.",
        transcript.join("\n"),
        persona.first_name(),
        partner_name
    );
    Prompt::new(PromptKind::ConversationSummary, text)
        .with_focus([persona.name.as_str(), partner_name])
}

pub fn planning_thought(persona: &Persona, partner_name: &str, transcript: &[String]) -> Prompt {
    let text = format!(
        "Conversation:\n{}\nWrite what {} should remember from this conversation with {} for planning, \
         from {}'s perspective, in one sentence.",
        transcript.join("\n"),
        persona.first_name(),
        partner_name,
        persona.first_name()
    );
    Prompt::new(PromptKind::PlanningThought, text).with_focus([persona.name.as_str(), partner_name])
}

pub fn conversation_memo(persona: &Persona, partner_name: &str, transcript: &[String]) -> Prompt {
    let text = format!(
        "Conversation:\n{}\nWrite {}'s one-sentence impression of the conversation with {}.",
        transcript.join("\n"),
        persona.first_name(),
        partner_name
    );
    Prompt::new(PromptKind::ConversationMemo, text).with_focus([persona.name.as_str(), partner_name])
}

pub fn insights(persona: &Persona, statements: &[String]) -> Prompt {
    let text = format!(
        "{}\nStatements:\n{}\nWhat high-level insights can {} infer? One per line, formatted \
         \"insight (because of 1, 3)\".",
        header(persona),
        numbered(statements),
        persona.first_name()
    );
    Prompt::new(PromptKind::Insights, text)
        .with_focus([persona.name.clone(), statements.len().to_string()])
}

pub fn identity_revision(persona: &Persona, statements: &[String]) -> Prompt {
    let text = format!(
        "{}\nRecent memories:\n{}\nWrite one sentence describing {}'s current status and concerns.",
        header(persona),
        numbered(statements),
        persona.first_name()
    );
    Prompt::new(PromptKind::IdentityRevision, text)
        .with_focus([persona.currently.as_str(), persona.name.as_str()])
}

pub fn whisper_thought(persona: &Persona, whisper: &str) -> Prompt {
    let text = format!(
        "{}\nTranslate this statement into {}'s own inner thought, one sentence:\n{}",
        header(persona),
        persona.first_name(),
        whisper
    );
    Prompt::new(PromptKind::WhisperThought, text).with_focus([whisper])
}

// Parsers

/// Strips bullets and enumeration from each line, dropping empty lines.
pub fn parse_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .map(|line| {
            let t = line.trim();
            let t = t
                .trim_start_matches(|c: char| c == '-' || c == '*' || c == '•')
                .trim_start();
            let digits = t.chars().take_while(|c| c.is_ascii_digit()).count();
            let rest = &t[digits..];
            if digits > 0 && (rest.starts_with(". ") || rest.starts_with(") ")) {
                rest[2..].trim().to_string()
            } else {
                t.to_string()
            }
        })
        .filter(|l| !l.is_empty())
        .collect()
}

/// First whole number in the text.
pub fn first_number(output: &str) -> Option<u32> {
    let start = output.find(|c: char| c.is_ascii_digit())?;
    let digits: String = output[start..].chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// An hour 0..=23; "7pm" style answers are converted.
pub fn parse_hour(output: &str) -> Option<u32> {
    let hour = first_number(output)?;
    let lower = output.to_lowercase();
    let hour = if lower.contains("pm") && hour < 12 { hour + 12 } else { hour };
    (hour < 24).then_some(hour)
}

/// A rating clamped to 1..=10.
pub fn parse_poignancy(output: &str) -> Option<f32> {
    first_number(output).map(|n| n.clamp(1, 10) as f32)
}

/// One activity per line, with any "HH:MM" prefix removed.
pub fn parse_schedule(output: &str) -> Option<Vec<String>> {
    let activities: Vec<String> = parse_lines(output)
        .into_iter()
        .map(|line| {
            let mut parts = line.splitn(2, char::is_whitespace);
            let first = parts.next().unwrap_or("");
            let is_clock =
                first.contains(':') && first.chars().all(|c| c.is_ascii_digit() || c == ':');
            if is_clock {
                parts.next().unwrap_or("").trim().to_string()
            } else {
                line.clone()
            }
        })
        .filter(|a| !a.is_empty())
        .collect();
    (!activities.is_empty()).then_some(activities)
}

/// "subtask | minutes" lines.
pub fn parse_decomposition(output: &str) -> Option<Vec<(String, u32)>> {
    let mut tasks = Vec::new();
    for line in parse_lines(output) {
        let (description, minutes) = line.rsplit_once('|')?;
        let minutes = first_number(minutes)?;
        let description = description.trim();
        if description.is_empty() || minutes == 0 {
            return None;
        }
        tasks.push((description.to_string(), minutes));
    }
    (!tasks.is_empty()).then_some(tasks)
}

/// Scales durations so they add up to `total`, keeping at least a minute each.
pub fn fit_durations(tasks: Vec<(String, u32)>, total: u32) -> Vec<(String, u32)> {
    let tasks: Vec<(String, u32)> = tasks.into_iter().take(total.max(1) as usize).collect();
    let sum: u32 = tasks.iter().map(|(_, m)| *m).sum();
    if sum == 0 || tasks.is_empty() {
        return tasks;
    }
    let mut fitted: Vec<(String, u32)> = tasks
        .into_iter()
        .map(|(d, m)| {
            let scaled = (u64::from(m) * u64::from(total) / u64::from(sum)) as u32;
            (d, scaled.max(1))
        })
        .collect();
    let mut assigned: u32 = fitted.iter().map(|(_, m)| *m).sum();
    let mut i = fitted.len();
    while assigned > total && i > 0 {
        i -= 1;
        let give = (fitted[i].1 - 1).min(assigned - total);
        fitted[i].1 -= give;
        assigned -= give;
    }
    if assigned < total {
        if let Some(last) = fitted.last_mut() {
            last.1 += total - assigned;
        }
    }
    fitted
}

/// "subject | predicate | object".
pub fn parse_triple(output: &str) -> Option<Triple> {
    let line = parse_lines(output).into_iter().next()?;
    let line = line.trim_matches(|c: char| c == '(' || c == ')');
    let parts: Vec<&str> = line.split('|').map(str::trim).collect();
    match parts.as_slice() {
        [s, p, o] if !s.is_empty() && !p.is_empty() && !o.is_empty() => Some(Triple::new(*s, *p, *o)),
        _ => None,
    }
}

/// A spoken line and whether the speaker ended the conversation.
pub fn parse_utterance(output: &str) -> Option<(String, bool)> {
    let trimmed = output.trim();
    let ended = trimmed.contains(END_MARKER);
    let text = trimmed.replace(END_MARKER, "").trim().trim_matches('"').trim().to_string();
    (!text.is_empty() || ended).then_some((text, ended))
}

/// "insight (because of 1, 3)" lines; evidence indices are 1-based.
pub fn parse_insights(output: &str, statement_count: usize) -> Option<Vec<(String, Vec<usize>)>> {
    let mut insights = Vec::new();
    for line in parse_lines(output) {
        let (text, evidence) = match line.rfind("(because of") {
            Some(at) => {
                let cited: Vec<usize> = line[at..]
                    .split(|c: char| !c.is_ascii_digit())
                    .filter_map(|n| n.parse::<usize>().ok())
                    .filter(|n| *n >= 1 && *n <= statement_count)
                    .map(|n| n - 1)
                    .collect();
                (line[..at].trim().to_string(), cited)
            }
            None => (line.trim().to_string(), Vec::new()),
        };
        if !text.is_empty() {
            insights.push((text, evidence));
        }
    }
    (!insights.is_empty()).then_some(insights)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lines_strips_bullets() {
        let lines = parse_lines("1. wake up\n- eat\n\n2) work\n* sleep");
        assert_eq!(lines, vec!["wake up", "eat", "work", "sleep"]);
    }

    #[test]
    fn test_parse_hour() {
        assert_eq!(parse_hour("7"), Some(7));
        assert_eq!(parse_hour("around 6am"), Some(6));
        assert_eq!(parse_hour("8 pm"), Some(20));
        assert_eq!(parse_hour("31"), None);
        assert_eq!(parse_hour("early"), None);
    }

    #[test]
    fn test_parse_poignancy_clamps() {
        assert_eq!(parse_poignancy("Rating: 7"), Some(7.0));
        assert_eq!(parse_poignancy("0"), Some(1.0));
        assert_eq!(parse_poignancy("42"), Some(10.0));
        assert_eq!(parse_poignancy("high"), None);
    }

    #[test]
    fn test_parse_schedule_drops_clock_prefix() {
        let acts = parse_schedule("00:00 sleeping\n07:00 eating breakfast\nwork").unwrap();
        assert_eq!(acts, vec!["sleeping", "eating breakfast", "work"]);
        assert!(parse_schedule("\n\n").is_none());
    }

    #[test]
    fn test_parse_decomposition() {
        let tasks = parse_decomposition("brew coffee | 10\nserve customers | 50 minutes").unwrap();
        assert_eq!(tasks, vec![("brew coffee".into(), 10), ("serve customers".into(), 50)]);
        assert!(parse_decomposition("brew coffee for a while").is_none());
    }

    #[test]
    fn test_fit_durations_matches_total() {
        let fitted = fit_durations(vec![("a".into(), 10), ("b".into(), 10), ("c".into(), 10)], 50);
        assert_eq!(fitted.iter().map(|(_, m)| m).sum::<u32>(), 50);
        assert!(fitted.iter().all(|(_, m)| *m >= 1));

        let shrunk = fit_durations(vec![("a".into(), 100), ("b".into(), 1)], 10);
        assert_eq!(shrunk.iter().map(|(_, m)| m).sum::<u32>(), 10);
        assert_eq!(shrunk[1].1, 1);
    }

    #[test]
    fn test_parse_triple() {
        let t = parse_triple("Isabella | is | brewing coffee").unwrap();
        assert_eq!(t, Triple::new("Isabella", "is", "brewing coffee"));
        assert!(parse_triple("Isabella brewing").is_none());
    }

    #[test]
    fn test_parse_utterance_end_marker() {
        assert_eq!(parse_utterance("Hi there!"), Some(("Hi there!".into(), false)));
        assert_eq!(parse_utterance("Bye! [END]"), Some(("Bye!".into(), true)));
        assert_eq!(parse_utterance("   "), None);
    }

    #[test]
    fn test_parse_insights_with_evidence() {
        let out = "Ada loves painting (because of 1, 3)\nAda is tired (because of 9)";
        let parsed = parse_insights(out, 3).unwrap();
        assert_eq!(parsed[0], ("Ada loves painting".into(), vec![0, 2]));
        assert_eq!(parsed[1], ("Ada is tired".into(), vec![]));
    }

    #[test]
    fn test_choice_prompts_carry_options() {
        let persona = Persona::new("Ada Lin", "town:Home".parse().unwrap());
        let p = decide_to_talk(&persona, "Bo", "reading", "walking", &[]);
        assert_eq!(p.options(), &["yes".to_string(), "no".to_string()]);
        assert_eq!(p.focus_at(1), "Bo");
    }
}
