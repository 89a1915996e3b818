//! Scratch (working memory)
//!
//! Short-term state an agent carries between steps: the current action,
//! today's plan, the reflection counter and conversation links.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use town_events::{Coord, SimTime, MINUTES_PER_DAY};

use super::address::Address;
use super::agent::{AgentId, CognitiveParams};
use super::memory::Triple;

/// Activity used to pad a plan out to the end of the day.
pub const SLEEPING: &str = "sleeping";

/// True for activities that should never be decomposed or interrupted.
pub fn is_sleep_activity(description: &str) -> bool {
    let d = description.to_lowercase();
    d.contains("sleep") || d.contains("asleep") || d.contains("in bed")
}

/// Where the current action happens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionTarget {
    Place { address: Address },
    Conversation { partner: AgentId },
    Waiting { tile: Coord },
}

/// Event annotated on the object an agent is using.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectEvent {
    pub address: Address,
    pub triple: Triple,
    pub description: String,
}

/// What the agent is doing right now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentAction {
    pub target: Option<ActionTarget>,
    pub start: SimTime,
    pub duration_minutes: u32,
    pub description: String,
    #[serde(default)]
    pub emoji: String,
    pub event: Triple,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_event: Option<ObjectEvent>,
    /// Tiles still to walk, next tile first.
    #[serde(default)]
    pub planned_path: Vec<Coord>,
}

impl Default for CurrentAction {
    fn default() -> Self {
        Self {
            target: None,
            start: SimTime::default(),
            duration_minutes: 0,
            description: String::new(),
            emoji: String::new(),
            event: Triple::new("", "", ""),
            object_event: None,
            planned_path: Vec::new(),
        }
    }
}

impl CurrentAction {
    pub fn is_set(&self) -> bool {
        !self.description.is_empty()
    }

    pub fn end_time(&self) -> SimTime {
        self.start.plus_minutes(u64::from(self.duration_minutes))
    }

    pub fn is_finished(&self, now: SimTime) -> bool {
        !self.is_set() || now >= self.end_time()
    }

    pub fn remaining_minutes(&self, now: SimTime) -> u32 {
        self.end_time().minutes_since(now) as u32
    }

    pub fn is_sleeping(&self) -> bool {
        is_sleep_activity(&self.description)
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self.target, Some(ActionTarget::Waiting { .. }))
    }

    pub fn chatting_with(&self) -> Option<&AgentId> {
        match &self.target {
            Some(ActionTarget::Conversation { partner }) => Some(partner),
            _ => None,
        }
    }

    pub fn place(&self) -> Option<&Address> {
        match &self.target {
            Some(ActionTarget::Place { address }) => Some(address),
            _ => None,
        }
    }

    /// Public description, "idle" when nothing is set.
    pub fn public_description(&self) -> &str {
        if self.is_set() {
            &self.description
        } else {
            "idle"
        }
    }

    /// Ends the action at `now` so the next step plans afresh.
    pub fn finish_at(&mut self, now: SimTime) {
        self.duration_minutes = now.minutes_since(self.start) as u32;
        self.planned_path.clear();
    }
}

/// One entry of a daily plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub description: String,
    pub duration_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    /// 0 for hourly entries, +1 for each decomposition.
    #[serde(default)]
    pub depth: u8,
}

impl PlanStep {
    pub fn new(description: impl Into<String>, duration_minutes: u32) -> Self {
        Self {
            description: description.into(),
            duration_minutes,
            address: None,
            depth: 0,
        }
    }

    pub fn at_depth(mut self, depth: u8) -> Self {
        self.depth = depth;
        self
    }
}

/// Today's schedule. Start times derive from cumulative durations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyPlan {
    pub steps: Vec<PlanStep>,
    /// The hourly schedule before any decomposition or reaction.
    pub hourly: Vec<PlanStep>,
}

impl DailyPlan {
    /// Builds a plan from an hourly schedule, padded to a full day.
    pub fn new(hourly: Vec<PlanStep>) -> Self {
        let mut plan = Self {
            steps: hourly,
            hourly: Vec::new(),
        };
        plan.pad_to_day();
        plan.hourly = plan.steps.clone();
        plan
    }

    /// Merges consecutive identical hourly activities into longer steps.
    pub fn from_hourly_activities(activities: &[String]) -> Self {
        let mut steps: Vec<PlanStep> = Vec::new();
        for activity in activities {
            match steps.last_mut() {
                Some(last) if last.description == *activity => last.duration_minutes += 60,
                _ => steps.push(PlanStep::new(activity.clone(), 60)),
            }
        }
        Self::new(steps)
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn total_minutes(&self) -> u32 {
        self.steps.iter().map(|s| s.duration_minutes).sum()
    }

    /// Appends a sleeping step so the plan covers the whole day.
    pub fn pad_to_day(&mut self) {
        let total = self.total_minutes();
        if total < MINUTES_PER_DAY {
            self.steps.push(PlanStep::new(SLEEPING, MINUTES_PER_DAY - total));
        }
    }

    /// Index of the step active at `minute` past midnight.
    pub fn index_at(&self, minute: u32) -> Option<usize> {
        let mut elapsed = 0;
        for (i, step) in self.steps.iter().enumerate() {
            elapsed += step.duration_minutes;
            if minute < elapsed {
                return Some(i);
            }
        }
        None
    }

    pub fn step_at(&self, minute: u32) -> Option<&PlanStep> {
        self.index_at(minute).map(|i| &self.steps[i])
    }

    pub fn start_of(&self, index: usize) -> u32 {
        self.steps[..index.min(self.steps.len())]
            .iter()
            .map(|s| s.duration_minutes)
            .sum()
    }

    pub fn end_of(&self, index: usize) -> u32 {
        self.start_of(index) + self.steps.get(index).map_or(0, |s| s.duration_minutes)
    }

    /// Replaces one step with finer sub-steps in place.
    pub fn replace_with(&mut self, index: usize, subs: Vec<PlanStep>) {
        if index < self.steps.len() && !subs.is_empty() {
            self.steps.splice(index..=index, subs);
        }
    }

    /// Replaces the rest of the step active at `minute` with `reaction`.
    ///
    /// The elapsed part of the interrupted step is kept; any overflow of the
    /// reaction eats into the steps after it.
    pub fn insert_reaction(&mut self, minute: u32, reaction: PlanStep) {
        let Some(index) = self.index_at(minute) else {
            self.steps.push(reaction);
            return;
        };
        let start = self.start_of(index);
        let elapsed = minute - start;

        let mut rebuilt: Vec<PlanStep> = self.steps[..index].to_vec();
        if elapsed > 0 {
            let mut head = self.steps[index].clone();
            head.duration_minutes = elapsed;
            rebuilt.push(head);
        }

        let remaining_in_step = self.steps[index].duration_minutes - elapsed;
        let mut overflow = reaction.duration_minutes.saturating_sub(remaining_in_step);
        let shortfall = remaining_in_step.saturating_sub(reaction.duration_minutes);
        let depth = self.steps[index].depth;
        rebuilt.push(reaction.at_depth(depth));
        if shortfall > 0 {
            let mut tail = self.steps[index].clone();
            tail.duration_minutes = shortfall;
            rebuilt.push(tail);
        }

        for step in &self.steps[index + 1..] {
            if overflow >= step.duration_minutes {
                overflow -= step.duration_minutes;
                continue;
            }
            let mut kept = step.clone();
            kept.duration_minutes -= overflow;
            overflow = 0;
            rebuilt.push(kept);
        }
        self.steps = rebuilt;
    }

    /// Cuts the step active at `minute` short; the next step starts now.
    pub fn end_active_at(&mut self, minute: u32) {
        let Some(index) = self.index_at(minute) else {
            return;
        };
        let cut = self.end_of(index) - minute;
        if cut == 0 {
            return;
        }
        self.steps[index].duration_minutes -= cut;
        match self.steps.get_mut(index + 1) {
            Some(next) => next.duration_minutes += cut,
            None => self.steps.push(PlanStep::new(SLEEPING, cut)),
        }
        if self.steps[index].duration_minutes == 0 {
            self.steps.remove(index);
        }
    }

    /// Compact "HH:MM description" listing for prompts.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let mut start = 0;
        for step in &self.steps {
            out.push_str(&format!(
                "{:02}:{:02} {} ({} min)\n",
                start / 60,
                start % 60,
                step.description,
                step.duration_minutes
            ));
            start += step.duration_minutes;
        }
        out
    }
}

/// Accumulated poignancy since the last reflection, counting down from `max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImportanceCounter {
    pub max: f32,
    pub curr: f32,
    pub since_reflection: u32,
}

impl ImportanceCounter {
    pub fn new(max: f32) -> Self {
        Self {
            max,
            curr: max,
            since_reflection: 0,
        }
    }

    pub fn record(&mut self, poignancy: f32) {
        self.curr -= poignancy;
        self.since_reflection += 1;
    }

    pub fn is_due(&self) -> bool {
        self.curr <= 0.0
    }

    pub fn reset(&mut self) {
        self.curr = self.max;
        self.since_reflection = 0;
    }
}

/// Component: an agent's working memory.
#[derive(Component, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scratch {
    pub params: CognitiveParams,
    pub tile: Coord,
    #[serde(default)]
    pub wake_hour: Option<u32>,
    #[serde(default)]
    pub daily_requirements: Vec<String>,
    #[serde(default)]
    pub plan: DailyPlan,
    /// Day number the plan was made for.
    #[serde(default)]
    pub plan_day: Option<u32>,
    #[serde(default)]
    pub action: CurrentAction,
    pub importance: ImportanceCounter,
    #[serde(default)]
    pub conversation: Option<u64>,
    /// Partner id to steps left before another chat is allowed.
    #[serde(default)]
    pub chat_cooldown: BTreeMap<String, u32>,
    #[serde(default)]
    pub last_daily_reflection: Option<u32>,
}

impl Scratch {
    pub fn new(params: CognitiveParams, tile: Coord) -> Self {
        Self {
            params,
            tile,
            wake_hour: None,
            daily_requirements: Vec::new(),
            plan: DailyPlan::default(),
            plan_day: None,
            action: CurrentAction::default(),
            importance: ImportanceCounter::new(params.importance_trigger_max),
            conversation: None,
            chat_cooldown: BTreeMap::new(),
            last_daily_reflection: None,
        }
    }

    pub fn needs_daily_plan(&self, now: SimTime) -> bool {
        self.plan_day != Some(now.day()) || self.plan.is_empty()
    }

    pub fn chat_blocked_with(&self, partner: &str) -> bool {
        self.chat_cooldown.get(partner).is_some_and(|steps| *steps > 0)
    }

    pub fn start_cooldown(&mut self, partner: &str, steps: u32) {
        if steps > 0 {
            self.chat_cooldown.insert(partner.to_string(), steps);
        }
    }

    /// Counts every cooldown down by one step.
    pub fn tick_cooldowns(&mut self) {
        self.chat_cooldown.retain(|_, steps| {
            *steps = steps.saturating_sub(1);
            *steps > 0
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(steps: &[(&str, u32)]) -> DailyPlan {
        DailyPlan::new(steps.iter().map(|(d, m)| PlanStep::new(*d, *m)).collect())
    }

    fn layout(plan: &DailyPlan) -> Vec<(String, u32)> {
        plan.steps
            .iter()
            .map(|s| (s.description.clone(), s.duration_minutes))
            .collect()
    }

    #[test]
    fn test_plan_padded_to_full_day() {
        let p = plan(&[("sleeping", 420), ("breakfast", 60)]);
        assert_eq!(p.total_minutes(), MINUTES_PER_DAY);
        assert_eq!(p.steps.last().unwrap().description, SLEEPING);
        assert_eq!(p.hourly, p.steps);
    }

    #[test]
    fn test_from_hourly_compresses_repeats() {
        let acts: Vec<String> = ["sleeping", "sleeping", "work", "work", "work", "lunch"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let p = DailyPlan::from_hourly_activities(&acts);
        assert_eq!(p.steps[0].duration_minutes, 120);
        assert_eq!(p.steps[1].duration_minutes, 180);
        assert_eq!(p.steps[2].description, "lunch");
        assert_eq!(p.total_minutes(), MINUTES_PER_DAY);
    }

    #[test]
    fn test_exactly_one_active_step_per_minute() {
        let p = plan(&[("sleeping", 420), ("breakfast", 45), ("work", 300)]);
        for minute in 0..MINUTES_PER_DAY {
            assert!(p.index_at(minute).is_some());
        }
        assert_eq!(p.index_at(419), Some(0));
        assert_eq!(p.index_at(420), Some(1));
        assert_eq!(p.index_at(465), Some(2));
        assert_eq!(p.index_at(MINUTES_PER_DAY), None);
    }

    #[test]
    fn test_replace_with_keeps_total() {
        let mut p = plan(&[("sleeping", 420), ("work", 120)]);
        p.replace_with(
            1,
            vec![
                PlanStep::new("check email", 30).at_depth(1),
                PlanStep::new("write report", 90).at_depth(1),
            ],
        );
        assert_eq!(p.total_minutes(), MINUTES_PER_DAY);
        assert_eq!(p.step_at(450).unwrap().description, "write report");
        assert_eq!(p.hourly[1].description, "work");
    }

    #[test]
    fn test_insert_reaction_replaces_remainder() {
        let mut p = plan(&[("sleeping", 420), ("work", 120), ("lunch", 60)]);
        p.insert_reaction(450, PlanStep::new("chat with bo", 90));
        assert_eq!(
            layout(&p)[..4],
            [
                ("sleeping".to_string(), 420),
                ("work".to_string(), 30),
                ("chat with bo".to_string(), 90),
                ("lunch".to_string(), 60),
            ]
        );
        assert_eq!(p.total_minutes(), MINUTES_PER_DAY);
    }

    #[test]
    fn test_insert_reaction_overflow_eats_next_steps() {
        let mut p = plan(&[("sleeping", 420), ("work", 60), ("lunch", 60)]);
        p.insert_reaction(420, PlanStep::new("wait", 90));
        assert_eq!(layout(&p)[1], ("wait".to_string(), 90));
        assert_eq!(layout(&p)[2], ("lunch".to_string(), 30));
        assert_eq!(p.total_minutes(), MINUTES_PER_DAY);
    }

    #[test]
    fn test_short_reaction_keeps_tail() {
        let mut p = plan(&[("sleeping", 420), ("work", 120)]);
        p.insert_reaction(420, PlanStep::new("wait", 20));
        assert_eq!(layout(&p)[1], ("wait".to_string(), 20));
        assert_eq!(layout(&p)[2], ("work".to_string(), 100));
        assert_eq!(p.total_minutes(), MINUTES_PER_DAY);
    }

    #[test]
    fn test_end_active_at_hands_time_to_next() {
        let mut p = plan(&[("sleeping", 420), ("chat", 60), ("work", 60)]);
        p.end_active_at(430);
        assert_eq!(layout(&p)[1], ("chat".to_string(), 10));
        assert_eq!(layout(&p)[2], ("work".to_string(), 110));
        assert_eq!(p.step_at(430).unwrap().description, "work");
    }

    #[test]
    fn test_action_finish() {
        let start = SimTime::new(1, 9, 0);
        let mut action = CurrentAction {
            start,
            duration_minutes: 30,
            description: "reading".into(),
            ..CurrentAction::default()
        };
        assert!(!action.is_finished(start.plus_minutes(10)));
        assert!(action.is_finished(start.plus_minutes(30)));
        action.finish_at(start.plus_minutes(10));
        assert!(action.is_finished(start.plus_minutes(10)));
        assert!(CurrentAction::default().is_finished(start));
    }

    #[test]
    fn test_importance_counter() {
        let mut c = ImportanceCounter::new(150.0);
        for p in [1.0, 1.0, 1.0, 150.0] {
            c.record(p);
        }
        assert!(c.is_due());
        assert_eq!(c.since_reflection, 4);
        c.reset();
        assert_eq!(c.curr, 150.0);
        assert!(!c.is_due());
    }

    #[test]
    fn test_cooldowns_tick_down() {
        let mut s = Scratch::new(CognitiveParams::default(), Coord::new(0, 0));
        s.start_cooldown("bo", 2);
        assert!(s.chat_blocked_with("bo"));
        s.tick_cooldowns();
        assert!(s.chat_blocked_with("bo"));
        s.tick_cooldowns();
        assert!(!s.chat_blocked_with("bo"));
        assert!(s.chat_cooldown.is_empty());
    }
}
