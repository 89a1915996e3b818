//! Simulation Timestamp Types
//!
//! Handles simulated wall-clock time with both step-based and human-readable
//! formats.
//!
//! # Example
//!
//! ```
//! use town_events::{SimTime, SimTimestamp};
//!
//! let ts = SimTimestamp::new(12, SimTime::new(1, 8, 30));
//! assert_eq!(ts.step, 12);
//! assert_eq!(ts.time.to_string(), "day_1.08:30:00");
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Seconds in one simulated minute.
pub const SECONDS_PER_MINUTE: u64 = 60;

/// Minutes in one simulated day.
pub const MINUTES_PER_DAY: u32 = 1440;

/// Seconds in one simulated day.
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Simulated wall-clock time, stored as seconds since midnight of day 1.
///
/// Serializes to strings like "day_3.14:05:00".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimTime {
    seconds: u64,
}

impl SimTime {
    /// Creates a time on the given (1-based) day at hour:minute.
    pub fn new(day: u32, hour: u32, minute: u32) -> Self {
        let day = u64::from(day.max(1) - 1);
        Self {
            seconds: day * SECONDS_PER_DAY
                + u64::from(hour) * 3600
                + u64::from(minute) * SECONDS_PER_MINUTE,
        }
    }

    pub fn from_seconds(seconds: u64) -> Self {
        Self { seconds }
    }

    pub fn as_seconds(&self) -> u64 {
        self.seconds
    }

    /// Day number, starting at 1.
    pub fn day(&self) -> u32 {
        (self.seconds / SECONDS_PER_DAY) as u32 + 1
    }

    pub fn hour(&self) -> u32 {
        ((self.seconds % SECONDS_PER_DAY) / 3600) as u32
    }

    pub fn minute(&self) -> u32 {
        ((self.seconds % 3600) / SECONDS_PER_MINUTE) as u32
    }

    pub fn second(&self) -> u32 {
        (self.seconds % SECONDS_PER_MINUTE) as u32
    }

    /// Minutes elapsed since midnight of the current day.
    pub fn minute_of_day(&self) -> u32 {
        ((self.seconds % SECONDS_PER_DAY) / SECONDS_PER_MINUTE) as u32
    }

    /// Midnight of the current day.
    pub fn start_of_day(&self) -> Self {
        Self {
            seconds: self.seconds - self.seconds % SECONDS_PER_DAY,
        }
    }

    pub fn plus_seconds(self, seconds: u64) -> Self {
        Self {
            seconds: self.seconds + seconds,
        }
    }

    pub fn plus_minutes(self, minutes: u64) -> Self {
        self.plus_seconds(minutes * SECONDS_PER_MINUTE)
    }

    pub fn plus_days(self, days: u64) -> Self {
        self.plus_seconds(days * SECONDS_PER_DAY)
    }

    /// Whole minutes from `earlier` to `self`, zero if `earlier` is later.
    pub fn minutes_since(&self, earlier: SimTime) -> u64 {
        self.seconds.saturating_sub(earlier.seconds) / SECONDS_PER_MINUTE
    }

    /// Human-readable clock time, e.g. "08:30".
    pub fn clock_string(&self) -> String {
        format!("{:02}:{:02}", self.hour(), self.minute())
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "day_{}.{:02}:{:02}:{:02}",
            self.day(),
            self.hour(),
            self.minute(),
            self.second()
        )
    }
}

/// Error type for parsing SimTime from strings.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseTimeError {
    InvalidFormat(String),
    InvalidDay(String),
    InvalidClock(String),
}

impl fmt::Display for ParseTimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseTimeError::InvalidFormat(s) => {
                write!(f, "invalid time format: '{}', expected 'day_N.HH:MM:SS'", s)
            }
            ParseTimeError::InvalidDay(s) => write!(f, "invalid day: '{}'", s),
            ParseTimeError::InvalidClock(s) => write!(f, "invalid clock time: '{}'", s),
        }
    }
}

impl std::error::Error for ParseTimeError {}

impl FromStr for SimTime {
    type Err = ParseTimeError;

    /// Parses a SimTime from a string like "day_3.14:05:00".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (day_part, clock_part) = s
            .split_once('.')
            .ok_or_else(|| ParseTimeError::InvalidFormat(s.to_string()))?;

        let day: u32 = day_part
            .strip_prefix("day_")
            .ok_or_else(|| ParseTimeError::InvalidDay(day_part.to_string()))?
            .parse()
            .map_err(|_| ParseTimeError::InvalidDay(day_part.to_string()))?;
        if day == 0 {
            return Err(ParseTimeError::InvalidDay(day_part.to_string()));
        }

        let fields: Vec<&str> = clock_part.split(':').collect();
        if fields.len() != 3 {
            return Err(ParseTimeError::InvalidClock(clock_part.to_string()));
        }
        let mut values = [0u64; 3];
        for (slot, field) in values.iter_mut().zip(&fields) {
            *slot = field
                .parse()
                .map_err(|_| ParseTimeError::InvalidClock(clock_part.to_string()))?;
        }
        let [hour, minute, second] = values;
        if hour >= 24 || minute >= 60 || second >= 60 {
            return Err(ParseTimeError::InvalidClock(clock_part.to_string()));
        }

        Ok(Self {
            seconds: u64::from(day - 1) * SECONDS_PER_DAY
                + hour * 3600
                + minute * SECONDS_PER_MINUTE
                + second,
        })
    }
}

impl Serialize for SimTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SimTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        SimTime::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Complete timestamp with both the step counter and simulated time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SimTimestamp {
    pub step: u64,
    pub time: SimTime,
}

impl SimTimestamp {
    pub fn new(step: u64, time: SimTime) -> Self {
        Self { step, time }
    }

    /// Step zero at the given starting time.
    pub fn start(time: SimTime) -> Self {
        Self { step: 0, time }
    }

    /// Advances by one step of `seconds_per_step` seconds.
    pub fn advance(&mut self, seconds_per_step: u64) {
        self.step += 1;
        self.time = self.time.plus_seconds(seconds_per_step);
    }

    /// Returns true if advancing by one step would cross midnight.
    pub fn crosses_day(&self, seconds_per_step: u64) -> bool {
        self.time.plus_seconds(seconds_per_step).day() != self.time.day()
    }
}

impl fmt::Display for SimTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {} ({})", self.step, self.time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_components() {
        let t = SimTime::new(2, 13, 45);
        assert_eq!(t.day(), 2);
        assert_eq!(t.hour(), 13);
        assert_eq!(t.minute(), 45);
        assert_eq!(t.second(), 0);
        assert_eq!(t.minute_of_day(), 13 * 60 + 45);
    }

    #[test]
    fn test_time_display() {
        assert_eq!(SimTime::new(1, 0, 0).to_string(), "day_1.00:00:00");
        assert_eq!(
            SimTime::new(3, 7, 5).plus_seconds(9).to_string(),
            "day_3.07:05:09"
        );
    }

    #[test]
    fn test_time_parse() {
        let t: SimTime = "day_4.23:59:10".parse().unwrap();
        assert_eq!(t.day(), 4);
        assert_eq!(t.hour(), 23);
        assert_eq!(t.minute(), 59);
        assert_eq!(t.second(), 10);
    }

    #[test]
    fn test_time_parse_errors() {
        assert!("garbage".parse::<SimTime>().is_err());
        assert!("day_0.01:00:00".parse::<SimTime>().is_err());
        assert!("day_1.24:00:00".parse::<SimTime>().is_err());
        assert!("day_1.10:00".parse::<SimTime>().is_err());
        assert!("week_1.10:00:00".parse::<SimTime>().is_err());
    }

    #[test]
    fn test_day_rollover() {
        let t = SimTime::new(1, 23, 50).plus_minutes(20);
        assert_eq!(t.day(), 2);
        assert_eq!(t.hour(), 0);
        assert_eq!(t.minute(), 10);
        assert_eq!(t.start_of_day(), SimTime::new(2, 0, 0));
    }

    #[test]
    fn test_minutes_since() {
        let a = SimTime::new(1, 8, 0);
        let b = SimTime::new(1, 9, 30);
        assert_eq!(b.minutes_since(a), 90);
        assert_eq!(a.minutes_since(b), 0);
    }

    #[test]
    fn test_timestamp_advance() {
        let mut ts = SimTimestamp::start(SimTime::new(1, 23, 59));
        assert!(ts.crosses_day(60));
        ts.advance(60);
        assert_eq!(ts.step, 1);
        assert_eq!(ts.time, SimTime::new(2, 0, 0));
        assert!(!ts.crosses_day(10));
    }

    #[test]
    fn test_timestamp_json() {
        let ts = SimTimestamp::new(7, SimTime::new(1, 8, 10));
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, r#"{"step":7,"time":"day_1.08:10:00"}"#);

        let back: SimTimestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }
}
