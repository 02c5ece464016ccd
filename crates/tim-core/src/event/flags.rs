//! Recognized event flags.
//!
//! Integrations hand over labels as raw strings; only the ones listed in
//! [`Flag`] carry scheduling meaning. Everything else is treated as a
//! context by the integration boundary.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// A recognized flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flag {
    /// Never auto-place this event
    NoBox,
    P1,
    P2,
    P3,
    P4,
    Minor,
    Easy,
    Medium,
    Hard,
    Morning,
    Afternoon,
    Evening,
    /// Morning and afternoon
    Daytime,
    /// Day-part preference is advisory only
    Flex,
    /// The source's due date is a deadline rather than a do-after date
    Deadline,
}

impl Flag {
    pub const ALL: [Flag; 15] = [
        Flag::NoBox,
        Flag::P1,
        Flag::P2,
        Flag::P3,
        Flag::P4,
        Flag::Minor,
        Flag::Easy,
        Flag::Medium,
        Flag::Hard,
        Flag::Morning,
        Flag::Afternoon,
        Flag::Evening,
        Flag::Daytime,
        Flag::Flex,
        Flag::Deadline,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Flag::NoBox => "nobox",
            Flag::P1 => "p1",
            Flag::P2 => "p2",
            Flag::P3 => "p3",
            Flag::P4 => "p4",
            Flag::Minor => "minor",
            Flag::Easy => "easy",
            Flag::Medium => "medium",
            Flag::Hard => "hard",
            Flag::Morning => "morning",
            Flag::Afternoon => "afternoon",
            Flag::Evening => "evening",
            Flag::Daytime => "daytime",
            Flag::Flex => "flex",
            Flag::Deadline => "deadline",
        }
    }

    /// The day-part this flag asserts, if any.
    pub fn day_part(&self) -> Option<DayPart> {
        match self {
            Flag::Morning => Some(DayPart::Morning),
            Flag::Afternoon => Some(DayPart::Afternoon),
            Flag::Evening => Some(DayPart::Evening),
            Flag::Daytime => Some(DayPart::Daytime),
            _ => None,
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Flag {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Flag::ALL
            .iter()
            .copied()
            .find(|flag| flag.as_str() == needle)
            .ok_or_else(|| ValidationError::UnknownFlag(s.to_string()))
    }
}

/// A named local clock-time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayPart {
    Morning,
    Afternoon,
    Evening,
    Daytime,
}

impl DayPart {
    /// Inclusive local clock-time bounds.
    pub fn range(&self) -> (NaiveTime, NaiveTime) {
        let (earliest, latest) = match self {
            DayPart::Morning => (7, 12),
            DayPart::Afternoon => (12, 17),
            DayPart::Evening => (17, 22),
            DayPart::Daytime => (7, 17),
        };
        (hour(earliest), hour(latest))
    }
}

fn hour(h: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, 0, 0).unwrap_or(NaiveTime::MIN)
}
