//! Per-user scheduling configuration.
//!
//! A [`Schedule`] owns a set of events and describes the daily working window
//! they may be placed in. Window bounds are local wall-clock times that get
//! re-anchored to the schedule's timezone on every cycle.

mod block;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

pub use block::Block;

/// How the scheduler treats events that already have a start time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReschedulingBehavior {
    /// Prefer keeping events near their previous start time.
    Consistency,
    /// Place every event wherever it scores best right now.
    #[default]
    Efficiency,
}

impl ReschedulingBehavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReschedulingBehavior::Consistency => "CONSISTENCY",
            ReschedulingBehavior::Efficiency => "EFFICIENCY",
        }
    }
}

impl fmt::Display for ReschedulingBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReschedulingBehavior {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CONSISTENCY" => Ok(ReschedulingBehavior::Consistency),
            "EFFICIENCY" => Ok(ReschedulingBehavior::Efficiency),
            _ => Err(ValidationError::InvalidReschedulingBehavior(s.to_string())),
        }
    }
}

/// One user's scheduling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: i64,
    pub user: String,
    #[serde(default)]
    pub rescheduling_behavior: ReschedulingBehavior,
    pub timezone: Tz,
    pub start_day_at: NaiveTime,
    pub end_day_at: NaiveTime,
    pub active_days: Vec<Weekday>,
    /// Grace period in minutes past an event's expected end before it is
    /// re-opened for scheduling.
    pub reschedule_after: i64,
    pub shift_after_early_completion: bool,
}

impl Schedule {
    pub const DEFAULT_RESCHEDULE_AFTER_MINUTES: i64 = 30;

    pub fn new(user: impl Into<String>, timezone: Tz) -> Self {
        Self {
            id: 0,
            user: user.into(),
            rescheduling_behavior: ReschedulingBehavior::default(),
            timezone,
            start_day_at: NaiveTime::from_hms_opt(7, 0, 0).unwrap_or(NaiveTime::MIN),
            end_day_at: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or(NaiveTime::MIN),
            active_days: ALL_WEEKDAYS.to_vec(),
            reschedule_after: Self::DEFAULT_RESCHEDULE_AFTER_MINUTES,
            shift_after_early_completion: true,
        }
    }

    pub fn reschedule_after(&self) -> Duration {
        Duration::minutes(self.reschedule_after)
    }

    /// Local wall-clock time of an instant in this schedule's timezone.
    pub fn local_time(&self, instant: DateTime<Utc>) -> NaiveTime {
        instant.with_timezone(&self.timezone).time()
    }

    /// The window to schedule in at `now`, or `None` when today is not an
    /// active day or the working day is already over.
    ///
    /// The start is clamped to `now`, rounded up to a whole minute, so every
    /// candidate minute lies in the future.
    pub fn current_window(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let local = now.with_timezone(&self.timezone);
        if !self.active_days.contains(&local.weekday()) {
            return None;
        }

        let date = local.date_naive();
        let day_start = resolve_local(&self.timezone, date, self.start_day_at)?;
        let day_end = resolve_local(&self.timezone, date, self.end_day_at)?;

        let start = day_start.max(ceil_to_minute(now));
        if start >= day_end {
            return None;
        }
        Some((start, day_end))
    }

    /// Parse a space separated weekday list such as `"Mon Tue Wed"`.
    pub fn parse_days(days: &str) -> Result<Vec<Weekday>, ValidationError> {
        days.split_whitespace()
            .map(|day| {
                day.parse::<Weekday>()
                    .map_err(|_| ValidationError::InvalidWeekday(day.to_string()))
            })
            .collect()
    }

    /// Inverse of [`Schedule::parse_days`].
    pub fn format_days(days: &[Weekday]) -> String {
        days.iter()
            .map(|day| day.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn parse_timezone(name: &str) -> Result<Tz, ValidationError> {
        name.parse::<Tz>()
            .map_err(|_| ValidationError::InvalidTimezone(name.to_string()))
    }
}

pub const ALL_WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Resolve a local date and time to an instant.
///
/// Ambiguous times (DST fall-back) take the earlier instant. Times inside a
/// DST gap are pushed forward by an hour, past the transition.
fn resolve_local(tz: &Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    let naive = date.and_time(time);
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

fn ceil_to_minute(instant: DateTime<Utc>) -> DateTime<Utc> {
    let secs = instant.timestamp();
    let rem = secs.rem_euclid(60);
    if rem == 0 && instant.timestamp_subsec_nanos() == 0 {
        return instant;
    }
    DateTime::from_timestamp(secs - rem + 60, 0).unwrap_or(instant)
}
