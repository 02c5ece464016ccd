//! Event priority.
//!
//! Ranks events against each other within one scheduling batch. The value is
//! only meaningful relative to other events scored at the same reference
//! time.

use chrono::{DateTime, Duration, Utc};

use crate::event::{Event, Flag};
use crate::schedule::Schedule;

/// Age (in days) past which an event stops gaining priority.
pub const AGE_CAP_DAYS: i64 = 28;

/// Distance (in days) at which a deadline starts raising priority.
pub const DEADLINE_HORIZON_DAYS: i64 = 14;

/// Base priority of the first matching tier flag.
const TIERS: [(Flag, f64); 5] = [
    (Flag::P1, 4.0),
    (Flag::P2, 3.0),
    (Flag::P3, 2.0),
    (Flag::P4, 1.0),
    (Flag::Minor, 0.0),
];

const DEFAULT_BASE: f64 = 1.0;

/// Priority of `event` at `reference`.
///
/// - base from the tier flag (p1 > p2 > p3 > p4 > minor), 1.0 without one
/// - plus up to 1.0 for age since inception, capped at four weeks
/// - times a deadline multiplier that is 1.0 two weeks out (or further) and
///   grows by 1/7 per day as the deadline approaches, without bound once it
///   has passed
pub fn priority(_schedule: &Schedule, reference: DateTime<Utc>, event: &Event) -> f64 {
    let mut priority = TIERS
        .iter()
        .find(|(flag, _)| event.has_flag(*flag))
        .map(|(_, base)| *base)
        .unwrap_or(DEFAULT_BASE);

    if let Some(inception) = event.inception {
        let age = whole_days(reference - inception).clamp(0, AGE_CAP_DAYS);
        priority += age as f64 / AGE_CAP_DAYS as f64;
    }

    if let Some(deadline) = event.deadline {
        let days_left = whole_days(deadline - reference);
        let weeks_inside_horizon = (DEADLINE_HORIZON_DAYS - days_left) as f64 / 7.0;
        priority *= f64::max(1.0, 1.0 + weeks_inside_horizon);
    }

    tracing::trace!(event = %event, %reference, priority, "scored priority");
    priority
}

/// Whole days in `delta`, rounded towards negative infinity.
fn whole_days(delta: Duration) -> i64 {
    delta.num_seconds().div_euclid(86_400)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 22, 0, 0).unwrap()
    }

    fn schedule() -> Schedule {
        Schedule::new("ada", chrono_tz::UTC)
    }

    fn score(event: &Event) -> f64 {
        priority(&schedule(), reference(), event)
    }

    #[test]
    fn tier_flags_follow_precedence() {
        assert_eq!(score(&Event::manual("none")), 1.0);
        assert_eq!(score(&Event::manual("a").with_flag(Flag::P1)), 4.0);
        assert_eq!(score(&Event::manual("b").with_flag(Flag::P2)), 3.0);
        assert_eq!(score(&Event::manual("c").with_flag(Flag::P3)), 2.0);
        assert_eq!(score(&Event::manual("d").with_flag(Flag::P4)), 1.0);
        assert_eq!(score(&Event::manual("e").with_flag(Flag::Minor)), 0.0);
        let both = Event::manual("f").with_flag(Flag::Minor).with_flag(Flag::P2);
        assert_eq!(score(&both), 3.0);
    }

    #[test]
    fn age_bonus_grows_then_flattens() {
        let aged = |days: i64| {
            score(&Event::manual("old").with_inception(reference() - Duration::days(days)))
        };
        assert_eq!(aged(0), 1.0);
        assert_eq!(aged(7), 1.25);
        assert_eq!(aged(14), 1.5);
        assert_eq!(aged(28), 2.0);
        assert_eq!(aged(90), 2.0);

        let mut previous = aged(0);
        for days in 1..=40 {
            let current = aged(days);
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn partial_days_do_not_count() {
        let event = Event::manual("new").with_inception(reference() - Duration::hours(23));
        assert_eq!(score(&event), 1.0);
    }

    #[test]
    fn deadline_two_weeks_out_is_neutral() {
        let event = Event::manual("report").with_deadline(reference() + Duration::days(14));
        assert_eq!(score(&event), 1.0);
        let later = Event::manual("report").with_deadline(reference() + Duration::days(40));
        assert_eq!(score(&later), 1.0);
    }

    #[test]
    fn nearer_and_past_deadlines_raise_priority() {
        let thirteen = Event::manual("close").with_deadline(reference() + Duration::days(13));
        assert!(score(&thirteen) > 1.0);

        let week = Event::manual("soon").with_deadline(reference() + Duration::days(7));
        assert_eq!(score(&week), 2.0);

        let today = Event::manual("today").with_deadline(reference());
        assert_eq!(score(&today), 3.0);

        let overdue = Event::manual("late").with_deadline(reference() - Duration::days(7));
        assert_eq!(score(&overdue), 4.0);
        let very_overdue = Event::manual("later").with_deadline(reference() - Duration::days(70));
        assert!(score(&very_overdue) > score(&overdue));
    }

    #[test]
    fn deadline_multiplies_base_and_age() {
        let event = Event::manual("mixed")
            .with_flag(Flag::P2)
            .with_inception(reference() - Duration::days(14))
            .with_deadline(reference() + Duration::days(7));
        assert_eq!(score(&event), (3.0 + 0.5) * 2.0);
    }
}
