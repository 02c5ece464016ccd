use chrono::NaiveTime;
use clap::Subcommand;
use tim_core::{EventStore, ReschedulingBehavior, Schedule, ValidationError};

use super::{CmdResult, Context};

#[derive(Subcommand)]
pub enum ScheduleAction {
    /// Show one schedule, or all of them
    Show {
        /// Schedule ID
        id: Option<i64>,
    },
    /// Create a new schedule
    Create {
        /// Owner of the schedule
        user: String,
        /// IANA timezone (e.g. "Europe/Berlin")
        #[arg(long, default_value = "UTC")]
        timezone: String,
        /// Start of the working day (HH:MM)
        #[arg(long)]
        start: Option<String>,
        /// End of the working day (HH:MM)
        #[arg(long)]
        end: Option<String>,
        /// Active days, e.g. "Mon Tue Wed Thu Fri"
        #[arg(long)]
        days: Option<String>,
        /// CONSISTENCY or EFFICIENCY
        #[arg(long)]
        behavior: Option<String>,
    },
    /// Change one field of a schedule
    Set {
        /// Schedule ID
        id: i64,
        /// Field name (e.g. "end_day_at", "active_days")
        field: String,
        /// New value
        value: String,
    },
}

pub fn run(ctx: &Context, action: ScheduleAction) -> CmdResult {
    let config = ctx.load_config()?;
    let store = ctx.open_store(&config)?;

    match action {
        ScheduleAction::Show { id: Some(id) } => {
            let schedule = store
                .load_schedule(id)?
                .ok_or(tim_core::CoreError::ScheduleNotFound(id))?;
            print_schedule(&schedule);
        }
        ScheduleAction::Show { id: None } => {
            let schedules = store.list_schedules()?;
            if schedules.is_empty() {
                println!("no schedules");
            }
            for schedule in &schedules {
                print_schedule(schedule);
            }
        }
        ScheduleAction::Create {
            user,
            timezone,
            start,
            end,
            days,
            behavior,
        } => {
            let mut schedule = Schedule::new(user, Schedule::parse_timezone(&timezone)?);
            if let Some(start) = start {
                apply(&mut schedule, "start_day_at", &start)?;
            }
            if let Some(end) = end {
                apply(&mut schedule, "end_day_at", &end)?;
            }
            if let Some(days) = days {
                apply(&mut schedule, "active_days", &days)?;
            }
            if let Some(behavior) = behavior {
                apply(&mut schedule, "rescheduling_behavior", &behavior)?;
            }
            let id = store.save_schedule(&schedule)?;
            println!("created schedule {id}");
        }
        ScheduleAction::Set { id, field, value } => {
            let mut schedule = store
                .load_schedule(id)?
                .ok_or(tim_core::CoreError::ScheduleNotFound(id))?;
            apply(&mut schedule, &field, &value)?;
            store.save_schedule(&schedule)?;
            println!("ok");
        }
    }
    Ok(())
}

/// Set a schedule field from its textual form.
fn apply(schedule: &mut Schedule, field: &str, value: &str) -> Result<(), ValidationError> {
    let invalid = |message: &str| ValidationError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    };
    match field {
        "user" => schedule.user = value.to_string(),
        "timezone" => schedule.timezone = Schedule::parse_timezone(value)?,
        "start_day_at" => {
            schedule.start_day_at = parse_clock(value).ok_or_else(|| invalid("expected HH:MM"))?
        }
        "end_day_at" => {
            schedule.end_day_at = parse_clock(value).ok_or_else(|| invalid("expected HH:MM"))?
        }
        "active_days" => schedule.active_days = Schedule::parse_days(value)?,
        "rescheduling_behavior" => {
            schedule.rescheduling_behavior = value.parse::<ReschedulingBehavior>()?
        }
        "reschedule_after" => {
            schedule.reschedule_after = value
                .parse::<i64>()
                .ok()
                .filter(|minutes| *minutes >= 0)
                .ok_or_else(|| invalid("expected a non-negative number of minutes"))?
        }
        "shift_after_early_completion" => {
            schedule.shift_after_early_completion = value
                .parse::<bool>()
                .map_err(|_| invalid("expected true or false"))?
        }
        _ => return Err(invalid("unknown field")),
    }
    Ok(())
}

fn parse_clock(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

fn print_schedule(schedule: &Schedule) {
    println!("schedule {} ({})", schedule.id, schedule.user);
    println!("  timezone:        {}", schedule.timezone.name());
    println!(
        "  working hours:   {} - {}",
        schedule.start_day_at.format("%H:%M"),
        schedule.end_day_at.format("%H:%M")
    );
    println!("  active days:     {}", Schedule::format_days(&schedule.active_days));
    println!("  behavior:        {}", schedule.rescheduling_behavior);
    println!("  reschedule after {} min", schedule.reschedule_after);
    println!(
        "  shift after early completion: {}",
        schedule.shift_after_early_completion
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn schedule() -> Schedule {
        Schedule::new("ada", chrono_tz::UTC)
    }

    #[test]
    fn apply_parses_clock_and_days() {
        let mut s = schedule();
        apply(&mut s, "end_day_at", "18:30").unwrap();
        apply(&mut s, "active_days", "Mon Wed").unwrap();
        assert_eq!(s.end_day_at, NaiveTime::from_hms_opt(18, 30, 0).unwrap());
        assert_eq!(s.active_days, vec![Weekday::Mon, Weekday::Wed]);
    }

    #[test]
    fn apply_accepts_lowercase_behavior() {
        let mut s = schedule();
        apply(&mut s, "rescheduling_behavior", "consistency").unwrap();
        assert_eq!(s.rescheduling_behavior, ReschedulingBehavior::Consistency);
    }

    #[test]
    fn apply_rejects_unknown_field_and_bad_values() {
        let mut s = schedule();
        assert!(apply(&mut s, "colour", "blue").is_err());
        assert!(apply(&mut s, "reschedule_after", "-5").is_err());
        assert!(apply(&mut s, "timezone", "Mars/Olympus").is_err());
        assert_eq!(s, schedule());
    }
}
