use clap::Subcommand;
use tim_core::{CoreError, Event, EventStore, Schedule};

use super::{CmdResult, Context};

#[derive(Subcommand)]
pub enum EventsAction {
    /// List the events of a schedule, earliest placement first
    List {
        /// Schedule ID
        schedule_id: i64,
        /// Hide completed events
        #[arg(long)]
        pending: bool,
        /// Print the events as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(ctx: &Context, action: EventsAction) -> CmdResult {
    let config = ctx.load_config()?;
    let store = ctx.open_store(&config)?;

    match action {
        EventsAction::List {
            schedule_id,
            pending,
            json,
        } => {
            let schedule = store
                .load_schedule(schedule_id)?
                .ok_or(CoreError::ScheduleNotFound(schedule_id))?;
            let mut events = store.load_events(schedule_id)?;
            if pending {
                events.retain(|event| !event.completed);
            }
            sort_for_display(&mut events);

            if json {
                println!("{}", serde_json::to_string_pretty(&events)?);
                return Ok(());
            }
            if events.is_empty() {
                println!("no events");
            }
            for event in &events {
                println!("{}", format_line(&schedule, event));
            }
        }
    }
    Ok(())
}

/// Placed events by start time, then unplaced events by content.
fn sort_for_display(events: &mut [Event]) {
    events.sort_by(|a, b| match (a.scheduled, b.scheduled) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.content.cmp(&b.content),
    });
}

fn format_line(schedule: &Schedule, event: &Event) -> String {
    let when = match event.scheduled {
        Some(at) => at.with_timezone(&schedule.timezone).format("%a %H:%M").to_string(),
        None => "--".to_string(),
    };
    let duration = match event.duration() {
        Some(duration) => format!("{}m", duration.num_minutes()),
        None => "-".to_string(),
    };
    let mark = if event.completed { "x" } else { " " };
    let flags: Vec<&str> = event.flags.iter().map(|flag| flag.as_str()).collect();
    let mut line = format!("[{mark}] {when:<9} {duration:>5}  {event}");
    if !flags.is_empty() {
        line.push_str(&format!("  #{}", flags.join(" #")));
    }
    line
}
