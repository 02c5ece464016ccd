use std::sync::Arc;

use clap::Subcommand;
use tim_core::{
    CycleReport, CycleRunner, CycleSettings, EventStore, FeedProvider, IntegratorProvider,
};

use super::{parse_now, CmdResult, Context};

#[derive(Subcommand)]
pub enum CycleAction {
    /// Run one cycle for a schedule
    Run {
        /// Schedule ID
        schedule_id: i64,
        /// Instant to run at (RFC 3339), defaults to now
        #[arg(long)]
        at: Option<String>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run one cycle for every schedule concurrently
    RunAll {
        /// Instant to run at (RFC 3339), defaults to now
        #[arg(long)]
        at: Option<String>,
        /// Print the reports as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn run(ctx: &Context, action: CycleAction) -> CmdResult {
    let config = ctx.load_config()?;
    let store: Arc<dyn EventStore> = ctx.open_store(&config)?;
    let provider: Arc<dyn IntegratorProvider> = Arc::new(FeedProvider::new(config.feeds.clone()));
    let runner = Arc::new(CycleRunner::new(
        store,
        provider,
        CycleSettings::from(&config.cycle),
    ));

    match action {
        CycleAction::Run {
            schedule_id,
            at,
            json,
        } => {
            let now = parse_now(at.as_deref())?;
            let report = runner.run_cycle(schedule_id, now).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        CycleAction::RunAll { at, json } => {
            let now = parse_now(at.as_deref())?;
            let results = runner.run_all(now).await?;
            let mut failed = 0;
            let mut reports = Vec::new();
            for (schedule_id, result) in results {
                match result {
                    Ok(report) => reports.push(report),
                    Err(e) => {
                        failed += 1;
                        eprintln!("schedule {schedule_id}: error: {e}");
                    }
                }
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                for report in &reports {
                    print_report(report);
                }
            }
            if failed > 0 {
                return Err(format!("{failed} schedule(s) failed").into());
            }
        }
    }
    Ok(())
}

fn print_report(report: &CycleReport) {
    println!("schedule {}", report.schedule_id);
    match report.window {
        Some((start, end)) => println!(
            "  window:        {} .. {}",
            start.to_rfc3339(),
            end.to_rfc3339()
        ),
        None => println!("  window:        inactive"),
    }
    println!(
        "  reconciled:    {} added, {} merged, {} superseded",
        report.reconcile.added, report.reconcile.merged, report.reconcile.superseded
    );
    println!("  maintenance:   {} cleared", report.maintenance.total());
    println!(
        "  scheduled:     {} placed, {} unschedulable",
        report.scheduled, report.unschedulable
    );
    println!("  changed:       {}", report.changed);
    println!("  published:     {}", report.published);
    for failure in &report.failures {
        println!(
            "  failed:        {} {}: {}",
            failure.integrator, failure.operation, failure.message
        );
    }
}
