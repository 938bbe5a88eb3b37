use chrono::NaiveDate;
use clap::Args;
use std::sync::Arc;

use fieldtrack_core::clock::{Clock, SystemClock};
use fieldtrack_core::tracking::route;
use fieldtrack_core::{Config, Event, EventLog, LocalStore, SqliteStore};

type CmdResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Args, Debug)]
pub struct LogArgs {
    /// Local date (YYYY-MM-DD), defaults to today
    #[arg(long)]
    pub date: Option<NaiveDate>,
    /// Output as JSON with a route summary
    #[arg(long)]
    pub json: bool,
    /// Thin tracking samples to a drawable route
    #[arg(long)]
    pub route: bool,
}

pub fn format_event(event: &Event) -> String {
    let mut line = format!(
        "{} {:<9} {:>10.6},{:<11.6}",
        event.timestamp.format("%H:%M:%S"),
        event.kind.tag(),
        event.latitude,
        event.longitude
    );
    if let Some(contract) = &event.contract_id {
        line.push_str(&format!(" [{contract}"));
        if let Some(name) = &event.contract_name {
            line.push_str(&format!(" {name}"));
        }
        line.push(']');
    }
    if let Some(address) = &event.address {
        line.push_str(&format!(" {address}"));
    }
    if let Some(comment) = &event.comment {
        line.push_str(&format!(" \"{comment}\""));
    }
    line
}

pub async fn run(args: LogArgs) -> CmdResult {
    let config = Config::load()?;
    let store: Arc<dyn LocalStore> = Arc::new(SqliteStore::open()?);
    let log = EventLog::load(store).await?;

    let date = args
        .date
        .unwrap_or_else(|| SystemClock.now_local(config.tracking.utc_offset_hours).date());
    let mut events = route::events_on(&log.events().await, date);
    if args.route {
        events = route::thin(&events, config.tracking.route_thinning_m);
    }

    if args.json {
        println!("{}", route::export_json(date, &events)?);
        return Ok(());
    }

    if events.is_empty() {
        println!("No events on {date}.");
        return Ok(());
    }
    for event in &events {
        println!("{}", format_event(event));
    }
    let summary = route::summarize(date, &events);
    println!(
        "{} point(s), {} site check-in(s), {:.1} km",
        summary.points,
        summary.site_checkins,
        summary.distance_m / 1000.0
    );
    Ok(())
}
