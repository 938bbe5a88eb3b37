use clap::Args;

use crate::app::{position_from, App};
use fieldtrack_core::sync::SendOutcome;
use fieldtrack_core::tracking::{ActionReport, StatusSource, TrackingState};
use fieldtrack_core::CoreError;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Current device position.
#[derive(Args, Debug, Clone, Copy)]
pub struct PositionArgs {
    /// Latitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lat: Option<f64>,
    /// Longitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lon: Option<f64>,
}

#[derive(Args, Debug)]
pub struct CheckinArgs {
    /// Contract (lease) number
    pub contract: String,
    /// Customer name shown in the log
    #[arg(long)]
    pub name: Option<String>,
    /// Visit note
    #[arg(long)]
    pub comment: Option<String>,
    #[command(flatten)]
    pub position: PositionArgs,
}

/// Foreground failures become the alert text the user should see.
fn alert(err: CoreError) -> Box<dyn std::error::Error> {
    tracing::debug!(error = %err, "foreground action failed");
    err.user_message().into()
}

pub fn describe(outcome: &SendOutcome) -> String {
    match outcome {
        SendOutcome::Sent => "sent".to_string(),
        SendOutcome::Skipped(reason) => format!("not sent ({reason})"),
        SendOutcome::Queued(message) => format!("queued for retry ({message})"),
    }
}

fn print_report(action: &str, report: &ActionReport) {
    let event = &report.event;
    println!(
        "{action} at {} ({:.6}, {:.6})",
        event.timestamp_string(),
        event.latitude,
        event.longitude
    );
    if let Some(address) = &event.address {
        println!("  {address}");
    }
    println!("  {}", describe(&report.outcome));
}

async fn open(position: PositionArgs) -> Result<App, CoreError> {
    let app = App::open(position_from(position.lat, position.lon)).await?;
    app.scheduler.resume().await?;
    Ok(app)
}

pub async fn start(position: PositionArgs) -> CmdResult {
    let app = open(position).await.map_err(alert)?;
    let report = app.scheduler.start().await.map_err(alert)?;
    print_report("Tracking started", &report);
    Ok(())
}

pub async fn stop(position: PositionArgs) -> CmdResult {
    let app = open(position).await.map_err(alert)?;
    let report = app.scheduler.stop().await.map_err(alert)?;
    print_report("Tracking stopped", &report);
    Ok(())
}

pub async fn checkin(args: CheckinArgs) -> CmdResult {
    let app = open(args.position).await.map_err(alert)?;
    let report = app
        .scheduler
        .site_checkin(&args.contract, args.name.as_deref(), args.comment.as_deref())
        .await
        .map_err(alert)?;
    print_report(&format!("Checked in to {}", args.contract), &report);
    Ok(())
}

/// One tick from the external scheduler. Failures are logged, not alerted.
pub async fn sample(position: PositionArgs) -> CmdResult {
    let Some(fix) = position_from(position.lat, position.lon) else {
        return Err("sample needs --lat and --lon".into());
    };
    let app = open(position).await?;
    match app.scheduler.handle_sample(fix).await {
        Ok(Some(outcome)) => println!("{}", describe(&outcome)),
        Ok(None) => println!("tracking idle, sample ignored"),
        Err(e) => {
            tracing::warn!(error = %e, "tracking sample failed");
            return Err(e.into());
        }
    }
    Ok(())
}

pub async fn sync() -> CmdResult {
    let app = App::open(None).await.map_err(alert)?;
    let report = app.scheduler.engine().flush_pending().await.map_err(alert)?;
    println!("sent {}, still pending {}", report.sent, report.still_pending);
    Ok(())
}

pub async fn status(json: bool) -> CmdResult {
    let app = open(PositionArgs { lat: None, lon: None }).await.map_err(alert)?;
    let status = app.scheduler.status().await;
    let engine = app.scheduler.engine();
    let employee = app.employee_id();
    let pending = engine.pending().len().await?;
    let last_sent = engine.last_sent(employee).await?;
    let next_allowed = engine.next_allowed_send(employee).await?;
    let sampling = app.sampler.registration().await?;
    let state = app.scheduler.state().await;

    if json {
        let value = serde_json::json!({
            "employee": employee,
            "state": if state == TrackingState::Active { "active" } else { "idle" },
            "active": status.active,
            "source": if status.source == StatusSource::Server { "server" } else { "eventLog" },
            "pending": pending,
            "lastSent": last_sent,
            "nextAllowedSendAt": next_allowed,
            "sampling": sampling,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let source = match status.source {
        StatusSource::Server => "server",
        StatusSource::EventLog => "local log",
    };
    println!("Employee:   {employee}");
    println!(
        "Tracking:   {} (per {source})",
        if status.active { "active" } else { "idle" }
    );
    println!("Pending:    {pending}");
    if let Some(marker) = last_sent {
        println!(
            "Last sent:  {} ({:.6}, {:.6})",
            marker.last_sent_timestamp.format("%Y-%m-%d %H:%M:%S"),
            marker.last_sent_latitude,
            marker.last_sent_longitude
        );
    }
    if let Some(at) = next_allowed {
        println!("Next send:  {}", at.to_rfc3339());
    }
    if let Some(sampling) = sampling {
        println!(
            "Sampling:   every {}s, {}m minimum distance",
            sampling.interval_secs, sampling.min_distance_m
        );
    }
    Ok(())
}

pub async fn logout() -> CmdResult {
    let app = App::open(None).await.map_err(alert)?;
    app.scheduler.logout().await.map_err(alert)?;
    app.client.session().clear().await;

    let mut config = app.config;
    if let Some(employee_id) = config.employee_id.as_mut() {
        employee_id.clear();
    }
    config.save()?;
    println!("Logged out");
    Ok(())
}
