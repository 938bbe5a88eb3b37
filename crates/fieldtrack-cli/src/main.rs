use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod app;
mod commands;

use commands::tracking::{CheckinArgs, PositionArgs};

#[derive(Parser)]
#[command(name = "fieldtrack", version, about = "Field sales location tracking")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a tracking session
    Start {
        #[command(flatten)]
        position: PositionArgs,
    },
    /// Stop the tracking session
    Stop {
        #[command(flatten)]
        position: PositionArgs,
    },
    /// Check in at a contract's site
    Checkin(CheckinArgs),
    /// Feed one periodic location sample (run by cron or a device shell)
    Sample {
        #[command(flatten)]
        position: PositionArgs,
    },
    /// Retry events that failed to send
    Sync,
    /// Show tracking status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the local event log
    Log(commands::log::LogArgs),
    /// List assigned contracts
    Contracts {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update the comment on a checked-in contract
    Comment {
        /// Contract (lease) number
        lease_no: String,
        /// New comment
        text: String,
    },
    /// Clear local tracking data and sign out
    Logout,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fieldtrack=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Start { position } => commands::tracking::start(position).await,
        Commands::Stop { position } => commands::tracking::stop(position).await,
        Commands::Checkin(args) => commands::tracking::checkin(args).await,
        Commands::Sample { position } => commands::tracking::sample(position).await,
        Commands::Sync => commands::tracking::sync().await,
        Commands::Status { json } => commands::tracking::status(json).await,
        Commands::Log(args) => commands::log::run(args).await,
        Commands::Contracts { json } => commands::contracts::list(json).await,
        Commands::Comment { lease_no, text } => commands::contracts::comment(&lease_no, &text).await,
        Commands::Logout => commands::tracking::logout().await,
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn negative_coordinates_parse() {
        let cli = Cli::try_parse_from(["fieldtrack", "start", "--lat", "-6.2", "--lon", "106.8"]).unwrap();
        match cli.command {
            Commands::Start { position } => {
                assert_eq!(position.lat, Some(-6.2));
                assert_eq!(position.lon, Some(106.8));
            }
            _ => panic!("expected start"),
        }
    }

    #[test]
    fn checkin_takes_contract_and_note() {
        let cli = Cli::try_parse_from([
            "fieldtrack", "checkin", "L100", "--comment", "paid", "--lat", "-6.2", "--lon", "106.8",
        ])
        .unwrap();
        match cli.command {
            Commands::Checkin(args) => {
                assert_eq!(args.contract, "L100");
                assert_eq!(args.comment.as_deref(), Some("paid"));
            }
            _ => panic!("expected checkin"),
        }
    }
}
