use std::time::Duration;

use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::info;
use tracker_core::{render_status, SightingEndpoint, Tracker};

#[derive(Parser, Debug)]
#[command(name = "tracker_core", version)]
struct Args {
    /// Script endpoint URL that stores the current sighting.
    #[arg(long, env = "MOCHI_ENDPOINT")]
    endpoint: String,

    /// Name shown in the status view.
    #[arg(long, default_value = "Mochi")]
    name: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the last sighting once and print it (default).
    Show,
    /// Keep refreshing the status view until Ctrl-C.
    Watch {
        /// Refresh interval (seconds).
        #[arg(long, default_value_t = 60)]
        interval_seconds: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tracker_core=info".into()),
        )
        .init();

    let args = Args::parse();
    let endpoint = SightingEndpoint::new(args.endpoint.trim());
    let mut tracker = Tracker::new(endpoint);

    match args.command.unwrap_or(Command::Show) {
        Command::Show => {
            tracker.refresh().await;
            println!("{}", render_status(tracker.state(), &args.name, &Local::now()));
        }
        Command::Watch { interval_seconds } => {
            if interval_seconds == 0 {
                anyhow::bail!("--interval-seconds must be at least 1");
            }
            info!("Watching {} every {interval_seconds}s", args.endpoint);
            let name = args.name.as_str();
            tracker
                .watch(Duration::from_secs(interval_seconds), shutdown_signal(), |state| {
                    println!("{}\n", render_status(state, name, &Local::now()));
                })
                .await;
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}
