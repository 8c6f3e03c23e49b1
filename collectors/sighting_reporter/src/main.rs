use std::io::{self, BufRead, Write};

use chrono::Local;
use clap::Parser;
use tracing::{error, info};
use tracker_core::{
    render_status, Coordinates, FixedLocation, LocationError, LocationSource, SightingEndpoint,
    TimestampStyle, Tracker,
};

#[derive(Parser, Debug)]
#[command(name = "sighting_reporter", version)]
struct Args {
    /// Script endpoint URL that stores the current sighting.
    #[arg(long, env = "MOCHI_ENDPOINT")]
    endpoint: String,

    /// Name shown in the status view.
    #[arg(long, default_value = "Mochi")]
    name: String,

    /// Latitude of the sighting. Prompted for when omitted.
    #[arg(long, requires = "lng", allow_hyphen_values = true, value_parser = finite_coordinate)]
    lat: Option<f64>,

    /// Longitude of the sighting. Prompted for when omitted.
    #[arg(long, requires = "lat", allow_hyphen_values = true, value_parser = finite_coordinate)]
    lng: Option<f64>,

    /// How the report time is written to the sheet.
    ///
    /// `day-first` matches what en-GB browsers send (`29/07/2025, 18:27:27`).
    #[arg(long, value_enum, default_value_t = TimestampStyle::DayFirst)]
    time_style: TimestampStyle,
}

/// Asks on the terminal. An empty answer declines, like dismissing the
/// browser's location permission prompt.
struct PromptLocation;

impl LocationSource for PromptLocation {
    fn locate(&mut self) -> Result<Coordinates, LocationError> {
        eprint!("Share your location as `lat, lng` (empty to decline): ");
        io::stderr()
            .flush()
            .map_err(|e| LocationError::Unavailable(e.to_string()))?;

        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| LocationError::Unavailable(e.to_string()))?;
        parse_coordinates(&line)
    }
}

fn finite_coordinate(s: &str) -> Result<f64, String> {
    s.trim()
        .parse::<f64>()
        .ok()
        .filter(|x| x.is_finite())
        .ok_or_else(|| format!("not a number: {:?}", s.trim()))
}

fn parse_coordinates(input: &str) -> Result<Coordinates, LocationError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(LocationError::PermissionDenied);
    }
    let (lat, lng) = input
        .split_once(',')
        .ok_or_else(|| LocationError::Unavailable(format!("expected `lat, lng`, got {input:?}")))?;
    let number = |s: &str| finite_coordinate(s).map_err(LocationError::Unavailable);
    Ok(Coordinates {
        lat: number(lat)?,
        lng: number(lng)?,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sighting_reporter=info,tracker_core=info".into()),
        )
        .init();

    let args = Args::parse();
    let endpoint = SightingEndpoint::new(args.endpoint.trim());
    info!("Reporting to {}", endpoint.url());

    let mut tracker = Tracker::new(endpoint);
    let now = Local::now();
    let result = match (args.lat, args.lng) {
        (Some(lat), Some(lng)) => {
            let mut source = FixedLocation(Coordinates { lat, lng });
            tracker.report(&mut source, &now, args.time_style).await
        }
        _ => tracker.report(&mut PromptLocation, &now, args.time_style).await,
    };

    println!("{}", render_status(tracker.state(), &args.name, &Local::now()));

    if let Err(e) = result {
        error!("report failed: {e}");
        anyhow::bail!("sighting not recorded: {e}");
    }
    Ok(())
}
