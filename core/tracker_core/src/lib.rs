//! Client for the Mochi tracker: reads and reports the pet's last known
//! position through a spreadsheet-backed script endpoint.

pub mod endpoint;
pub mod location;
pub mod relative_time;
pub mod render;
pub mod sighting;
pub mod tracker;

pub use endpoint::{classify_write_response, EndpointError, SightingEndpoint, WriteOutcome};
pub use location::{FixedLocation, LocationError, LocationSource};
pub use relative_time::{
    display_timestamp, parse_last_seen, relative_phrase, relative_time, LastSeen, TimestampError,
    TimestampStyle,
};
pub use render::{map_link, render_status};
pub use sighting::{parse_read_response, Coordinates, Sighting};
pub use tracker::{Notice, NoticeKind, ReportError, ReportPhase, Tracker, TrackerEvent, TrackerState};
