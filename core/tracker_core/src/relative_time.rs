//! "Last seen ... ago" phrasing for the free-form timestamps the endpoint
//! hands back.
//!
//! The endpoint stores whatever display string the reporting device
//! produced, so a timestamp can arrive day-first (`29/07/2025, 18:27:27`),
//! month-first with a 12-hour clock (`7/29/2025, 6:27:27 PM`), as RFC 3339,
//! or as something unparseable. Naive strings are read in the time zone of
//! the `now` snapshot the caller passes in.

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

/// What the tracker knows about when the pet was last seen.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LastSeen<'a> {
    Instant(DateTime<FixedOffset>),
    Text(&'a str),
    Absent,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimestampError {
    #[error("timestamp does not look like {0}")]
    NoMatch(&'static str),
    #[error("invalid calendar fields in {0:?}")]
    InvalidFields(String),
    #[error("local time {0} does not exist in this time zone")]
    NonexistentLocalTime(NaiveDateTime),
    #[error("unrecognized timestamp {0:?}")]
    Unrecognized(String),
}

impl TimestampError {
    /// A strategy recognised the shape but could not build a date from it;
    /// later strategies must not reinterpret the string.
    fn ends_chain(&self) -> bool {
        matches!(self, TimestampError::InvalidFields(_))
    }
}

/// How a freshly reported timestamp is rendered before it is sent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum TimestampStyle {
    /// `DD/MM/YYYY, HH:MM:SS`
    #[default]
    DayFirst,
    /// `M/D/YYYY, h:mm:ss AM`
    MonthFirst,
}

const DAY_FIRST_LABEL: &str = "DD/MM/YYYY, HH:MM:SS";

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

type Strategy<Tz> = fn(&str, &Tz) -> Result<DateTime<Tz>, TimestampError>;

/// Parsers tried in order; the first success wins.
fn strategies<Tz: TimeZone>() -> [(&'static str, Strategy<Tz>); 3] {
    [
        ("day_first", parse_day_first::<Tz> as Strategy<Tz>),
        ("general", parse_general::<Tz> as Strategy<Tz>),
        ("without_commas", parse_without_commas::<Tz> as Strategy<Tz>),
    ]
}

fn day_first_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([0-9]{1,2})/([0-9]{1,2})/([0-9]{4}),\s*([0-9]{1,2}):([0-9]{2}):([0-9]{2})$")
            .expect("day-first pattern compiles")
    })
}

/// Resolve a display string to an instant in `tz`.
pub fn parse_last_seen<Tz: TimeZone>(raw: &str, tz: &Tz) -> Result<DateTime<Tz>, TimestampError> {
    let raw = raw.trim();
    for (name, strategy) in strategies::<Tz>() {
        match strategy(raw, tz) {
            Ok(t) => {
                debug!(strategy = name, raw, "parsed last-seen timestamp");
                return Ok(t);
            }
            Err(e) if e.ends_chain() => {
                debug!(strategy = name, raw, "matched but unusable: {e}");
                break;
            }
            Err(e) => debug!(strategy = name, raw, "no parse: {e}"),
        }
    }
    Err(TimestampError::Unrecognized(raw.to_string()))
}

/// `DD/MM/YYYY, HH:MM:SS`: the first group is the day, the second the month.
/// Once the pattern matches, any failure is `InvalidFields` and final.
fn parse_day_first<Tz: TimeZone>(raw: &str, tz: &Tz) -> Result<DateTime<Tz>, TimestampError> {
    let caps = day_first_pattern()
        .captures(raw)
        .ok_or(TimestampError::NoMatch(DAY_FIRST_LABEL))?;
    let field = |i: usize| -> Result<u32, TimestampError> {
        caps[i]
            .parse()
            .map_err(|_| TimestampError::InvalidFields(raw.to_string()))
    };

    let (day, month) = (field(1)?, field(2)?);
    let year = field(3)? as i32;
    let naive = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(field(4).ok()?, field(5).ok()?, field(6).ok()?))
        .ok_or_else(|| TimestampError::InvalidFields(raw.to_string()))?;
    localize(naive, tz).map_err(|_| TimestampError::InvalidFields(raw.to_string()))
}

fn parse_general<Tz: TimeZone>(raw: &str, tz: &Tz) -> Result<DateTime<Tz>, TimestampError> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(tz));
    }
    if let Ok(t) = DateTime::parse_from_rfc2822(raw) {
        return Ok(t.with_timezone(tz));
    }
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return localize(naive, tz);
        }
    }
    for fmt in DATE_FORMATS {
        if let Some(naive) = NaiveDate::parse_from_str(raw, fmt)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
        {
            return localize(naive, tz);
        }
    }
    Err(TimestampError::Unrecognized(raw.to_string()))
}

fn parse_without_commas<Tz: TimeZone>(raw: &str, tz: &Tz) -> Result<DateTime<Tz>, TimestampError> {
    if !raw.contains(',') {
        return Err(TimestampError::NoMatch("a comma-separated date"));
    }
    parse_general(&raw.replace(',', ""), tz)
}

fn localize<Tz: TimeZone>(naive: NaiveDateTime, tz: &Tz) -> Result<DateTime<Tz>, TimestampError> {
    tz.from_local_datetime(&naive)
        .earliest()
        .ok_or(TimestampError::NonexistentLocalTime(naive))
}

/// Phrase for an elapsed time in whole seconds. Negative deltas (clock skew)
/// read as "just now".
pub fn relative_phrase(delta_seconds: i64) -> String {
    if delta_seconds < 0 {
        return "just now".to_string();
    }
    let minutes = delta_seconds / 60;
    let hours = delta_seconds / 3600;
    if hours < 1 {
        if minutes < 1 {
            "just now".to_string()
        } else {
            ago(minutes, "minute")
        }
    } else if hours < 24 {
        ago(hours, "hour")
    } else {
        ago(hours / 24, "day")
    }
}

fn ago(n: i64, unit: &str) -> String {
    format!("{n} {unit}{} ago", if n == 1 { "" } else { "s" })
}

/// "3 hours ago" for `last_seen` relative to `now`, or `None` when there is
/// nothing meaningful to say. Parse failures are logged, never returned.
pub fn relative_time<Tz: TimeZone>(last_seen: &LastSeen<'_>, now: &DateTime<Tz>) -> Option<String> {
    let seen_ms = match last_seen {
        LastSeen::Absent => return None,
        LastSeen::Instant(t) => t.timestamp_millis(),
        LastSeen::Text(raw) => match parse_last_seen(raw, &now.timezone()) {
            Ok(t) => t.timestamp_millis(),
            Err(e) => {
                warn!("cannot format last-seen time: {e}");
                return None;
            }
        },
    };
    let delta_seconds = (now.timestamp_millis() - seen_ms).div_euclid(1000);
    Some(relative_phrase(delta_seconds))
}

/// Render `now` the way a browser's `toLocaleString()` would for `style`.
pub fn display_timestamp<Tz>(now: &DateTime<Tz>, style: TimestampStyle) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    match style {
        TimestampStyle::DayFirst => now.format("%d/%m/%Y, %H:%M:%S").to_string(),
        TimestampStyle::MonthFirst => now.format("%-m/%-d/%Y, %-I:%M:%S %p").to_string(),
    }
}
