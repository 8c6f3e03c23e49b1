use chrono::{DateTime, TimeZone, Utc};

use crate::relative_time::relative_time;
use crate::sighting::Coordinates;
use crate::tracker::{NoticeKind, TrackerState};

/// OpenStreetMap link centred on the coordinates.
pub fn map_link(c: Coordinates) -> String {
    format!(
        "https://www.openstreetmap.org/?mlat={lat:.5}&mlon={lng:.5}#map=16/{lat:.5}/{lng:.5}",
        lat = c.lat,
        lng = c.lng
    )
}

/// Plain-text status view for the current state.
pub fn render_status<Tz: TimeZone>(state: &TrackerState, pet_name: &str, now: &DateTime<Tz>) -> String {
    let mut lines: Vec<String> = Vec::new();

    if state.is_loading() {
        lines.push(format!("Locating {pet_name}..."));
    }

    match state.sighting() {
        None if state.is_loading() => {}
        None => lines.push(format!("No sighting of {pet_name} yet.")),
        Some(s) => {
            match relative_time(&s.last_seen(), now) {
                Some(ago) => lines.push(format!("{pet_name} was last seen {ago}.")),
                None => lines.push(format!("{pet_name} was last seen at an unknown time.")),
            }
            let c = s.coordinates;
            lines.push(format!("  at {:.5}, {:.5}", c.lat, c.lng));
            if let Some(raw) = s.observed_at.as_deref() {
                lines.push(format!("  reported {raw}"));
            }
            lines.push(format!("  map: {}", map_link(c)));
        }
    }

    if let Some(notice) = state.visible_notice(now.with_timezone(&Utc)) {
        let tag = match notice.kind {
            NoticeKind::Success => "ok",
            NoticeKind::Error => "error",
        };
        lines.push(format!("[{tag}] {}", notice.message));
    }

    lines.join("\n")
}
