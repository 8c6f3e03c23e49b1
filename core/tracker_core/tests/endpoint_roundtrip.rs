use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{Local, Utc};
use serde_json::{json, Value};
use tracker_core::{
    display_timestamp, render_status, Coordinates, EndpointError, FixedLocation, LocationError,
    NoticeKind, ReportError, ReportPhase, SightingEndpoint, TimestampStyle, Tracker,
};

/// Stand-in for the spreadsheet script: one row, plus knobs to misbehave.
#[derive(Default)]
struct Sheet {
    row: Value,
    update_reply: String,
    broken: Option<(StatusCode, String)>,
    updates: usize,
}

type Shared = Arc<Mutex<Sheet>>;

async fn exec(State(sheet): State<Shared>, Query(q): Query<HashMap<String, String>>) -> Response {
    let mut sheet = sheet.lock().unwrap();
    if let Some((status, body)) = sheet.broken.clone() {
        return (status, body).into_response();
    }
    if q.get("action").map(String::as_str) == Some("update") {
        sheet.updates += 1;
        sheet.row = json!({
            "lat": q.get("lat"),
            "lng": q.get("lng"),
            "time": q.get("time"),
        });
        return sheet.update_reply.clone().into_response();
    }
    Json(sheet.row.clone()).into_response()
}

async fn spawn_router(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/exec")
}

async fn spawn_sheet(sheet: Sheet) -> (String, Shared) {
    let shared: Shared = Arc::new(Mutex::new(sheet));
    let app = Router::new()
        .route("/exec", get(exec))
        .with_state(shared.clone());
    (spawn_router(app).await, shared)
}

/// A URL nothing listens on.
async fn closed_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/exec")
}

fn empty_row() -> Value {
    json!({ "lat": null, "lng": null, "time": null })
}

#[tokio::test]
async fn empty_sheet_is_no_sighting_yet() {
    let (url, _) = spawn_sheet(Sheet {
        row: empty_row(),
        ..Default::default()
    })
    .await;
    let mut tracker = Tracker::new(SightingEndpoint::new(url));
    tracker.refresh().await;

    assert!(!tracker.state().is_loading());
    assert!(tracker.state().sighting().is_none());
    assert_eq!(
        render_status(tracker.state(), "Mochi", &Local::now()),
        "No sighting of Mochi yet."
    );
}

#[tokio::test]
async fn report_then_confirm() {
    let (url, sheet) = spawn_sheet(Sheet {
        row: empty_row(),
        update_reply: "OK".to_string(),
        ..Default::default()
    })
    .await;
    let mut tracker = Tracker::new(SightingEndpoint::new(url));
    let now = Local::now();
    let here = Coordinates { lat: 52.37, lng: -4.89 };

    let sent = tracker
        .report(&mut FixedLocation(here), &now, TimestampStyle::DayFirst)
        .await
        .unwrap();
    assert_eq!(sent.coordinates, here);

    let expected_time = display_timestamp(&now, TimestampStyle::DayFirst);
    {
        let sheet = sheet.lock().unwrap();
        assert_eq!(sheet.updates, 1);
        assert_eq!(sheet.row["time"], json!(expected_time));
        assert_eq!(sheet.row["lat"], json!("52.37"));
    }

    let state = tracker.state();
    assert_eq!(state.report_phase(), &ReportPhase::Succeeded);
    let current = state.sighting().unwrap();
    assert_eq!(current.coordinates, here);
    assert_eq!(current.observed_at.as_deref(), Some(expected_time.as_str()));

    let view = render_status(state, "Mochi", &now);
    assert!(view.starts_with("Mochi was last seen just now."), "{view}");
    assert!(view.ends_with("[ok] Location updated!"), "{view}");
}

#[tokio::test]
async fn unrecognized_write_reply_is_a_failure() {
    let (url, _) = spawn_sheet(Sheet {
        row: json!({ "lat": 1.0, "lng": 2.0, "time": "29/07/2025, 18:27:27" }),
        update_reply: "Error: bad input".to_string(),
        ..Default::default()
    })
    .await;
    let mut tracker = Tracker::new(SightingEndpoint::new(url));
    tracker.refresh().await;

    let err = tracker
        .report(
            &mut FixedLocation(Coordinates { lat: 3.0, lng: 4.0 }),
            &Local::now(),
            TimestampStyle::DayFirst,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReportError::Endpoint(EndpointError::Rejected(ref body)) if body == "Error: bad input"
    ));
    assert!(matches!(tracker.state().report_phase(), ReportPhase::Failed(_)));
    // The optimistic update only happens on success.
    let current = tracker.state().sighting().unwrap();
    assert_eq!(current.coordinates, Coordinates { lat: 1.0, lng: 2.0 });
}

#[tokio::test]
async fn denied_permission_never_hits_the_endpoint() {
    let (url, sheet) = spawn_sheet(Sheet {
        row: empty_row(),
        update_reply: "OK".to_string(),
        ..Default::default()
    })
    .await;
    let mut tracker = Tracker::new(SightingEndpoint::new(url));
    let mut deny = || -> Result<Coordinates, LocationError> { Err(LocationError::PermissionDenied) };

    let err = tracker
        .report(&mut deny, &Local::now(), TimestampStyle::DayFirst)
        .await
        .unwrap_err();
    assert!(matches!(err, ReportError::Location(LocationError::PermissionDenied)));
    assert_eq!(sheet.lock().unwrap().updates, 0);
    assert!(matches!(tracker.state().report_phase(), ReportPhase::Failed(_)));
}

#[tokio::test]
async fn broken_fetch_keeps_previous_sighting() {
    let (url, sheet) = spawn_sheet(Sheet {
        row: json!({ "lat": "51.5", "lng": "-0.12", "time": "29/07/2025, 18:27:27" }),
        ..Default::default()
    })
    .await;
    let mut tracker = Tracker::new(SightingEndpoint::new(url.clone()));
    tracker.refresh().await;
    assert!(tracker.state().sighting().is_some());

    sheet.lock().unwrap().broken = Some((StatusCode::OK, "<html>quota exceeded</html>".to_string()));
    tracker.refresh().await;
    assert!(!tracker.state().is_loading());
    assert_eq!(
        tracker.state().sighting().unwrap().coordinates,
        Coordinates { lat: 51.5, lng: -0.12 }
    );

    sheet.lock().unwrap().broken = Some((StatusCode::INTERNAL_SERVER_ERROR, String::new()));
    let err = SightingEndpoint::new(url).fetch().await.unwrap_err();
    assert!(matches!(err, EndpointError::Status(500)));
}

#[tokio::test]
async fn unavailable_location_fails_with_a_notice() {
    let (url, sheet) = spawn_sheet(Sheet {
        row: empty_row(),
        update_reply: "OK".to_string(),
        ..Default::default()
    })
    .await;
    let mut tracker = Tracker::new(SightingEndpoint::new(url));
    let mut no_fix = || -> Result<Coordinates, LocationError> {
        Err(LocationError::Unavailable("no GPS fix".to_string()))
    };

    let err = tracker
        .report(&mut no_fix, &Local::now(), TimestampStyle::DayFirst)
        .await
        .unwrap_err();
    assert!(matches!(err, ReportError::Location(LocationError::Unavailable(_))));
    assert_eq!(sheet.lock().unwrap().updates, 0);

    let state = tracker.state();
    assert!(matches!(state.report_phase(), ReportPhase::Failed(m) if m.contains("no GPS fix")));
    let notice = state.visible_notice(Utc::now()).unwrap();
    assert_eq!(notice.kind, NoticeKind::Error);
    assert!(notice.message.contains("no GPS fix"));
}

#[tokio::test]
async fn unreachable_endpoint_fails_the_report() {
    let mut tracker = Tracker::new(SightingEndpoint::new(closed_url().await));

    let err = tracker
        .report(
            &mut FixedLocation(Coordinates { lat: 1.0, lng: 2.0 }),
            &Local::now(),
            TimestampStyle::DayFirst,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ReportError::Endpoint(EndpointError::Transport(_))));

    let state = tracker.state();
    assert!(matches!(state.report_phase(), ReportPhase::Failed(_)));
    assert!(state.sighting().is_none());
    assert_eq!(state.visible_notice(Utc::now()).unwrap().kind, NoticeKind::Error);

    tracker.refresh().await;
    assert!(!tracker.state().is_loading());
    assert!(tracker.state().sighting().is_none());
}

#[tokio::test]
async fn watch_stops_while_a_fetch_is_stalled() {
    let app = Router::new().route(
        "/exec",
        get(|| async { std::future::pending::<&'static str>().await }),
    );
    let url = spawn_router(app).await;
    let mut tracker = Tracker::new(SightingEndpoint::new(url));
    let mut refreshes = 0;

    let stopped = tokio::time::timeout(
        Duration::from_secs(5),
        tracker.watch(
            Duration::from_secs(60),
            tokio::time::sleep(Duration::from_millis(200)),
            |_| refreshes += 1,
        ),
    )
    .await;
    assert!(stopped.is_ok(), "watch kept waiting on the stalled fetch");
    assert_eq!(refreshes, 0);
}

#[tokio::test]
async fn watch_refreshes_then_stops_during_the_pause() {
    let (url, _) = spawn_sheet(Sheet {
        row: json!({ "lat": 1.0, "lng": 2.0, "time": "29/07/2025, 18:27:27" }),
        ..Default::default()
    })
    .await;
    let mut tracker = Tracker::new(SightingEndpoint::new(url));
    let mut seen = Vec::new();

    let stopped = tokio::time::timeout(
        Duration::from_secs(5),
        tracker.watch(
            Duration::from_secs(60),
            tokio::time::sleep(Duration::from_millis(500)),
            |state| seen.push(state.sighting().map(|s| s.coordinates)),
        ),
    )
    .await;
    assert!(stopped.is_ok());
    assert_eq!(seen, vec![Some(Coordinates { lat: 1.0, lng: 2.0 })]);
}
