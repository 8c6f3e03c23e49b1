//! The tracker's UI state and the transitions between its states.
//!
//! `TrackerState` is the only place the current sighting, the loading flag,
//! the report phase and the transient notice live. Everything that changes
//! them goes through [`TrackerState::apply`]; [`Tracker`] drives the endpoint
//! calls and feeds the results back in as events.

use std::future::Future;

use chrono::{DateTime, Duration, TimeZone, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::endpoint::{EndpointError, SightingEndpoint};
use crate::location::{LocationError, LocationSource};
use crate::relative_time::{display_timestamp, TimestampStyle};
use crate::sighting::{Coordinates, Sighting};

/// How long a notice stays visible unless dismissed first.
pub const NOTICE_TTL_SECONDS: i64 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

impl Notice {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.raised_at >= Duration::seconds(NOTICE_TTL_SECONDS)
    }
}

/// Where the report action currently stands.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ReportPhase {
    #[default]
    Idle,
    RequestingPermission,
    Sending(Coordinates),
    /// Idle, last report confirmed.
    Succeeded,
    /// Idle, last report failed.
    Failed(String),
}

impl ReportPhase {
    pub fn is_busy(&self) -> bool {
        matches!(self, ReportPhase::RequestingPermission | ReportPhase::Sending(_))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TrackerEvent {
    FetchStarted,
    FetchCompleted(Option<Sighting>),
    FetchFailed(String),
    ReportRequested,
    PermissionDenied,
    LocationUnavailable(String),
    PermissionGranted(Coordinates),
    ReportConfirmed(Sighting),
    ReportFailed(String),
    NoticeDismissed,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackerState {
    sighting: Option<Sighting>,
    loading: bool,
    report: ReportPhase,
    notice: Option<Notice>,
}

impl TrackerState {
    pub fn sighting(&self) -> Option<&Sighting> {
        self.sighting.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn report_phase(&self) -> &ReportPhase {
        &self.report
    }

    pub fn visible_notice(&self, now: DateTime<Utc>) -> Option<&Notice> {
        self.notice.as_ref().filter(|n| !n.is_expired(now))
    }

    pub fn apply(&mut self, event: TrackerEvent, now: DateTime<Utc>) {
        match event {
            TrackerEvent::FetchStarted => self.loading = true,
            TrackerEvent::FetchCompleted(found) => {
                self.loading = false;
                match found {
                    Some(s) => self.sighting = Some(s),
                    None => debug!("endpoint has no sighting yet"),
                }
            }
            TrackerEvent::FetchFailed(reason) => {
                self.loading = false;
                warn!("fetch failed, keeping previous sighting: {reason}");
            }
            TrackerEvent::ReportRequested => {
                if self.report.is_busy() {
                    debug!("starting another report while one is in flight");
                }
                self.report = ReportPhase::RequestingPermission;
            }
            TrackerEvent::PermissionDenied => {
                if self.report == ReportPhase::RequestingPermission {
                    self.fail_report("Location permission denied".to_string(), now);
                } else {
                    self.ignored("PermissionDenied");
                }
            }
            TrackerEvent::LocationUnavailable(reason) => {
                if self.report == ReportPhase::RequestingPermission {
                    self.fail_report(format!("Could not get your location: {reason}"), now);
                } else {
                    self.ignored("LocationUnavailable");
                }
            }
            TrackerEvent::PermissionGranted(coordinates) => {
                if self.report == ReportPhase::RequestingPermission {
                    self.report = ReportPhase::Sending(coordinates);
                } else {
                    self.ignored("PermissionGranted");
                }
            }
            TrackerEvent::ReportConfirmed(sighting) => {
                if matches!(self.report, ReportPhase::Sending(_)) {
                    self.sighting = Some(sighting);
                    self.report = ReportPhase::Succeeded;
                    self.notice = Some(Notice {
                        kind: NoticeKind::Success,
                        message: "Location updated!".to_string(),
                        raised_at: now,
                    });
                } else {
                    self.ignored("ReportConfirmed");
                }
            }
            TrackerEvent::ReportFailed(reason) => {
                if matches!(self.report, ReportPhase::Sending(_)) {
                    self.fail_report(format!("Failed to update location: {reason}"), now);
                } else {
                    self.ignored("ReportFailed");
                }
            }
            TrackerEvent::NoticeDismissed => self.notice = None,
        }
    }

    fn fail_report(&mut self, message: String, now: DateTime<Utc>) {
        warn!("report failed: {message}");
        self.report = ReportPhase::Failed(message.clone());
        self.notice = Some(Notice {
            kind: NoticeKind::Error,
            message,
            raised_at: now,
        });
    }

    fn ignored(&self, event: &str) {
        debug!(phase = ?self.report, "ignoring {event}");
    }
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Location(#[from] LocationError),
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
}

/// Drives fetches and reports against the endpoint and keeps the state.
pub struct Tracker {
    endpoint: SightingEndpoint,
    state: TrackerState,
}

impl Tracker {
    pub fn new(endpoint: SightingEndpoint) -> Self {
        Self {
            endpoint,
            state: TrackerState::default(),
        }
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    pub fn dismiss_notice(&mut self) {
        self.state.apply(TrackerEvent::NoticeDismissed, Utc::now());
    }

    /// Re-read the current sighting. Failures only log; the previous
    /// sighting stays in place.
    pub async fn refresh(&mut self) {
        self.state.apply(TrackerEvent::FetchStarted, Utc::now());
        let event = match self.endpoint.fetch().await {
            Ok(found) => TrackerEvent::FetchCompleted(found),
            Err(e) => TrackerEvent::FetchFailed(e.to_string()),
        };
        self.state.apply(event, Utc::now());
    }

    /// Refresh every `interval` and hand each result to `on_refresh` until
    /// `shutdown` completes. Shutdown also cuts short a stalled fetch.
    pub async fn watch<S, F>(&mut self, interval: std::time::Duration, shutdown: S, mut on_refresh: F)
    where
        S: Future<Output = ()>,
        F: FnMut(&TrackerState),
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = self.refresh() => {}
                _ = &mut shutdown => return,
            }
            on_refresh(&self.state);
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = &mut shutdown => return,
            }
        }
    }

    /// Capture a position, send it with `now` rendered in `style`, and on
    /// success show it immediately and re-fetch to confirm.
    pub async fn report<L, Tz>(
        &mut self,
        source: &mut L,
        now: &DateTime<Tz>,
        style: TimestampStyle,
    ) -> Result<Sighting, ReportError>
    where
        L: LocationSource + ?Sized,
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        let at = now.with_timezone(&Utc);
        self.state.apply(TrackerEvent::ReportRequested, at);

        let coordinates = match source.locate() {
            Ok(c) => c,
            Err(e) => {
                let event = match &e {
                    LocationError::PermissionDenied => TrackerEvent::PermissionDenied,
                    LocationError::Unavailable(reason) => {
                        TrackerEvent::LocationUnavailable(reason.clone())
                    }
                };
                self.state.apply(event, at);
                return Err(e.into());
            }
        };
        self.state.apply(TrackerEvent::PermissionGranted(coordinates), at);

        let time = display_timestamp(now, style);
        info!(time = %time, "sending sighting");
        match self.endpoint.report(coordinates, &time).await {
            Ok(()) => {
                let sighting = Sighting::new(coordinates, time);
                self.state
                    .apply(TrackerEvent::ReportConfirmed(sighting.clone()), Utc::now());
                self.refresh().await;
                Ok(sighting)
            }
            Err(e) => {
                self.state
                    .apply(TrackerEvent::ReportFailed(e.to_string()), Utc::now());
                Err(e.into())
            }
        }
    }
}
