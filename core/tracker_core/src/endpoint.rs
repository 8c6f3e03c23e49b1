use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::sighting::{parse_read_response, Coordinates, Sighting};

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("http_{0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("update not acknowledged: {0:?}")]
    Rejected(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Success,
    Failure,
}

/// The spreadsheet script that stores the single current sighting.
#[derive(Clone, Debug)]
pub struct SightingEndpoint {
    client: Client,
    url: String,
}

impl SightingEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), url)
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// `GET <endpoint>`. `Ok(None)` is the "no sighting yet" answer.
    pub async fn fetch(&self) -> Result<Option<Sighting>, EndpointError> {
        let res = self.client.get(&self.url).send().await?;
        if !res.status().is_success() {
            return Err(EndpointError::Status(res.status().as_u16()));
        }
        let text = res.text().await?;
        let body: Value = serde_json::from_str(&text)
            .map_err(|e| EndpointError::MalformedResponse(e.to_string()))?;
        let sighting = parse_read_response(&body).map_err(EndpointError::MalformedResponse)?;
        debug!(found = sighting.is_some(), "fetched sighting");
        Ok(sighting)
    }

    /// `GET <endpoint>?action=update&lat=..&lng=..&time=..`.
    pub async fn report(&self, coordinates: Coordinates, time: &str) -> Result<(), EndpointError> {
        let query = [
            ("action", "update".to_string()),
            ("lat", coordinates.lat.to_string()),
            ("lng", coordinates.lng.to_string()),
            ("time", time.to_string()),
        ];
        let res = self.client.get(&self.url).query(&query).send().await?;
        if !res.status().is_success() {
            return Err(EndpointError::Status(res.status().as_u16()));
        }
        let body = res.text().await?;
        match classify_write_response(&body) {
            WriteOutcome::Success => {
                info!(lat = coordinates.lat, lng = coordinates.lng, time, "sighting reported");
                Ok(())
            }
            WriteOutcome::Failure => Err(EndpointError::Rejected(body.trim().to_string())),
        }
    }
}

/// A write succeeded if the body is a JSON object with a truthy `success`,
/// or otherwise if the text contains `success` or is exactly `OK`.
pub fn classify_write_response(body: &str) -> WriteOutcome {
    let body = body.trim();
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(body) {
        if let Some(flag) = obj.get("success") {
            return if truthy(flag) {
                WriteOutcome::Success
            } else {
                WriteOutcome::Failure
            };
        }
    }
    if body == "OK" || body.contains("success") {
        WriteOutcome::Success
    } else {
        WriteOutcome::Failure
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|x| x != 0.0 && !x.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
