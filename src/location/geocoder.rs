//! External geocoding lookup.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;

use crate::config::GeocoderConfig;
use crate::error::{PipelineError, Result};

/// Region and country reported for a place, each individually optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeocodeMatch {
    pub region: Option<String>,
    pub country: Option<String>,
}

/// Failure classes of a geocoding lookup. Never fatal for a run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupFailure {
    #[error("invalid API key (401)")]
    Unauthorized,

    #[error("invalid API request (400)")]
    BadRequest,

    #[error("API quota exceeded (403)")]
    QuotaExceeded,

    #[error("API service unavailable (503)")]
    ServiceUnavailable,

    #[error("other API error (status {0})")]
    OtherStatus(u16),

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl LookupFailure {
    /// Maps a non-success HTTP status to its failure class.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => LookupFailure::Unauthorized,
            400 => LookupFailure::BadRequest,
            403 => LookupFailure::QuotaExceeded,
            503 => LookupFailure::ServiceUnavailable,
            other => LookupFailure::OtherStatus(other),
        }
    }
}

/// Resolves a place name to its region and country.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn lookup(&self, place: &str) -> std::result::Result<GeocodeMatch, LookupFailure>;
}

#[derive(Debug, Deserialize)]
struct OpenCageResponse {
    #[serde(default)]
    results: Vec<OpenCageResult>,
}

#[derive(Debug, Deserialize)]
struct OpenCageResult {
    #[serde(default)]
    components: OpenCageComponents,
}

#[derive(Debug, Default, Deserialize)]
struct OpenCageComponents {
    state: Option<String>,
    country: Option<String>,
}

/// Extracts region and country from the first result of an OpenCage response body.
pub fn parse_opencage_body(body: &str) -> std::result::Result<GeocodeMatch, LookupFailure> {
    let response: OpenCageResponse = serde_json::from_str(body)
        .map_err(|err| LookupFailure::MalformedResponse(err.to_string()))?;

    Ok(response
        .results
        .into_iter()
        .next()
        .map(|first| GeocodeMatch {
            region: first.components.state,
            country: first.components.country,
        })
        .unwrap_or_default())
}

/// OpenCage forward geocoding over HTTP.
pub struct OpenCageGeocoder {
    client: Client,
    config: GeocoderConfig,
}

impl OpenCageGeocoder {
    pub fn new(config: GeocoderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| PipelineError::config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/geocode/v1/json",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl Geocoder for OpenCageGeocoder {
    async fn lookup(&self, place: &str) -> std::result::Result<GeocodeMatch, LookupFailure> {
        let response = self
            .client
            .get(self.endpoint())
            .query(&[("q", place), ("key", self.config.api_key.as_str()), ("limit", "1")])
            .send()
            .await
            .map_err(|err| LookupFailure::Network(err.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(LookupFailure::from_status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|err| LookupFailure::Network(err.to_string()))?;
        parse_opencage_body(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classes() {
        assert_eq!(LookupFailure::from_status(401), LookupFailure::Unauthorized);
        assert_eq!(LookupFailure::from_status(400), LookupFailure::BadRequest);
        assert_eq!(LookupFailure::from_status(403), LookupFailure::QuotaExceeded);
        assert_eq!(LookupFailure::from_status(503), LookupFailure::ServiceUnavailable);
        assert_eq!(LookupFailure::from_status(500), LookupFailure::OtherStatus(500));
    }

    #[test]
    fn parses_first_result_components() {
        let body = r#"{"results":[
            {"components":{"state":"Washington","country":"United States","city":"Tacoma"}},
            {"components":{"state":"Other","country":"Elsewhere"}}
        ]}"#;
        let found = parse_opencage_body(body).unwrap();
        assert_eq!(found.region.as_deref(), Some("Washington"));
        assert_eq!(found.country.as_deref(), Some("United States"));
    }

    #[test]
    fn missing_parts_stay_empty() {
        let found = parse_opencage_body(r#"{"results":[{"components":{"country":"France"}}]}"#)
            .unwrap();
        assert_eq!(found.region, None);
        assert_eq!(found.country.as_deref(), Some("France"));

        let empty = parse_opencage_body(r#"{"results":[]}"#).unwrap();
        assert_eq!(empty, GeocodeMatch::default());
    }

    #[test]
    fn garbage_body_is_malformed() {
        assert!(matches!(
            parse_opencage_body("<html>"),
            Err(LookupFailure::MalformedResponse(_))
        ));
    }
}
