//! Reverse geocoding of EXIF GPS positions through the OpenCage API.

use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::error::Error;
use crate::meta::Coordinate;

/// Place name reported when a lookup fails for any reason.
pub const UNKNOWN_LOCATION: &str = "Unknown Location";

pub const OPENCAGE_ENDPOINT: &str = "https://api.opencagedata.com/geocode/v1/json";

/// Maps a coordinate to a human readable place name.
pub trait Geocoder {
    /// Never fails: errors are logged and reported as [`UNKNOWN_LOCATION`].
    fn place_name(&self, at: Coordinate) -> String;

    /// Called once per slideshow cycle, after the working set was rebuilt.
    fn begin_cycle(&self) {}
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    formatted: Option<String>,
}

/// Coordinates rounded to roughly ten metres.
type CacheKey = (i64, i64);

fn cache_key(at: Coordinate) -> CacheKey {
    (
        (at.latitude * 10_000.0).round() as i64,
        (at.longitude * 10_000.0).round() as i64,
    )
}

/// Blocking OpenCage client.
///
/// Requests run on the shared tokio runtime and the calling thread waits for
/// them, bounded by `timeout`. Answers (including failures) are remembered
/// until the next cycle begins.
pub struct OpenCageGeocoder {
    client: reqwest::Client,
    runtime: Handle,
    endpoint: String,
    api_key: String,
    timeout: Duration,
    cache: RefCell<HashMap<CacheKey, String>>,
}

impl OpenCageGeocoder {
    /// # Errors
    /// Returns [`Error::Geocode`] if the HTTP client cannot be constructed.
    pub fn new(api_key: String, timeout: Duration, runtime: Handle) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("fotowand/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            runtime,
            endpoint: OPENCAGE_ENDPOINT.to_string(),
            api_key,
            timeout,
            cache: RefCell::new(HashMap::new()),
        })
    }

    /// Point the client at a different endpoint (self-hosted proxy, tests).
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn fetch(&self, at: Coordinate) -> Result<Option<String>, Error> {
        let query = format!("{:.6},{:.6}", at.latitude, at.longitude);
        let response: GeocodeResponse = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", query.as_str()),
                ("key", self.api_key.as_str()),
                ("limit", "1"),
                ("no_annotations", "1"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(first_formatted(response))
    }

    fn lookup(&self, at: Coordinate) -> String {
        let timeout = self.timeout;
        let result = self
            .runtime
            .block_on(async { tokio::time::timeout(timeout, self.fetch(at)).await })
            .unwrap_or(Err(Error::GeocodeTimeout(timeout)));
        match result {
            Ok(Some(place)) => place,
            Ok(None) => {
                debug!(lat = at.latitude, lon = at.longitude, "no geocoding results");
                UNKNOWN_LOCATION.to_string()
            }
            Err(err) => {
                warn!(
                    lat = at.latitude,
                    lon = at.longitude,
                    error = %err,
                    "reverse geocoding failed"
                );
                UNKNOWN_LOCATION.to_string()
            }
        }
    }
}

impl Geocoder for OpenCageGeocoder {
    fn place_name(&self, at: Coordinate) -> String {
        let key = cache_key(at);
        if let Some(place) = self.cache.borrow().get(&key) {
            return place.clone();
        }
        let place = self.lookup(at);
        self.cache.borrow_mut().insert(key, place.clone());
        place
    }

    fn begin_cycle(&self) {
        self.cache.borrow_mut().clear();
    }
}

fn first_formatted(response: GeocodeResponse) -> Option<String> {
    response
        .results
        .into_iter()
        .next()
        .and_then(|result| result.formatted)
        .filter(|place| !place.trim().is_empty())
}
