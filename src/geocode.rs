//! Address → coordinate lookups and the two table drivers built on them.
//!
//! Failures never abort a run: a row whose lookup errors is logged and
//! recorded as missing, and the driver moves on to the next row.

use crate::config::{GeocodeConfig, Throttle};
use crate::data::SchoolTable;
use geo::Point;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {status}: {message}")]
    Status { status: String, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Resolves an address string to `Point::new(lon, lat)`. `Ok(None)` means
/// the provider answered but had no match.
pub trait Geocoder {
    fn geocode(&self, address: &str) -> Result<Option<Point<f64>>, GeocodeError>;
}

pub fn build_address(base: &str, suffix: &str) -> String {
    format!("{}{}", base.trim(), suffix)
}

// --- Google ---------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    status: String,
    #[serde(default)]
    results: Vec<GoogleResult>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleResult {
    geometry: GoogleGeometry,
}

#[derive(Debug, Deserialize)]
struct GoogleGeometry {
    location: GoogleLatLng,
}

#[derive(Debug, Deserialize)]
struct GoogleLatLng {
    lat: f64,
    lng: f64,
}

pub struct GoogleGeocoder {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl GoogleGeocoder {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Result<Self, GeocodeError> {
        Ok(Self {
            client: Client::builder().build()?,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }
}

impl Geocoder for GoogleGeocoder {
    fn geocode(&self, address: &str) -> Result<Option<Point<f64>>, GeocodeError> {
        let body = self
            .client
            .get(&self.endpoint)
            .query(&[("address", address), ("key", self.api_key.as_str())])
            .send()?
            .text()?;
        parse_google_response(&body)
    }
}

pub fn parse_google_response(body: &str) -> Result<Option<Point<f64>>, GeocodeError> {
    let response: GoogleResponse =
        serde_json::from_str(body).map_err(|e| GeocodeError::Malformed(e.to_string()))?;

    match response.status.as_str() {
        "OK" => {
            let first = response
                .results
                .first()
                .ok_or_else(|| GeocodeError::Malformed("status OK with no results".to_string()))?;
            let loc = &first.geometry.location;
            Ok(Some(Point::new(loc.lng, loc.lat)))
        }
        "ZERO_RESULTS" => Ok(None),
        _ => Err(GeocodeError::Status {
            status: response.status,
            message: response.error_message.unwrap_or_default(),
        }),
    }
}

// --- Nominatim ------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

pub struct NominatimGeocoder {
    client: Client,
    endpoint: String,
}

impl NominatimGeocoder {
    pub fn new(endpoint: impl Into<String>, user_agent: &str) -> Result<Self, GeocodeError> {
        Ok(Self {
            client: Client::builder().user_agent(user_agent).build()?,
            endpoint: endpoint.into(),
        })
    }
}

impl Geocoder for NominatimGeocoder {
    fn geocode(&self, address: &str) -> Result<Option<Point<f64>>, GeocodeError> {
        let body = self
            .client
            .get(&self.endpoint)
            .query(&[("q", address), ("format", "json"), ("limit", "1")])
            .send()?
            .error_for_status()?
            .text()?;
        parse_nominatim_response(&body)
    }
}

pub fn parse_nominatim_response(body: &str) -> Result<Option<Point<f64>>, GeocodeError> {
    let places: Vec<NominatimPlace> =
        serde_json::from_str(body).map_err(|e| GeocodeError::Malformed(e.to_string()))?;

    let Some(place) = places.first() else {
        return Ok(None);
    };
    let lat: f64 = place
        .lat
        .parse()
        .map_err(|_| GeocodeError::Malformed(format!("bad latitude {:?}", place.lat)))?;
    let lon: f64 = place
        .lon
        .parse()
        .map_err(|_| GeocodeError::Malformed(format!("bad longitude {:?}", place.lon)))?;
    Ok(Some(Point::new(lon, lat)))
}

// --- Drivers --------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeocodeStats {
    pub attempted: usize,
    pub resolved: usize,
    pub failed: usize,
    /// Rows that needed no request (already located, or nothing to search for).
    pub skipped: usize,
}

/// Looks up one address, folding every failure into `None`.
fn lookup(geocoder: &dyn Geocoder, address: &str, stats: &mut GeocodeStats) -> Option<Point<f64>> {
    stats.attempted += 1;
    match geocoder.geocode(address) {
        Ok(Some(pt)) => {
            stats.resolved += 1;
            debug!("Geocoded {} -> ({}, {})", address, pt.y(), pt.x());
            Some(pt)
        }
        Ok(None) => {
            stats.failed += 1;
            info!("No match for {}", address);
            None
        }
        Err(e) => {
            stats.failed += 1;
            warn!("Error for {}: {}", address, e);
            None
        }
    }
}

/// Default pause between lookups for the drivers below.
pub fn sleep_for(delay: Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}

/// Geocodes every row from its search name and overwrites its coordinates.
/// `pause` is called with the configured delay after every request, or once
/// at the end under `Throttle::PerRun`.
pub fn geocode_all(
    table: &mut SchoolTable,
    geocoder: &dyn Geocoder,
    settings: &GeocodeConfig,
    pause: &mut dyn FnMut(Duration),
) -> anyhow::Result<GeocodeStats> {
    table.require_name_column()?;
    if table.is_empty() {
        warn!("School table has no rows to geocode");
    }
    let mut stats = GeocodeStats::default();

    for row in 0..table.len() {
        let Some(name) = table.search_name(row) else {
            stats.skipped += 1;
            table.set_location(row, None);
            continue;
        };
        let address = build_address(name, &settings.address_suffix);
        let location = lookup(geocoder, &address, &mut stats);
        table.set_location(row, location);

        if settings.throttle == Throttle::PerRequest {
            pause(settings.delay());
        }
    }

    if settings.throttle == Throttle::PerRun {
        pause(settings.delay());
    }

    info!(
        "Geocoded {} rows: {} resolved, {} failed, {} skipped",
        stats.attempted, stats.resolved, stats.failed, stats.skipped
    );
    Ok(stats)
}

/// Geocodes only the rows missing a latitude or longitude, addressing them
/// by their full school id. Complete rows are left untouched. `pause` runs
/// after every lookup regardless of `settings.throttle`.
pub fn fill_missing(
    table: &mut SchoolTable,
    geocoder: &dyn Geocoder,
    settings: &GeocodeConfig,
    pause: &mut dyn FnMut(Duration),
) -> anyhow::Result<GeocodeStats> {
    table.require_id_column()?;
    if table.is_empty() {
        warn!("School table has no rows to geocode");
    }
    let mut stats = GeocodeStats::default();

    for row in 0..table.len() {
        if table.location(row).is_some() {
            stats.skipped += 1;
            continue;
        }
        let address = build_address(table.id(row).unwrap_or_default(), &settings.address_suffix);
        let location = lookup(geocoder, &address, &mut stats);
        table.set_location(row, location);
        pause(settings.delay());
    }

    info!(
        "Filled {} of {} missing rows ({} already located)",
        stats.resolved, stats.attempted, stats.skipped
    );
    Ok(stats)
}
