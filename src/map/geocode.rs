use crate::map::LatLng;
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

const GOOGLE_TEXT_SEARCH_URL: &str = "https://maps.googleapis.com/maps/api/place/textsearch/json";
const AMAP_GEOCODE_URL: &str = "https://restapi.amap.com/v3/geocode/geo";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GeocodeError {
    #[error("map service API key is not configured")]
    MissingApiKey,
    #[error("map service request failed: {0}")]
    Transport(String),
    #[error("map service rejected the query: {0}")]
    Rejected(String),
    #[error("map service returned an unreadable response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for GeocodeError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Place search: free text in, at most one best match out.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn search(&self, query: &str) -> Result<Option<LatLng>, GeocodeError>;
}

#[derive(Debug, Clone)]
pub struct GooglePlacesGeocoder {
    api_key: Option<String>,
    endpoint: String,
    http: reqwest::Client,
}

impl GooglePlacesGeocoder {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            endpoint: GOOGLE_TEXT_SEARCH_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GoogleTextSearchResponse {
    status: String,
    #[serde(default)]
    results: Vec<GoogleResult>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleResult {
    geometry: GoogleGeometry,
}

#[derive(Debug, Deserialize)]
struct GoogleGeometry {
    location: LatLng,
}

fn parse_google_response(body: &str) -> Result<Option<LatLng>, GeocodeError> {
    let response: GoogleTextSearchResponse = serde_json::from_str(body)
        .map_err(|err| GeocodeError::InvalidResponse(err.to_string()))?;
    match response.status.as_str() {
        "OK" => Ok(response
            .results
            .into_iter()
            .next()
            .map(|result| result.geometry.location)),
        "ZERO_RESULTS" => Ok(None),
        status => Err(GeocodeError::Rejected(
            response
                .error_message
                .map(|message| format!("{status}: {message}"))
                .unwrap_or_else(|| status.to_string()),
        )),
    }
}

#[async_trait]
impl Geocoder for GooglePlacesGeocoder {
    async fn search(&self, query: &str) -> Result<Option<LatLng>, GeocodeError> {
        let api_key = self.api_key.as_deref().ok_or(GeocodeError::MissingApiKey)?;
        debug!(query, "google places text search");
        let body = self
            .http
            .get(&self.endpoint)
            .query(&[("query", query), ("fields", "name,geometry"), ("key", api_key)])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_google_response(&body)
    }
}

#[derive(Debug, Clone)]
pub struct AmapGeocoder {
    api_key: Option<String>,
    endpoint: String,
    http: reqwest::Client,
}

impl AmapGeocoder {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            endpoint: AMAP_GEOCODE_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AmapResponse {
    status: String,
    #[serde(default)]
    info: String,
    #[serde(default)]
    geocodes: Vec<AmapGeocode>,
}

#[derive(Debug, Deserialize)]
struct AmapGeocode {
    location: String,
}

/// AMap reports locations as `"lng,lat"`.
fn parse_amap_location(raw: &str) -> Result<LatLng, GeocodeError> {
    let (lng, lat) = raw
        .split_once(',')
        .ok_or_else(|| GeocodeError::InvalidResponse(format!("malformed location: {raw}")))?;
    let lng = lng
        .trim()
        .parse::<f64>()
        .map_err(|err| GeocodeError::InvalidResponse(format!("bad longitude {lng}: {err}")))?;
    let lat = lat
        .trim()
        .parse::<f64>()
        .map_err(|err| GeocodeError::InvalidResponse(format!("bad latitude {lat}: {err}")))?;
    let location = LatLng::new(lat, lng);
    if !location.is_valid() {
        return Err(GeocodeError::InvalidResponse(format!("out of range location: {raw}")));
    }
    Ok(location)
}

fn parse_amap_response(body: &str) -> Result<Option<LatLng>, GeocodeError> {
    let response: AmapResponse = serde_json::from_str(body)
        .map_err(|err| GeocodeError::InvalidResponse(err.to_string()))?;
    if response.status != "1" {
        return Err(GeocodeError::Rejected(response.info));
    }
    response
        .geocodes
        .first()
        .map(|geocode| parse_amap_location(&geocode.location))
        .transpose()
}

#[async_trait]
impl Geocoder for AmapGeocoder {
    async fn search(&self, query: &str) -> Result<Option<LatLng>, GeocodeError> {
        let api_key = self.api_key.as_deref().ok_or(GeocodeError::MissingApiKey)?;
        debug!(query, "amap geocode");
        let body = self
            .http
            .get(&self.endpoint)
            .query(&[("address", query), ("key", api_key)])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_amap_response(&body)
    }
}
