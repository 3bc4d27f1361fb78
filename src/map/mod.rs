use serde::{Deserialize, Serialize};

pub mod canvas;
pub mod geocode;
pub mod jump;
pub mod reconcile;

pub const DEFAULT_CENTER: LatLng = LatLng {
    lat: 23.1291,
    lng: 113.2644,
};
pub const DEFAULT_ZOOM: f64 = 13.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }

    /// Finite and inside the WGS84 latitude/longitude ranges.
    pub fn is_valid(&self) -> bool {
        self.is_finite() && (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerHandle(pub u64);

/// What a marker stands for. Clicks on a marker are reported with this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Place(crate::places::PlaceId),
    UserLocation,
    Jump,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerSpec {
    pub position: LatLng,
    pub title: String,
    pub kind: MarkerKind,
}

/// The slice of a map engine the core talks to.
pub trait MapSurface {
    fn add_marker(&mut self, marker: MarkerSpec) -> MarkerHandle;
    fn remove_marker(&mut self, handle: MarkerHandle) -> bool;
    fn pan_to(&mut self, center: LatLng);
    fn set_zoom(&mut self, zoom: f64);
}
