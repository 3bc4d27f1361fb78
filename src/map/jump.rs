use crate::event::AppEvent;
use crate::map::geocode::{GeocodeError, Geocoder};
use crate::map::{LatLng, MapSurface, MarkerHandle, MarkerKind, MarkerSpec};
use std::sync::{mpsc, Arc};
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

pub const JUMP_ZOOM: f64 = 17.0;

/// Hand-curated coordinates for addresses the search services get wrong.
const MANUAL_COORDINATES: &[(&str, LatLng)] = &[("雅居乐南湖半岛花园", LatLng::new(23.21767, 113.33141))];

pub fn manual_coordinate(address: &str) -> Option<LatLng> {
    MANUAL_COORDINATES
        .iter()
        .find(|(name, _)| *name == address)
        .map(|(_, location)| *location)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JumpStatus {
    Landed(LatLng),
    Pending,
}

#[derive(Debug, Error)]
pub enum JumpError {
    #[error("no address to look up")]
    EmptyAddress,
    #[error("could not find \"{0}\" on the map")]
    NotFound(String),
    #[error("map search for \"{address}\" returned an invalid coordinate ({lat}, {lng})")]
    InvalidCoordinate { address: String, lat: f64, lng: f64 },
    #[error("map search for \"{address}\" failed: {source}")]
    Geocoder {
        address: String,
        #[source]
        source: GeocodeError,
    },
}

/// Turns free-text addresses into a map jump and owns the transient jump markers.
pub struct JumpDispatcher {
    geocoder: Arc<dyn Geocoder>,
    runtime_handle: Handle,
    tx: mpsc::Sender<AppEvent>,
    epoch: u64,
    handles: Vec<MarkerHandle>,
}

impl JumpDispatcher {
    pub fn new(
        geocoder: Arc<dyn Geocoder>,
        runtime_handle: Handle,
        tx: mpsc::Sender<AppEvent>,
        epoch: u64,
    ) -> Self {
        Self {
            geocoder,
            runtime_handle,
            tx,
            epoch,
            handles: Vec::new(),
        }
    }

    pub fn jump_to(
        &mut self,
        map: &mut dyn MapSurface,
        address: &str,
    ) -> Result<JumpStatus, JumpError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(JumpError::EmptyAddress);
        }

        if let Some(location) = manual_coordinate(address) {
            debug!(address, "using manual coordinate");
            self.land(map, address, location);
            return Ok(JumpStatus::Landed(location));
        }

        let geocoder = Arc::clone(&self.geocoder);
        let tx = self.tx.clone();
        let epoch = self.epoch;
        let address = address.to_string();
        self.runtime_handle.spawn(async move {
            let outcome = geocoder.search(&address).await;
            let _ = tx.send(AppEvent::GeocodeFinished {
                epoch,
                address,
                outcome,
            });
        });
        Ok(JumpStatus::Pending)
    }

    /// Applies a geocoder result. Results from another epoch are dropped and yield `Ok(None)`.
    pub fn finish(
        &mut self,
        map: &mut dyn MapSurface,
        epoch: u64,
        address: &str,
        outcome: Result<Option<LatLng>, GeocodeError>,
    ) -> Result<Option<LatLng>, JumpError> {
        if epoch != self.epoch {
            debug!(address, epoch, current = self.epoch, "dropping stale geocode result");
            return Ok(None);
        }

        match outcome {
            Ok(Some(location)) if !location.is_valid() => {
                warn!(
                    address,
                    lat = location.lat,
                    lng = location.lng,
                    "geocoder returned an invalid coordinate"
                );
                Err(JumpError::InvalidCoordinate {
                    address: address.to_string(),
                    lat: location.lat,
                    lng: location.lng,
                })
            }
            Ok(Some(location)) => {
                self.land(map, address, location);
                Ok(Some(location))
            }
            Ok(None) => Err(JumpError::NotFound(address.to_string())),
            Err(source) => {
                warn!(address, "geocoding failed: {source}");
                Err(JumpError::Geocoder {
                    address: address.to_string(),
                    source,
                })
            }
        }
    }

    fn land(&mut self, map: &mut dyn MapSurface, address: &str, location: LatLng) {
        self.clear(map);
        map.pan_to(location);
        map.set_zoom(JUMP_ZOOM);
        let handle = map.add_marker(MarkerSpec {
            position: location,
            title: address.to_string(),
            kind: MarkerKind::Jump,
        });
        self.handles.push(handle);
        info!(address, lat = location.lat, lng = location.lng, "map jumped");
    }

    pub fn clear(&mut self, map: &mut dyn MapSurface) {
        for handle in self.handles.drain(..) {
            map.remove_marker(handle);
        }
    }

    #[cfg(test)]
    pub fn handles(&self) -> &[MarkerHandle] {
        &self.handles
    }
}

#[cfg(test)]
mod tests {
    use super::{JumpDispatcher, JumpError, JumpStatus, JUMP_ZOOM};
    use crate::event::AppEvent;
    use crate::map::canvas::MapCanvas;
    use crate::map::geocode::{GeocodeError, Geocoder};
    use crate::map::{LatLng, MarkerKind};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};
    use std::time::Duration;

    struct CountingGeocoder {
        calls: AtomicUsize,
        answer: Option<LatLng>,
    }

    #[async_trait]
    impl Geocoder for CountingGeocoder {
        async fn search(&self, _query: &str) -> Result<Option<LatLng>, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer)
        }
    }

    fn dispatcher(
        runtime: &tokio::runtime::Runtime,
        answer: Option<LatLng>,
    ) -> (JumpDispatcher, Arc<CountingGeocoder>, mpsc::Receiver<AppEvent>) {
        let geocoder = Arc::new(CountingGeocoder {
            calls: AtomicUsize::new(0),
            answer,
        });
        let (tx, rx) = mpsc::channel();
        let dispatcher = JumpDispatcher::new(geocoder.clone(), runtime.handle().clone(), tx, 7);
        (dispatcher, geocoder, rx)
    }

    #[test]
    fn manual_coordinate_skips_the_geocoder() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime should build");
        let (mut dispatcher, geocoder, rx) = dispatcher(&runtime, None);
        let mut map = MapCanvas::default();

        let status = dispatcher
            .jump_to(&mut map, "雅居乐南湖半岛花园")
            .expect("manual coordinate should land");

        assert_eq!(status, JumpStatus::Landed(LatLng::new(23.21767, 113.33141)));
        assert_eq!(map.center(), LatLng::new(23.21767, 113.33141));
        assert_eq!(map.zoom(), JUMP_ZOOM);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn geocoded_jump_replaces_previous_jump_marker() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime should build");
        let tower = LatLng::new(23.1066, 113.3245);
        let (mut dispatcher, geocoder, rx) = dispatcher(&runtime, Some(tower));
        let mut map = MapCanvas::default();

        dispatcher
            .jump_to(&mut map, "雅居乐南湖半岛花园")
            .expect("manual coordinate should land");
        let status = dispatcher
            .jump_to(&mut map, "  广州塔 ")
            .expect("lookup should start");
        assert_eq!(status, JumpStatus::Pending);

        let event = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("geocode result should arrive");
        let AppEvent::GeocodeFinished {
            epoch,
            address,
            outcome,
        } = event
        else {
            panic!("unexpected event");
        };
        assert_eq!(address, "广州塔");
        let landed = dispatcher
            .finish(&mut map, epoch, &address, outcome)
            .expect("match should land");

        assert_eq!(landed, Some(tower));
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.handles().len(), 1);
        let jumps: Vec<_> = map
            .markers()
            .filter(|(_, spec)| spec.kind == MarkerKind::Jump)
            .map(|(_, spec)| spec.title.clone())
            .collect();
        assert_eq!(jumps, vec!["广州塔".to_string()]);
    }

    #[test]
    fn no_match_reports_not_found_and_keeps_map() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime should build");
        let (mut dispatcher, _geocoder, _rx) = dispatcher(&runtime, None);
        let mut map = MapCanvas::default();
        let before = map.center();

        let error = dispatcher
            .finish(&mut map, 7, "nowhere", Ok(None))
            .expect_err("missing match should fail");

        assert!(matches!(error, JumpError::NotFound(address) if address == "nowhere"));
        assert_eq!(map.center(), before);
        assert_eq!(map.marker_count(), 0);
    }

    #[test]
    fn geocoder_failure_is_reported() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime should build");
        let (mut dispatcher, _geocoder, _rx) = dispatcher(&runtime, None);
        let mut map = MapCanvas::default();

        let error = dispatcher
            .finish(&mut map, 7, "x", Err(GeocodeError::MissingApiKey))
            .expect_err("geocoder error should fail");

        assert!(matches!(error, JumpError::Geocoder { .. }));
    }

    #[test]
    fn out_of_range_coordinates_are_rejected() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime should build");
        let (mut dispatcher, _geocoder, _rx) = dispatcher(&runtime, None);
        let mut map = MapCanvas::default();
        let before = map.center();

        for bad in [
            LatLng::new(23.0, 1e300),
            LatLng::new(23.0, f64::INFINITY),
            LatLng::new(f64::NAN, 113.0),
            LatLng::new(95.0, 113.0),
        ] {
            let error = dispatcher
                .finish(&mut map, 7, "x", Ok(Some(bad)))
                .expect_err("invalid coordinate should fail");
            assert!(matches!(error, JumpError::InvalidCoordinate { .. }));
        }

        assert_eq!(map.center(), before);
        assert_eq!(map.marker_count(), 0);
    }

    #[test]
    fn stale_epoch_results_are_dropped() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime should build");
        let (mut dispatcher, _geocoder, _rx) = dispatcher(&runtime, None);
        let mut map = MapCanvas::default();

        let landed = dispatcher
            .finish(&mut map, 6, "old", Ok(Some(LatLng::new(1.0, 1.0))))
            .expect("stale result should be ignored");

        assert!(landed.is_none());
        assert_eq!(map.marker_count(), 0);
    }

    #[test]
    fn empty_address_is_rejected() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime should build");
        let (mut dispatcher, geocoder, _rx) = dispatcher(&runtime, None);
        let mut map = MapCanvas::default();

        let error = dispatcher.jump_to(&mut map, "   ").expect_err("blank should fail");

        assert!(matches!(error, JumpError::EmptyAddress));
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 0);
    }
}
