use crate::map::{LatLng, MapSurface, MarkerHandle, MarkerKind, MarkerSpec};
use crate::places::Place;
use tracing::debug;

pub const USER_LOCATION_TITLE: &str = "Your location";

/// Rebuilds place markers from scratch on every call.
#[derive(Debug, Default)]
pub struct MarkerReconciler {
    handles: Vec<MarkerHandle>,
}

impl MarkerReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reconcile(
        &mut self,
        places: &[Place],
        map: &mut dyn MapSurface,
        user_location: Option<LatLng>,
    ) {
        self.teardown(map);

        for place in places {
            let position = place.position();
            if !position.is_finite() {
                debug!(place_id = place.id.0, "skipping marker for place without coordinates");
                continue;
            }
            let handle = map.add_marker(MarkerSpec {
                position,
                title: place.name.clone(),
                kind: MarkerKind::Place(place.id),
            });
            self.handles.push(handle);
        }

        if let Some(location) = user_location.filter(LatLng::is_finite) {
            let handle = map.add_marker(MarkerSpec {
                position: location,
                title: USER_LOCATION_TITLE.to_string(),
                kind: MarkerKind::UserLocation,
            });
            self.handles.push(handle);
        }

        debug!(markers = self.handles.len(), "markers reconciled");
    }

    pub fn teardown(&mut self, map: &mut dyn MapSurface) {
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
    use super::MarkerReconciler;
    use crate::map::canvas::MapCanvas;
    use crate::map::{LatLng, MapSurface, MarkerKind, MarkerSpec};
    use crate::places::{Place, PlaceId, UploaderInfo};

    fn place(id: u64, name: &str, lat: f64, lng: f64) -> Place {
        Place {
            id: PlaceId(id),
            name: name.to_string(),
            description: String::new(),
            lat,
            lng,
            image_url: "https://example.com/a.png".to_string(),
            creator_id: "u_tester01".to_string(),
            uploader: UploaderInfo::default(),
        }
    }

    #[test]
    fn reconcile_twice_keeps_one_marker_per_place() {
        let places = vec![
            place(1, "Graffiti wall", 23.1291, 113.2644),
            place(2, "Coffee lane", 23.1257, 113.2806),
        ];
        let mut canvas = MapCanvas::default();
        let mut reconciler = MarkerReconciler::new();

        reconciler.reconcile(&places, &mut canvas, None);
        let first: Vec<_> = canvas.markers().map(|(_, spec)| spec.clone()).collect();
        reconciler.reconcile(&places, &mut canvas, None);
        let second: Vec<_> = canvas.markers().map(|(_, spec)| spec.clone()).collect();

        assert_eq!(canvas.marker_count(), places.len());
        assert_eq!(reconciler.handles().len(), places.len());
        assert_eq!(first, second);
        assert_eq!(second[0].kind, MarkerKind::Place(PlaceId(1)));
        assert_eq!(second[1].title, "Coffee lane");
    }

    #[test]
    fn reconcile_skips_places_with_non_finite_coordinates() {
        let places = vec![
            place(1, "ok", 23.0, 113.0),
            place(2, "broken", f64::NAN, 113.0),
        ];
        let mut canvas = MapCanvas::default();
        let mut reconciler = MarkerReconciler::new();

        reconciler.reconcile(&places, &mut canvas, None);

        assert_eq!(canvas.marker_count(), 1);
    }

    #[test]
    fn user_location_marker_is_rebuilt_with_places() {
        let places = vec![place(1, "ok", 23.0, 113.0)];
        let mut canvas = MapCanvas::default();
        let mut reconciler = MarkerReconciler::new();
        let here = LatLng::new(23.2, 113.3);

        reconciler.reconcile(&places, &mut canvas, Some(here));
        reconciler.reconcile(&places, &mut canvas, Some(here));

        assert_eq!(canvas.marker_count(), 2);
        assert_eq!(
            canvas
                .markers()
                .filter(|(_, spec)| spec.kind == MarkerKind::UserLocation)
                .count(),
            1
        );
    }

    #[test]
    fn reconcile_leaves_foreign_markers_alone() {
        let mut canvas = MapCanvas::default();
        let foreign = canvas.add_marker(MarkerSpec {
            position: LatLng::new(23.0, 113.0),
            title: "jump".to_string(),
            kind: MarkerKind::Jump,
        });
        let mut reconciler = MarkerReconciler::new();

        reconciler.reconcile(&[place(1, "a", 23.1, 113.1)], &mut canvas, None);
        reconciler.reconcile(&[], &mut canvas, None);

        assert_eq!(canvas.marker_count(), 1);
        assert!(canvas.marker(foreign).is_some());
    }
}
