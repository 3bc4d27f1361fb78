use crate::map::{LatLng, MapSurface, MarkerHandle, MarkerKind, MarkerSpec, DEFAULT_CENTER, DEFAULT_ZOOM};
use crate::theme::Theme;
use eframe::egui::{self, Align2, FontId, Pos2, Rect, Sense, Stroke, Vec2};
use std::collections::BTreeMap;
use std::f64::consts::PI;

const TILE_SIZE: f64 = 256.0;
const MIN_ZOOM: f64 = 2.0;
const MAX_ZOOM: f64 = 19.0;
const MAX_LATITUDE: f64 = 85.051_128_78;
const MARKER_RADIUS: f32 = 7.0;
const MARKER_HIT_RADIUS: f32 = 12.0;

/// Result of one frame of pointer input on the map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MapInteraction {
    Clicked(LatLng),
    MarkerClicked(MarkerKind),
}

/// In-process map surface: a Web Mercator viewport with a graticule and pins.
/// Tiles are left to a real map engine.
#[derive(Debug)]
pub struct MapCanvas {
    center: LatLng,
    zoom: f64,
    markers: BTreeMap<MarkerHandle, MarkerSpec>,
    next_handle: u64,
}

impl Default for MapCanvas {
    fn default() -> Self {
        Self::new(DEFAULT_CENTER, DEFAULT_ZOOM)
    }
}

impl MapCanvas {
    pub fn new(center: LatLng, zoom: f64) -> Self {
        Self {
            center: clamp_center(center),
            zoom: zoom.clamp(MIN_ZOOM, MAX_ZOOM),
            markers: BTreeMap::new(),
            next_handle: 1,
        }
    }

    pub fn center(&self) -> LatLng {
        self.center
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    #[cfg(test)]
    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    #[cfg(test)]
    pub fn marker(&self, handle: MarkerHandle) -> Option<&MarkerSpec> {
        self.markers.get(&handle)
    }

    #[cfg(test)]
    pub fn markers(&self) -> impl Iterator<Item = (MarkerHandle, &MarkerSpec)> {
        self.markers.iter().map(|(handle, spec)| (*handle, spec))
    }

    fn world_size(&self) -> f64 {
        TILE_SIZE * 2f64.powf(self.zoom)
    }

    fn project(&self, position: LatLng) -> (f64, f64) {
        let size = self.world_size();
        let lat = position.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
        let x = (position.lng + 180.0) / 360.0 * size;
        let y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0 * size;
        (x, y)
    }

    fn unproject(&self, x: f64, y: f64) -> LatLng {
        let size = self.world_size();
        let lng = x / size * 360.0 - 180.0;
        let n = PI - 2.0 * PI * y / size;
        let lat = n.sinh().atan().to_degrees();
        LatLng::new(lat, lng)
    }

    fn to_screen(&self, rect: Rect, position: LatLng) -> Pos2 {
        let (cx, cy) = self.project(self.center);
        let (x, y) = self.project(position);
        rect.center() + Vec2::new((x - cx) as f32, (y - cy) as f32)
    }

    fn to_lat_lng(&self, rect: Rect, pos: Pos2) -> LatLng {
        let (cx, cy) = self.project(self.center);
        let offset = pos - rect.center();
        self.unproject(cx + offset.x as f64, cy + offset.y as f64)
    }

    fn pan_by_pixels(&mut self, delta: Vec2) {
        let (cx, cy) = self.project(self.center);
        let moved = self.unproject(cx - delta.x as f64, cy - delta.y as f64);
        self.center = clamp_center(moved);
    }

    fn marker_at(&self, rect: Rect, pos: Pos2) -> Option<MarkerKind> {
        self.markers
            .values()
            .map(|spec| (spec, self.to_screen(rect, spec.position).distance(pos)))
            .filter(|(_, distance)| *distance <= MARKER_HIT_RADIUS)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(spec, _)| spec.kind)
    }

    pub fn show(&mut self, ui: &mut egui::Ui, theme: &Theme) -> Option<MapInteraction> {
        let size = ui.available_size();
        let (rect, response) = ui.allocate_exact_size(size, Sense::click_and_drag());

        if response.dragged() {
            self.pan_by_pixels(response.drag_delta());
        }

        if response.hovered() {
            let scroll = ui.input(|input| input.smooth_scroll_delta.y);
            if scroll.abs() > f32::EPSILON {
                self.zoom = (self.zoom + (scroll / 120.0) as f64).clamp(MIN_ZOOM, MAX_ZOOM);
            }
        }

        let mut interaction = None;
        if response.clicked() {
            if let Some(pos) = response.interact_pointer_pos() {
                interaction = Some(match self.marker_at(rect, pos) {
                    Some(kind) => MapInteraction::MarkerClicked(kind),
                    None => MapInteraction::Clicked(self.to_lat_lng(rect, pos)),
                });
            }
        }

        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, 0.0, theme.surface_0);
        self.paint_graticule(&painter, rect, theme);
        self.paint_markers(&painter, rect, theme);
        painter.text(
            rect.right_bottom() - Vec2::new(8.0, 6.0),
            Align2::RIGHT_BOTTOM,
            format!(
                "{:.5}, {:.5}  z{:.1}",
                self.center.lat, self.center.lng, self.zoom
            ),
            FontId::monospace(11.0),
            theme.text_muted,
        );

        interaction
    }

    fn paint_graticule(&self, painter: &egui::Painter, rect: Rect, theme: &Theme) {
        let step = graticule_step(self.zoom);
        let stroke = Stroke::new(1.0, theme.border_subtle);
        let top_left = self.to_lat_lng(rect, rect.left_top());
        let bottom_right = self.to_lat_lng(rect, rect.right_bottom());

        let mut lng = (top_left.lng / step).floor() * step;
        while lng <= bottom_right.lng {
            let x = self.to_screen(rect, LatLng::new(self.center.lat, lng)).x;
            painter.line_segment([Pos2::new(x, rect.top()), Pos2::new(x, rect.bottom())], stroke);
            lng += step;
        }

        let mut lat = (bottom_right.lat / step).floor() * step;
        while lat <= top_left.lat {
            let y = self.to_screen(rect, LatLng::new(lat, self.center.lng)).y;
            painter.line_segment([Pos2::new(rect.left(), y), Pos2::new(rect.right(), y)], stroke);
            lat += step;
        }
    }

    fn paint_markers(&self, painter: &egui::Painter, rect: Rect, theme: &Theme) {
        for spec in self.markers.values() {
            let pos = self.to_screen(rect, spec.position);
            if !rect.expand(MARKER_HIT_RADIUS).contains(pos) {
                continue;
            }
            let fill = match spec.kind {
                MarkerKind::Place(_) => theme.marker_place,
                MarkerKind::UserLocation => theme.marker_user,
                MarkerKind::Jump => theme.marker_jump,
            };
            painter.circle_filled(pos, MARKER_RADIUS, fill);
            painter.circle_stroke(pos, MARKER_RADIUS, Stroke::new(2.0, theme.marker_outline));
            painter.text(
                pos - Vec2::new(0.0, MARKER_RADIUS + 2.0),
                Align2::CENTER_BOTTOM,
                &spec.title,
                FontId::proportional(12.0),
                theme.text_primary,
            );
        }
    }
}

impl MapSurface for MapCanvas {
    fn add_marker(&mut self, marker: MarkerSpec) -> MarkerHandle {
        let handle = MarkerHandle(self.next_handle);
        self.next_handle += 1;
        self.markers.insert(handle, marker);
        handle
    }

    fn remove_marker(&mut self, handle: MarkerHandle) -> bool {
        self.markers.remove(&handle).is_some()
    }

    fn pan_to(&mut self, center: LatLng) {
        if center.is_finite() {
            self.center = clamp_center(center);
        }
    }

    fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
    }
}

fn clamp_center(center: LatLng) -> LatLng {
    let lng = if (-180.0..=180.0).contains(&center.lng) {
        center.lng
    } else {
        (center.lng + 180.0).rem_euclid(360.0) - 180.0
    };
    LatLng::new(center.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE), lng)
}

fn graticule_step(zoom: f64) -> f64 {
    match zoom {
        z if z < 5.0 => 10.0,
        z if z < 8.0 => 1.0,
        z if z < 11.0 => 0.1,
        z if z < 15.0 => 0.01,
        _ => 0.001,
    }
}
