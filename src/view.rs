use geo::{coord, Coord, Rect};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

// Constants for Web Mercator
const EARTH_RADIUS: f64 = 6378137.0;
const TILE_SIZE: f64 = 256.0;
pub const MAX_ZOOM: f64 = 28.0;
// Latitude at which the mercator world becomes square
pub const MAX_LATITUDE: f64 = 85.0511287798066;

/// Padding (top, right, bottom, left) used when zooming to a cluster.
pub const CLUSTER_FIT_PADDING: Padding = Padding {
    top: 72.0,
    right: 48.0,
    bottom: 24.0,
    left: 48.0,
};

/// Projects a WGS84 position into EPSG:3857 map units.
pub fn from_lon_lat(lon: f64, lat: f64) -> Coord<f64> {
    let x = EARTH_RADIUS * lon.to_radians();
    let y = EARTH_RADIUS * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln();
    coord! { x: x, y: y }
}

/// Projected marker position, or `None` when the position lies outside the mercator world.
pub fn marker_coordinate(lon: f64, lat: f64) -> Option<Coord<f64>> {
    if !(-MAX_LATITUDE..=MAX_LATITUDE).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return None;
    }
    let c = from_lon_lat(lon, lat);
    (c.x.is_finite() && c.y.is_finite()).then_some(c)
}

fn max_resolution() -> f64 {
    2.0 * PI * EARTH_RADIUS / TILE_SIZE
}

pub fn resolution_for_zoom(zoom: f64) -> f64 {
    max_resolution() / 2.0_f64.powf(zoom)
}

pub fn zoom_for_resolution(resolution: f64) -> f64 {
    (max_resolution() / resolution).log2()
}

/// Smallest extent containing all coordinates.
pub fn extent_of(coords: impl IntoIterator<Item = Coord<f64>>) -> Option<Rect<f64>> {
    let mut iter = coords.into_iter();
    let first = iter.next()?;
    let (min, max) = iter.fold((first, first), |(min, max), c| {
        (
            coord! { x: min.x.min(c.x), y: min.y.min(c.y) },
            coord! { x: max.x.max(c.x), y: max.y.max(c.y) },
        )
    });
    Some(Rect::new(min, max))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Padding {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

/// What the client currently shows: centre in map units, zoom level and pixel size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub center: [f64; 2],
    pub zoom: f64,
    pub size: [f64; 2],
}

impl Viewport {
    pub fn new(center: Coord<f64>, zoom: f64, size: [f64; 2]) -> Self {
        Self {
            center: [center.x, center.y],
            zoom,
            size,
        }
    }

    pub fn resolution(&self) -> f64 {
        resolution_for_zoom(self.zoom)
    }

    pub fn center(&self) -> Coord<f64> {
        coord! { x: self.center[0], y: self.center[1] }
    }

    pub fn width(&self) -> f64 {
        self.size[0]
    }

    pub fn height(&self) -> f64 {
        self.size[1]
    }

    pub fn pixel_to_coordinate(&self, pixel: [f64; 2]) -> Coord<f64> {
        let res = self.resolution();
        coord! {
            x: self.center[0] + (pixel[0] - self.size[0] / 2.0) * res,
            y: self.center[1] - (pixel[1] - self.size[1] / 2.0) * res,
        }
    }

    pub fn coordinate_to_pixel(&self, c: Coord<f64>) -> [f64; 2] {
        let res = self.resolution();
        [
            (c.x - self.center[0]) / res + self.size[0] / 2.0,
            (self.center[1] - c.y) / res + self.size[1] / 2.0,
        ]
    }

    /// Centre that puts `coordinate` at screen `position` at the current resolution.
    pub fn center_on(&self, coordinate: Coord<f64>, position: [f64; 2]) -> Coord<f64> {
        let res = self.resolution();
        coord! {
            x: coordinate.x + (self.size[0] / 2.0 - position[0]) * res,
            y: coordinate.y + (position[1] - self.size[1] / 2.0) * res,
        }
    }

    /// Centre and zoom showing the whole extent inside the padded viewport.
    pub fn fit(&self, extent: Rect<f64>, padding: Padding) -> (Coord<f64>, f64) {
        let inner_w = (self.size[0] - padding.left - padding.right).max(1.0);
        let inner_h = (self.size[1] - padding.top - padding.bottom).max(1.0);
        let resolution = (extent.width() / inner_w)
            .max(extent.height() / inner_h)
            .clamp(resolution_for_zoom(MAX_ZOOM), max_resolution());

        let mid = extent.center();
        let center = coord! {
            x: mid.x + (padding.right - padding.left) / 2.0 * resolution,
            y: mid.y + (padding.top - padding.bottom) / 2.0 * resolution,
        };
        (center, zoom_for_resolution(resolution))
    }
}

/// One animation phase; phases run one after another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimationStep {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<[f64; 2]>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewAnimation {
    pub delay_ms: u64,
    pub steps: Vec<AnimationStep>,
}

impl ViewAnimation {
    pub fn fit(viewport: &Viewport, extent: Rect<f64>, padding: Padding, duration_ms: u64) -> Self {
        let (center, zoom) = viewport.fit(extent, padding);
        Self {
            delay_ms: 0,
            steps: vec![AnimationStep {
                center: Some([center.x, center.y]),
                zoom: Some(zoom),
                anchor: None,
                duration_ms,
            }],
        }
    }

    /// Pans so `target` lands on `position`, then zooms around it.
    pub fn center_on(
        viewport: &Viewport,
        target: Coord<f64>,
        position: [f64; 2],
        zoom: f64,
        duration_ms: u64,
    ) -> Self {
        let center = viewport.center_on(target, position);
        let anchor = Some([target.x, target.y]);
        Self {
            delay_ms: 0,
            steps: vec![
                AnimationStep {
                    center: Some([center.x, center.y]),
                    zoom: None,
                    anchor,
                    duration_ms,
                },
                AnimationStep {
                    center: None,
                    zoom: Some(zoom),
                    anchor,
                    duration_ms,
                },
            ],
        }
    }

    pub fn delayed(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn projection_of_known_points() {
        assert!(close(from_lon_lat(0.0, 0.0).y, 0.0));
        assert!(close(from_lon_lat(180.0, 0.0).x, 20037508.342789244));
    }

    #[test]
    fn markers_outside_the_mercator_world_have_no_coordinate() {
        assert!(marker_coordinate(9.1797, 48.7786).is_some());
        assert!(marker_coordinate(0.0, MAX_LATITUDE).is_some());
        assert_eq!(marker_coordinate(0.0, 90.0), None);
        assert_eq!(marker_coordinate(0.0, -90.0), None);
        assert_eq!(marker_coordinate(0.0, 91.0), None);
        assert_eq!(marker_coordinate(200.0, 10.0), None);
        assert_eq!(marker_coordinate(f64::NAN, 10.0), None);
        assert_eq!(marker_coordinate(10.0, f64::INFINITY), None);
    }

    #[test]
    fn zoom_and_resolution_are_inverse() {
        assert!(close(zoom_for_resolution(resolution_for_zoom(14.0)), 14.0));
        assert!(close(resolution_for_zoom(0.0), 156543.03392804097));
    }

    #[test]
    fn pixel_conversion_is_symmetric() {
        let vp = Viewport::new(from_lon_lat(9.18, 48.78), 14.0, [800.0, 600.0]);
        let c = vp.pixel_to_coordinate([100.0, 500.0]);
        let p = vp.coordinate_to_pixel(c);
        assert!(close(p[0], 100.0));
        assert!(close(p[1], 500.0));
        let mid = vp.pixel_to_coordinate([400.0, 300.0]);
        assert!(close(mid.x, vp.center[0]));
    }

    #[test]
    fn center_on_places_target_at_position() {
        let vp = Viewport::new(coord! { x: 0.0, y: 0.0 }, 10.0, [800.0, 600.0]);
        let target = coord! { x: 5000.0, y: -3000.0 };
        let position = [400.0, 585.0];
        let moved = Viewport {
            center: {
                let c = vp.center_on(target, position);
                [c.x, c.y]
            },
            ..vp
        };
        let p = moved.coordinate_to_pixel(target);
        assert!(close(p[0], position[0]));
        assert!(close(p[1], position[1]));
    }

    #[test]
    fn fit_keeps_extent_inside_padding() {
        let vp = Viewport::new(coord! { x: 0.0, y: 0.0 }, 5.0, [800.0, 600.0]);
        let extent = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 7040.0, y: 1000.0 });
        let (center, zoom) = vp.fit(extent, CLUSTER_FIT_PADDING);
        let fitted = Viewport::new(center, zoom, vp.size);

        // width is the binding dimension: 7040 / (800 - 96) = 10 units per pixel
        assert!(close(fitted.resolution(), 10.0));
        let min = fitted.coordinate_to_pixel(coord! { x: 0.0, y: 1000.0 });
        let max = fitted.coordinate_to_pixel(coord! { x: 7040.0, y: 0.0 });
        assert!(close(min[0], 48.0));
        assert!(close(max[0], 752.0));
        assert!(min[1] >= 72.0 - 1e-6);
        assert!(max[1] <= 576.0 + 1e-6);
    }

    #[test]
    fn fit_of_a_point_is_clamped_to_max_zoom() {
        let vp = Viewport::new(coord! { x: 0.0, y: 0.0 }, 5.0, [800.0, 600.0]);
        let p = coord! { x: 10.0, y: 10.0 };
        let (_, zoom) = vp.fit(Rect::new(p, p), CLUSTER_FIT_PADDING);
        assert!(close(zoom, MAX_ZOOM));
    }

    #[test]
    fn extent_of_nothing_is_none() {
        assert!(extent_of(Vec::new()).is_none());
        let e = extent_of(vec![coord! { x: 1.0, y: 5.0 }, coord! { x: -2.0, y: 3.0 }]).unwrap();
        assert_eq!(e.min(), coord! { x: -2.0, y: 3.0 });
        assert_eq!(e.max(), coord! { x: 1.0, y: 5.0 });
    }
}
