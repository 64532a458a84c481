use crate::cluster::{is_displayed_in_cluster, Cluster, ClusterSource};
use crate::config::MapConfig;
use crate::data::Directory;
use crate::filter::FilterState;
use crate::popup::{popup_content, PopupOverlay, PopupState, POPUP_OFFSET};
use crate::redraw::{Redraw, RepaintSchedule};
use crate::style::{cluster_style, ClusterStyle};
use crate::types::{Association, DropdownOption};
use crate::view::{from_lon_lat, marker_coordinate, ViewAnimation, Viewport, CLUSTER_FIT_PADDING};
use geo::Coord;
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Below this container width the sidebar collapses when a popup opens.
const NARROW_WIDTH_PX: f64 = 360.0;
/// Zoom used when an association is picked from the list while hidden in a cluster.
const SELECT_ZOOM: f64 = 20.0;
/// Vertical popup anchor as a fraction of the container height.
const POPUP_ANCHOR_Y: f64 = 0.975;

/// Loaded directory plus marker features. Shared read-only between requests.
pub struct MapData {
    pub associations: Vec<Association>,
    pub district_options: Vec<DropdownOption>,
    pub activity_options: Vec<DropdownOption>,
    pub source: ClusterSource,
    pub config: MapConfig,
}

impl MapData {
    pub fn new(directory: Directory, config: MapConfig) -> Self {
        let source = ClusterSource::from_associations(&directory.associations);
        info!(
            "Placed {} of {} associations on the map",
            source.len(),
            directory.associations.len()
        );
        Self {
            associations: directory.associations,
            district_options: directory.district_options,
            activity_options: directory.activity_options,
            source,
            config,
        }
    }

    pub fn association(&self, id: &str) -> Option<&Association> {
        self.associations.iter().find(|a| a.id == id)
    }

    fn animation_ms(&self) -> u64 {
        self.config.animation_duration_ms
    }
}

/// Everything the map view owns. Round-trips through the client between interactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapState {
    #[serde(default)]
    pub filter: FilterState,
    pub viewport: Viewport,
    #[serde(default)]
    pub popup: PopupState,
    #[serde(default = "default_true")]
    pub sidebar_expanded: bool,
}

fn default_true() -> bool {
    true
}

impl MapState {
    pub fn initial(config: &MapConfig, size: [f64; 2]) -> Self {
        Self {
            filter: FilterState::default(),
            viewport: Viewport::new(
                from_lon_lat(config.center_lon, config.center_lat),
                config.zoom,
                size,
            ),
            popup: PopupState::Closed,
            sidebar_expanded: size[0] >= NARROW_WIDTH_PX,
        }
    }
}

/// A cluster as drawn in the current viewport.
#[derive(Debug, Clone)]
pub struct RenderedCluster {
    pub cluster: Cluster,
    pub style: ClusterStyle,
    pub pixel: [f64; 2],
}

/// Result of a click or list selection.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub animation: Option<ViewAnimation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay: Option<PopupOverlay>,
}

/// Controller of one map view: filters, renders and reacts to pointer events.
pub struct MapView<'a> {
    data: &'a MapData,
    state: MapState,
    filtered: Vec<String>,
    redraw: Option<(Arc<dyn Redraw>, RepaintSchedule)>,
}

impl<'a> MapView<'a> {
    pub fn new(data: &'a MapData, state: MapState) -> Self {
        let filtered = Self::filtered_ids_for(data, &state.filter);
        Self {
            data,
            state,
            filtered,
            redraw: None,
        }
    }

    /// Layer to invalidate repeatedly whenever the style changes.
    pub fn with_redraw(mut self, target: Arc<dyn Redraw>, schedule: RepaintSchedule) -> Self {
        self.redraw = Some((target, schedule));
        self
    }

    fn filtered_ids_for(data: &MapData, filter: &FilterState) -> Vec<String> {
        filter
            .apply(&data.associations)
            .into_iter()
            .map(|a| a.id.clone())
            .collect()
    }

    pub fn state(&self) -> &MapState {
        &self.state
    }

    pub fn into_state(self) -> MapState {
        self.state
    }

    pub fn filtered_ids(&self) -> &[String] {
        &self.filtered
    }

    pub fn filtered_associations(&self) -> Vec<&'a Association> {
        self.state.filter.apply(&self.data.associations)
    }

    /// Replaces the filter. Restyles and schedules repaints when the visible set changed.
    pub fn apply_filter(&mut self, filter: FilterState) -> bool {
        let filtered = Self::filtered_ids_for(self.data, &filter);
        self.state.filter = filter;
        if filtered == self.filtered {
            return false;
        }
        debug!("Filter changed: {} of {} visible", filtered.len(), self.data.associations.len());
        self.filtered = filtered;
        if let Some((target, schedule)) = &self.redraw {
            schedule.run(target.clone());
        }
        true
    }

    pub fn set_query(&mut self, query: &str) -> bool {
        let mut filter = self.state.filter.clone();
        filter.query = query.to_string();
        self.apply_filter(filter)
    }

    pub fn select_districts(&mut self, values: Vec<String>) -> bool {
        let mut filter = self.state.filter.clone();
        filter.selected_districts = values;
        self.apply_filter(filter)
    }

    pub fn select_activities(&mut self, values: Vec<String>) -> bool {
        let mut filter = self.state.filter.clone();
        filter.selected_activities = values;
        self.apply_filter(filter)
    }

    pub fn reset_districts(&mut self) -> bool {
        let mut filter = self.state.filter.clone();
        filter.reset_districts();
        self.apply_filter(filter)
    }

    pub fn reset_activities(&mut self) -> bool {
        let mut filter = self.state.filter.clone();
        filter.reset_activities();
        self.apply_filter(filter)
    }

    pub fn clear_filters(&mut self) -> bool {
        self.apply_filter(FilterState::default())
    }

    pub fn toggle_sidebar(&mut self) {
        self.state.sidebar_expanded = !self.state.sidebar_expanded;
    }

    pub fn clusters(&self) -> Vec<Cluster> {
        self.data.source.cluster(
            self.state.viewport.resolution(),
            self.data.config.cluster_distance_px,
        )
    }

    /// Clusters of the current viewport with their styles, in drawing order.
    pub fn render(&self) -> Vec<RenderedCluster> {
        let filtered: HashSet<&str> = self.filtered.iter().map(String::as_str).collect();
        self.clusters()
            .into_iter()
            .map(|cluster| RenderedCluster {
                style: cluster_style(&cluster, &filtered),
                pixel: self.state.viewport.coordinate_to_pixel(cluster.coordinate),
                cluster,
            })
            .collect()
    }

    pub fn render_geojson(&self) -> FeatureCollection {
        let features = self
            .render()
            .into_iter()
            .map(|rendered| {
                let mut properties = JsonObject::new();
                properties.insert("ids".into(), serde_json::json!(rendered.cluster.ids));
                properties.insert("size".into(), serde_json::json!(rendered.cluster.size()));
                properties.insert(
                    "style".into(),
                    serde_json::to_value(&rendered.style).unwrap_or_default(),
                );
                let c = rendered.cluster.coordinate;
                Feature {
                    bbox: None,
                    geometry: Some(Geometry::new(Value::Point(vec![c.x, c.y]))),
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();
        FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        }
    }

    /// Topmost rendered cluster under `pixel`.
    pub fn hit_test(&self, pixel: [f64; 2]) -> Option<RenderedCluster> {
        self.render()
            .into_iter()
            .rev()
            .find(|r| r.style.hit(r.pixel, pixel))
    }

    pub fn cursor(&self, pixel: [f64; 2]) -> &'static str {
        if self.hit_test(pixel).is_some() {
            "pointer"
        } else {
            ""
        }
    }

    pub fn click(&mut self, pixel: [f64; 2]) -> Interaction {
        let Some(hit) = self.hit_test(pixel) else {
            self.state.popup.close();
            return Interaction::default();
        };

        if hit.cluster.is_clustered() {
            let animation = hit.cluster.extent().map(|extent| {
                ViewAnimation::fit(
                    &self.state.viewport,
                    extent,
                    CLUSTER_FIT_PADDING,
                    self.data.animation_ms() * 2,
                )
            });
            return Interaction {
                animation,
                overlay: None,
            };
        }

        match (hit.cluster.ids.first(), hit.cluster.members.first()) {
            (Some(id), Some(coordinate)) => {
                let id = id.clone();
                self.toggle_popup(*coordinate, &id, false)
            }
            _ => Interaction::default(),
        }
    }

    /// Selection from the sidebar list; zooms in when the marker hides inside a cluster.
    pub fn select_association(&mut self, id: &str) -> Interaction {
        let Some(association) = self.data.association(id) else {
            return Interaction::default();
        };
        let Some(position) = marker_coordinate(association.lng, association.lat) else {
            return Interaction::default();
        };
        let zoom_in = is_displayed_in_cluster(&self.clusters(), id);
        self.toggle_popup(position, id, zoom_in)
    }

    /// Close button in the popup. Returns whether a popup was open.
    pub fn close_popup(&mut self) -> bool {
        self.state.popup.close()
    }

    pub fn popup_overlay(&self) -> Option<PopupOverlay> {
        let id = self.state.popup.open_id()?;
        let association = self.data.association(id)?;
        let position = marker_coordinate(association.lng, association.lat)?;
        Some(self.overlay_for(association, position))
    }

    fn overlay_for(&self, association: &Association, position: Coord<f64>) -> PopupOverlay {
        PopupOverlay {
            id: association.id.clone(),
            position: [position.x, position.y],
            positioning: "bottom-center",
            offset: POPUP_OFFSET,
            html: popup_content(association, &self.data.district_options),
        }
    }

    fn toggle_popup(&mut self, position: Coord<f64>, id: &str, zoom_in: bool) -> Interaction {
        if !self.state.popup.toggle(id) {
            return Interaction::default();
        }

        let half = self.data.animation_ms() / 2;
        let mut delay = 0;
        let viewport = self.state.viewport;
        if viewport.width() < NARROW_WIDTH_PX && self.state.sidebar_expanded {
            self.state.sidebar_expanded = false;
            delay = half;
        }

        let zoom = if zoom_in { SELECT_ZOOM } else { viewport.zoom };
        let anchor = [viewport.width() / 2.0, viewport.height() * POPUP_ANCHOR_Y];
        let animation = ViewAnimation::center_on(
            &viewport,
            position,
            anchor,
            zoom,
            self.data.animation_ms() * 2,
        )
        .delayed(delay);

        let overlay = self
            .data
            .association(id)
            .map(|association| self.overlay_for(association, position));

        Interaction {
            animation: Some(animation),
            overlay,
        }
    }
}
