use crate::types::Association;
use crate::view::{extent_of, marker_coordinate};
use geo::{Coord, Rect};
use rstar::{RTree, RTreeObject, AABB};
use std::collections::HashSet;
use tracing::warn;

/// Point feature backing one association marker.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerFeature {
    pub id: String,
    pub coordinate: Coord<f64>,
}

// Wrapper for RTree indexing, points back into the feature list
struct FeatureIndex {
    index: usize,
    point: [f64; 2],
}

impl RTreeObject for FeatureIndex {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

/// Render-time grouping of nearby markers.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub ids: Vec<String>,
    pub coordinate: Coord<f64>,
    pub members: Vec<Coord<f64>>,
}

impl Cluster {
    pub fn size(&self) -> usize {
        self.ids.len()
    }

    /// More than one marker shares this cluster.
    pub fn is_clustered(&self) -> bool {
        self.ids.len() > 1
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|i| i == id)
    }

    pub fn extent(&self) -> Option<Rect<f64>> {
        extent_of(self.members.iter().copied())
    }
}

/// Marker features plus a spatial index over them.
pub struct ClusterSource {
    features: Vec<MarkerFeature>,
    tree: RTree<FeatureIndex>,
}

impl ClusterSource {
    /// Features without a finite coordinate are left out of the index.
    pub fn new(mut features: Vec<MarkerFeature>) -> Self {
        features.retain(|f| f.coordinate.x.is_finite() && f.coordinate.y.is_finite());
        let tree_items = features
            .iter()
            .enumerate()
            .map(|(index, f)| FeatureIndex {
                index,
                point: [f.coordinate.x, f.coordinate.y],
            })
            .collect();
        Self {
            tree: RTree::bulk_load(tree_items),
            features,
        }
    }

    /// One feature per association, in list order. Associations that cannot be placed on
    /// the map get no marker.
    pub fn from_associations(associations: &[Association]) -> Self {
        Self::new(
            associations
                .iter()
                .filter_map(|a| match marker_coordinate(a.lng, a.lat) {
                    Some(coordinate) => Some(MarkerFeature {
                        id: a.id.clone(),
                        coordinate,
                    }),
                    None => {
                        warn!(
                            "Skipping association {} with unmappable position lat={} lng={}",
                            a.id, a.lat, a.lng
                        );
                        None
                    }
                })
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Groups features lying within `distance_px` screen pixels at `resolution`.
    ///
    /// Walks the features in source order; each unclaimed feature claims every other
    /// unclaimed feature inside the square of half-width `distance_px * resolution`
    /// around it. The cluster sits at the centroid of its members.
    pub fn cluster(&self, resolution: f64, distance_px: f64) -> Vec<Cluster> {
        let map_distance = distance_px * resolution;
        let mut claimed = vec![false; self.features.len()];
        let mut clusters = Vec::new();

        for (index, feature) in self.features.iter().enumerate() {
            if claimed[index] {
                continue;
            }
            let c = feature.coordinate;
            let envelope = AABB::from_corners(
                [c.x - map_distance, c.y - map_distance],
                [c.x + map_distance, c.y + map_distance],
            );

            let mut neighbours: Vec<usize> = self
                .tree
                .locate_in_envelope(&envelope)
                .map(|item| item.index)
                .filter(|i| !claimed[*i])
                .collect();
            if neighbours.is_empty() {
                continue;
            }
            neighbours.sort_unstable();
            for i in &neighbours {
                claimed[*i] = true;
            }

            let members: Vec<Coord<f64>> = neighbours
                .iter()
                .map(|i| self.features[*i].coordinate)
                .collect();
            let n = members.len() as f64;
            let (sx, sy) = members
                .iter()
                .fold((0.0, 0.0), |(sx, sy), m| (sx + m.x, sy + m.y));

            clusters.push(Cluster {
                ids: neighbours
                    .iter()
                    .map(|i| self.features[*i].id.clone())
                    .collect(),
                coordinate: Coord { x: sx / n, y: sy / n },
                members,
            });
        }

        clusters
    }
}

pub fn is_displayed_in_cluster(clusters: &[Cluster], id: &str) -> bool {
    clusters.iter().any(|c| c.is_clustered() && c.contains(id))
}

/// How much of a cluster survives the current filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inclusion {
    All,
    Partial,
    None,
}

impl Inclusion {
    pub fn of(ids: &[String], filtered: &HashSet<&str>) -> Self {
        let included = ids.iter().filter(|id| filtered.contains(id.as_str())).count();
        if included == 0 {
            Inclusion::None
        } else if included == ids.len() {
            Inclusion::All
        } else {
            Inclusion::Partial
        }
    }
}
