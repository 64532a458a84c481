use crate::cluster::{Cluster, Inclusion};
use serde::Serialize;
use std::collections::HashSet;

pub const BASE_COLOR: &str = "#d13858";
pub const PARTIAL_COLOR: &str = "#B47172";
pub const EXCLUDED_COLOR: &str = "#989898";
const STROKE_COLOR: &str = "#231f20";
const CLUSTER_RADIUS: f64 = 15.0;
const MARKER_SIZE: f64 = 48.0;
const INACTIVE_MARKER_SRC: &str = "assets/marker-inactive-small.png";

/// How a cluster is drawn. Pure function of its members and the filtered set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ClusterStyle {
    #[serde(rename_all = "camelCase")]
    Circle {
        radius: f64,
        stroke: String,
        fill: String,
        text: String,
        font: String,
        text_fill: String,
    },
    #[serde(rename_all = "camelCase")]
    Icon {
        src: String,
        size: [f64; 2],
        // fraction of the icon size, [0.5, 1] is bottom centre
        anchor: [f64; 2],
        active: bool,
    },
}

pub fn cluster_style(cluster: &Cluster, filtered: &HashSet<&str>) -> ClusterStyle {
    let inclusion = Inclusion::of(&cluster.ids, filtered);

    if cluster.is_clustered() {
        let fill = match inclusion {
            Inclusion::All => BASE_COLOR,
            Inclusion::Partial => PARTIAL_COLOR,
            Inclusion::None => EXCLUDED_COLOR,
        };
        ClusterStyle::Circle {
            radius: CLUSTER_RADIUS,
            stroke: STROKE_COLOR.to_string(),
            fill: fill.to_string(),
            text: cluster.size().to_string(),
            font: "16px Alegreya".to_string(),
            text_fill: "#fff".to_string(),
        }
    } else {
        let active = inclusion != Inclusion::None;
        ClusterStyle::Icon {
            src: if active {
                active_marker_src(BASE_COLOR)
            } else {
                INACTIVE_MARKER_SRC.to_string()
            },
            size: [MARKER_SIZE, MARKER_SIZE],
            anchor: [0.5, 1.0],
            active,
        }
    }
}

impl ClusterStyle {
    /// Whether `pixel` hits a feature drawn with this style at `at`.
    pub fn hit(&self, at: [f64; 2], pixel: [f64; 2]) -> bool {
        match self {
            ClusterStyle::Circle { radius, .. } => {
                let dx = pixel[0] - at[0];
                let dy = pixel[1] - at[1];
                (dx * dx + dy * dy).sqrt() <= *radius
            }
            ClusterStyle::Icon { size, anchor, .. } => {
                let left = at[0] - size[0] * anchor[0];
                let top = at[1] - size[1] * anchor[1];
                (left..=left + size[0]).contains(&pixel[0]) && (top..=top + size[1]).contains(&pixel[1])
            }
        }
    }
}

/// Marker icon as an SVG data URL. The fill has to be given in rgba form.
pub fn active_marker_src(hex_fill: &str) -> String {
    let svg = format!(
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg">"#,
            r#"<path fill="{}" stroke="white" stroke-width="0.50744" d="M 34.58637,33.56877 C 36.5425,30.96358 37.74628,27.7965 37.74628,24.27184 37.74628,15.99655 31.1255,9.25372 23,9.25372 c -8.1255,0 -14.74628,6.74283 -14.74628,15.01812 0,3.52466 1.25394,6.69174 3.15992,9.29693 C 14.37293,37.50208 23,48.58688 23,48.58688 c 0,0 8.62708,-11.0848 11.58637,-15.01811 z" />"#,
            r#"<circle style="fill:white;fill-rule:evenodd" cx="23" cy="23.642452" r="5.6927967" />"#,
            "</svg>"
        ),
        hex_to_rgba(hex_fill)
    );
    format!("data:image/svg+xml;utf-8,{}", svg)
}

fn hex_to_rgba(hex: &str) -> String {
    let hex = hex.trim_start_matches('#');
    let channel = |range: std::ops::Range<usize>| {
        hex.get(range)
            .and_then(|h| u8::from_str_radix(h, 16).ok())
            .unwrap_or(0)
    };
    format!("rgba({}, {}, {}, 1)", channel(0..2), channel(2..4), channel(4..6))
}
