//! Measurements shown as dimension labels on a PV area.
//!
//! Pure geometry, recomputed from the current corners whenever the labels
//! refresh. Nothing here is stored.

use crate::geometry::{self, LatLng, LocalFrame};
use crate::project::{store::roof_parallel_perpendicular_distance, AreaKindTag, PvArea};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDimension {
    pub edge: usize,
    /// Label anchor.
    pub midpoint: LatLng,
    pub length_meters: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaMeasurements {
    pub edges: Vec<EdgeDimension>,
    pub perimeter_meters: f64,
    pub area_square_meters: f64,
    /// Roof-parallel areas only.
    pub perpendicular_distance: Option<f64>,
}

/// Index pairs of the edges of a shape: a single segment for two corners,
/// a closed ring otherwise.
pub fn edge_indices(corner_count: usize) -> Vec<(usize, usize)> {
    match corner_count {
        0 | 1 => Vec::new(),
        2 => vec![(0, 1)],
        n => (0..n).map(|i| (i, (i + 1) % n)).collect(),
    }
}

pub fn measure_edges(corners: &[LatLng]) -> Vec<EdgeDimension> {
    let Some(frame) = LocalFrame::anchored_at_centroid(corners) else {
        return Vec::new();
    };
    let local = frame.to_local_all(corners);
    edge_indices(corners.len())
        .into_iter()
        .map(|(a, b)| EdgeDimension {
            edge: a,
            midpoint: frame.to_geo(geometry::midpoint(local[a], local[b])),
            length_meters: geometry::distance(local[a], local[b]),
        })
        .collect()
}

/// Planar area in square meters.
pub fn measure_polygon_area(corners: &[LatLng]) -> f64 {
    LocalFrame::anchored_at_centroid(corners)
        .map(|frame| geometry::polygon_area(&frame.to_local_all(corners)))
        .unwrap_or(0.0)
}

pub fn measure_area(area: &PvArea) -> AreaMeasurements {
    let edges = measure_edges(&area.corners);
    AreaMeasurements {
        perimeter_meters: edges.iter().map(|e| e.length_meters).sum(),
        area_square_meters: measure_polygon_area(&area.corners),
        perpendicular_distance: match area.tag() {
            AreaKindTag::RoofParallel => roof_parallel_perpendicular_distance(&area.corners),
            _ => None,
        },
        edges,
    }
}
