//! Sample grid for ground-mounted areas.
//!
//! A lattice with step `S` meters covers the polygon's bounding box and
//! keeps only points inside the polygon. Each edge then contributes
//! `floor(length / S)` evenly spaced points so narrow shapes still get
//! samples along their outline.

use crate::geometry::{self, LatLng, LocalFrame, METERS_PER_DEGREE};
use crate::project::MIN_GRID_SPACING_M;

/// Spacing actually used for a requested spacing.
pub fn effective_spacing(spacing_meters: f64) -> f64 {
    if spacing_meters.is_finite() {
        spacing_meters.max(MIN_GRID_SPACING_M)
    } else {
        MIN_GRID_SPACING_M
    }
}

/// Interior lattice points, stepping from the south-west corner of the
/// bounding box. Degrees per step use the first vertex's latitude.
pub fn lattice_points(boundary: &[LatLng], spacing_meters: f64) -> Vec<LatLng> {
    if boundary.len() < 3 || boundary.iter().any(|p| !p.is_finite()) {
        return Vec::new();
    }
    let spacing = effective_spacing(spacing_meters);
    let polygon: Vec<[f64; 2]> = boundary.iter().map(|p| p.to_xy()).collect();
    let Some((min, max)) = geometry::bounding_box(&polygon) else {
        return Vec::new();
    };

    let frame = LocalFrame::new(boundary[0]);
    let lat_step = spacing / METERS_PER_DEGREE;
    let lng_step = frame.lng_degrees(spacing);
    // Tolerance so a box that is an exact multiple of the step keeps its far edge
    let rows = ((max[1] - min[1]) / lat_step + 1e-9).floor() as usize;
    let cols = ((max[0] - min[0]) / lng_step + 1e-9).floor() as usize;

    let mut points = Vec::new();
    for row in 0..=rows {
        let lat = min[1] + row as f64 * lat_step;
        for col in 0..=cols {
            let lng = min[0] + col as f64 * lng_step;
            if geometry::point_in_polygon([lng, lat], &polygon) {
                points.push(LatLng::new(lat, lng));
            }
        }
    }
    points
}

/// Points along each edge: `floor(length / S)` of them at `t = k / count`,
/// starting at the edge's first vertex.
pub fn boundary_points(boundary: &[LatLng], spacing_meters: f64) -> Vec<LatLng> {
    if boundary.len() < 3 || boundary.iter().any(|p| !p.is_finite()) {
        return Vec::new();
    }
    let spacing = effective_spacing(spacing_meters);
    let frame = LocalFrame::new(boundary[0]);
    let n = boundary.len();

    let mut points = Vec::new();
    for i in 0..n {
        let a = boundary[i];
        let b = boundary[(i + 1) % n];
        let count = (frame.distance(a, b) / spacing).floor() as usize;
        for k in 0..count {
            let t = k as f64 / count as f64;
            let [lng, lat] = geometry::lerp(a.to_xy(), b.to_xy(), t);
            points.push(LatLng::new(lat, lng));
        }
    }
    points
}

/// Lattice plus boundary samples for a polygon. Spacing below the minimum
/// is raised to it.
pub fn generate_topography_grid(boundary: &[LatLng], spacing_meters: f64) -> Vec<LatLng> {
    let mut points = lattice_points(boundary, spacing_meters);
    points.extend(boundary_points(boundary, spacing_meters));
    points
}
