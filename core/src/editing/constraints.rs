//! Per-kind vertex and edge constraints applied while a shape is dragged.
//!
//! Roof-parallel areas are defined by two straight edges (0–1 and 2–3).
//! Dragging one of their vertices slides it along the line it forms with its
//! partner, so the edge keeps its direction and only its length changes.
//! All other kinds accept the dragged position as given.

use crate::geometry::{self, LatLng, LocalFrame, EPSILON};
use crate::project::AreaKindTag;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConstraintError {
    #[error("target position is not a finite coordinate")]
    NonFinite,
    #[error("vertex {index} does not exist on a shape with {count} corners")]
    VertexOutOfRange { index: usize, count: usize },
    #[error("edge {index} does not exist on a shape with {count} corners")]
    EdgeOutOfRange { index: usize, count: usize },
    #[error("reference edge has zero length")]
    DegenerateEdge,
}

/// The vertex a roof-parallel vertex shares its defining edge with.
pub fn paired_vertex(index: usize) -> usize {
    index ^ 1
}

/// Slide a vertex along the line through `drag_start` with the current
/// direction of its defining edge, in local planar coordinates.
///
/// `corners` is the geometry as of this tick, so the direction follows any
/// earlier ticks of the same drag.
pub fn slide_along_edge(
    corners: &[[f64; 2]],
    index: usize,
    drag_start: [f64; 2],
    target: [f64; 2],
) -> Result<[f64; 2], ConstraintError> {
    if index >= corners.len() {
        return Err(ConstraintError::VertexOutOfRange { index, count: corners.len() });
    }
    if !geometry::is_finite_2d(target) || !geometry::is_finite_2d(drag_start) {
        return Err(ConstraintError::NonFinite);
    }
    let partner = corners
        .get(paired_vertex(index))
        .ok_or(ConstraintError::VertexOutOfRange { index, count: corners.len() })?;
    let direction = geometry::sub_2d(corners[index], *partner);
    if geometry::length_2d(direction) < EPSILON {
        return Err(ConstraintError::DegenerateEdge);
    }
    let unit = geometry::try_normalize_2d(direction).ok_or(ConstraintError::DegenerateEdge)?;

    let delta = geometry::sub_2d(target, drag_start);
    let along = geometry::dot_2d(delta, unit);
    Ok(geometry::add_2d(drag_start, geometry::scale_2d(unit, along)))
}

/// Position a dragged vertex may take.
///
/// `drag_start` is where the vertex was when the drag began and `target`
/// is the pointer position of this tick.
pub fn compute_constrained_vertex(
    kind: AreaKindTag,
    corners: &[LatLng],
    index: usize,
    drag_start: LatLng,
    target: LatLng,
) -> Result<LatLng, ConstraintError> {
    if !target.is_finite() || !drag_start.is_finite() {
        return Err(ConstraintError::NonFinite);
    }
    if index >= corners.len() {
        return Err(ConstraintError::VertexOutOfRange { index, count: corners.len() });
    }
    match kind {
        AreaKindTag::RoofParallel => {
            let frame = LocalFrame::new(drag_start);
            let local = frame.to_local_all(corners);
            let moved = slide_along_edge(&local, index, [0.0, 0.0], frame.to_local(target))?;
            Ok(frame.to_geo(moved))
        }
        AreaKindTag::RoofMounted | AreaKindTag::Facade | AreaKindTag::Ground => Ok(target),
    }
}

/// Move both endpoints of edge `(edge, edge + 1 mod n)` by the same offset.
/// `delta` is an offset in degrees, not a position.
pub fn translate_edge(corners: &[LatLng], edge: usize, delta: LatLng) -> Result<Vec<LatLng>, ConstraintError> {
    let n = corners.len();
    if n < 2 || edge >= n {
        return Err(ConstraintError::EdgeOutOfRange { index: edge, count: n });
    }
    if !delta.is_finite() {
        return Err(ConstraintError::NonFinite);
    }
    let mut moved = corners.to_vec();
    for i in [edge, (edge + 1) % n] {
        moved[i] = LatLng::new(corners[i].lat + delta.lat, corners[i].lng + delta.lng);
    }
    Ok(moved)
}
