//! Rigid rotation of a quadrilateral about its centroid.
//!
//! The gesture is measured in a local meter frame anchored at the vertex
//! centroid, so the rotated shape keeps its true side lengths and angles
//! instead of being skewed by the lat/lng aspect ratio.

use crate::geometry::{self, LatLng, LocalFrame, EPSILON};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RotationError {
    #[error("rotation needs exactly 4 corners, got {0}")]
    NotAQuadrilateral(usize),
    #[error("pointer position is not a finite coordinate")]
    NonFinite,
    #[error("pointer is on the rotation center")]
    PointerAtCenter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationResult {
    pub corners: Vec<LatLng>,
    /// Compass azimuth of the rotated shape, [0, 360).
    pub azimuth: f64,
    /// Counter-clockwise rotation applied, in degrees.
    pub angle_degrees: f64,
}

/// Facing direction of a quadrilateral in local coordinates.
///
/// The facing direction is perpendicular to edge 0–1, on the side of edge
/// 2–3: `v = mid(c2, c3) - c0` with its component along edge 0–1 removed.
/// Of the two perpendiculars of edge 0–1 the one closer to the bearing from
/// mid(0, 1) to mid(2, 3) wins.
pub fn quadrilateral_azimuth(corners: &[[f64; 2]]) -> Option<f64> {
    if corners.len() != 4 {
        return None;
    }
    let edge = geometry::try_normalize_2d(geometry::sub_2d(corners[1], corners[0]))?;
    let far_mid = geometry::midpoint(corners[2], corners[3]);
    let v = geometry::sub_2d(far_mid, corners[0]);
    let w = geometry::sub_2d(v, geometry::scale_2d(edge, geometry::dot_2d(v, edge)));

    let between_mids = geometry::sub_2d(far_mid, geometry::midpoint(corners[0], corners[1]));
    let reference = if geometry::length_2d(between_mids) > EPSILON {
        geometry::bearing_degrees(between_mids)
    } else if geometry::length_2d(w) > EPSILON {
        geometry::bearing_degrees(w)
    } else {
        return None;
    };

    let candidates = [
        geometry::bearing_degrees(geometry::perpendicular_ccw(edge)),
        geometry::bearing_degrees(geometry::perpendicular_cw(edge)),
    ];
    let best = if geometry::angular_difference_degrees(candidates[0], reference)
        <= geometry::angular_difference_degrees(candidates[1], reference)
    {
        candidates[0]
    } else {
        candidates[1]
    };
    Some(geometry::normalize_degrees(best))
}

/// Azimuth of a 4-corner area given in geographic coordinates.
pub fn area_azimuth(corners: &[LatLng]) -> Option<f64> {
    let frame = LocalFrame::anchored_at_centroid(corners)?;
    quadrilateral_azimuth(&frame.to_local_all(corners))
}

/// Rotate `original` about its centroid by the angle swept from
/// `start_pointer` to `pointer`, both seen from the centroid.
pub fn rotate_quadrilateral(
    original: &[LatLng],
    start_pointer: LatLng,
    pointer: LatLng,
) -> Result<RotationResult, RotationError> {
    if original.len() != 4 {
        return Err(RotationError::NotAQuadrilateral(original.len()));
    }
    if !start_pointer.is_finite() || !pointer.is_finite() || original.iter().any(|c| !c.is_finite()) {
        return Err(RotationError::NonFinite);
    }
    let frame = LocalFrame::anchored_at_centroid(original).ok_or(RotationError::NotAQuadrilateral(0))?;

    let start = frame.to_local(start_pointer);
    let current = frame.to_local(pointer);
    if geometry::length_2d(start) < EPSILON || geometry::length_2d(current) < EPSILON {
        return Err(RotationError::PointerAtCenter);
    }
    let angle = current[1].atan2(current[0]) - start[1].atan2(start[0]);

    let rotated: Vec<[f64; 2]> = frame
        .to_local_all(original)
        .into_iter()
        .map(|p| geometry::rotate_about(p, [0.0, 0.0], angle))
        .collect();
    let azimuth = quadrilateral_azimuth(&rotated).ok_or(RotationError::NotAQuadrilateral(4))?;

    Ok(RotationResult {
        corners: frame.to_geo_all(&rotated),
        azimuth,
        angle_degrees: angle.to_degrees(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roof() -> Vec<LatLng> {
        // 20 m east/west ridge along edge 0-1, far edge 10 m to the south
        let frame = LocalFrame::new(LatLng::new(48.137, 11.575));
        frame.to_geo_all(&[[0.0, 0.0], [20.0, 0.0], [20.0, -10.0], [0.0, -10.0]])
    }

    fn pairwise(frame: &LocalFrame, corners: &[LatLng]) -> Vec<f64> {
        let mut out = Vec::new();
        for i in 0..corners.len() {
            for j in (i + 1)..corners.len() {
                out.push(frame.distance(corners[i], corners[j]));
            }
        }
        out
    }

    #[test]
    fn test_azimuth_faces_far_edge() {
        assert!((area_azimuth(&roof()).unwrap() - 180.0).abs() < 1e-6);

        let north = quadrilateral_azimuth(&[[0.0, 0.0], [-20.0, 0.0], [-20.0, 10.0], [0.0, 10.0]]).unwrap();
        assert!(north.abs() < 1e-9 || (north - 360.0).abs() < 1e-9);

        let east = quadrilateral_azimuth(&[[0.0, 0.0], [0.0, 20.0], [10.0, 20.0], [10.0, 0.0]]).unwrap();
        assert!((east - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_azimuth_of_skewed_shape_is_perpendicular_to_first_edge() {
        // Far edge shifted sideways; facing stays perpendicular to edge 0-1
        let azimuth = quadrilateral_azimuth(&[[0.0, 0.0], [20.0, 0.0], [35.0, -10.0], [15.0, -10.0]]).unwrap();
        assert!((azimuth - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_quarter_turn() {
        let original = roof();
        let frame = LocalFrame::anchored_at_centroid(&original).unwrap();
        let start = frame.to_geo([30.0, 0.0]);
        let pointer = frame.to_geo([0.0, 30.0]);

        let result = rotate_quadrilateral(&original, start, pointer).unwrap();
        assert!((result.angle_degrees - 90.0).abs() < 1e-9);
        // Counter-clockwise quarter turn: facing south becomes facing east
        assert!((result.azimuth - 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_rigidity() {
        let original = roof();
        let frame = LocalFrame::anchored_at_centroid(&original).unwrap();
        let before = pairwise(&frame, &original);

        let start = frame.to_geo([5.0, 40.0]);
        for pointer in [[-12.0, 3.0], [7.0, -30.0], [0.5, 0.7], [-40.0, -41.0]] {
            let result = rotate_quadrilateral(&original, start, frame.to_geo(pointer)).unwrap();
            let after = pairwise(&frame, &result.corners);
            for (b, a) in before.iter().zip(&after) {
                assert!(((a - b) / b).abs() < 1e-9, "distance {} became {}", b, a);
            }
            assert!((0.0..360.0).contains(&result.azimuth));
        }
    }

    #[test]
    fn test_rejections() {
        let original = roof();
        let center = LocalFrame::anchored_at_centroid(&original).unwrap().origin();
        assert_eq!(
            rotate_quadrilateral(&original[..3], original[0], original[1]),
            Err(RotationError::NotAQuadrilateral(3))
        );
        assert_eq!(
            rotate_quadrilateral(&original, original[0], center),
            Err(RotationError::PointerAtCenter)
        );
        assert_eq!(
            rotate_quadrilateral(&original, original[0], LatLng::new(f64::NAN, 0.0)),
            Err(RotationError::NonFinite)
        );
    }
}
