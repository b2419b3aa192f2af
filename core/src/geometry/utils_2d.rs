//! 2D geometry utilities for interactive shape editing.
//!
//! All functions operate on `[f64; 2]` points. Callers working with
//! geographic data project into a [`LocalFrame`](super::LocalFrame) first
//! so that `[0]` is east and `[1]` is north, both in meters.

use super::EPSILON;

// =============================================================================
// Point Operations
// =============================================================================

/// Check if two 2D points are approximately equal within EPSILON.
#[inline]
pub fn points_equal(p1: [f64; 2], p2: [f64; 2]) -> bool {
    (p1[0] - p2[0]).abs() < EPSILON && (p1[1] - p2[1]).abs() < EPSILON
}

/// Compute squared distance between two 2D points.
#[inline]
pub fn distance_squared(p1: [f64; 2], p2: [f64; 2]) -> f64 {
    let dx = p2[0] - p1[0];
    let dy = p2[1] - p1[1];
    dx * dx + dy * dy
}

/// Compute distance between two 2D points.
#[inline]
pub fn distance(p1: [f64; 2], p2: [f64; 2]) -> f64 {
    distance_squared(p1, p2).sqrt()
}

/// Linear interpolation between two 2D points.
#[inline]
pub fn lerp(p1: [f64; 2], p2: [f64; 2], t: f64) -> [f64; 2] {
    [
        p1[0] + t * (p2[0] - p1[0]),
        p1[1] + t * (p2[1] - p1[1]),
    ]
}

/// Midpoint between two 2D points.
#[inline]
pub fn midpoint(p1: [f64; 2], p2: [f64; 2]) -> [f64; 2] {
    lerp(p1, p2, 0.5)
}

#[inline]
pub fn is_finite_2d(p: [f64; 2]) -> bool {
    p[0].is_finite() && p[1].is_finite()
}

// =============================================================================
// Vector Operations
// =============================================================================

#[inline]
pub fn add_2d(a: [f64; 2], b: [f64; 2]) -> [f64; 2] {
    [a[0] + b[0], a[1] + b[1]]
}

#[inline]
pub fn sub_2d(a: [f64; 2], b: [f64; 2]) -> [f64; 2] {
    [a[0] - b[0], a[1] - b[1]]
}

#[inline]
pub fn scale_2d(v: [f64; 2], s: f64) -> [f64; 2] {
    [v[0] * s, v[1] * s]
}

#[inline]
pub fn length_2d(v: [f64; 2]) -> f64 {
    (v[0] * v[0] + v[1] * v[1]).sqrt()
}

/// 2D cross product (z-component of 3D cross product).
/// Positive if v2 is counter-clockwise from v1.
#[inline]
pub fn cross_2d(v1: [f64; 2], v2: [f64; 2]) -> f64 {
    v1[0] * v2[1] - v1[1] * v2[0]
}

/// 2D dot product.
#[inline]
pub fn dot_2d(v1: [f64; 2], v2: [f64; 2]) -> f64 {
    v1[0] * v2[0] + v1[1] * v2[1]
}

/// Normalize a 2D vector. Returns `None` for (near) zero-length input.
#[inline]
pub fn try_normalize_2d(v: [f64; 2]) -> Option<[f64; 2]> {
    let len = length_2d(v);
    if !len.is_finite() || len < EPSILON {
        None
    } else {
        Some([v[0] / len, v[1] / len])
    }
}

/// Perpendicular vector (90° counter-clockwise rotation).
#[inline]
pub fn perpendicular_ccw(v: [f64; 2]) -> [f64; 2] {
    [-v[1], v[0]]
}

/// Perpendicular vector (90° clockwise rotation).
#[inline]
pub fn perpendicular_cw(v: [f64; 2]) -> [f64; 2] {
    [v[1], -v[0]]
}

/// Rotate `point` counter-clockwise by `angle` radians around `center`.
#[inline]
pub fn rotate_about(point: [f64; 2], center: [f64; 2], angle: f64) -> [f64; 2] {
    let (sin, cos) = angle.sin_cos();
    let dx = point[0] - center[0];
    let dy = point[1] - center[1];
    [
        center[0] + dx * cos - dy * sin,
        center[1] + dx * sin + dy * cos,
    ]
}

// =============================================================================
// Compass Bearings
// =============================================================================

/// Compass bearing of a local east/north vector in degrees [0, 360).
/// 0 = north, 90 = east.
pub fn bearing_degrees(v: [f64; 2]) -> f64 {
    normalize_degrees(v[0].atan2(v[1]).to_degrees())
}

/// Wrap an angle in degrees into [0, 360).
pub fn normalize_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Smallest absolute difference between two bearings, in [0, 180].
pub fn angular_difference_degrees(a: f64, b: f64) -> f64 {
    let diff = (a - b).rem_euclid(360.0);
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}

// =============================================================================
// Line Segment Operations
// =============================================================================

/// Compute perpendicular distance from point to infinite line.
pub fn distance_point_to_line(line_start: [f64; 2], line_end: [f64; 2], point: [f64; 2]) -> f64 {
    let dx = line_end[0] - line_start[0];
    let dy = line_end[1] - line_start[1];
    let len = (dx * dx + dy * dy).sqrt();

    if len < EPSILON {
        return distance(line_start, point);
    }

    let px = point[0] - line_start[0];
    let py = point[1] - line_start[1];
    ((px * dy - py * dx) / len).abs()
}

// =============================================================================
// Polygon Operations
// =============================================================================

/// Compute signed area of a polygon using the Shoelace formula.
/// Positive = CCW winding, Negative = CW winding.
pub fn polygon_signed_area(vertices: &[[f64; 2]]) -> f64 {
    let n = vertices.len();
    if n < 3 {
        return 0.0;
    }

    let mut area = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        area += vertices[i][0] * vertices[j][1];
        area -= vertices[j][0] * vertices[i][1];
    }
    area / 2.0
}

/// Compute absolute area of a polygon.
pub fn polygon_area(vertices: &[[f64; 2]]) -> f64 {
    polygon_signed_area(vertices).abs()
}

/// Arithmetic mean of the vertices. This is the pivot used for rotation.
pub fn vertex_centroid(vertices: &[[f64; 2]]) -> Option<[f64; 2]> {
    if vertices.is_empty() {
        return None;
    }
    let n = vertices.len() as f64;
    let sx: f64 = vertices.iter().map(|p| p[0]).sum();
    let sy: f64 = vertices.iter().map(|p| p[1]).sum();
    Some([sx / n, sy / n])
}

/// Axis-aligned bounds as `(min, max)`.
pub fn bounding_box(vertices: &[[f64; 2]]) -> Option<([f64; 2], [f64; 2])> {
    let first = *vertices.first()?;
    let mut min = first;
    let mut max = first;
    for p in &vertices[1..] {
        min[0] = min[0].min(p[0]);
        min[1] = min[1].min(p[1]);
        max[0] = max[0].max(p[0]);
        max[1] = max[1].max(p[1]);
    }
    Some((min, max))
}

/// Test if a point is inside a polygon using the winding number algorithm.
/// Works for both convex and concave polygons.
pub fn point_in_polygon(point: [f64; 2], polygon: &[[f64; 2]]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }

    let mut winding: i32 = 0;

    for i in 0..n {
        let p1 = polygon[i];
        let p2 = polygon[(i + 1) % n];

        if p1[1] <= point[1] {
            if p2[1] > point[1] {
                // Upward crossing
                let cross = (p2[0] - p1[0]) * (point[1] - p1[1]) - (p2[1] - p1[1]) * (point[0] - p1[0]);
                if cross > 0.0 {
                    winding += 1;
                }
            }
        } else if p2[1] <= point[1] {
            // Downward crossing
            let cross = (p2[0] - p1[0]) * (point[1] - p1[1]) - (p2[1] - p1[1]) * (point[0] - p1[0]);
            if cross < 0.0 {
                winding -= 1;
            }
        }
    }

    winding != 0
}

// =============================================================================
// Tests
// =============================================================================
