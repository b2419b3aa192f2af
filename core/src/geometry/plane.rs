//! Best-fit plane solver for roof corner heights.
//!
//! Real roofs are rarely perfectly planar and user-entered corner heights
//! rarely agree with each other. The solver fits one inclined plane through
//! the corners (exactly for three, least squares for more) so the editor can
//! show the reconciled height next to the entered one.

use super::{bearing_degrees, LatLng, LocalFrame, Point3, Vector3, EPSILON};
use serde::{Deserialize, Serialize};

/// Relative tolerance for singular systems and collinear triples.
const SINGULAR_TOLERANCE: f64 = 1e-12;

// =============================================================================
// Plane Representation
// =============================================================================

/// A plane `n · p + offset = 0` with unit normal `n` pointing upwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub normal: Vector3,
    pub offset: f64,
}

impl Plane {
    /// Exact plane through three points. `None` if they are collinear.
    pub fn from_three_points(p1: &Point3, p2: &Point3, p3: &Point3) -> Option<Self> {
        let edge1 = p2 - p1;
        let edge2 = p3 - p1;
        let cross = edge1.cross(&edge2);
        let scale = edge1.norm() * edge2.norm();
        let norm = cross.norm();

        if !norm.is_finite() || scale <= 0.0 || norm <= scale * SINGULAR_TOLERANCE {
            return None;
        }

        let mut normal = cross / norm;
        if normal.z < 0.0 {
            normal = -normal;
        }
        Some(Self {
            normal,
            offset: -normal.dot(&p1.coords),
        })
    }

    /// Plane from `z = a·x + b·y + c`.
    pub fn from_coefficients(a: f64, b: f64, c: f64) -> Self {
        let len = (a * a + b * b + 1.0).sqrt();
        Self {
            normal: Vector3::new(-a / len, -b / len, 1.0 / len),
            offset: -c / len,
        }
    }

    /// Height of the plane above `(x, y)`. `None` for vertical planes.
    pub fn height_at(&self, x: f64, y: f64) -> Option<f64> {
        if self.normal.z.abs() < EPSILON {
            return None;
        }
        Some(-(self.normal.x * x + self.normal.y * y + self.offset) / self.normal.z)
    }

    /// Signed distance from a point to this plane.
    /// Positive = point is above the plane.
    pub fn signed_distance(&self, point: &Point3) -> f64 {
        self.normal.dot(&point.coords) + self.offset
    }

    /// Inclination against the horizontal, in degrees [0, 90].
    pub fn tilt_degrees(&self) -> f64 {
        self.normal.z.abs().clamp(0.0, 1.0).acos().to_degrees()
    }

    /// Compass bearing of the downhill direction. `None` for a flat plane.
    pub fn downslope_azimuth(&self) -> Option<f64> {
        let horizontal = [self.normal.x, self.normal.y];
        if horizontal[0].hypot(horizontal[1]) < EPSILON {
            return None;
        }
        // With the normal oriented upwards its horizontal part points downhill
        Some(bearing_degrees(horizontal))
    }
}

// =============================================================================
// Fitting
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitMethod {
    /// Exactly three points, plane passes through all of them.
    ExactThreePoint,
    /// Least squares over all points.
    LeastSquares,
    /// Normal equations were singular, first three points were used.
    ThreePointFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaneFit {
    pub plane: Plane,
    pub method: FitMethod,
}

/// Fit a plane through `points`.
///
/// Three points give the exact plane. More points are fitted with
/// `z = a·x + b·y + c` by solving the normal equations with Cramer's rule,
/// falling back to the first three points when that system is singular.
/// Returns `None` for fewer than three points, non-finite input, or when no
/// non-vertical plane can be determined.
pub fn fit_best_fit_plane(points: &[Point3]) -> Option<PlaneFit> {
    if points.len() < 3 || points.iter().any(|p| !p.coords.iter().all(|c| c.is_finite())) {
        return None;
    }

    if points.len() == 3 {
        return Plane::from_three_points(&points[0], &points[1], &points[2])
            .map(|plane| PlaneFit { plane, method: FitMethod::ExactThreePoint });
    }

    match least_squares(points) {
        Some(plane) => Some(PlaneFit { plane, method: FitMethod::LeastSquares }),
        None => {
            tracing::debug!("normal equations singular for {} points, using first three", points.len());
            Plane::from_three_points(&points[0], &points[1], &points[2])
                .map(|plane| PlaneFit { plane, method: FitMethod::ThreePointFallback })
        }
    }
}

fn least_squares(points: &[Point3]) -> Option<Plane> {
    let n = points.len() as f64;
    let (mut sx, mut sy, mut sz) = (0.0, 0.0, 0.0);
    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    let (mut sxz, mut syz) = (0.0, 0.0);

    for p in points {
        sx += p.x;
        sy += p.y;
        sz += p.z;
        sxx += p.x * p.x;
        sxy += p.x * p.y;
        syy += p.y * p.y;
        sxz += p.x * p.z;
        syz += p.y * p.z;
    }

    let m = [
        [sxx, sxy, sx],
        [sxy, syy, sy],
        [sx, sy, n],
    ];
    let rhs = [sxz, syz, sz];

    let det = det3(&m);
    if !det.is_finite() || det.abs() <= SINGULAR_TOLERANCE * (sxx * syy * n).abs() {
        return None;
    }

    let a = det3(&replace_column(&m, 0, &rhs)) / det;
    let b = det3(&replace_column(&m, 1, &rhs)) / det;
    let c = det3(&replace_column(&m, 2, &rhs)) / det;

    Some(Plane::from_coefficients(a, b, c))
}

fn det3(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

fn replace_column(m: &[[f64; 3]; 3], col: usize, values: &[f64; 3]) -> [[f64; 3]; 3] {
    let mut out = *m;
    for (row, value) in out.iter_mut().zip(values) {
        row[col] = *value;
    }
    out
}

// =============================================================================
// Corner Reconciliation
// =============================================================================

/// Entered versus plane-reconciled height of one corner, above datum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CornerHeight {
    pub entered_total: f64,
    pub fitted_total: f64,
}

impl CornerHeight {
    pub fn deviation(&self) -> f64 {
        self.fitted_total - self.entered_total
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CornerReconciliation {
    pub corners: Vec<CornerHeight>,
    pub fit: Option<PlaneFit>,
}

/// Reconcile per-corner relative heights into one plane.
///
/// Corners are projected relative to the first corner. Absolute height is
/// `reference_height + relative`. When no plane can be fitted the entered
/// totals are reported unchanged.
pub fn reconcile_corner_heights(
    corners: &[LatLng],
    reference_height: f64,
    relative_heights: &[f64],
) -> CornerReconciliation {
    let count = corners.len().min(relative_heights.len());
    let entered: Vec<f64> = relative_heights[..count].iter().map(|h| reference_height + h).collect();

    let fit = LocalFrame::anchored_at_first(corners).and_then(|frame| {
        let points: Vec<Point3> = corners[..count]
            .iter()
            .zip(&entered)
            .map(|(c, z)| {
                let [x, y] = frame.to_local(*c);
                Point3::new(x, y, *z)
            })
            .collect();
        let fit = fit_best_fit_plane(&points)?;
        // A plane that cannot report heights is no better than none
        points.iter().try_for_each(|p| fit.plane.height_at(p.x, p.y).map(|_| ()))?;
        Some((fit, points))
    });

    match fit {
        Some((fit, points)) => CornerReconciliation {
            corners: points
                .iter()
                .zip(&entered)
                .map(|(p, entered_total)| CornerHeight {
                    entered_total: *entered_total,
                    fitted_total: fit.plane.height_at(p.x, p.y).unwrap_or(*entered_total),
                })
                .collect(),
            fit: Some(fit),
        },
        None => CornerReconciliation {
            corners: entered
                .iter()
                .map(|h| CornerHeight { entered_total: *h, fitted_total: *h })
                .collect(),
            fit: None,
        },
    }
}

// =============================================================================
// Tests
// =============================================================================
