use nalgebra as na;
use serde::{Deserialize, Serialize};

pub type Point3 = na::Point3<f64>;
pub type Vector3 = na::Vector3<f64>;

/// Tolerance for floating-point comparisons
pub const EPSILON: f64 = 1e-6;

/// A geographic position in decimal degrees (WGS84).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }

    /// True if the coordinate lies in the valid WGS84 range.
    pub fn in_range(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }

    /// `[lng, lat]` ordering for planar tests done directly in degrees.
    pub fn to_xy(self) -> [f64; 2] {
        [self.lng, self.lat]
    }
}

pub mod utils_2d;
pub use utils_2d::*;

pub mod projection;
pub use projection::{LocalFrame, METERS_PER_DEGREE};

pub mod plane;
pub use plane::{fit_best_fit_plane, reconcile_corner_heights, FitMethod, Plane, PlaneFit};
