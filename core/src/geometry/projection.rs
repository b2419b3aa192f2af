//! Local planar frame for geographic coordinates.
//!
//! Simple equirectangular projection around a fixed origin: one degree of
//! latitude is [`METERS_PER_DEGREE`] meters, one degree of longitude is
//! scaled by `cos(origin.lat)`. The mapping is affine, so straight lines and
//! ratios along them survive the round trip exactly, which is what the
//! constraint engine relies on.

use super::LatLng;

/// Meters per degree of latitude used throughout the editor.
pub const METERS_PER_DEGREE: f64 = 111_000.0;

// Keeps the frame invertible near the poles.
const MIN_COS_LAT: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalFrame {
    origin: LatLng,
    cos_lat: f64,
}

impl LocalFrame {
    pub fn new(origin: LatLng) -> Self {
        let cos_lat = origin.lat.to_radians().cos().max(MIN_COS_LAT);
        Self { origin, cos_lat }
    }

    /// Frame anchored at the first point of a shape.
    pub fn anchored_at_first(points: &[LatLng]) -> Option<Self> {
        points.first().map(|p| Self::new(*p))
    }

    /// Frame anchored at the vertex centroid of a shape.
    pub fn anchored_at_centroid(points: &[LatLng]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let n = points.len() as f64;
        let lat = points.iter().map(|p| p.lat).sum::<f64>() / n;
        let lng = points.iter().map(|p| p.lng).sum::<f64>() / n;
        Some(Self::new(LatLng::new(lat, lng)))
    }

    pub fn origin(&self) -> LatLng {
        self.origin
    }

    /// Geographic position to local `[east, north]` meters.
    pub fn to_local(&self, p: LatLng) -> [f64; 2] {
        [
            (p.lng - self.origin.lng) * METERS_PER_DEGREE * self.cos_lat,
            (p.lat - self.origin.lat) * METERS_PER_DEGREE,
        ]
    }

    /// Local `[east, north]` meters back to a geographic position.
    pub fn to_geo(&self, p: [f64; 2]) -> LatLng {
        LatLng {
            lat: self.origin.lat + p[1] / METERS_PER_DEGREE,
            lng: self.origin.lng + p[0] / (METERS_PER_DEGREE * self.cos_lat),
        }
    }

    pub fn to_local_all(&self, points: &[LatLng]) -> Vec<[f64; 2]> {
        points.iter().map(|p| self.to_local(*p)).collect()
    }

    pub fn to_geo_all(&self, points: &[[f64; 2]]) -> Vec<LatLng> {
        points.iter().map(|p| self.to_geo(*p)).collect()
    }

    /// Latitude step in degrees for a north/south distance in meters.
    pub fn lat_degrees(&self, meters: f64) -> f64 {
        meters / METERS_PER_DEGREE
    }

    /// Longitude step in degrees for an east/west distance in meters.
    pub fn lng_degrees(&self, meters: f64) -> f64 {
        meters / (METERS_PER_DEGREE * self.cos_lat)
    }

    /// Planar distance in meters between two geographic points.
    pub fn distance(&self, a: LatLng, b: LatLng) -> f64 {
        super::distance(self.to_local(a), self.to_local(b))
    }
}
