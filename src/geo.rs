//! Geographic primitives shared by providers, fetchers, and engines.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Geographic bounding box. Edges are inclusive: a point on the boundary is
/// inside the box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    /// Check if a point lies within the box (boundary included).
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        self.min_lat <= lat && lat <= self.max_lat && self.min_lon <= lon && lon <= self.max_lon
    }

    /// Check if two boxes overlap. Two boxes overlap iff neither lies
    /// entirely to one side of the other; touching edges count as overlap.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        !(self.max_lat < other.min_lat
            || self.min_lat > other.max_lat
            || self.max_lon < other.min_lon
            || self.min_lon > other.max_lon)
    }

    /// Validate that min <= max on both axes and latitudes are plausible.
    pub fn is_well_formed(&self) -> bool {
        self.min_lat <= self.max_lat
            && self.min_lon <= self.max_lon
            && self.min_lat >= -90.0
            && self.max_lat <= 90.0
    }
}

/// Great-circle distance between two points in kilometers (Haversine).
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_boundary_point() {
        let bbox = BoundingBox::new(5.9, 9.9, 79.5, 81.9);
        // Point exactly on the min latitude edge is inside
        assert!(bbox.contains(5.9, 80.0));
        assert!(bbox.contains(9.9, 81.9));
        assert!(!bbox.contains(5.89, 80.0));
    }

    #[test]
    fn test_intersects_overlapping() {
        let a = BoundingBox::new(5.0, 10.0, 79.0, 82.0);
        let b = BoundingBox::new(8.0, 14.0, 80.0, 85.0);
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
    }

    #[test]
    fn test_intersects_disjoint() {
        let a = BoundingBox::new(5.0, 10.0, 79.0, 82.0);
        let b = BoundingBox::new(11.0, 14.0, 79.0, 82.0);
        assert!(!a.intersects(&b));
    }

    #[test]
    fn test_intersects_touching_edge() {
        let a = BoundingBox::new(5.0, 10.0, 79.0, 82.0);
        let b = BoundingBox::new(10.0, 14.0, 79.0, 82.0);
        // Shared edge counts as overlap
        assert!(a.intersects(&b));
    }

    #[test]
    fn test_haversine_colombo_kandy() {
        // Colombo to Kandy is roughly 94 km as the crow flies
        let d = haversine_km(6.9271, 79.8612, 7.2906, 80.6337);
        assert!((d - 94.0).abs() < 5.0, "got {d}");
    }

    #[test]
    fn test_haversine_zero_distance() {
        assert!(haversine_km(6.9, 79.86, 6.9, 79.86) < 1e-9);
    }

    #[test]
    fn test_haversine_short_distance() {
        // Two nearby points in Colombo, well under a kilometer apart
        let d = haversine_km(6.90, 79.86, 6.905, 79.862);
        assert!(d < 1.0, "got {d}");
    }
}
