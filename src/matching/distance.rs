// src/matching/distance.rs
use crate::models::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Tier-2 tie-break: nearest same-name reference must be closer than this.
pub const NAME_MATCH_RADIUS_KM: f64 = 5.0;

/// Refinement: a replacement coordinate further than this from the existing
/// centroid is treated as a false-positive match.
pub const MAX_REFINEMENT_SHIFT_KM: f64 = 10.0;

/// ~100 m at UK latitudes, applied independently to each axis.
pub const PROXIMITY_DEGREES: f64 = 0.001;

/// Great-circle distance in kilometres.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let (delta_phi, delta_lambda) = ((lat2 - lat1).to_radians(), (lon2 - lon1).to_radians());
    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}

pub fn distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    haversine_km(a.lat, a.lon, b.lat, b.lon)
}

pub fn within_name_radius(distance_km: f64) -> bool {
    distance_km < NAME_MATCH_RADIUS_KM
}

pub fn within_proximity_box(a: GeoPoint, b: GeoPoint) -> bool {
    (a.lat - b.lat).abs() < PROXIMITY_DEGREES && (a.lon - b.lon).abs() < PROXIMITY_DEGREES
}

/// Whether a refinement candidate is plausible given the current centroid.
/// With no centroid there is nothing to contradict.
pub fn accept_refinement(centroid: Option<GeoPoint>, candidate: GeoPoint) -> bool {
    match centroid {
        Some(c) => distance_km(c, candidate) <= MAX_REFINEMENT_SHIFT_KM,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Point `km` kilometres due north of `origin`.
    fn north_of(origin: GeoPoint, km: f64) -> GeoPoint {
        GeoPoint::new(origin.lat + (km / EARTH_RADIUS_KM).to_degrees(), origin.lon)
    }

    #[test]
    fn test_zero_distance_to_self() {
        for (lat, lon) in [(53.0, -1.8), (0.0, 0.0), (-33.9, 151.2), (89.9, 179.9)] {
            assert_eq!(haversine_km(lat, lon, lat, lon), 0.0);
        }
    }

    #[test]
    fn test_symmetric() {
        let pairs = [((53.795, -1.759), (53.480, -2.242)), ((51.5, -0.12), (55.95, -3.19))];
        for ((a_lat, a_lon), (b_lat, b_lon)) in pairs {
            let ab = haversine_km(a_lat, a_lon, b_lat, b_lon);
            let ba = haversine_km(b_lat, b_lon, a_lat, a_lon);
            assert!((ab - ba).abs() < 1e-9);
        }
    }

    #[test]
    fn test_known_distance() {
        // One degree along a meridian is R * pi / 180.
        let degree = haversine_km(53.0, -1.8, 54.0, -1.8);
        assert!((degree - EARTH_RADIUS_KM * std::f64::consts::PI / 180.0).abs() < 1e-9);
        assert!((degree - 111.195).abs() < 0.001, "got {degree}");

        // Bradford to Manchester.
        let d = haversine_km(53.795, -1.759, 53.480, -2.242);
        assert!((d - 47.337).abs() < 0.01, "got {d}");
    }

    #[test]
    fn test_name_radius_boundary() {
        assert!(within_name_radius(4.999));
        assert!(!within_name_radius(5.0));
        assert!(!within_name_radius(6.0));
    }

    #[test]
    fn test_refinement_rejects_far_candidate() {
        let centroid = GeoPoint::new(53.0, -1.8);
        assert!(!accept_refinement(Some(centroid), north_of(centroid, 12.0)));
        assert!(accept_refinement(Some(centroid), north_of(centroid, 9.5)));
        assert!(accept_refinement(None, north_of(centroid, 500.0)));
    }

    #[test]
    fn test_proximity_box() {
        let a = GeoPoint::new(53.7950, -1.7590);
        assert!(within_proximity_box(a, GeoPoint::new(53.7955, -1.7585)));
        assert!(!within_proximity_box(a, GeoPoint::new(53.7965, -1.7590)));
        assert!(!within_proximity_box(a, GeoPoint::new(53.7950, -1.7575)));
    }
}
