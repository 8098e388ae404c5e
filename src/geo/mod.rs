use crate::models::driver::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Great-circle distance on a spherical Earth. Ranking only; not survey grade.
pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    // Rounding can push this a hair past 1.0 for antipodal points.
    let haversine =
        (sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng).clamp(0.0, 1.0);
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

#[cfg(test)]
mod tests {
    use super::haversine_km;
    use crate::models::driver::GeoPoint;

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint {
            lat: 4.711,
            lng: -74.0721,
        };
        assert_eq!(haversine_km(&p, &p), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let pairs = [
            ((0.0, 0.0), (10.0, 10.0)),
            ((4.711, -74.0721), (6.2442, -75.5812)),
            ((-33.8688, 151.2093), (51.5074, -0.1278)),
            ((89.9, 0.0), (-89.9, 180.0)),
        ];

        for ((lat_a, lng_a), (lat_b, lng_b)) in pairs {
            let a = GeoPoint { lat: lat_a, lng: lng_a };
            let b = GeoPoint { lat: lat_b, lng: lng_b };
            let ab = haversine_km(&a, &b);
            let ba = haversine_km(&b, &a);
            assert!((ab - ba).abs() < 1e-9, "{ab} != {ba}");
            assert!(ab > 0.0);
        }
    }

    #[test]
    fn bogota_to_medellin_is_around_240_km() {
        let bogota = GeoPoint {
            lat: 4.711,
            lng: -74.0721,
        };
        let medellin = GeoPoint {
            lat: 6.2442,
            lng: -75.5812,
        };
        let distance = haversine_km(&bogota, &medellin);
        assert!((distance - 240.0).abs() < 10.0, "got {distance}");
    }
}
