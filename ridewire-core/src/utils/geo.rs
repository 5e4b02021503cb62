use ridewire_sdk::objects::Coordinates;

/// Mean earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates in meters (haversine).
pub fn haversine_m(a: Coordinates, b: Coordinates) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let d_lat = lat_b - lat_a;
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Whole minutes needed to cover `distance_m` at `speed_kmh`, at least one.
pub fn eta_minutes(distance_m: f64, speed_kmh: f64) -> Option<u32> {
    if !distance_m.is_finite() || !speed_kmh.is_finite() || speed_kmh <= 0.0 {
        return None;
    }
    let minutes = distance_m / 1_000.0 / speed_kmh * 60.0;
    Some(minutes.ceil().max(1.0) as u32)
}

/// Normalize a heading into `[0, 360)`; missing or non-finite headings are 0.
pub fn normalize_heading(heading: Option<f64>) -> f64 {
    match heading {
        Some(h) if h.is_finite() => h.rem_euclid(360.0),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_distance_east_west() {
        let d = haversine_m(Coordinates::new(10.0, 10.0), Coordinates::new(10.0, 10.0001));
        assert!((d - 10.95).abs() < 0.05, "got {d}");
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let d = haversine_m(Coordinates::new(0.0, 0.0), Coordinates::new(1.0, 0.0));
        assert!((d - 111_194.9).abs() < 1.0, "got {d}");
    }

    #[test]
    fn test_distance_is_symmetric_and_zero_on_self() {
        let a = Coordinates::new(52.52, 13.405);
        let b = Coordinates::new(48.8566, 2.3522);
        assert_eq!(haversine_m(a, a), 0.0);
        assert!((haversine_m(a, b) - haversine_m(b, a)).abs() < 1e-6);
    }

    #[test]
    fn test_eta_minutes() {
        assert_eq!(eta_minutes(1_500.0, 30.0), Some(3));
        assert_eq!(eta_minutes(100.0, 30.0), Some(1));
        assert_eq!(eta_minutes(1_000.0, 0.0), None);
    }

    #[test]
    fn test_normalize_heading() {
        assert_eq!(normalize_heading(None), 0.0);
        assert_eq!(normalize_heading(Some(370.0)), 10.0);
        assert_eq!(normalize_heading(Some(-90.0)), 270.0);
        assert_eq!(normalize_heading(Some(f64::INFINITY)), 0.0);
    }
}
