use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;

pub const EARTH_RADIUS_KM: f64 = 6_371.0;
pub const KM_PER_DEGREE: f64 = 111.0;

const FULL_LONGITUDE: LongitudeRange = LongitudeRange {
    min: -180.0,
    max: 180.0,
};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> DomainResult<Self> {
        Ok(Self {
            latitude: validate_latitude(latitude)?,
            longitude: validate_longitude(longitude)?,
        })
    }

    /// Reads a GeoJSON-ordered `[longitude, latitude]` pair. Anything that is
    /// not exactly two finite, in-range numbers yields `None`.
    pub fn from_coordinates(coordinates: &[f64]) -> Option<Self> {
        match coordinates {
            [longitude, latitude] => Self::new(*latitude, *longitude).ok(),
            _ => None,
        }
    }

    pub fn coordinates(&self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }
}

pub fn validate_latitude(latitude: f64) -> DomainResult<f64> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(DomainError::InvalidCoordinates(
            "Invalid latitude. Must be between -90 and 90".into(),
        ));
    }
    Ok(latitude)
}

pub fn validate_longitude(longitude: f64) -> DomainResult<f64> {
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(DomainError::InvalidCoordinates(
            "Invalid longitude. Must be between -180 and 180".into(),
        ));
    }
    Ok(longitude)
}

/// Great-circle distance in kilometres.
pub fn haversine_km(from: GeoPoint, to: GeoPoint) -> f64 {
    let from_lat = from.latitude.to_radians();
    let to_lat = to.latitude.to_radians();
    let delta_lat = (to.latitude - from.latitude).to_radians();
    let delta_lng = (to.longitude - from.longitude).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + from_lat.cos() * to_lat.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

pub fn round_km(distance_km: f64) -> f64 {
    (distance_km * 100.0).round() / 100.0
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct LongitudeRange {
    pub min: f64,
    pub max: f64,
}

impl LongitudeRange {
    pub fn contains(&self, longitude: f64) -> bool {
        longitude >= self.min && longitude <= self.max
    }
}

/// Equirectangular prefilter around a search circle. It only ever
/// over-approximates the circle: it widens to every longitude when the circle
/// reaches a pole and splits in two when it crosses the antimeridian.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub longitude_ranges: Vec<LongitudeRange>,
}

impl BoundingBox {
    pub fn around(origin: GeoPoint, radius_km: f64) -> Self {
        let lat_delta = radius_km / KM_PER_DEGREE;
        let min_latitude = (origin.latitude - lat_delta).max(-90.0);
        let max_latitude = (origin.latitude + lat_delta).min(90.0);

        let cos_lat = origin.latitude.to_radians().cos();
        let lng_delta = if cos_lat <= f64::EPSILON {
            f64::INFINITY
        } else {
            radius_km / (KM_PER_DEGREE * cos_lat)
        };

        let touches_pole = min_latitude <= -90.0 || max_latitude >= 90.0;
        let longitude_ranges = if touches_pole || lng_delta >= 180.0 {
            vec![FULL_LONGITUDE]
        } else {
            let min = origin.longitude - lng_delta;
            let max = origin.longitude + lng_delta;
            if min < -180.0 {
                vec![
                    LongitudeRange {
                        min: min + 360.0,
                        max: 180.0,
                    },
                    LongitudeRange { min: -180.0, max },
                ]
            } else if max > 180.0 {
                vec![
                    LongitudeRange { min, max: 180.0 },
                    LongitudeRange {
                        min: -180.0,
                        max: max - 360.0,
                    },
                ]
            } else {
                vec![LongitudeRange { min, max }]
            }
        };

        Self {
            min_latitude,
            max_latitude,
            longitude_ranges,
        }
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        point.latitude >= self.min_latitude
            && point.latitude <= self.max_latitude
            && self
                .longitude_ranges
                .iter()
                .any(|range| range.contains(point.longitude))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn point(latitude: f64, longitude: f64) -> GeoPoint {
        GeoPoint::new(latitude, longitude).unwrap()
    }

    fn assert_approx(actual: f64, expected: f64, tolerance: f64) {
        assert!(
            (actual - expected).abs() < tolerance,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn haversine_matches_reference_distances() {
        let campus = point(28.6024, -81.2003);
        assert_approx(haversine_km(campus, campus), 0.0, EPS);
        assert_approx(haversine_km(campus, point(28.6114, -81.2003)), 1.00075, 1e-4);
        assert_approx(
            haversine_km(point(51.5074, -0.1278), point(48.8566, 2.3522)),
            343.556,
            1e-2,
        );
    }

    #[test]
    fn haversine_is_short_across_antimeridian() {
        assert_approx(haversine_km(point(0.0, 179.99), point(0.0, -179.99)), 2.2239, 1e-3);
    }

    #[test]
    fn round_km_keeps_two_decimals() {
        assert_eq!(round_km(1.0007543), 1.0);
        assert_eq!(round_km(100.0754339), 100.08);
    }

    #[test]
    fn new_rejects_out_of_range_latitude() {
        let err = GeoPoint::new(91.0, -81.2003).unwrap_err();
        assert!(matches!(err, DomainError::InvalidCoordinates(message) if message.contains("latitude")));
    }

    #[test]
    fn new_rejects_out_of_range_longitude() {
        let err = GeoPoint::new(0.0, -180.5).unwrap_err();
        assert!(matches!(err, DomainError::InvalidCoordinates(message) if message.contains("longitude")));
    }

    #[test]
    fn from_coordinates_requires_exactly_two_components() {
        assert_eq!(
            GeoPoint::from_coordinates(&[-81.2003, 28.6024]),
            Some(point(28.6024, -81.2003))
        );
        assert_eq!(GeoPoint::from_coordinates(&[]), None);
        assert_eq!(GeoPoint::from_coordinates(&[1.0]), None);
        assert_eq!(GeoPoint::from_coordinates(&[1.0, 2.0, 3.0]), None);
        assert_eq!(GeoPoint::from_coordinates(&[f64::NAN, 2.0]), None);
    }

    #[test]
    fn bounding_box_uses_degree_approximation() {
        let bbox = BoundingBox::around(point(0.0, 0.0), 111.0);
        assert_approx(bbox.min_latitude, -1.0, EPS);
        assert_approx(bbox.max_latitude, 1.0, EPS);
        assert_eq!(bbox.longitude_ranges.len(), 1);
        assert_approx(bbox.longitude_ranges[0].min, -1.0, EPS);
        assert_approx(bbox.longitude_ranges[0].max, 1.0, EPS);
    }

    #[test]
    fn bounding_box_widens_longitude_away_from_equator() {
        let bbox = BoundingBox::around(point(60.0, 10.0), 111.0);
        assert_approx(bbox.longitude_ranges[0].min, 8.0, 1e-9);
        assert_approx(bbox.longitude_ranges[0].max, 12.0, 1e-9);
    }

    #[test]
    fn bounding_box_splits_at_antimeridian() {
        let bbox = BoundingBox::around(point(0.0, 179.9), 50.0);
        assert_eq!(bbox.longitude_ranges.len(), 2);
        assert!(bbox.contains(point(0.0, 179.95)));
        assert!(bbox.contains(point(0.0, -179.9)));
        assert!(!bbox.contains(point(0.0, 0.0)));
    }

    #[test]
    fn bounding_box_covers_all_longitudes_at_pole() {
        let bbox = BoundingBox::around(point(89.99, 0.0), 10.0);
        assert_eq!(bbox.longitude_ranges, vec![FULL_LONGITUDE]);
        assert!(bbox.contains(point(89.99, 180.0)));
        assert_approx(bbox.max_latitude, 90.0, EPS);
    }
}
