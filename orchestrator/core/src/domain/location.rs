// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Coordinates, great-circle distance and delivery-zone checks.

use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Range check only; `validate_in_zone` covers the geofence.
    pub fn validate(&self) -> Result<(), DomainError> {
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(DomainError::Validation(
                "latitude must be between -90 and 90".to_string(),
            ));
        }
        if !(-180.0..=180.0).contains(&self.lng) {
            return Err(DomainError::Validation(
                "longitude must be between -180 and 180".to_string(),
            ));
        }
        Ok(())
    }

    pub fn distance_km(&self, other: &Location) -> f64 {
        haversine_km(self.lat, self.lng, other.lat, other.lng)
    }
}

pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Circular service area around a fixed center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeliveryZone {
    pub center: Location,
    pub radius_km: f64,
}

impl DeliveryZone {
    pub fn contains(&self, point: &Location) -> bool {
        self.center.distance_km(point) <= self.radius_km
    }

    /// `label` names the point in the error message ("origin", "destination", ...).
    pub fn validate_in_zone(&self, point: &Location, label: &str) -> Result<(), DomainError> {
        if self.contains(point) {
            Ok(())
        } else {
            Err(DomainError::OutOfZone(format!(
                "{label} is outside the delivery zone"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn riyadh_zone() -> DeliveryZone {
        DeliveryZone {
            center: Location::new(24.7136, 46.6753),
            radius_km: 50.0,
        }
    }

    #[test]
    fn test_haversine_same_point_is_zero() {
        assert!(haversine_km(24.7, 46.6, 24.7, 46.6).abs() < 1e-9);
    }

    #[test]
    fn test_haversine_known_distance() {
        // Riyadh to Jeddah, roughly 846 km
        let d = haversine_km(24.7136, 46.6753, 21.4858, 39.1925);
        assert!((d - 846.0).abs() < 10.0, "got {d}");
    }

    #[test]
    fn test_validate_ranges() {
        assert!(Location::new(90.0, 180.0).validate().is_ok());
        assert!(Location::new(-90.0, -180.0).validate().is_ok());
        assert!(matches!(
            Location::new(90.1, 0.0).validate(),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            Location::new(0.0, -180.5).validate(),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn test_zone_membership() {
        let zone = riyadh_zone();
        assert!(zone.contains(&Location::new(24.75, 46.70)));
        assert!(!zone.contains(&Location::new(21.4858, 39.1925)));

        let err = zone
            .validate_in_zone(&Location::new(21.4858, 39.1925), "origin")
            .unwrap_err();
        assert_eq!(err.code(), "OUT_OF_ZONE");
        assert_eq!(err.to_string(), "origin is outside the delivery zone");
    }
}
