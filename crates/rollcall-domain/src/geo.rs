//! Geofence geometry.
//!
//! Distances use the Haversine great-circle formula on a spherical Earth.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum GeoError {
    #[error("latitude {0} is outside [-90, 90]")]
    Latitude(f64),
    #[error("longitude {0} is outside [-180, 180]")]
    Longitude(f64),
    #[error("radius {0} must be a non-negative number of meters")]
    Radius(f64),
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, GeoError> {
        let point = Self {
            latitude,
            longitude,
        };
        point.validate()?;
        Ok(point)
    }

    /// Reject NaN and out-of-range degrees.
    pub fn validate(&self) -> Result<(), GeoError> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(GeoError::Latitude(self.latitude));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(GeoError::Longitude(self.longitude));
        }
        Ok(())
    }
}

/// Circular area a scan must originate from.
///
/// `radius_meters` of `None` or `0` disables the location restriction, which is
/// used for indoor rooms where GPS accuracy is too poor to enforce a radius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    pub center: Coordinates,
    pub radius_meters: Option<f64>,
    pub address: Option<String>,
}

impl Geofence {
    pub fn validate(&self) -> Result<(), GeoError> {
        self.center.validate()?;
        match self.radius_meters {
            Some(r) if !(r >= 0.0 && r.is_finite()) => Err(GeoError::Radius(r)),
            _ => Ok(()),
        }
    }

    /// Whether the fence restricts anything at all.
    pub fn is_enforced(&self) -> bool {
        matches!(self.radius_meters, Some(r) if r > 0.0)
    }

    pub fn contains(&self, point: Coordinates) -> bool {
        within_radius(self.center, self.radius_meters, point)
    }
}

/// Great-circle distance between two points in meters.
pub fn distance_meters(a: Coordinates, b: Coordinates) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push h marginally above 1 for antipodal points.
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_METERS * c
}

/// `true` when `point` lies within `radius_meters` of `center` (inclusive).
/// A missing or zero radius means no restriction.
pub fn within_radius(center: Coordinates, radius_meters: Option<f64>, point: Coordinates) -> bool {
    match radius_meters {
        Some(r) if r > 0.0 => distance_meters(center, point) <= r,
        _ => true,
    }
}
