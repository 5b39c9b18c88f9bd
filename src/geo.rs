//! # Geo Utility
//! Great-circle distance and coordinate bucketing. Pure functions, no I/O.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

const EARTH_RADIUS_MILES: f64 = 3_958.8;

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Upstream feeds encode "unknown" as 0,0; treat that (and NaN) as absent.
    pub fn is_known(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite() && !(self.lat == 0.0 && self.lng == 0.0)
    }
}

/// Haversine distance in miles.
pub fn distance_miles(a: GeoPoint, b: GeoPoint) -> f64 {
    let to_rad = |deg: f64| deg * PI / 180.0;

    let dlat = to_rad(b.lat - a.lat);
    let dlng = to_rad(b.lng - a.lng);

    let h = (dlat / 2.0).sin().powi(2)
        + to_rad(a.lat).cos() * to_rad(b.lat).cos() * (dlng / 2.0).sin().powi(2);

    // clamp guards against tiny float overshoot for antipodal points
    let c = 2.0 * h.sqrt().min(1.0).asin();
    EARTH_RADIUS_MILES * c
}

/// Round to `decimals` places. One decimal is roughly an 11 km grid.
pub fn round_coord(v: f64, decimals: i32) -> f64 {
    let f = 10f64.powi(decimals);
    (v * f).round() / f
}

/// Location bucket used by cache keys: "lat,lng" on the ~11 km grid.
pub fn bucket_key(p: GeoPoint) -> String {
    // normalise -0.0 so it shares a bucket with 0.0
    let lat = round_coord(p.lat, 1) + 0.0;
    let lng = round_coord(p.lng, 1) + 0.0;
    format!("{lat:.1},{lng:.1}")
}
