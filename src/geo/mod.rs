use crate::error::AppError;
use crate::models::driver::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Great-circle distance between two validated points.
///
/// Symmetric and deterministic; zero for identical points. Malformed
/// coordinates are rejected up front rather than producing NaN downstream.
pub fn distance_km(a: &GeoPoint, b: &GeoPoint) -> Result<f64, AppError> {
    validate_point(a)?;
    validate_point(b)?;
    Ok(haversine_km(a, b))
}

pub fn validate_point(p: &GeoPoint) -> Result<(), AppError> {
    if !p.lat.is_finite() || !p.lng.is_finite() {
        return Err(AppError::InvalidCoordinates(format!(
            "coordinates must be finite, got ({}, {})",
            p.lat, p.lng
        )));
    }
    if !(-90.0..=90.0).contains(&p.lat) {
        return Err(AppError::InvalidCoordinates(format!(
            "latitude {} out of range [-90, 90]",
            p.lat
        )));
    }
    if !(-180.0..=180.0).contains(&p.lng) {
        return Err(AppError::InvalidCoordinates(format!(
            "longitude {} out of range [-180, 180]",
            p.lng
        )));
    }
    Ok(())
}

fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}
