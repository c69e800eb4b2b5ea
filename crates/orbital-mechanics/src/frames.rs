//! Reference-frame conversions: ECI, ECEF, geodetic, and topocentric look angles.

use chrono::{DateTime, Utc};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::{normalize_deg, EARTH_RADIUS_KM, WGS84_E2};

/// Unix milliseconds of the J2000 reference epoch (2000-01-01 12:00:00 UTC).
const J2000_UNIX_MILLIS: i64 = 946_728_000_000;

/// Geodetic coordinates on the WGS-84 ellipsoid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeodeticPosition {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_km: f64,
}

/// Topocentric pointing from a ground station to a satellite.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LookAngles {
    pub elevation_deg: f64,
    pub azimuth_deg: f64,
    pub range_km: f64,
}

/// Greenwich Mean Sidereal Time at `t`, radians.
pub fn gmst_radians(t: DateTime<Utc>) -> f64 {
    let days_since_j2000 = (t.timestamp_millis() - J2000_UNIX_MILLIS) as f64 / 86_400_000.0;
    let gmst_hours = (18.697_374_558 + 24.065_709_824_419_08 * days_since_j2000).rem_euclid(24.0);
    (gmst_hours * 15.0).to_radians()
}

/// Rotate an ECI vector into ECEF at time `t`.
pub fn eci_to_ecef(eci: &Vector3<f64>, t: DateTime<Utc>) -> Vector3<f64> {
    let theta = gmst_radians(t);
    let (sin_t, cos_t) = theta.sin_cos();
    Vector3::new(
        cos_t * eci.x + sin_t * eci.y,
        -sin_t * eci.x + cos_t * eci.y,
        eci.z,
    )
}

/// WGS-84 geodetic position to ECEF, km.
pub fn geodetic_to_ecef(geo: &GeodeticPosition) -> Vector3<f64> {
    let lat = geo.latitude_deg.to_radians();
    let lon = geo.longitude_deg.to_radians();
    let n = EARTH_RADIUS_KM / (1.0 - WGS84_E2 * lat.sin().powi(2)).sqrt();

    Vector3::new(
        (n + geo.altitude_km) * lat.cos() * lon.cos(),
        (n + geo.altitude_km) * lat.cos() * lon.sin(),
        (n * (1.0 - WGS84_E2) + geo.altitude_km) * lat.sin(),
    )
}

/// ECEF to WGS-84 geodetic via the standard iterative latitude solution.
/// Five iterations reduce the latitude error below 1e-9 degrees for orbital
/// altitudes.
pub fn ecef_to_geodetic(ecef: &Vector3<f64>) -> GeodeticPosition {
    let r = (ecef.x * ecef.x + ecef.y * ecef.y).sqrt();
    let longitude = ecef.y.atan2(ecef.x);

    if r < 1e-9 {
        // On the polar axis the iteration degenerates; latitude is exact.
        let b = EARTH_RADIUS_KM * (1.0 - WGS84_E2).sqrt();
        return GeodeticPosition {
            latitude_deg: 90.0_f64.copysign(ecef.z),
            longitude_deg: 0.0,
            altitude_km: ecef.z.abs() - b,
        };
    }

    let mut latitude = ecef.z.atan2(r);
    let mut n = EARTH_RADIUS_KM;
    let mut altitude = 0.0;
    for _ in 0..5 {
        n = EARTH_RADIUS_KM / (1.0 - WGS84_E2 * latitude.sin().powi(2)).sqrt();
        altitude = r / latitude.cos() - n;
        latitude = ecef.z.atan2(r * (1.0 - WGS84_E2 * n / (n + altitude)));
    }
    n = EARTH_RADIUS_KM / (1.0 - WGS84_E2 * latitude.sin().powi(2)).sqrt();
    altitude = r / latitude.cos() - n;

    GeodeticPosition {
        latitude_deg: latitude.to_degrees(),
        longitude_deg: longitude.to_degrees(),
        altitude_km: altitude,
    }
}

/// Look angles from a ground station to a satellite, both expressed in ECEF.
/// Projects the range vector into the station's local South-East-Up frame:
/// elevation `atan2(up, hypot(south, east))`, azimuth `atan2(east, south)`
/// normalized to `[0, 360)`.
pub fn look_angles(station: &GeodeticPosition, sat_ecef: &Vector3<f64>) -> LookAngles {
    let gs_ecef = geodetic_to_ecef(station);
    let range_vec = sat_ecef - gs_ecef;
    let range_km = range_vec.norm();

    let lat = station.latitude_deg.to_radians();
    let lon = station.longitude_deg.to_radians();
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();

    let south = -sin_lat * cos_lon * range_vec.x - sin_lat * sin_lon * range_vec.y
        + cos_lat * range_vec.z;
    let east = -sin_lon * range_vec.x + cos_lon * range_vec.y;
    let up = cos_lat * cos_lon * range_vec.x + cos_lat * sin_lon * range_vec.y
        + sin_lat * range_vec.z;

    let elevation_deg = up.atan2((south * south + east * east).sqrt()).to_degrees();
    let azimuth_deg = normalize_deg(east.atan2(south).to_degrees());

    LookAngles {
        elevation_deg,
        azimuth_deg,
        range_km,
    }
}
