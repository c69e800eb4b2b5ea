//! Orbital Mechanics Library
//!
//! Two-body Keplerian propagation, ECI/ECEF/geodetic transforms, and Walker
//! constellation modeling for DTN overlay simulations.

use thiserror::Error;

pub mod elements;
pub mod frames;
pub mod import;
pub mod propagation;
pub mod walker;

pub use elements::KeplerianElements;
pub use frames::{GeodeticPosition, LookAngles};
pub use import::import_constellation_csv;
pub use propagation::{propagate, solve_kepler, KeplerSolution, OrbitalState};
pub use walker::{ConstellationSatellite, WalkerConstellation};

/// Earth gravitational parameter, km^3/s^2.
pub const EARTH_MU_KM3_S2: f64 = 398_600.4418;

/// WGS-84 equatorial radius, km.
pub const EARTH_RADIUS_KM: f64 = 6378.137;

/// WGS-84 first eccentricity squared.
pub const WGS84_E2: f64 = 0.006_694_379_990_14;

/// Minimum perigee altitude accepted for an element set, km.
pub const MIN_SATELLITE_ALTITUDE_KM: f64 = 100.0;

#[derive(Error, Debug)]
pub enum OrbitalError {
    #[error("Invalid orbital elements: {0}")]
    InvalidElements(String),
    #[error(
        "Kepler solver diverged after {iterations} iterations (M={mean_anomaly_rad:.9} rad, e={eccentricity})"
    )]
    KeplerDivergence {
        mean_anomaly_rad: f64,
        eccentricity: f64,
        iterations: u32,
    },
    #[error("Constellation import failed: {0}")]
    Import(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, OrbitalError>;

/// Normalize an angle in degrees to `[0, 360)`.
pub(crate) fn normalize_deg(angle: f64) -> f64 {
    angle.rem_euclid(360.0)
}

/// Normalize an angle in radians to `[0, 2*pi)`.
pub(crate) fn normalize_rad(angle: f64) -> f64 {
    angle.rem_euclid(std::f64::consts::TAU)
}
