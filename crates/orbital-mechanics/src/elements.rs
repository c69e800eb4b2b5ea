//! Keplerian element sets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    normalize_deg, OrbitalError, Result, EARTH_MU_KM3_S2, EARTH_RADIUS_KM,
    MIN_SATELLITE_ALTITUDE_KM,
};

/// Six-scalar Keplerian element set with epoch. Immutable after construction;
/// `new` validates and normalizes, so every instance satisfies
/// `a > R_earth + 100 km`, `0 <= e < 1`, `0 <= i <= 180 deg`, and all angles
/// in `[0, 360)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KeplerianElements {
    semi_major_axis_km: f64,
    eccentricity: f64,
    inclination_deg: f64,
    raan_deg: f64,
    arg_perigee_deg: f64,
    mean_anomaly_deg: f64,
    epoch: DateTime<Utc>,
}

impl KeplerianElements {
    pub fn new(
        semi_major_axis_km: f64,
        eccentricity: f64,
        inclination_deg: f64,
        raan_deg: f64,
        arg_perigee_deg: f64,
        mean_anomaly_deg: f64,
        epoch: DateTime<Utc>,
    ) -> Result<Self> {
        if !semi_major_axis_km.is_finite()
            || semi_major_axis_km <= EARTH_RADIUS_KM + MIN_SATELLITE_ALTITUDE_KM
        {
            return Err(OrbitalError::InvalidElements(format!(
                "semi-major axis {semi_major_axis_km} km must exceed {} km",
                EARTH_RADIUS_KM + MIN_SATELLITE_ALTITUDE_KM
            )));
        }
        if !eccentricity.is_finite() || !(0.0..1.0).contains(&eccentricity) {
            return Err(OrbitalError::InvalidElements(format!(
                "eccentricity {eccentricity} must be in [0, 1)"
            )));
        }
        if !inclination_deg.is_finite() || !(0.0..=180.0).contains(&inclination_deg) {
            return Err(OrbitalError::InvalidElements(format!(
                "inclination {inclination_deg} deg must be in [0, 180]"
            )));
        }
        for (label, angle) in [
            ("RAAN", raan_deg),
            ("argument of perigee", arg_perigee_deg),
            ("mean anomaly", mean_anomaly_deg),
        ] {
            if !angle.is_finite() {
                return Err(OrbitalError::InvalidElements(format!(
                    "{label} must be finite, got {angle}"
                )));
            }
        }

        Ok(Self {
            semi_major_axis_km,
            eccentricity,
            inclination_deg,
            raan_deg: normalize_deg(raan_deg),
            arg_perigee_deg: normalize_deg(arg_perigee_deg),
            mean_anomaly_deg: normalize_deg(mean_anomaly_deg),
            epoch,
        })
    }

    /// Circular orbit at the given altitude above the WGS-84 equatorial radius.
    pub fn circular(
        altitude_km: f64,
        inclination_deg: f64,
        raan_deg: f64,
        mean_anomaly_deg: f64,
        epoch: DateTime<Utc>,
    ) -> Result<Self> {
        Self::new(
            EARTH_RADIUS_KM + altitude_km,
            0.0,
            inclination_deg,
            raan_deg,
            0.0,
            mean_anomaly_deg,
            epoch,
        )
    }

    pub fn semi_major_axis_km(&self) -> f64 {
        self.semi_major_axis_km
    }

    pub fn eccentricity(&self) -> f64 {
        self.eccentricity
    }

    pub fn inclination_deg(&self) -> f64 {
        self.inclination_deg
    }

    pub fn raan_deg(&self) -> f64 {
        self.raan_deg
    }

    pub fn arg_perigee_deg(&self) -> f64 {
        self.arg_perigee_deg
    }

    pub fn mean_anomaly_deg(&self) -> f64 {
        self.mean_anomaly_deg
    }

    pub fn epoch(&self) -> DateTime<Utc> {
        self.epoch
    }

    /// Mean motion `n = sqrt(mu / a^3)`, rad/s.
    pub fn mean_motion_rad_s(&self) -> f64 {
        (EARTH_MU_KM3_S2 / self.semi_major_axis_km.powi(3)).sqrt()
    }

    /// Orbital period, seconds.
    pub fn period_seconds(&self) -> f64 {
        std::f64::consts::TAU / self.mean_motion_rad_s()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_valid_elements_normalize_angles() {
        let el = KeplerianElements::new(6921.0, 0.001, 53.0, 370.0, -10.0, 720.5, epoch()).unwrap();
        assert_eq!(el.raan_deg(), 10.0);
        assert_eq!(el.arg_perigee_deg(), 350.0);
        assert!((el.mean_anomaly_deg() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_subsurface_orbit() {
        let result = KeplerianElements::new(6000.0, 0.0, 53.0, 0.0, 0.0, 0.0, epoch());
        assert!(matches!(result, Err(OrbitalError::InvalidElements(_))));
    }

    #[test]
    fn test_rejects_negative_eccentricity() {
        let result = KeplerianElements::new(7000.0, -0.1, 53.0, 0.0, 0.0, 0.0, epoch());
        assert!(matches!(result, Err(OrbitalError::InvalidElements(_))));
    }

    #[test]
    fn test_rejects_hyperbolic_eccentricity() {
        let result = KeplerianElements::new(7000.0, 1.0, 53.0, 0.0, 0.0, 0.0, epoch());
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_retrograde_beyond_180() {
        let result = KeplerianElements::new(7000.0, 0.0, 181.0, 0.0, 0.0, 0.0, epoch());
        assert!(result.is_err());
    }

    #[test]
    fn test_period_leo() {
        let el = KeplerianElements::circular(542.9, 53.0, 0.0, 0.0, epoch()).unwrap();
        // ~94.8 minutes at 543 km
        let period_min = el.period_seconds() / 60.0;
        assert!(
            (94.0..97.0).contains(&period_min),
            "unexpected period {period_min:.2} min"
        );
    }
}
