//! Two-body Keplerian propagation.

use chrono::{DateTime, Datelike, Utc};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::frames::{ecef_to_geodetic, eci_to_ecef, GeodeticPosition};
use crate::{normalize_rad, KeplerianElements, OrbitalError, Result, EARTH_MU_KM3_S2};

const KEPLER_TOLERANCE: f64 = 1e-12;
const KEPLER_MAX_ITERATIONS: u32 = 100;

/// Radius beyond which the conservative shadow-cylinder model is not applied, km.
const SHADOW_MODEL_MAX_RADIUS_KM: f64 = 50_000.0;

/// Instantaneous state derived from an element set at a query time.
/// Never stored long-term; recomputed every tick.
#[derive(Debug, Clone)]
pub struct OrbitalState {
    pub position_eci_km: Vector3<f64>,
    pub velocity_eci_km_s: Vector3<f64>,
    pub position_ecef_km: Vector3<f64>,
    pub geodetic: GeodeticPosition,
    pub in_eclipse: bool,
    pub epoch: DateTime<Utc>,
}

/// Converged solution of Kepler's equation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KeplerSolution {
    pub eccentric_anomaly_rad: f64,
    pub iterations: u32,
}

/// Solve `E - e*sin(E) = M` by Newton-Raphson to 1e-12. Divergence is fatal;
/// it cannot happen for `e < 1` and is only reachable through numerical
/// corruption upstream.
pub fn solve_kepler(mean_anomaly_rad: f64, eccentricity: f64) -> Result<KeplerSolution> {
    let m = normalize_rad(mean_anomaly_rad);
    let mut e_anom = m + eccentricity * m.sin();

    for iteration in 1..=KEPLER_MAX_ITERATIONS {
        let f = e_anom - eccentricity * e_anom.sin() - m;
        let f_prime = 1.0 - eccentricity * e_anom.cos();
        let delta = f / f_prime;
        e_anom -= delta;

        if delta.abs() < KEPLER_TOLERANCE {
            return Ok(KeplerSolution {
                eccentric_anomaly_rad: e_anom,
                iterations: iteration,
            });
        }
    }

    Err(OrbitalError::KeplerDivergence {
        mean_anomaly_rad: m,
        eccentricity,
        iterations: KEPLER_MAX_ITERATIONS,
    })
}

/// Propagate an element set to time `t`. Pure function, no hidden state.
pub fn propagate(elements: &KeplerianElements, t: DateTime<Utc>) -> Result<OrbitalState> {
    let dt_seconds = (t - elements.epoch()).num_milliseconds() as f64 / 1000.0;
    let e = elements.eccentricity();

    let mean_anomaly = normalize_rad(
        elements.mean_anomaly_deg().to_radians() + elements.mean_motion_rad_s() * dt_seconds,
    );
    let kepler = solve_kepler(mean_anomaly, e)?;
    let ecc_anomaly = kepler.eccentric_anomaly_rad;

    // True anomaly via the half-angle form.
    let beta = e / (1.0 + (1.0 - e * e).sqrt());
    let true_anomaly =
        ecc_anomaly + 2.0 * (beta * ecc_anomaly.sin() / (1.0 - beta * ecc_anomaly.cos())).atan();

    let a = elements.semi_major_axis_km();
    let p = a * (1.0 - e * e);
    let (sin_nu, cos_nu) = true_anomaly.sin_cos();
    let r = p / (1.0 + e * cos_nu);

    // Perifocal position and velocity (z is identically zero).
    let pos_pf = Vector3::new(r * cos_nu, r * sin_nu, 0.0);
    let h = (EARTH_MU_KM3_S2 * p).sqrt();
    let vel_pf = Vector3::new(
        -(EARTH_MU_KM3_S2 / h) * sin_nu,
        (EARTH_MU_KM3_S2 / h) * (e + cos_nu),
        0.0,
    );

    // R3(-raan) * R1(-i) * R3(-argp) into ECI; third column drops out with
    // the perifocal z component.
    let (sin_raan, cos_raan) = elements.raan_deg().to_radians().sin_cos();
    let (sin_inc, cos_inc) = elements.inclination_deg().to_radians().sin_cos();
    let (sin_argp, cos_argp) = elements.arg_perigee_deg().to_radians().sin_cos();

    let r11 = cos_raan * cos_argp - sin_raan * sin_argp * cos_inc;
    let r12 = -cos_raan * sin_argp - sin_raan * cos_argp * cos_inc;
    let r21 = sin_raan * cos_argp + cos_raan * sin_argp * cos_inc;
    let r22 = -sin_raan * sin_argp + cos_raan * cos_argp * cos_inc;
    let r31 = sin_argp * sin_inc;
    let r32 = cos_argp * sin_inc;

    let rotate = |v: &Vector3<f64>| {
        Vector3::new(
            r11 * v.x + r12 * v.y,
            r21 * v.x + r22 * v.y,
            r31 * v.x + r32 * v.y,
        )
    };

    let position_eci_km = rotate(&pos_pf);
    let velocity_eci_km_s = rotate(&vel_pf);
    let position_ecef_km = eci_to_ecef(&position_eci_km, t);
    let geodetic = ecef_to_geodetic(&position_ecef_km);
    let in_eclipse = in_earth_shadow(&position_eci_km, t);

    Ok(OrbitalState {
        position_eci_km,
        velocity_eci_km_s,
        position_ecef_km,
        geodetic,
        in_eclipse,
        epoch: t,
    })
}

/// Approximate solar direction parameterized by day-of-year. Informational
/// only; the eclipse flag does not feed any forwarding decision.
pub fn solar_unit_vector(t: DateTime<Utc>) -> Vector3<f64> {
    let solar_longitude = std::f64::consts::TAU * t.ordinal() as f64 / 365.25;
    Vector3::new(solar_longitude.cos(), solar_longitude.sin(), 0.0)
}

fn in_earth_shadow(position_eci_km: &Vector3<f64>, t: DateTime<Utc>) -> bool {
    let radius = position_eci_km.norm();
    if radius > SHADOW_MODEL_MAX_RADIUS_KM {
        return false;
    }
    position_eci_km.dot(&solar_unit_vector(t)) / radius < -0.1
}
