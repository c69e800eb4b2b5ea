//! Per-tick visibility assessment between satellites and ground stations,
//! plus the inter-satellite-link contact model.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use ground_stations::GroundStation;
use orbital_mechanics::frames::look_angles;

use crate::link_budget::LinkBudget;

/// ISL rate at exactly the threshold separation, Mbps.
const ISL_BASE_RATE_MBPS: f64 = 1000.0;

/// ISL rate ceiling; the inverse-square knob diverges as separation shrinks.
const ISL_RATE_CAP_MBPS: f64 = 10_000.0;

/// One visible satellite-to-ground geometry sample.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VisibilitySample {
    pub elevation_deg: f64,
    pub azimuth_deg: f64,
    pub range_km: f64,
    pub snr_db: f64,
    pub data_rate_mbps: f64,
}

/// Visibility verdict. `LinkFail` means the geometry cleared the mask and the
/// range limit but the budget came up short; the engine counts those as
/// attempted-but-unsuccessful contacts.
#[derive(Debug, Clone, Copy)]
pub enum Visibility {
    Obscured,
    LinkFail { snr_db: f64 },
    Visible(VisibilitySample),
}

/// Assess one satellite/station pair. Visible means elevation above the
/// station mask, range within the station limit, and a positive data rate.
pub fn assess(
    station: &GroundStation,
    sat_ecef_km: &Vector3<f64>,
    budget: &LinkBudget,
) -> Visibility {
    let angles = look_angles(&station.position, sat_ecef_km);

    if angles.elevation_deg < station.elevation_mask_deg || angles.range_km > station.max_range_km
    {
        return Visibility::Obscured;
    }

    let assessment = budget.evaluate(angles.range_km, angles.elevation_deg);
    if assessment.data_rate_mbps <= 0.0 {
        return Visibility::LinkFail {
            snr_db: assessment.snr_db,
        };
    }

    Visibility::Visible(VisibilitySample {
        elevation_deg: angles.elevation_deg,
        azimuth_deg: angles.azimuth_deg,
        range_km: angles.range_km,
        snr_db: assessment.snr_db,
        data_rate_mbps: assessment.data_rate_mbps,
    })
}

/// Inter-satellite link: a contact exists when the ECI separation is below
/// `threshold_km`. The rate curve is the inverse-square knob inherited from
/// the reference constellation tooling, capped.
pub fn isl_contact(
    a_eci_km: &Vector3<f64>,
    b_eci_km: &Vector3<f64>,
    threshold_km: f64,
) -> Option<(f64, f64)> {
    let distance_km = (a_eci_km - b_eci_km).norm();
    if distance_km >= threshold_km {
        return None;
    }

    let rate_mbps = (ISL_BASE_RATE_MBPS * (threshold_km / distance_km).powi(2))
        .min(ISL_RATE_CAP_MBPS);
    Some((distance_km, rate_mbps))
}
