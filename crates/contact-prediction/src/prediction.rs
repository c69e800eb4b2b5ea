//! Offline pass prediction.
//!
//! Sweeps a constellation against a station set over a time horizon and
//! returns the communication windows, for pass scheduling ahead of a run.
//! The per-tick engine diffs visibility live; this module answers "when is
//! the next pass" without running a simulation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use ground_stations::GroundStation;
use orbital_mechanics::{propagate, ConstellationSatellite};

use crate::link_budget::LinkBudget;
use crate::visibility::{assess, Visibility};

/// A predicted satellite pass over a ground station.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictedWindow {
    pub satellite_id: String,
    pub station_id: String,
    /// Acquisition of signal.
    pub aos: DateTime<Utc>,
    /// Loss of signal (exclusive; the last visible step plus one step).
    pub los: DateTime<Utc>,
    /// Time of closest approach (peak elevation).
    pub tca: DateTime<Utc>,
    pub max_elevation_deg: f64,
    pub peak_rate_mbps: f64,
}

impl PredictedWindow {
    pub fn duration_seconds(&self) -> i64 {
        (self.los - self.aos).num_seconds()
    }
}

struct OpenPass {
    aos: DateTime<Utc>,
    tca: DateTime<Utc>,
    max_elevation_deg: f64,
    peak_rate_mbps: f64,
}

/// Predict all satellite-ground windows in `[start, start + horizon]`,
/// sampling every `step`. Windows still open at the horizon are closed there.
pub fn predict_windows(
    satellites: &[ConstellationSatellite],
    stations: &[GroundStation],
    budget: &LinkBudget,
    start: DateTime<Utc>,
    horizon: Duration,
    step: Duration,
) -> orbital_mechanics::Result<Vec<PredictedWindow>> {
    let end = start + horizon;
    let mut windows = Vec::new();

    for satellite in satellites {
        for station in stations {
            let mut open: Option<OpenPass> = None;
            let mut t = start;

            while t <= end {
                let state = propagate(&satellite.elements, t)?;
                let verdict = assess(station, &state.position_ecef_km, budget);

                if let Visibility::Visible(sample) = verdict {
                    if let Some(pass) = open.as_mut() {
                        if sample.elevation_deg > pass.max_elevation_deg {
                            pass.max_elevation_deg = sample.elevation_deg;
                            pass.tca = t;
                        }
                        pass.peak_rate_mbps = pass.peak_rate_mbps.max(sample.data_rate_mbps);
                    } else {
                        open = Some(OpenPass {
                            aos: t,
                            tca: t,
                            max_elevation_deg: sample.elevation_deg,
                            peak_rate_mbps: sample.data_rate_mbps,
                        });
                    }
                } else if let Some(pass) = open.take() {
                    windows.push(finish_pass(satellite, station, pass, t));
                }

                t += step;
            }

            if let Some(pass) = open.take() {
                windows.push(finish_pass(satellite, station, pass, end));
            }
        }
    }

    windows.sort_by(|a, b| a.aos.cmp(&b.aos).then(a.satellite_id.cmp(&b.satellite_id)));
    Ok(windows)
}

fn finish_pass(
    satellite: &ConstellationSatellite,
    station: &GroundStation,
    pass: OpenPass,
    los: DateTime<Utc>,
) -> PredictedWindow {
    PredictedWindow {
        satellite_id: satellite.id.clone(),
        station_id: station.id.clone(),
        aos: pass.aos,
        los,
        tca: pass.tca,
        max_elevation_deg: pass.max_elevation_deg,
        peak_rate_mbps: pass.peak_rate_mbps,
    }
}
