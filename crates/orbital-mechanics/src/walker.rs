//! Walker constellation generator and the built-in constellation library.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{KeplerianElements, OrbitalError, Result};

/// Names accepted by [`WalkerConstellation::builtin`].
pub const BUILTIN_CONSTELLATIONS: [&str; 3] = ["starlink", "kuiper", "gps"];

/// Walker-pattern shell: evenly spaced planes, evenly phased slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkerConstellation {
    pub name: String,
    pub total_satellites: u32,
    pub planes: u32,
    pub phasing: u32,
    pub altitude_km: f64,
    pub inclination_deg: f64,
}

/// One generated member of a constellation.
#[derive(Debug, Clone)]
pub struct ConstellationSatellite {
    pub id: String,
    pub name: String,
    pub elements: KeplerianElements,
}

impl WalkerConstellation {
    pub fn starlink() -> Self {
        Self {
            name: "starlink".to_string(),
            total_satellites: 60,
            planes: 6,
            phasing: 1,
            altitude_km: 550.0,
            inclination_deg: 53.0,
        }
    }

    pub fn kuiper() -> Self {
        Self {
            name: "kuiper".to_string(),
            total_satellites: 48,
            planes: 6,
            phasing: 1,
            altitude_km: 630.0,
            inclination_deg: 51.9,
        }
    }

    pub fn gps() -> Self {
        Self {
            name: "gps".to_string(),
            total_satellites: 24,
            planes: 6,
            phasing: 2,
            altitude_km: 20_200.0,
            inclination_deg: 55.0,
        }
    }

    pub fn builtin(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "starlink" => Some(Self::starlink()),
            "kuiper" => Some(Self::kuiper()),
            "gps" => Some(Self::gps()),
            _ => None,
        }
    }

    pub fn satellites_per_plane(&self) -> u32 {
        self.total_satellites / self.planes
    }

    pub fn plane_spacing_deg(&self) -> f64 {
        360.0 / self.planes as f64
    }

    pub fn in_plane_spacing_deg(&self) -> f64 {
        360.0 / self.satellites_per_plane() as f64
    }

    /// Generate circular element sets for every slot at the given epoch.
    /// Satellite ids are `sat_001 ..` in plane-major order.
    pub fn generate(&self, epoch: DateTime<Utc>) -> Result<Vec<ConstellationSatellite>> {
        if self.planes == 0 || self.total_satellites == 0 {
            return Err(OrbitalError::InvalidElements(
                "constellation must have at least one plane and one satellite".to_string(),
            ));
        }
        if self.total_satellites % self.planes != 0 {
            return Err(OrbitalError::InvalidElements(format!(
                "{} satellites do not divide evenly into {} planes",
                self.total_satellites, self.planes
            )));
        }

        let sats_per_plane = self.satellites_per_plane();
        let plane_spacing = self.plane_spacing_deg();
        let in_plane_spacing = self.in_plane_spacing_deg();
        let phase_offset = self.phasing as f64 * 360.0 / self.total_satellites as f64;

        let mut satellites = Vec::with_capacity(self.total_satellites as usize);
        for plane in 0..self.planes {
            for slot in 0..sats_per_plane {
                let index = plane * sats_per_plane + slot;
                let raan = plane as f64 * plane_spacing;
                let mean_anomaly =
                    slot as f64 * in_plane_spacing + plane as f64 * phase_offset;

                let elements = KeplerianElements::circular(
                    self.altitude_km,
                    self.inclination_deg,
                    raan,
                    mean_anomaly,
                    epoch,
                )?;

                satellites.push(ConstellationSatellite {
                    id: format!("sat_{:03}", index + 1),
                    name: format!("{}-{:03}", self.name.to_uppercase(), index + 1),
                    elements,
                });
            }
        }

        Ok(satellites)
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
    fn test_builtin_lookup() {
        for name in BUILTIN_CONSTELLATIONS {
            assert!(WalkerConstellation::builtin(name).is_some(), "{name} missing");
        }
        assert!(WalkerConstellation::builtin("iridium").is_none());
    }

    #[test]
    fn test_starlink_shell() {
        let sats = WalkerConstellation::starlink().generate(epoch()).unwrap();
        assert_eq!(sats.len(), 60);

        // Ids are unique and plane RAANs evenly spaced.
        let mut ids: Vec<&str> = sats.iter().map(|s| s.id.as_str()).collect();
        ids.dedup();
        assert_eq!(ids.len(), 60);
        assert!((sats[0].elements.raan_deg() - 0.0).abs() < 1e-9);
        assert!((sats[10].elements.raan_deg() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_gps_altitude() {
        let sats = WalkerConstellation::gps().generate(epoch()).unwrap();
        assert_eq!(sats.len(), 24);
        for sat in &sats {
            let alt = sat.elements.semi_major_axis_km() - crate::EARTH_RADIUS_KM;
            assert!((alt - 20_200.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_uneven_plane_split_rejected() {
        let shell = WalkerConstellation {
            name: "bad".to_string(),
            total_satellites: 10,
            planes: 3,
            phasing: 1,
            altitude_km: 550.0,
            inclination_deg: 53.0,
        };
        assert!(shell.generate(epoch()).is_err());
    }
}
