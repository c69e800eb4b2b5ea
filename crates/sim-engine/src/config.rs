//! Simulation configuration.

use chrono::{DateTime, Utc};

use bundle_store::{EvictionPolicy, Priority};
use contact_prediction::{RfBand, DEFAULT_ISL_RANGE_KM};
use dtn_routing::{RoutingAlgorithm, DEFAULT_SPRAY_COPIES};
use ground_stations::GroundStation;
use orbital_mechanics::ConstellationSatellite;

use crate::{Result, SimError};

/// Tick length for real-time / UI runs, virtual seconds.
pub const REALTIME_TICK_SECONDS: f64 = 1.0;

/// Tick length for batch / experiment runs, virtual seconds.
pub const BATCH_TICK_SECONDS: f64 = 300.0;

/// Default virtual-to-wall acceleration: one virtual hour per wall second.
pub const DEFAULT_TIME_ACCELERATION: f64 = 3600.0;

/// Where the constellation comes from.
#[derive(Debug, Clone)]
pub enum ConstellationSource {
    /// One of the built-in Walker shells (`starlink`, `kuiper`, `gps`).
    Builtin(String),
    /// Explicit element sets, e.g. from a CSV import.
    Elements(Vec<ConstellationSatellite>),
}

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub name: String,
    pub constellation: ConstellationSource,
    pub stations: Vec<GroundStation>,
    pub source_station: String,
    pub destination_station: String,
    pub routing: RoutingAlgorithm,
    pub duration_hours: f64,
    pub bundle_rate_per_second: f64,
    pub bundle_payload_bytes: usize,
    pub bundle_ttl_seconds: i64,
    pub bundle_priority: Priority,
    pub buffer_bytes: u64,
    pub eviction_policy: EvictionPolicy,
    pub rf_band: RfBand,
    pub isl_range_km: f64,
    pub spray_copies: u32,
    pub tick_seconds: f64,
    pub time_acceleration: f64,
    pub seed: u64,
    /// Virtual start time of the run. Fixed in the config so reruns with the
    /// same seed reproduce bit-identical metrics.
    pub epoch: DateTime<Utc>,
    /// Accepted for control-surface compatibility; the band-dependent rain
    /// term already lives in the link budget.
    pub weather_enabled: bool,
}

impl SimulationConfig {
    /// Batch-mode configuration with the reference defaults.
    pub fn new(
        name: impl Into<String>,
        constellation: ConstellationSource,
        stations: Vec<GroundStation>,
        source_station: impl Into<String>,
        destination_station: impl Into<String>,
        epoch: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            constellation,
            stations,
            source_station: source_station.into(),
            destination_station: destination_station.into(),
            routing: RoutingAlgorithm::Epidemic,
            duration_hours: 12.0,
            bundle_rate_per_second: 0.2,
            bundle_payload_bytes: 1024,
            bundle_ttl_seconds: 3600,
            bundle_priority: Priority::Normal,
            buffer_bytes: 20 * 1024 * 1024,
            eviction_policy: EvictionPolicy::OldestFirst,
            rf_band: RfBand::SBand,
            isl_range_km: DEFAULT_ISL_RANGE_KM,
            spray_copies: DEFAULT_SPRAY_COPIES,
            tick_seconds: BATCH_TICK_SECONDS,
            time_acceleration: DEFAULT_TIME_ACCELERATION,
            seed: 0,
            epoch,
            weather_enabled: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.duration_hours <= 0.0 {
            return Err(SimError::InvalidInput(format!(
                "duration_hours must be positive, got {}",
                self.duration_hours
            )));
        }
        if self.bundle_rate_per_second < 0.0 {
            return Err(SimError::InvalidInput(
                "bundle_rate_per_second must be non-negative".to_string(),
            ));
        }
        if self.bundle_payload_bytes == 0 {
            return Err(SimError::InvalidInput(
                "bundle_payload_bytes must be positive".to_string(),
            ));
        }
        if self.bundle_ttl_seconds <= 0 {
            return Err(SimError::InvalidInput(
                "bundle_ttl_seconds must be positive".to_string(),
            ));
        }
        if self.buffer_bytes == 0 {
            return Err(SimError::InvalidInput(
                "buffer_bytes must be positive".to_string(),
            ));
        }
        if self.tick_seconds <= 0.0 {
            return Err(SimError::InvalidInput(
                "tick_seconds must be positive".to_string(),
            ));
        }
        if self.time_acceleration <= 0.0 {
            return Err(SimError::InvalidInput(
                "time_acceleration must be positive".to_string(),
            ));
        }
        if self.isl_range_km <= 0.0 {
            return Err(SimError::InvalidInput(
                "isl_range_km must be positive".to_string(),
            ));
        }
        if self.spray_copies == 0 {
            return Err(SimError::InvalidInput(
                "spray_copies must be at least 1".to_string(),
            ));
        }
        if self.source_station == self.destination_station {
            return Err(SimError::InvalidInput(
                "source and destination stations must differ".to_string(),
            ));
        }
        for endpoint in [&self.source_station, &self.destination_station] {
            if !self.stations.iter().any(|s| &s.id == endpoint) {
                return Err(SimError::InvalidInput(format!(
                    "station '{endpoint}' is not in the station set"
                )));
            }
        }
        let mut ids: Vec<&str> = self.stations.iter().map(|s| s.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() != self.stations.len() {
            return Err(SimError::InvalidInput(
                "station ids must be unique".to_string(),
            ));
        }
        if let ConstellationSource::Builtin(name) = &self.constellation {
            if orbital_mechanics::WalkerConstellation::builtin(name).is_none() {
                return Err(SimError::InvalidInput(format!(
                    "unknown built-in constellation '{name}'"
                )));
            }
        }
        Ok(())
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_hours * 3600.0
    }

    /// Wall-clock pacing between ticks for the real-time loop.
    pub fn wall_pace(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.tick_seconds / self.time_acceleration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ground_stations::StationRegistry;

    fn stations() -> Vec<GroundStation> {
        let registry = StationRegistry::with_major_cities();
        vec![
            registry.get("gs_los_angeles").unwrap().clone(),
            registry.get("gs_tokyo").unwrap().clone(),
        ]
    }

    fn config() -> SimulationConfig {
        SimulationConfig::new(
            "test",
            ConstellationSource::Builtin("starlink".to_string()),
            stations(),
            "gs_los_angeles",
            "gs_tokyo",
            Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_defaults_validate() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_rejects_unknown_station() {
        let mut bad = config();
        bad.destination_station = "gs_nowhere".to_string();
        assert!(matches!(bad.validate(), Err(SimError::InvalidInput(_))));
    }

    #[test]
    fn test_rejects_same_endpoints() {
        let mut bad = config();
        bad.destination_station = bad.source_station.clone();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_constellation() {
        let mut bad = config();
        bad.constellation = ConstellationSource::Builtin("iridium".to_string());
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_duration() {
        let mut bad = config();
        bad.duration_hours = 0.0;
        assert!(bad.validate().is_err());
    }
}
