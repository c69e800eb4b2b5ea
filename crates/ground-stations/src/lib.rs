//! Ground Stations Library
//!
//! DTN endpoint stations: geodetic position, elevation mask, range limit,
//! antenna gain. Stations are immutable for the lifetime of a simulation run.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use orbital_mechanics::GeodeticPosition;

pub mod import;

pub use import::import_stations_csv;

/// Default minimum elevation above the local horizon, degrees.
pub const DEFAULT_ELEVATION_MASK_DEG: f64 = 10.0;

/// Default maximum communication range, km.
pub const DEFAULT_MAX_RANGE_KM: f64 = 2000.0;

/// Default ground antenna gain, dBi.
pub const DEFAULT_ANTENNA_GAIN_DBI: f64 = 45.0;

#[derive(Error, Debug)]
pub enum StationError {
    #[error("Station not found: {0}")]
    NotFound(String),
    #[error("Duplicate station id: {0}")]
    DuplicateId(String),
    #[error("Invalid station: {0}")]
    InvalidStation(String),
    #[error("Station import failed: {0}")]
    Import(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, StationError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundStation {
    pub id: String,
    pub name: String,
    pub position: GeodeticPosition,
    pub elevation_mask_deg: f64,
    pub max_range_km: f64,
    pub antenna_gain_dbi: f64,
}

impl GroundStation {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        position: GeodeticPosition,
        elevation_mask_deg: f64,
        max_range_km: f64,
        antenna_gain_dbi: f64,
    ) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(StationError::InvalidStation("empty station id".to_string()));
        }
        if !(-90.0..=90.0).contains(&position.latitude_deg) {
            return Err(StationError::InvalidStation(format!(
                "{id}: latitude {} out of [-90, 90]",
                position.latitude_deg
            )));
        }
        if !(-180.0..=180.0).contains(&position.longitude_deg) {
            return Err(StationError::InvalidStation(format!(
                "{id}: longitude {} out of [-180, 180]",
                position.longitude_deg
            )));
        }
        if !(0.0..90.0).contains(&elevation_mask_deg) {
            return Err(StationError::InvalidStation(format!(
                "{id}: elevation mask {elevation_mask_deg} out of [0, 90)"
            )));
        }
        if max_range_km <= 0.0 {
            return Err(StationError::InvalidStation(format!(
                "{id}: max range {max_range_km} must be positive"
            )));
        }

        Ok(Self {
            id,
            name: name.into(),
            position,
            elevation_mask_deg,
            max_range_km,
            antenna_gain_dbi,
        })
    }

    /// Station with the default mask, range, and gain.
    pub fn with_defaults(
        id: impl Into<String>,
        name: impl Into<String>,
        position: GeodeticPosition,
    ) -> Result<Self> {
        Self::new(
            id,
            name,
            position,
            DEFAULT_ELEVATION_MASK_DEG,
            DEFAULT_MAX_RANGE_KM,
            DEFAULT_ANTENNA_GAIN_DBI,
        )
    }
}

/// Read-only after construction; the simulation engine holds one per run.
#[derive(Debug, Clone, Default)]
pub struct StationRegistry {
    stations: Vec<GroundStation>,
}

impl StationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_stations(stations: Vec<GroundStation>) -> Result<Self> {
        let mut registry = Self::new();
        for station in stations {
            registry.insert(station)?;
        }
        Ok(registry)
    }

    pub fn insert(&mut self, station: GroundStation) -> Result<()> {
        if self.stations.iter().any(|s| s.id == station.id) {
            return Err(StationError::DuplicateId(station.id));
        }
        self.stations.push(station);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&GroundStation> {
        self.stations
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| StationError::NotFound(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &GroundStation> {
        self.stations.iter()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Built-in catalog of strategically placed city stations.
    pub fn with_major_cities() -> Self {
        let cities = [
            ("gs_los_angeles", "Los Angeles", 34.0522, -118.2437, 0.100),
            ("gs_new_york", "New York", 40.7128, -74.0060, 0.010),
            ("gs_london", "London", 51.5074, -0.1278, 0.035),
            ("gs_berlin", "Berlin", 52.5200, 13.4050, 0.034),
            ("gs_moscow", "Moscow", 55.7558, 37.6173, 0.156),
            ("gs_tokyo", "Tokyo", 35.6762, 139.6503, 0.040),
            ("gs_singapore", "Singapore", 1.3521, 103.8198, 0.015),
            ("gs_sydney", "Sydney", -33.8688, 151.2093, 0.058),
            ("gs_sao_paulo", "Sao Paulo", -23.5505, -46.6333, 0.760),
            ("gs_johannesburg", "Johannesburg", -26.2041, 28.0473, 1.753),
            ("gs_reykjavik", "Reykjavik", 64.1466, -21.9426, 0.028),
            ("gs_anchorage", "Anchorage", 61.2181, -149.9003, 0.040),
        ];

        let mut registry = Self::new();
        for (id, name, lat, lon, alt) in cities {
            // Catalog entries are statically valid.
            if let Ok(station) = GroundStation::with_defaults(
                id,
                name,
                GeodeticPosition {
                    latitude_deg: lat,
                    longitude_deg: lon,
                    altitude_km: alt,
                },
            ) {
                registry.stations.push(station);
            }
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(lat: f64, lon: f64) -> GeodeticPosition {
        GeodeticPosition {
            latitude_deg: lat,
            longitude_deg: lon,
            altitude_km: 0.0,
        }
    }

    #[test]
    fn test_station_validation() {
        assert!(GroundStation::with_defaults("gs_x", "X", position(91.0, 0.0)).is_err());
        assert!(GroundStation::with_defaults("gs_x", "X", position(0.0, -181.0)).is_err());
        assert!(GroundStation::with_defaults("", "X", position(0.0, 0.0)).is_err());
        assert!(GroundStation::with_defaults("gs_x", "X", position(45.0, 90.0)).is_ok());
    }

    #[test]
    fn test_registry_duplicate_rejected() {
        let mut registry = StationRegistry::new();
        let station = GroundStation::with_defaults("gs_a", "A", position(1.0, 2.0)).unwrap();
        registry.insert(station.clone()).unwrap();
        assert!(matches!(
            registry.insert(station),
            Err(StationError::DuplicateId(_))
        ));
    }

    #[test]
    fn test_registry_lookup() {
        let registry = StationRegistry::with_major_cities();
        assert!(registry.len() >= 10);
        let tokyo = registry.get("gs_tokyo").unwrap();
        assert_eq!(tokyo.elevation_mask_deg, DEFAULT_ELEVATION_MASK_DEG);
        assert!(matches!(
            registry.get("gs_atlantis"),
            Err(StationError::NotFound(_))
        ));
    }
}
