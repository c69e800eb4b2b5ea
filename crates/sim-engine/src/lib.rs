//! Simulation Engine Library
//!
//! The coupled DTN core loop: orbital propagation drives contact prediction,
//! contacts drive routing, routing drives bundle state. One engine per
//! simulation; a registry runs many engines concurrently and exposes the
//! control surface the host layers on top.

use thiserror::Error;
use uuid::Uuid;

pub mod config;
pub mod engine;
pub mod metrics;
pub mod node;
pub mod registry;

pub use config::{ConstellationSource, SimulationConfig};
pub use engine::{SatelliteStatus, SimulationEngine, SimulationSnapshot, SimulationState};
pub use metrics::SimulationMetrics;
pub use registry::SimulationRegistry;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invalid elements: {0}")]
    InvalidElements(String),
    #[error("Simulation not found: {0}")]
    NotFound(Uuid),
    #[error("Illegal state: cannot {action} while {state:?}")]
    IllegalState {
        action: &'static str,
        state: SimulationState,
    },
    #[error("Fatal simulation error: {0}")]
    Fatal(String),
}

pub type Result<T> = std::result::Result<T, SimError>;

impl From<orbital_mechanics::OrbitalError> for SimError {
    fn from(err: orbital_mechanics::OrbitalError) -> Self {
        use orbital_mechanics::OrbitalError;
        match err {
            OrbitalError::InvalidElements(msg) => SimError::InvalidElements(msg),
            OrbitalError::KeplerDivergence { .. } => SimError::Fatal(err.to_string()),
            OrbitalError::Import(_) | OrbitalError::Csv(_) => {
                SimError::InvalidInput(err.to_string())
            }
        }
    }
}

impl From<ground_stations::StationError> for SimError {
    fn from(err: ground_stations::StationError) -> Self {
        SimError::InvalidInput(err.to_string())
    }
}

impl From<contact_prediction::ContactError> for SimError {
    fn from(err: contact_prediction::ContactError) -> Self {
        SimError::InvalidInput(err.to_string())
    }
}

impl From<bundle_store::StoreError> for SimError {
    fn from(err: bundle_store::StoreError) -> Self {
        SimError::InvalidInput(err.to_string())
    }
}
