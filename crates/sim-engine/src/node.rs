//! Satellite runtime state.

use bundle_store::BundleBuffer;
use dtn_routing::RoutingStrategy;
use orbital_mechanics::{KeplerianElements, OrbitalState};

/// One satellite in a running simulation: immutable elements, the state
/// repositioned every tick, the node's buffer, and its routing scratch.
/// Created at simulation start, destroyed at simulation stop.
pub struct SatelliteNode {
    pub id: String,
    pub name: String,
    pub elements: KeplerianElements,
    pub state: OrbitalState,
    pub buffer: BundleBuffer,
    pub strategy: Box<dyn RoutingStrategy>,
}

impl std::fmt::Debug for SatelliteNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SatelliteNode")
            .field("id", &self.id)
            .field("buffered_bundles", &self.buffer.len())
            .field("strategy", &self.strategy.name())
            .finish()
    }
}
