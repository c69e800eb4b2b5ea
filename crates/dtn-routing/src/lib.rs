//! DTN Routing Library
//!
//! Per-contact forwarding decisions under Epidemic, PRoPHET, and binary
//! Spray-and-Wait semantics. Every node runs its own strategy instance; the
//! simulation engine mediates encounters and executes the decisions.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bundle_store::{Bundle, BundleId};

pub mod epidemic;
pub mod prophet;
pub mod score;
pub mod spray_and_wait;

pub use epidemic::EpidemicRouter;
pub use prophet::ProphetRouter;
pub use spray_and_wait::SprayAndWaitRouter;

/// Default initial copy count for Spray-and-Wait.
pub const DEFAULT_SPRAY_COPIES: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingAlgorithm {
    Epidemic,
    Prophet,
    SprayAndWait,
}

impl RoutingAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            RoutingAlgorithm::Epidemic => "epidemic",
            RoutingAlgorithm::Prophet => "prophet",
            RoutingAlgorithm::SprayAndWait => "spray_and_wait",
        }
    }
}

impl FromStr for RoutingAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "epidemic" => Ok(RoutingAlgorithm::Epidemic),
            "prophet" => Ok(RoutingAlgorithm::Prophet),
            "spray_and_wait" => Ok(RoutingAlgorithm::SprayAndWait),
            other => Err(format!("unknown routing algorithm '{other}'")),
        }
    }
}

/// One active contact offered to a strategy as a forwarding candidate.
/// `peer_holds_bundle` is engine-verified against the peer's buffer, so a
/// strategy never has to guess about duplicates.
#[derive(Debug, Clone)]
pub struct CandidateContact {
    pub contact_id: u64,
    pub peer: String,
    pub peer_is_ground_station: bool,
    pub peer_holds_bundle: bool,
    pub data_rate_mbps: f64,
    pub opened_at: DateTime<Utc>,
}

/// Whether a forward leaves a replica behind at the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardMode {
    Replicate,
    Handoff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    TtlExpired,
    BufferFull,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteDecision {
    Forward {
        contact_id: u64,
        next_hop: String,
        mode: ForwardMode,
        copies: u32,
    },
    Deliver {
        contact_id: u64,
    },
    Store,
    Drop(DropReason),
}

/// State a node shares with a peer when a contact opens: its bundle summary
/// vector and (for PRoPHET) its delivery-predictability table.
#[derive(Debug, Clone, Default)]
pub struct NeighborView {
    pub node_id: String,
    pub bundles_seen: HashSet<BundleId>,
    pub predictability: HashMap<String, f64>,
}

/// Per-node forwarding strategy. One instance per node; all state is local
/// scratch, never shared across nodes except through `NeighborView`.
pub trait RoutingStrategy: Send {
    fn name(&self) -> &'static str;

    /// Forwarding decision for one bundle against the node's active contacts.
    fn decide(
        &mut self,
        bundle: &Bundle,
        candidates: &[CandidateContact],
        now: DateTime<Utc>,
    ) -> RouteDecision;

    /// A bundle entered this node's buffer. `from` is `None` when the node is
    /// the origin holder (source ingestion); `copies_granted` carries the
    /// Spray-and-Wait allocation and is zero for other strategies.
    fn on_bundle_received(
        &mut self,
        bundle: &Bundle,
        from: Option<&str>,
        copies_granted: u32,
        now: DateTime<Utc>,
    );

    /// A forward decision was executed.
    fn on_bundle_forwarded(&mut self, bundle_id: &str, peer: &str, copies: u32);

    /// A contact with `peer` just opened; `view` is the peer's exchanged state.
    fn on_encounter(&mut self, peer: &str, view: &NeighborView, now: DateTime<Utc>);

    /// The state this node exchanges when a contact opens.
    fn neighbor_view(&self, now: DateTime<Utc>) -> NeighborView;

    /// Periodic upkeep: aging, anti-entropy.
    fn maintain(&mut self, now: DateTime<Utc>);

    /// Drop scratch for bundles this node no longer holds.
    fn prune(&mut self, held: &HashSet<BundleId>) {
        let _ = held;
    }

    /// Strategy-specific counters for snapshots.
    fn metrics(&self) -> serde_json::Value;
}

/// Everything needed to instantiate a strategy for one node.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub algorithm: RoutingAlgorithm,
    pub node_id: String,
    pub seed: u64,
    pub spray_copies: u32,
}

pub fn create_strategy(config: &StrategyConfig) -> Box<dyn RoutingStrategy> {
    match config.algorithm {
        RoutingAlgorithm::Epidemic => {
            Box::new(EpidemicRouter::new(&config.node_id, config.seed))
        }
        RoutingAlgorithm::Prophet => Box::new(ProphetRouter::new(&config.node_id)),
        RoutingAlgorithm::SprayAndWait => Box::new(SprayAndWaitRouter::new(
            &config.node_id,
            config.spray_copies,
            config.seed,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_names_round_trip() {
        for algorithm in [
            RoutingAlgorithm::Epidemic,
            RoutingAlgorithm::Prophet,
            RoutingAlgorithm::SprayAndWait,
        ] {
            assert_eq!(
                algorithm.name().parse::<RoutingAlgorithm>().unwrap(),
                algorithm
            );
        }
        assert!("flooding".parse::<RoutingAlgorithm>().is_err());
    }

    #[test]
    fn test_factory_dispatch() {
        for (algorithm, expected) in [
            (RoutingAlgorithm::Epidemic, "epidemic"),
            (RoutingAlgorithm::Prophet, "prophet"),
            (RoutingAlgorithm::SprayAndWait, "spray_and_wait"),
        ] {
            let strategy = create_strategy(&StrategyConfig {
                algorithm,
                node_id: "sat_001".to_string(),
                seed: 1,
                spray_copies: DEFAULT_SPRAY_COPIES,
            });
            assert_eq!(strategy.name(), expected);
        }
    }
}
