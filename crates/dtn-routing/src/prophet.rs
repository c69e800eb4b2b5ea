//! PRoPHET routing (RFC 6693 semantics): delivery predictability from
//! encounter history, additive transitivity, and exponential aging.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::debug;

use bundle_store::Bundle;

use crate::{CandidateContact, DropReason, ForwardMode, NeighborView, RouteDecision, RoutingStrategy};

/// Predictability gain on a direct encounter.
const P_ENCOUNTER_MAX: f64 = 0.7;

/// Transitivity scaling factor (RFC additive form).
const BETA: f64 = 0.9;

/// Aging base per aging unit.
const GAMMA: f64 = 0.95;

/// Aging time unit, seconds of virtual time.
const AGING_UNIT_S: i64 = 60;

/// Entries below this are deleted.
const MIN_PREDICTABILITY: f64 = 0.01;

/// A peer must beat our predictability by this margin to receive a handoff.
const FORWARD_THRESHOLD: f64 = 0.1;

/// Minimum predictability for direct delivery to the destination.
const DIRECT_DELIVERY_MIN: f64 = 0.5;

pub struct ProphetRouter {
    node_id: String,
    predictability: HashMap<String, f64>,
    last_encounter: HashMap<String, DateTime<Utc>>,
    // Per-entry decay clock; keeps P(x) non-increasing between encounters
    // without compounding.
    last_update: HashMap<String, DateTime<Utc>>,
    neighbor_tables: HashMap<String, HashMap<String, f64>>,
    last_aging: Option<DateTime<Utc>>,
}

impl ProphetRouter {
    pub fn new(node_id: &str) -> Self {
        Self {
            node_id: node_id.to_string(),
            predictability: HashMap::new(),
            last_encounter: HashMap::new(),
            last_update: HashMap::new(),
            neighbor_tables: HashMap::new(),
            last_aging: None,
        }
    }

    pub fn predictability_for(&self, destination: &str) -> f64 {
        self.predictability.get(destination).copied().unwrap_or(0.0)
    }

    fn neighbor_predictability(&self, neighbor: &str, destination: &str) -> f64 {
        self.neighbor_tables
            .get(neighbor)
            .and_then(|table| table.get(destination))
            .copied()
            .unwrap_or(0.0)
    }

    /// Decay one entry for the time elapsed since it was last touched.
    fn age_entry(&mut self, node: &str, now: DateTime<Utc>) {
        let Some(p) = self.predictability.get(node).copied() else {
            return;
        };
        let last = self.last_update.get(node).copied().unwrap_or(now);
        let elapsed_units = (now - last).num_seconds().max(0) as f64 / AGING_UNIT_S as f64;
        if elapsed_units > 0.0 {
            self.predictability
                .insert(node.to_string(), p * GAMMA.powf(elapsed_units));
            self.last_update.insert(node.to_string(), now);
        }
    }

    fn bump_direct(&mut self, peer: &str, now: DateTime<Utc>) {
        self.age_entry(peer, now);
        let old = self.predictability_for(peer);
        let new = (old + (1.0 - old) * P_ENCOUNTER_MAX).min(1.0);
        self.predictability.insert(peer.to_string(), new);
        self.last_update.insert(peer.to_string(), now);
        self.last_encounter.insert(peer.to_string(), now);
        debug!(node = %self.node_id, %peer, old, new, "direct predictability update");
    }
}

impl RoutingStrategy for ProphetRouter {
    fn name(&self) -> &'static str {
        "prophet"
    }

    fn decide(
        &mut self,
        bundle: &Bundle,
        candidates: &[CandidateContact],
        now: DateTime<Utc>,
    ) -> RouteDecision {
        if bundle.is_expired(now) {
            return RouteDecision::Drop(DropReason::TtlExpired);
        }
        if candidates.is_empty() {
            return RouteDecision::Store;
        }

        let destination = bundle.destination();
        let my_p = self.predictability_for(destination);

        // Hand off to the peer with the highest predictability that clears
        // the improvement threshold.
        let mut best: Option<(&CandidateContact, f64)> = None;
        for candidate in candidates.iter().filter(|c| !c.peer_holds_bundle) {
            if candidate.peer == destination {
                continue;
            }
            let peer_p = self.neighbor_predictability(&candidate.peer, destination);
            if peer_p > my_p + FORWARD_THRESHOLD && peer_p > best.map_or(my_p, |(_, p)| p) {
                best = Some((candidate, peer_p));
            }
        }

        if let Some((candidate, peer_p)) = best {
            debug!(
                node = %self.node_id,
                bundle = bundle.id(),
                peer = %candidate.peer,
                peer_p,
                my_p,
                "prophet handoff"
            );
            return RouteDecision::Forward {
                contact_id: candidate.contact_id,
                next_hop: candidate.peer.clone(),
                mode: ForwardMode::Handoff,
                copies: 1,
            };
        }

        // Direct delivery when the destination itself is in contact and our
        // own predictability clears the bar.
        if let Some(direct) = candidates
            .iter()
            .find(|c| c.peer == destination && !c.peer_holds_bundle)
        {
            if my_p > DIRECT_DELIVERY_MIN {
                return RouteDecision::Deliver {
                    contact_id: direct.contact_id,
                };
            }
        }

        RouteDecision::Store
    }

    fn on_bundle_received(
        &mut self,
        _bundle: &Bundle,
        _from: Option<&str>,
        _copies_granted: u32,
        _now: DateTime<Utc>,
    ) {
    }

    fn on_bundle_forwarded(&mut self, _bundle_id: &str, _peer: &str, _copies: u32) {}

    fn on_encounter(&mut self, peer: &str, view: &NeighborView, now: DateTime<Utc>) {
        self.bump_direct(peer, now);
        self.neighbor_tables
            .insert(peer.to_string(), view.predictability.clone());

        // Transitive update, RFC additive form:
        // P(C) += (1 - P(C)) * P(B) * P_B(C) * beta.
        let p_peer = self.predictability_for(peer);
        let transit: Vec<(String, f64)> = view
            .predictability
            .iter()
            .filter(|(dest, _)| dest.as_str() != self.node_id && dest.as_str() != peer)
            .map(|(dest, p)| (dest.clone(), *p))
            .collect();

        for (dest, p_bc) in transit {
            self.age_entry(&dest, now);
            let old = self.predictability_for(&dest);
            let new = (old + (1.0 - old) * p_peer * p_bc * BETA).min(1.0);
            if new > old {
                self.predictability.insert(dest.clone(), new);
                self.last_update.insert(dest, now);
            }
        }
    }

    fn neighbor_view(&self, _now: DateTime<Utc>) -> NeighborView {
        NeighborView {
            node_id: self.node_id.clone(),
            bundles_seen: HashSet::new(),
            predictability: self.predictability.clone(),
        }
    }

    fn maintain(&mut self, now: DateTime<Utc>) {
        let due = match self.last_aging {
            None => true,
            Some(last) => now - last >= Duration::seconds(AGING_UNIT_S),
        };
        if !due {
            return;
        }
        self.last_aging = Some(now);

        let nodes: Vec<String> = self.predictability.keys().cloned().collect();
        for node in nodes {
            self.age_entry(&node, now);
        }

        let before = self.predictability.len();
        self.predictability.retain(|_, p| *p >= MIN_PREDICTABILITY);
        let predictability = &self.predictability;
        self.last_update
            .retain(|node, _| predictability.contains_key(node));
        self.last_encounter
            .retain(|node, _| predictability.contains_key(node));
        let removed = before - self.predictability.len();
        if removed > 0 {
            debug!(node = %self.node_id, removed, "aged out predictability entries");
        }
    }

    fn metrics(&self) -> serde_json::Value {
        let max = self
            .predictability
            .values()
            .fold(0.0f64, |acc, p| acc.max(*p));
        let avg = if self.predictability.is_empty() {
            0.0
        } else {
            self.predictability.values().sum::<f64>() / self.predictability.len() as f64
        };
        json!({
            "algorithm": "prophet",
            "predictability_entries": self.predictability.len(),
            "average_predictability": avg,
            "max_predictability": max,
        })
    }
}
