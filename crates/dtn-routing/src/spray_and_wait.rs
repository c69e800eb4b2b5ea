//! Binary Spray-and-Wait: a bounded number of copies is halved across
//! encounters (spray), after which holders wait for direct delivery.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use tracing::debug;

use bundle_store::{Bundle, BundleId};

use crate::score::contact_quality_score;
use crate::{CandidateContact, DropReason, ForwardMode, NeighborView, RouteDecision, RoutingStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SprayPhase {
    Spray,
    Wait,
}

pub struct SprayAndWaitRouter {
    node_id: String,
    initial_copies: u32,
    copies: HashMap<BundleId, u32>,
    phase: HashMap<BundleId, SprayPhase>,
    rng: StdRng,
}

impl SprayAndWaitRouter {
    pub fn new(node_id: &str, initial_copies: u32, seed: u64) -> Self {
        Self {
            node_id: node_id.to_string(),
            initial_copies: initial_copies.max(1),
            copies: HashMap::new(),
            phase: HashMap::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn copies_for(&self, bundle_id: &str) -> u32 {
        self.copies.get(bundle_id).copied().unwrap_or(0)
    }

    pub fn in_spray_phase(&self, bundle_id: &str) -> bool {
        matches!(self.phase.get(bundle_id), Some(SprayPhase::Spray))
    }

    fn ensure_state(&mut self, bundle_id: &str) -> (u32, SprayPhase) {
        let copies = *self
            .copies
            .entry(bundle_id.to_string())
            .or_insert(self.initial_copies);
        let phase = *self.phase.entry(bundle_id.to_string()).or_insert({
            if copies > 1 {
                SprayPhase::Spray
            } else {
                SprayPhase::Wait
            }
        });
        (copies, phase)
    }
}

impl RoutingStrategy for SprayAndWaitRouter {
    fn name(&self) -> &'static str {
        "spray_and_wait"
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

        let (copies, phase) = self.ensure_state(bundle.id());

        // Direct delivery applies in both phases.
        if let Some(direct) = candidates
            .iter()
            .find(|c| c.peer == bundle.destination() && !c.peer_holds_bundle)
        {
            return RouteDecision::Deliver {
                contact_id: direct.contact_id,
            };
        }

        if phase == SprayPhase::Wait || copies <= 1 {
            return RouteDecision::Store;
        }

        let mut best: Option<(&CandidateContact, f64)> = None;
        for candidate in candidates.iter().filter(|c| !c.peer_holds_bundle) {
            let score = contact_quality_score(bundle, candidate, now, &mut self.rng);
            if score > best.map_or(0.0, |(_, s)| s) {
                best = Some((candidate, score));
            }
        }

        match best {
            Some((candidate, score)) => {
                let granted = copies / 2;
                debug!(
                    node = %self.node_id,
                    bundle = bundle.id(),
                    peer = %candidate.peer,
                    granted,
                    retained = copies - granted,
                    score,
                    "binary spray"
                );
                RouteDecision::Forward {
                    contact_id: candidate.contact_id,
                    next_hop: candidate.peer.clone(),
                    mode: ForwardMode::Replicate,
                    copies: granted,
                }
            }
            None => RouteDecision::Store,
        }
    }

    fn on_bundle_received(
        &mut self,
        bundle: &Bundle,
        from: Option<&str>,
        copies_granted: u32,
        _now: DateTime<Utc>,
    ) {
        let id = bundle.id().to_string();
        match from {
            // Origin holder: full allocation, spray phase.
            None => {
                self.copies.insert(id.clone(), self.initial_copies);
                self.phase.insert(
                    id,
                    if self.initial_copies > 1 {
                        SprayPhase::Spray
                    } else {
                        SprayPhase::Wait
                    },
                );
            }
            // Sprayed replica: the granted half keeps spraying if above one.
            Some(_) => {
                let granted = copies_granted.max(1);
                self.copies.insert(id.clone(), granted);
                self.phase.insert(
                    id,
                    if granted > 1 {
                        SprayPhase::Spray
                    } else {
                        SprayPhase::Wait
                    },
                );
            }
        }
    }

    fn on_bundle_forwarded(&mut self, bundle_id: &str, _peer: &str, copies: u32) {
        let remaining = self
            .copies
            .get(bundle_id)
            .copied()
            .unwrap_or(self.initial_copies)
            .saturating_sub(copies)
            .max(1);
        self.copies.insert(bundle_id.to_string(), remaining);
        if remaining <= 1 {
            self.phase.insert(bundle_id.to_string(), SprayPhase::Wait);
        }
    }

    fn on_encounter(&mut self, _peer: &str, _view: &NeighborView, _now: DateTime<Utc>) {}

    fn neighbor_view(&self, _now: DateTime<Utc>) -> NeighborView {
        NeighborView {
            node_id: self.node_id.clone(),
            bundles_seen: self.copies.keys().cloned().collect(),
            predictability: HashMap::new(),
        }
    }

    fn maintain(&mut self, _now: DateTime<Utc>) {}

    fn prune(&mut self, held: &HashSet<BundleId>) {
        self.copies.retain(|id, _| held.contains(id));
        self.phase.retain(|id, _| held.contains(id));
    }

    fn metrics(&self) -> serde_json::Value {
        let spray = self
            .phase
            .values()
            .filter(|p| **p == SprayPhase::Spray)
            .count();
        let wait = self.phase.len() - spray;
        let total_copies: u32 = self.copies.values().sum();
        json!({
            "algorithm": "spray_and_wait",
            "spray_copies_l": self.initial_copies,
            "bundles_in_spray_phase": spray,
            "bundles_in_wait_phase": wait,
            "total_copies_held": total_copies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bundle_store::Priority;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
    }

    fn bundle() -> Bundle {
        Bundle::new("gs_la", "gs_tokyo", vec![0; 16], 7200, Priority::Normal, t0(), 1).unwrap()
    }

    fn candidate(peer: &str, holds: bool) -> CandidateContact {
        CandidateContact {
            contact_id: 2,
            peer: peer.to_string(),
            peer_is_ground_station: peer.starts_with("gs_"),
            peer_holds_bundle: holds,
            data_rate_mbps: 120.0,
            opened_at: t0() - Duration::seconds(120),
        }
    }

    #[test]
    fn test_binary_halving_preserves_total() {
        let mut router = SprayAndWaitRouter::new("sat_001", 4, 1);
        let b = bundle();
        router.on_bundle_received(&b, None, 0, t0());

        let decision = router.decide(&b, &[candidate("sat_002", false)], t0());
        let RouteDecision::Forward { copies, mode, .. } = decision else {
            panic!("expected forward, got {decision:?}");
        };
        assert_eq!(mode, ForwardMode::Replicate);
        assert_eq!(copies, 2);

        router.on_bundle_forwarded(b.id(), "sat_002", copies);
        assert_eq!(router.copies_for(b.id()), 2);

        // Receiver side: granted half continues spraying.
        let mut receiver = SprayAndWaitRouter::new("sat_002", 4, 2);
        receiver.on_bundle_received(&b, Some("sat_001"), copies, t0());
        assert_eq!(receiver.copies_for(b.id()), 2);
        assert!(receiver.in_spray_phase(b.id()));

        // Totals across holders never exceed L.
        assert_eq!(router.copies_for(b.id()) + receiver.copies_for(b.id()), 4);
    }

    #[test]
    fn test_wait_phase_after_copies_exhausted() {
        let mut router = SprayAndWaitRouter::new("sat_001", 2, 1);
        let b = bundle();
        router.on_bundle_received(&b, None, 0, t0());

        let decision = router.decide(&b, &[candidate("sat_002", false)], t0());
        let RouteDecision::Forward { copies, .. } = decision else {
            panic!("expected forward");
        };
        assert_eq!(copies, 1);
        router.on_bundle_forwarded(b.id(), "sat_002", copies);

        assert!(!router.in_spray_phase(b.id()));
        // In wait phase, a non-destination peer gets nothing.
        let decision = router.decide(&b, &[candidate("sat_003", false)], t0());
        assert_eq!(decision, RouteDecision::Store);
    }

    #[test]
    fn test_wait_phase_still_delivers_direct() {
        let mut router = SprayAndWaitRouter::new("sat_001", 1, 1);
        let b = bundle();
        router.on_bundle_received(&b, Some("sat_009"), 1, t0());
        assert!(!router.in_spray_phase(b.id()));

        let decision = router.decide(&b, &[candidate("gs_tokyo", false)], t0());
        assert!(matches!(decision, RouteDecision::Deliver { .. }));
    }

    #[test]
    fn test_no_spray_to_existing_holder() {
        let mut router = SprayAndWaitRouter::new("sat_001", 6, 1);
        let b = bundle();
        router.on_bundle_received(&b, None, 0, t0());
        let decision = router.decide(&b, &[candidate("sat_002", true)], t0());
        assert_eq!(decision, RouteDecision::Store);
    }

    #[test]
    fn test_expired_dropped() {
        let mut router = SprayAndWaitRouter::new("sat_001", 6, 1);
        let b = bundle();
        let decision = router.decide(&b, &[candidate("sat_002", false)], t0() + Duration::seconds(7201));
        assert_eq!(decision, RouteDecision::Drop(DropReason::TtlExpired));
    }

    #[test]
    fn test_prune_drops_stale_state() {
        let mut router = SprayAndWaitRouter::new("sat_001", 6, 1);
        let b = bundle();
        router.on_bundle_received(&b, None, 0, t0());
        router.prune(&HashSet::new());
        assert_eq!(router.copies_for(b.id()), 0);
    }
}
