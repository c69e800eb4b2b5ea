//! Epidemic routing: replicate to every encountered peer that lacks the
//! bundle, capped per bundle, with periodic anti-entropy pruning of the
//! summary vector.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use tracing::debug;

use bundle_store::{Bundle, BundleId};

use crate::score::contact_quality_score;
use crate::{CandidateContact, DropReason, ForwardMode, NeighborView, RouteDecision, RoutingStrategy};

/// Global replication cap per bundle.
const MAX_REPLICATIONS_PER_BUNDLE: u32 = 50;

/// How often summary vectors are reconciled and pruned.
const ANTI_ENTROPY_INTERVAL_S: i64 = 5 * 60;

/// Summary entries older than this are pruned at anti-entropy time.
const SUMMARY_MAX_AGE_S: i64 = 24 * 3600;

pub struct EpidemicRouter {
    node_id: String,
    summary_vector: HashMap<BundleId, DateTime<Utc>>,
    replication_counts: HashMap<BundleId, u32>,
    last_anti_entropy: Option<DateTime<Utc>>,
    rng: StdRng,
}

impl EpidemicRouter {
    pub fn new(node_id: &str, seed: u64) -> Self {
        Self {
            node_id: node_id.to_string(),
            summary_vector: HashMap::new(),
            replication_counts: HashMap::new(),
            last_anti_entropy: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn replication_count(&self, bundle_id: &str) -> u32 {
        self.replication_counts.get(bundle_id).copied().unwrap_or(0)
    }

    pub fn summary_len(&self) -> usize {
        self.summary_vector.len()
    }
}

impl RoutingStrategy for EpidemicRouter {
    fn name(&self) -> &'static str {
        "epidemic"
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

        // Direct delivery preempts replication.
        if let Some(direct) = candidates
            .iter()
            .find(|c| c.peer == bundle.destination() && !c.peer_holds_bundle)
        {
            return RouteDecision::Deliver {
                contact_id: direct.contact_id,
            };
        }

        if self.replication_count(bundle.id()) >= MAX_REPLICATIONS_PER_BUNDLE {
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
                debug!(
                    node = %self.node_id,
                    bundle = bundle.id(),
                    peer = %candidate.peer,
                    score,
                    "epidemic replication"
                );
                RouteDecision::Forward {
                    contact_id: candidate.contact_id,
                    next_hop: candidate.peer.clone(),
                    mode: ForwardMode::Replicate,
                    copies: 1,
                }
            }
            None => RouteDecision::Store,
        }
    }

    fn on_bundle_received(
        &mut self,
        bundle: &Bundle,
        _from: Option<&str>,
        _copies_granted: u32,
        _now: DateTime<Utc>,
    ) {
        self.summary_vector
            .insert(bundle.id().to_string(), bundle.created_at());
        self.replication_counts
            .entry(bundle.id().to_string())
            .or_insert(0);
    }

    fn on_bundle_forwarded(&mut self, bundle_id: &str, _peer: &str, _copies: u32) {
        *self
            .replication_counts
            .entry(bundle_id.to_string())
            .or_insert(0) += 1;
    }

    fn on_encounter(&mut self, _peer: &str, view: &NeighborView, now: DateTime<Utc>) {
        // Summary-vector reconciliation: remember everything the peer has seen.
        for bundle_id in &view.bundles_seen {
            self.summary_vector
                .entry(bundle_id.clone())
                .or_insert(now);
        }
    }

    fn neighbor_view(&self, _now: DateTime<Utc>) -> NeighborView {
        NeighborView {
            node_id: self.node_id.clone(),
            bundles_seen: self.summary_vector.keys().cloned().collect(),
            predictability: HashMap::new(),
        }
    }

    fn maintain(&mut self, now: DateTime<Utc>) {
        let due = match self.last_anti_entropy {
            None => true,
            Some(last) => now - last >= Duration::seconds(ANTI_ENTROPY_INTERVAL_S),
        };
        if !due {
            return;
        }
        self.last_anti_entropy = Some(now);

        let cutoff = now - Duration::seconds(SUMMARY_MAX_AGE_S);
        let before = self.summary_vector.len();
        self.summary_vector.retain(|_, seen_at| *seen_at >= cutoff);
        let removed = before - self.summary_vector.len();
        if removed > 0 {
            debug!(node = %self.node_id, removed, "anti-entropy pruned summary entries");
        }
    }

    fn prune(&mut self, held: &HashSet<BundleId>) {
        self.replication_counts.retain(|id, _| held.contains(id));
    }

    fn metrics(&self) -> serde_json::Value {
        let total: u32 = self.replication_counts.values().sum();
        let max = self.replication_counts.values().max().copied().unwrap_or(0);
        json!({
            "algorithm": "epidemic",
            "summary_vector_size": self.summary_vector.len(),
            "total_replications": total,
            "max_replications": max,
        })
    }
}
