//! Eviction policies for a full buffer. Policies are independent of the
//! routing strategy and selectable at buffer construction.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::bundle::{Bundle, BundleId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionPolicy {
    OldestFirst,
    LargestFirst,
    ShortestTtl,
    Random,
    PriorityThenAge,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        EvictionPolicy::OldestFirst
    }
}

impl FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "oldest-first" => Ok(EvictionPolicy::OldestFirst),
            "largest-first" => Ok(EvictionPolicy::LargestFirst),
            "shortest-ttl" => Ok(EvictionPolicy::ShortestTtl),
            "random" => Ok(EvictionPolicy::Random),
            "priority-then-age" => Ok(EvictionPolicy::PriorityThenAge),
            other => Err(format!("unknown eviction policy '{other}'")),
        }
    }
}

impl EvictionPolicy {
    /// Pick the bundle to evict, or `None` when the store is empty. All
    /// orderings break ties on bundle id, so selection is deterministic for
    /// a given seed.
    pub(crate) fn select_victim(
        &self,
        bundles: &BTreeMap<BundleId, Bundle>,
        now: DateTime<Utc>,
        rng: &mut StdRng,
    ) -> Option<BundleId> {
        if bundles.is_empty() {
            return None;
        }

        let chosen = match self {
            EvictionPolicy::OldestFirst => bundles
                .values()
                .min_by_key(|b| (b.created_at(), b.id().to_string())),
            EvictionPolicy::LargestFirst => bundles
                .values()
                .max_by_key(|b| (b.size_bytes(), std::cmp::Reverse(b.id().to_string()))),
            EvictionPolicy::ShortestTtl => bundles
                .values()
                .min_by_key(|b| (b.remaining_ttl_seconds(now), b.id().to_string())),
            EvictionPolicy::Random => {
                let index = rng.gen_range(0..bundles.len());
                bundles.values().nth(index)
            }
            EvictionPolicy::PriorityThenAge => bundles
                .values()
                .min_by_key(|b| (b.priority(), b.created_at(), b.id().to_string())),
        };

        chosen.map(|b| b.id().to_string())
    }
}
