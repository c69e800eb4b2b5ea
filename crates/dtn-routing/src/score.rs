//! Contact quality scoring shared by Epidemic and Spray-and-Wait.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::Rng;

use bundle_store::Bundle;

use crate::CandidateContact;

/// Score a candidate contact for one bundle. Higher is better; the jitter
/// term breaks ties deterministically under a fixed seed.
pub(crate) fn contact_quality_score(
    bundle: &Bundle,
    candidate: &CandidateContact,
    now: DateTime<Utc>,
    rng: &mut StdRng,
) -> f64 {
    let mut score = candidate.data_rate_mbps / 100.0;

    if candidate.peer == bundle.destination() {
        score += 10.0;
    }
    if candidate.peer_is_ground_station {
        score += 2.0;
    }

    let age_hours = bundle.age(now).num_seconds() as f64 / 3600.0;
    if age_hours > 1.0 {
        score *= 1.0 / (1.0 + age_hours);
    }

    let open_seconds = (now - candidate.opened_at).num_seconds();
    if open_seconds < 60 {
        score *= 0.5;
    }

    score += rng.gen_range(0.0..0.1);
    score.max(0.0)
}
