//! Bounded per-node bundle buffer.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::debug;

use crate::bundle::{Bundle, BundleId, Priority};
use crate::eviction::EvictionPolicy;
use crate::{Result, StoreError};

/// A bounded container of bundles, exclusively owned by one node. The sum of
/// stored payload sizes never exceeds the configured capacity.
#[derive(Debug)]
pub struct BundleBuffer {
    capacity_bytes: u64,
    used_bytes: u64,
    bundles: BTreeMap<BundleId, Bundle>,
    policy: EvictionPolicy,
    rng: StdRng,
    evicted_count: u64,
    expired_count: u64,
}

impl BundleBuffer {
    pub fn new(capacity_bytes: u64, policy: EvictionPolicy, seed: u64) -> Self {
        Self {
            capacity_bytes,
            used_bytes: 0,
            bundles: BTreeMap::new(),
            policy,
            rng: StdRng::seed_from_u64(seed),
            evicted_count: 0,
            expired_count: 0,
        }
    }

    /// Insert a bundle. A duplicate id is a success no-op. When the bundle
    /// does not fit, the eviction policy frees space until it does or the
    /// store is empty, which yields `BufferFull`.
    pub fn insert(&mut self, bundle: Bundle, now: DateTime<Utc>) -> Result<()> {
        if self.bundles.contains_key(bundle.id()) {
            return Ok(());
        }

        let size = bundle.size_bytes();
        while self.used_bytes + size > self.capacity_bytes {
            let victim = self
                .policy
                .select_victim(&self.bundles, now, &mut self.rng)
                .ok_or(StoreError::BufferFull {
                    needed_bytes: size,
                    capacity_bytes: self.capacity_bytes,
                })?;
            debug!(bundle = %victim, policy = ?self.policy, "evicting bundle");
            self.remove(&victim);
            self.evicted_count += 1;
        }

        self.used_bytes += size;
        self.bundles.insert(bundle.id().to_string(), bundle);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Option<Bundle> {
        let bundle = self.bundles.remove(id)?;
        self.used_bytes -= bundle.size_bytes();
        Some(bundle)
    }

    pub fn get(&self, id: &str) -> Option<&Bundle> {
        self.bundles.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.bundles.contains_key(id)
    }

    /// Lazy scan of bundles addressed to `destination`.
    pub fn for_destination<'a>(
        &'a self,
        destination: &'a str,
    ) -> impl Iterator<Item = &'a Bundle> + 'a {
        self.bundles
            .values()
            .filter(move |b| b.destination() == destination)
    }

    /// Remove every bundle whose age exceeds its TTL; returns how many.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> usize {
        let expired: Vec<BundleId> = self
            .bundles
            .values()
            .filter(|b| b.is_expired(now))
            .map(|b| b.id().to_string())
            .collect();

        for id in &expired {
            self.remove(id);
        }
        self.expired_count += expired.len() as u64;
        expired.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bundle> {
        self.bundles.values()
    }

    /// Bundle ids in deterministic (sorted) order.
    pub fn ids(&self) -> Vec<BundleId> {
        self.bundles.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }

    pub fn utilization(&self) -> f64 {
        if self.capacity_bytes == 0 {
            return 1.0;
        }
        self.used_bytes as f64 / self.capacity_bytes as f64
    }

    pub fn evicted_count(&self) -> u64 {
        self.evicted_count
    }

    pub fn expired_count(&self) -> u64 {
        self.expired_count
    }

    pub fn stats(&self) -> BufferStats {
        let mut by_priority = [0usize; 4];
        for bundle in self.bundles.values() {
            by_priority[bundle.priority() as usize - 1] += 1;
        }
        BufferStats {
            bundle_count: self.bundles.len(),
            used_bytes: self.used_bytes,
            capacity_bytes: self.capacity_bytes,
            utilization: self.utilization(),
            low: by_priority[Priority::Low as usize - 1],
            normal: by_priority[Priority::Normal as usize - 1],
            high: by_priority[Priority::High as usize - 1],
            critical: by_priority[Priority::Critical as usize - 1],
        }
    }
}

/// Occupancy summary for one buffer.
#[derive(Debug, Clone, Serialize)]
pub struct BufferStats {
    pub bundle_count: usize,
    pub used_bytes: u64,
    pub capacity_bytes: u64,
    pub utilization: f64,
    pub low: usize,
    pub normal: usize,
    pub high: usize,
    pub critical: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::Priority;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
    }

    fn make_bundle(seq: u64, size: usize, ttl: i64, offset_s: i64) -> Bundle {
        Bundle::new(
            "gs_src",
            "gs_dst",
            vec![0u8; size],
            ttl,
            Priority::Normal,
            t0() + Duration::seconds(offset_s),
            seq,
        )
        .unwrap()
    }

    #[test]
    fn test_duplicate_insert_is_noop() {
        let mut buffer = BundleBuffer::new(1024, EvictionPolicy::OldestFirst, 1);
        let bundle = make_bundle(1, 100, 600, 0);
        buffer.insert(bundle.clone(), t0()).unwrap();
        buffer.insert(bundle, t0()).unwrap();
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.used_bytes(), 100);
    }

    #[test]
    fn test_oldest_first_is_fifo_under_pressure() {
        let mut buffer = BundleBuffer::new(300, EvictionPolicy::OldestFirst, 1);
        for seq in 0..5u64 {
            let bundle = make_bundle(seq, 100, 600, seq as i64);
            buffer
                .insert(bundle, t0() + Duration::seconds(seq as i64))
                .unwrap();
        }
        // Capacity holds 3; the two oldest were evicted.
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.evicted_count(), 2);
        let oldest_remaining = buffer.iter().map(|b| b.created_at()).min().unwrap();
        assert_eq!(oldest_remaining, t0() + Duration::seconds(2));
    }

    #[test]
    fn test_bundle_larger_than_capacity() {
        let mut buffer = BundleBuffer::new(256, EvictionPolicy::OldestFirst, 1);
        buffer.insert(make_bundle(1, 100, 600, 0), t0()).unwrap();
        let result = buffer.insert(make_bundle(2, 512, 600, 0), t0());
        assert!(matches!(result, Err(StoreError::BufferFull { .. })));
        // The oversized insert drained the store trying to make room.
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_sweep_expired_exact() {
        let mut buffer = BundleBuffer::new(4096, EvictionPolicy::OldestFirst, 1);
        buffer.insert(make_bundle(1, 10, 10, 0), t0()).unwrap();
        buffer.insert(make_bundle(2, 10, 100, 0), t0()).unwrap();
        buffer.insert(make_bundle(3, 10, 20, 0), t0()).unwrap();

        let removed = buffer.sweep_expired(t0() + Duration::seconds(30));
        assert_eq!(removed, 2);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.iter().next().unwrap().ttl_seconds(), 100);
        assert_eq!(buffer.expired_count(), 2);
    }

    #[test]
    fn test_scan_for_destination() {
        let mut buffer = BundleBuffer::new(4096, EvictionPolicy::OldestFirst, 1);
        buffer.insert(make_bundle(1, 10, 600, 0), t0()).unwrap();
        let other = Bundle::new(
            "gs_src",
            "gs_other",
            vec![0u8; 10],
            600,
            Priority::Normal,
            t0(),
            99,
        )
        .unwrap();
        buffer.insert(other, t0()).unwrap();

        assert_eq!(buffer.for_destination("gs_dst").count(), 1);
        assert_eq!(buffer.for_destination("gs_other").count(), 1);
        assert_eq!(buffer.for_destination("gs_nowhere").count(), 0);
    }

    #[test]
    fn test_stats_by_priority() {
        let mut buffer = BundleBuffer::new(4096, EvictionPolicy::OldestFirst, 1);
        buffer.insert(make_bundle(1, 10, 600, 0), t0()).unwrap();
        let urgent = Bundle::new(
            "gs_src",
            "gs_dst",
            vec![0u8; 10],
            600,
            Priority::Critical,
            t0(),
            42,
        )
        .unwrap();
        buffer.insert(urgent, t0()).unwrap();

        let stats = buffer.stats();
        assert_eq!(stats.bundle_count, 2);
        assert_eq!(stats.normal, 1);
        assert_eq!(stats.critical, 1);
        assert_eq!(stats.used_bytes, 20);
        assert!(stats.utilization < 0.01);
    }

    proptest! {
        #[test]
        fn prop_capacity_invariant_holds(
            sizes in proptest::collection::vec(1usize..400, 1..40),
        ) {
            let mut buffer = BundleBuffer::new(1000, EvictionPolicy::OldestFirst, 7);
            for (seq, size) in sizes.into_iter().enumerate() {
                let bundle = make_bundle(seq as u64, size, 600, seq as i64);
                let _ = buffer.insert(bundle, t0());
                prop_assert!(buffer.used_bytes() <= buffer.capacity_bytes());
            }
        }
    }
}
