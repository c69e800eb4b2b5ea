//! Bundle envelope and payload.

use std::io::Cursor;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, StoreError};

pub type BundleId = String;

/// Bundle priority classes, ordered Low < Normal < High < Critical.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low = 1,
    Normal = 2,
    High = 3,
    Critical = 4,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// A store-carry-forward message. The envelope (id, endpoints, payload, TTL,
/// priority, creation time) is immutable; the hop trail is per-replica state.
/// Replicas share the payload bytes through the `Arc`, so replication never
/// copies payload data.
#[derive(Debug, Clone)]
pub struct Bundle {
    id: BundleId,
    source: String,
    destination: String,
    payload: Arc<Vec<u8>>,
    created_at: DateTime<Utc>,
    ttl_seconds: i64,
    priority: Priority,
    pub hop_trail: Vec<String>,
}

impl Bundle {
    /// Create a bundle. The id is a content-stable murmur3 fingerprint of
    /// `source:creation_millis:sequence`, so re-creating the same logical
    /// bundle yields the same id.
    pub fn new(
        source: impl Into<String>,
        destination: impl Into<String>,
        payload: Vec<u8>,
        ttl_seconds: i64,
        priority: Priority,
        created_at: DateTime<Utc>,
        sequence: u64,
    ) -> Result<Self> {
        let source = source.into();
        let destination = destination.into();

        if source.is_empty() || destination.is_empty() {
            return Err(StoreError::InvalidBundle(
                "source and destination endpoints must be set".to_string(),
            ));
        }
        if ttl_seconds <= 0 {
            return Err(StoreError::InvalidBundle(format!(
                "TTL must be positive, got {ttl_seconds}"
            )));
        }
        if payload.is_empty() {
            return Err(StoreError::InvalidBundle("payload is empty".to_string()));
        }

        let id = fingerprint(&source, created_at, sequence)?;

        Ok(Self {
            id,
            source,
            destination,
            payload: Arc::new(payload),
            created_at,
            ttl_seconds,
            priority,
            hop_trail: Vec::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn size_bytes(&self) -> u64 {
        self.payload.len() as u64
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.age(now) > Duration::seconds(self.ttl_seconds)
    }

    pub fn remaining_ttl_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.ttl_seconds - self.age(now).num_seconds()).max(0)
    }

    /// A new replica for another holder: same envelope, shared payload bytes,
    /// hop trail carried forward.
    pub fn replicate(&self) -> Bundle {
        self.clone()
    }

    pub fn record_hop(&mut self, node_id: &str) {
        self.hop_trail.push(node_id.to_string());
    }

    pub fn hop_count(&self) -> usize {
        self.hop_trail.len()
    }
}

fn fingerprint(source: &str, created_at: DateTime<Utc>, sequence: u64) -> Result<BundleId> {
    let key = format!("{source}:{}:{sequence}", created_at.timestamp_millis());
    let hash = murmur3::murmur3_x64_128(&mut Cursor::new(key.as_bytes()), 0)
        .map_err(|e| StoreError::InvalidBundle(format!("fingerprint failed: {e}")))?;
    Ok(format!("{:016x}", (hash >> 64) as u64))
}
