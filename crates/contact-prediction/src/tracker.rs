//! Contact-window state machine.
//!
//! Per endpoint pair: `closed -> open` when the rate first becomes positive,
//! `open -> closed` when it drops out. While open, peak elevation and peak
//! rate accumulate; closing emits the completed window. At most one window is
//! open per pair at any tick.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactKind {
    SatelliteGround,
    InterSatellite,
}

/// Instantaneous link quality fed to the tracker each tick while a pair is
/// connectable.
#[derive(Debug, Clone, Copy)]
pub struct ContactSample {
    pub elevation_deg: f64,
    pub data_rate_mbps: f64,
    pub snr_db: f64,
}

impl ContactSample {
    /// ISL links have no meaningful elevation; the window records zenith,
    /// matching the reference tooling.
    pub fn isl(data_rate_mbps: f64, snr_db: f64) -> Self {
        Self {
            elevation_deg: 90.0,
            data_rate_mbps,
            snr_db,
        }
    }
}

/// A currently open contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveContact {
    pub id: u64,
    pub node_a: String,
    pub node_b: String,
    pub kind: ContactKind,
    pub opened_at: DateTime<Utc>,
    pub current_elevation_deg: f64,
    pub current_rate_mbps: f64,
    pub current_snr_db: f64,
    pub peak_elevation_deg: f64,
    pub peak_rate_mbps: f64,
}

/// A completed contact window. `closed_at > opened_at` holds by construction:
/// a window can only close on a later tick than the one that opened it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactWindow {
    pub id: u64,
    pub node_a: String,
    pub node_b: String,
    pub kind: ContactKind,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub peak_elevation_deg: f64,
    pub peak_rate_mbps: f64,
}

#[derive(Debug, Clone)]
pub enum ContactEvent {
    Opened {
        id: u64,
        node_a: String,
        node_b: String,
        kind: ContactKind,
        at: DateTime<Utc>,
    },
    Closed(ContactWindow),
}

/// Diffs per-tick connectivity into open/close events.
#[derive(Debug, Default)]
pub struct ContactTracker {
    active: BTreeMap<(String, String), ActiveContact>,
    next_id: u64,
}

impl ContactTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the state of one endpoint pair for this tick. `Some(sample)`
    /// means the pair is connectable right now, `None` that it is not.
    pub fn observe(
        &mut self,
        now: DateTime<Utc>,
        node_a: &str,
        node_b: &str,
        kind: ContactKind,
        sample: Option<ContactSample>,
    ) -> Option<ContactEvent> {
        let key = (node_a.to_string(), node_b.to_string());

        match sample {
            Some(sample) => {
                if let Some(contact) = self.active.get_mut(&key) {
                    contact.current_elevation_deg = sample.elevation_deg;
                    contact.current_rate_mbps = sample.data_rate_mbps;
                    contact.current_snr_db = sample.snr_db;
                    contact.peak_elevation_deg =
                        contact.peak_elevation_deg.max(sample.elevation_deg);
                    contact.peak_rate_mbps = contact.peak_rate_mbps.max(sample.data_rate_mbps);
                    return None;
                }

                let id = self.next_id;
                self.next_id += 1;
                debug!(contact = id, %node_a, %node_b, "contact opened");
                self.active.insert(
                    key,
                    ActiveContact {
                        id,
                        node_a: node_a.to_string(),
                        node_b: node_b.to_string(),
                        kind,
                        opened_at: now,
                        current_elevation_deg: sample.elevation_deg,
                        current_rate_mbps: sample.data_rate_mbps,
                        current_snr_db: sample.snr_db,
                        peak_elevation_deg: sample.elevation_deg,
                        peak_rate_mbps: sample.data_rate_mbps,
                    },
                );
                Some(ContactEvent::Opened {
                    id,
                    node_a: node_a.to_string(),
                    node_b: node_b.to_string(),
                    kind,
                    at: now,
                })
            }
            None => {
                let contact = self.active.remove(&key)?;
                debug!(contact = contact.id, %node_a, %node_b, "contact closed");
                Some(ContactEvent::Closed(ContactWindow {
                    id: contact.id,
                    node_a: contact.node_a,
                    node_b: contact.node_b,
                    kind: contact.kind,
                    opened_at: contact.opened_at,
                    closed_at: now,
                    peak_elevation_deg: contact.peak_elevation_deg,
                    peak_rate_mbps: contact.peak_rate_mbps,
                }))
            }
        }
    }

    pub fn active(&self) -> impl Iterator<Item = &ActiveContact> {
        self.active.values()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn find(&self, node_a: &str, node_b: &str) -> Option<&ActiveContact> {
        self.active.get(&(node_a.to_string(), node_b.to_string()))
    }

    /// Flush every still-open window, e.g. at simulation end.
    pub fn close_all(&mut self, now: DateTime<Utc>) -> Vec<ContactWindow> {
        let drained: Vec<ActiveContact> = std::mem::take(&mut self.active).into_values().collect();
        drained
            .into_iter()
            .map(|contact| ContactWindow {
                id: contact.id,
                node_a: contact.node_a,
                node_b: contact.node_b,
                kind: contact.kind,
                opened_at: contact.opened_at,
                closed_at: now,
                peak_elevation_deg: contact.peak_elevation_deg,
                peak_rate_mbps: contact.peak_rate_mbps,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
    }

    fn sample(elevation: f64, rate: f64) -> ContactSample {
        ContactSample {
            elevation_deg: elevation,
            data_rate_mbps: rate,
            snr_db: 20.0,
        }
    }

    #[test]
    fn test_single_pass_one_open_one_close() {
        let mut tracker = ContactTracker::new();
        // Elevation rises to a peak then falls, like a single overhead pass.
        let profile = [
            None,
            Some(sample(12.0, 300.0)),
            Some(sample(48.0, 900.0)),
            Some(sample(75.0, 1400.0)),
            Some(sample(40.0, 800.0)),
            Some(sample(11.0, 250.0)),
            None,
            None,
        ];

        let mut opened = 0;
        let mut closed = Vec::new();
        for (tick, state) in profile.iter().enumerate() {
            let now = t0() + Duration::seconds(60 * tick as i64);
            match tracker.observe(now, "sat_001", "gs_tokyo", ContactKind::SatelliteGround, *state)
            {
                Some(ContactEvent::Opened { .. }) => opened += 1,
                Some(ContactEvent::Closed(window)) => closed.push(window),
                None => {}
            }
        }

        assert_eq!(opened, 1);
        assert_eq!(closed.len(), 1);
        let window = &closed[0];
        assert!(window.closed_at > window.opened_at);
        assert_eq!(window.peak_elevation_deg, 75.0);
        assert_eq!(window.peak_rate_mbps, 1400.0);
        assert_eq!(tracker.active_count(), 0);
    }

    #[test]
    fn test_at_most_one_open_window_per_pair() {
        let mut tracker = ContactTracker::new();
        tracker.observe(t0(), "a", "b", ContactKind::InterSatellite, Some(sample(90.0, 100.0)));
        let event = tracker.observe(
            t0() + Duration::seconds(60),
            "a",
            "b",
            ContactKind::InterSatellite,
            Some(sample(90.0, 200.0)),
        );
        assert!(event.is_none());
        assert_eq!(tracker.active_count(), 1);
    }

    #[test]
    fn test_close_all_flushes_open_windows() {
        let mut tracker = ContactTracker::new();
        tracker.observe(t0(), "a", "b", ContactKind::InterSatellite, Some(sample(90.0, 100.0)));
        tracker.observe(t0(), "a", "c", ContactKind::InterSatellite, Some(sample(90.0, 100.0)));

        let windows = tracker.close_all(t0() + Duration::seconds(120));
        assert_eq!(windows.len(), 2);
        assert_eq!(tracker.active_count(), 0);
        for window in windows {
            assert!(window.closed_at > window.opened_at);
        }
    }

    #[test]
    fn test_contact_ids_are_unique() {
        let mut tracker = ContactTracker::new();
        tracker.observe(t0(), "a", "b", ContactKind::InterSatellite, Some(sample(90.0, 1.0)));
        tracker.observe(
            t0() + Duration::seconds(60),
            "a",
            "b",
            ContactKind::InterSatellite,
            None,
        );
        let event = tracker
            .observe(
                t0() + Duration::seconds(120),
                "a",
                "b",
                ContactKind::InterSatellite,
                Some(sample(90.0, 1.0)),
            )
            .unwrap();
        match event {
            ContactEvent::Opened { id, .. } => assert_eq!(id, 1),
            other => panic!("expected open, got {other:?}"),
        }
    }
}
