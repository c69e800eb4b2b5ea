//! Simulation metrics collection.

use serde::{Deserialize, Serialize};

/// Per-bundle and link-layer losses are recorded here and never surfaced as
/// errors; only input validation and engine-fatal conditions cross the
/// control boundary.
#[derive(Debug, Default, Clone)]
pub struct MetricsCollector {
    bundles_generated: u64,
    bundles_delivered: u64,
    bundles_expired: u64,
    bundles_dropped_buffer_full: u64,
    duplicate_deliveries_dropped: u64,
    total_transmissions: u64,
    bytes_transmitted: u64,
    delivery_delay_sum_s: f64,
    snr_sum_db: f64,
    rate_sum_mbps: f64,
    link_samples: u64,
    attempted_assessments: u64,
    successful_assessments: u64,
    contacts_completed: u64,
    // Refreshed each tick from the buffers.
    replicas_in_network: u64,
    distinct_in_network: u64,
}

impl MetricsCollector {
    pub fn record_generated(&mut self) {
        self.bundles_generated += 1;
    }

    pub fn record_delivered(&mut self, delay_seconds: f64) {
        self.bundles_delivered += 1;
        self.delivery_delay_sum_s += delay_seconds;
    }

    pub fn record_expired(&mut self, count: u64) {
        self.bundles_expired += count;
    }

    pub fn record_buffer_full(&mut self, count: u64) {
        self.bundles_dropped_buffer_full += count;
    }

    pub fn record_duplicate_delivery(&mut self) {
        self.duplicate_deliveries_dropped += 1;
    }

    pub fn record_transmission(&mut self, bytes: u64) {
        self.total_transmissions += 1;
        self.bytes_transmitted += bytes;
    }

    /// One satellite-ground geometry assessment that cleared the elevation
    /// mask and range limit. `successful` means the link budget also closed.
    pub fn record_link_attempt(&mut self, successful: bool) {
        self.attempted_assessments += 1;
        if successful {
            self.successful_assessments += 1;
        }
    }

    pub fn record_link_sample(&mut self, snr_db: f64, rate_mbps: f64) {
        self.snr_sum_db += snr_db;
        self.rate_sum_mbps += rate_mbps;
        self.link_samples += 1;
    }

    pub fn record_contact_completed(&mut self) {
        self.contacts_completed += 1;
    }

    pub fn set_replica_stats(&mut self, replicas: u64, distinct: u64) {
        self.replicas_in_network = replicas;
        self.distinct_in_network = distinct;
    }

    pub fn bundles_generated(&self) -> u64 {
        self.bundles_generated
    }

    pub fn bundles_delivered(&self) -> u64 {
        self.bundles_delivered
    }

    pub fn bundles_expired(&self) -> u64 {
        self.bundles_expired
    }

    pub fn report(&self, active_contacts: usize) -> SimulationMetrics {
        let delivery_ratio = ratio(self.bundles_delivered as f64, self.bundles_generated as f64);
        let link_availability = ratio(
            self.successful_assessments as f64,
            self.attempted_assessments as f64,
        );

        SimulationMetrics {
            bundles_generated: self.bundles_generated,
            bundles_delivered: self.bundles_delivered,
            bundles_expired: self.bundles_expired,
            bundles_dropped_buffer_full: self.bundles_dropped_buffer_full,
            duplicate_deliveries_dropped: self.duplicate_deliveries_dropped,
            total_transmissions: self.total_transmissions,
            bytes_transmitted: self.bytes_transmitted,
            delivery_ratio,
            average_delivery_delay_s: ratio(
                self.delivery_delay_sum_s,
                self.bundles_delivered as f64,
            ),
            replication_overhead: ratio(
                self.total_transmissions as f64,
                self.bundles_delivered as f64,
            ),
            average_copies_per_bundle: ratio(
                self.replicas_in_network as f64,
                self.distinct_in_network as f64,
            ),
            mean_snr_db: ratio(self.snr_sum_db, self.link_samples as f64),
            mean_data_rate_mbps: ratio(self.rate_sum_mbps, self.link_samples as f64),
            link_availability,
            cross_layer_score: delivery_ratio * link_availability,
            contacts_completed: self.contacts_completed,
            active_contacts: active_contacts as u64,
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// End-to-end and link-layer aggregates for one simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationMetrics {
    pub bundles_generated: u64,
    pub bundles_delivered: u64,
    pub bundles_expired: u64,
    pub bundles_dropped_buffer_full: u64,
    pub duplicate_deliveries_dropped: u64,
    pub total_transmissions: u64,
    pub bytes_transmitted: u64,
    pub delivery_ratio: f64,
    pub average_delivery_delay_s: f64,
    /// `total_transmissions / delivered` (the experiment-engine definition).
    pub replication_overhead: f64,
    pub average_copies_per_bundle: f64,
    pub mean_snr_db: f64,
    pub mean_data_rate_mbps: f64,
    /// Successful / attempted satellite-ground link assessments.
    pub link_availability: f64,
    pub cross_layer_score: f64,
    pub contacts_completed: u64,
    pub active_contacts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report_is_all_zero() {
        let metrics = MetricsCollector::default().report(0);
        assert_eq!(metrics.delivery_ratio, 0.0);
        assert_eq!(metrics.average_delivery_delay_s, 0.0);
        assert_eq!(metrics.replication_overhead, 0.0);
        assert_eq!(metrics.cross_layer_score, 0.0);
    }

    #[test]
    fn test_single_replica_delivery_has_unit_overhead() {
        let mut collector = MetricsCollector::default();
        collector.record_generated();
        collector.record_transmission(1024);
        collector.record_delivered(120.0);

        let metrics = collector.report(0);
        assert_eq!(metrics.delivery_ratio, 1.0);
        assert_eq!(metrics.replication_overhead, 1.0);
        assert_eq!(metrics.average_delivery_delay_s, 120.0);
    }

    #[test]
    fn test_cross_layer_score() {
        let mut collector = MetricsCollector::default();
        collector.record_generated();
        collector.record_generated();
        collector.record_transmission(10);
        collector.record_delivered(5.0);
        collector.record_link_attempt(true);
        collector.record_link_attempt(true);
        collector.record_link_attempt(false);
        collector.record_link_attempt(false);

        let metrics = collector.report(1);
        assert_eq!(metrics.delivery_ratio, 0.5);
        assert_eq!(metrics.link_availability, 0.5);
        assert_eq!(metrics.cross_layer_score, 0.25);
    }
}
