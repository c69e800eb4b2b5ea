//! The discrete-time simulation engine.
//!
//! Tick order: advance clock, propagate satellites, refresh visibility,
//! ingest at the source, route, deliver, sweep expired, update metrics.
//! Everything inside a tick observes the visibility and buffer snapshot taken
//! at the contact-refresh step, and transfers execute in (priority desc, age
//! desc, id asc) order, so a fixed seed reproduces bit-identical metrics.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use bundle_store::{Bundle, BundleBuffer, BundleId, Priority};
use contact_prediction::{
    assess, isl_contact, ContactEvent, ContactKind, ContactSample, ContactTracker, LinkBudget,
    Visibility,
};
use dtn_routing::{
    create_strategy, CandidateContact, DropReason, ForwardMode, NeighborView, RouteDecision,
    StrategyConfig,
};
use ground_stations::GroundStation;
use orbital_mechanics::{propagate, WalkerConstellation};

use crate::config::{ConstellationSource, SimulationConfig};
use crate::metrics::{MetricsCollector, SimulationMetrics};
use crate::node::SatelliteNode;
use crate::{Result, SimError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationState {
    Created,
    Running,
    Paused,
    Stopped,
    Completed,
    Error,
}

impl SimulationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SimulationState::Stopped | SimulationState::Completed | SimulationState::Error
        )
    }
}

/// Read-only engine status produced at tick boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSnapshot {
    pub id: Uuid,
    pub name: String,
    pub state: SimulationState,
    pub sim_time: DateTime<Utc>,
    pub virtual_elapsed_s: i64,
    pub satellite_count: usize,
    pub station_count: usize,
    pub active_contacts: usize,
    pub source_queue_depth: usize,
    pub bundles_generated: u64,
    pub bundles_delivered: u64,
    pub bundles_expired: u64,
    pub bundles_in_transit: u64,
    pub metrics: SimulationMetrics,
}

/// Per-satellite view for observability surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SatelliteStatus {
    pub id: String,
    pub name: String,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_km: f64,
    pub in_eclipse: bool,
    pub buffered_bundles: usize,
    pub buffer_used_bytes: u64,
    pub buffer_utilization: f64,
    pub active_contacts: usize,
}

/// One active contact as seen from a particular satellite.
#[derive(Debug, Clone)]
struct ContactRef {
    contact_id: u64,
    peer: String,
    peer_is_ground: bool,
    rate_mbps: f64,
    opened_at: DateTime<Utc>,
}

pub struct SimulationEngine {
    id: Uuid,
    config: SimulationConfig,
    state: SimulationState,
    sim_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    tick_duration: Duration,
    tick_index: u64,
    satellites: Vec<SatelliteNode>,
    sat_index: HashMap<String, usize>,
    stations: Vec<GroundStation>,
    source_id: String,
    destination_id: String,
    budget: LinkBudget,
    tracker: ContactTracker,
    contacts_by_sat: HashMap<String, Vec<ContactRef>>,
    capacity_remaining: HashMap<u64, f64>,
    source_queue: VecDeque<Bundle>,
    delivered_ids: HashSet<BundleId>,
    ingest_accumulator: f64,
    bundle_sequence: u64,
    evictions_seen: u64,
    metrics: MetricsCollector,
}

impl SimulationEngine {
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;

        let generated = match &config.constellation {
            ConstellationSource::Builtin(name) => WalkerConstellation::builtin(name)
                .ok_or_else(|| {
                    SimError::InvalidInput(format!("unknown built-in constellation '{name}'"))
                })?
                .generate(config.epoch)?,
            ConstellationSource::Elements(sats) => sats.clone(),
        };
        if generated.is_empty() {
            return Err(SimError::InvalidInput(
                "constellation has no satellites".to_string(),
            ));
        }

        let mut members = generated;
        members.sort_by(|a, b| a.id.cmp(&b.id));
        if members.windows(2).any(|w| w[0].id == w[1].id) {
            return Err(SimError::InvalidInput(
                "duplicate satellite ids in constellation".to_string(),
            ));
        }

        let mut satellites = Vec::with_capacity(members.len());
        let mut sat_index = HashMap::new();
        for (i, member) in members.into_iter().enumerate() {
            let state = propagate(&member.elements, config.epoch)?;
            let buffer = BundleBuffer::new(
                config.buffer_bytes,
                config.eviction_policy,
                config.seed.wrapping_add(0x1000 + i as u64),
            );
            let strategy = create_strategy(&StrategyConfig {
                algorithm: config.routing,
                node_id: member.id.clone(),
                seed: config.seed.wrapping_add(0x2000 + i as u64),
                spray_copies: config.spray_copies,
            });
            sat_index.insert(member.id.clone(), i);
            satellites.push(SatelliteNode {
                id: member.id,
                name: member.name,
                elements: member.elements,
                state,
                buffer,
                strategy,
            });
        }

        let tick_duration = Duration::milliseconds((config.tick_seconds * 1000.0).round() as i64);
        let end_time = config.epoch
            + Duration::milliseconds((config.duration_seconds() * 1000.0).round() as i64);

        info!(
            name = %config.name,
            satellites = satellites.len(),
            stations = config.stations.len(),
            routing = config.routing.name(),
            band = config.rf_band.name(),
            "simulation created"
        );

        Ok(Self {
            id: Uuid::new_v4(),
            state: SimulationState::Created,
            sim_time: config.epoch,
            end_time,
            tick_duration,
            tick_index: 0,
            satellites,
            sat_index,
            stations: config.stations.clone(),
            source_id: config.source_station.clone(),
            destination_id: config.destination_station.clone(),
            budget: LinkBudget::preset(config.rf_band),
            tracker: ContactTracker::new(),
            contacts_by_sat: HashMap::new(),
            capacity_remaining: HashMap::new(),
            source_queue: VecDeque::new(),
            delivered_ids: HashSet::new(),
            ingest_accumulator: 0.0,
            bundle_sequence: 0,
            evictions_seen: 0,
            metrics: MetricsCollector::default(),
            config,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SimulationState {
        self.state
    }

    pub fn sim_time(&self) -> DateTime<Utc> {
        self.sim_time
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn satellites(&self) -> &[SatelliteNode] {
        &self.satellites
    }

    pub fn current_metrics(&self) -> SimulationMetrics {
        self.metrics.report(self.tracker.active_count())
    }

    /// Per-satellite position and buffer view, at the last tick boundary.
    pub fn satellite_statuses(&self) -> Vec<SatelliteStatus> {
        self.satellites
            .iter()
            .map(|node| SatelliteStatus {
                id: node.id.clone(),
                name: node.name.clone(),
                latitude_deg: node.state.geodetic.latitude_deg,
                longitude_deg: node.state.geodetic.longitude_deg,
                altitude_km: node.state.geodetic.altitude_km,
                in_eclipse: node.state.in_eclipse,
                buffered_bundles: node.buffer.len(),
                buffer_used_bytes: node.buffer.used_bytes(),
                buffer_utilization: node.buffer.utilization(),
                active_contacts: self
                    .contacts_by_sat
                    .get(&node.id)
                    .map_or(0, |refs| refs.len()),
            })
            .collect()
    }

    /// Per-node strategy counters, keyed by satellite id.
    pub fn strategy_metrics(&self) -> Vec<(String, serde_json::Value)> {
        self.satellites
            .iter()
            .map(|node| (node.id.clone(), node.strategy.metrics()))
            .collect()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// `created|paused -> running`; no-op when already running. Starting a
    /// finished simulation is an error.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            SimulationState::Created | SimulationState::Paused => {
                self.state = SimulationState::Running;
                info!(sim = %self.id, "simulation running");
                Ok(())
            }
            SimulationState::Running => Ok(()),
            state => Err(SimError::IllegalState {
                action: "start",
                state,
            }),
        }
    }

    /// `running -> paused`; idempotent on paused and terminal states.
    pub fn pause(&mut self) -> Result<()> {
        match self.state {
            SimulationState::Running | SimulationState::Paused => {
                self.state = SimulationState::Paused;
                Ok(())
            }
            SimulationState::Created => Err(SimError::IllegalState {
                action: "pause",
                state: self.state,
            }),
            _ => Ok(()),
        }
    }

    /// `paused -> running`; idempotent on running and terminal states.
    pub fn resume(&mut self) -> Result<()> {
        match self.state {
            SimulationState::Paused | SimulationState::Running => {
                self.state = SimulationState::Running;
                Ok(())
            }
            SimulationState::Created => Err(SimError::IllegalState {
                action: "resume",
                state: self.state,
            }),
            _ => Ok(()),
        }
    }

    /// Stop after the current tick; idempotent on terminal states.
    pub fn stop(&mut self) -> Result<()> {
        if !self.state.is_terminal() {
            self.finish(SimulationState::Stopped);
        }
        Ok(())
    }

    /// Synthesize one application bundle at the source station, using the
    /// configured payload defaults. Used for one-shot traffic on top of (or
    /// instead of) the configured generation rate.
    pub fn enqueue_bundle(
        &mut self,
        payload_bytes: usize,
        ttl_seconds: i64,
        priority: Priority,
    ) -> Result<BundleId> {
        self.bundle_sequence += 1;
        let mut bundle = Bundle::new(
            self.source_id.clone(),
            self.destination_id.clone(),
            vec![0u8; payload_bytes],
            ttl_seconds,
            priority,
            self.sim_time,
            self.bundle_sequence,
        )?;
        bundle.record_hop(&self.source_id);
        let id = bundle.id().to_string();
        self.source_queue.push_back(bundle);
        self.metrics.record_generated();
        Ok(id)
    }

    /// Run the batch loop: tick until completion with no pacing.
    pub fn run_to_completion(&mut self) -> Result<SimulationMetrics> {
        self.start()?;
        while self.state == SimulationState::Running {
            self.tick()?;
        }
        Ok(self.current_metrics())
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    pub fn tick(&mut self) -> Result<()> {
        if self.state != SimulationState::Running {
            return Err(SimError::IllegalState {
                action: "tick",
                state: self.state,
            });
        }

        // 1. Advance the virtual clock.
        self.sim_time += self.tick_duration;
        self.tick_index += 1;
        let now = self.sim_time;

        // 2. Reposition every satellite.
        for i in 0..self.satellites.len() {
            match propagate(&self.satellites[i].elements, now) {
                Ok(state) => self.satellites[i].state = state,
                Err(err) => {
                    warn!(sim = %self.id, sat = %self.satellites[i].id, %err, "propagation failed");
                    self.finish(SimulationState::Error);
                    return Err(err.into());
                }
            }
        }

        // 3. Refresh visibility, emit open/close events, snapshot contacts.
        self.refresh_contacts(now);

        // 4. Source ingestion.
        self.generate_bundles(now)?;
        self.inject_at_source(now);

        // 5. Routing pass.
        self.routing_pass(now);

        // 6. Delivery pass.
        self.delivery_pass(now);

        // 7. Sweep expired bundles, run strategy upkeep.
        self.sweep_and_maintain(now);

        // 8. Metrics and completion.
        self.update_replica_stats();
        if now >= self.end_time {
            self.finish(SimulationState::Completed);
        }
        Ok(())
    }

    fn refresh_contacts(&mut self, now: DateTime<Utc>) {
        let mut events = Vec::new();

        // Satellite <-> ground visibility.
        for i in 0..self.satellites.len() {
            for s in 0..self.stations.len() {
                let verdict = assess(
                    &self.stations[s],
                    &self.satellites[i].state.position_ecef_km,
                    &self.budget,
                );
                let sample = match verdict {
                    Visibility::Obscured => None,
                    Visibility::LinkFail { .. } => {
                        self.metrics.record_link_attempt(false);
                        None
                    }
                    Visibility::Visible(v) => {
                        self.metrics.record_link_attempt(true);
                        self.metrics.record_link_sample(v.snr_db, v.data_rate_mbps);
                        Some(ContactSample {
                            elevation_deg: v.elevation_deg,
                            data_rate_mbps: v.data_rate_mbps,
                            snr_db: v.snr_db,
                        })
                    }
                };
                let sat_id = self.satellites[i].id.clone();
                let station_id = self.stations[s].id.clone();
                if let Some(event) = self.tracker.observe(
                    now,
                    &sat_id,
                    &station_id,
                    ContactKind::SatelliteGround,
                    sample,
                ) {
                    events.push(event);
                }
            }
        }

        // Inter-satellite links, ordered pairs.
        for i in 0..self.satellites.len() {
            for j in (i + 1)..self.satellites.len() {
                let sample = isl_contact(
                    &self.satellites[i].state.position_eci_km,
                    &self.satellites[j].state.position_eci_km,
                    self.config.isl_range_km,
                )
                .map(|(_, rate)| ContactSample::isl(rate, 0.0));
                let a = self.satellites[i].id.clone();
                let b = self.satellites[j].id.clone();
                if let Some(event) =
                    self.tracker
                        .observe(now, &a, &b, ContactKind::InterSatellite, sample)
                {
                    events.push(event);
                }
            }
        }

        for event in events {
            match event {
                ContactEvent::Opened {
                    node_a,
                    node_b,
                    kind,
                    ..
                } => self.handle_encounter(&node_a, &node_b, kind, now),
                ContactEvent::Closed(window) => {
                    self.metrics.record_contact_completed();
                    debug!(
                        sim = %self.id,
                        contact = window.id,
                        a = %window.node_a,
                        b = %window.node_b,
                        peak_rate = window.peak_rate_mbps,
                        "contact window completed"
                    );
                }
            }
        }

        // Per-satellite contact view and per-tick transfer capacity.
        self.contacts_by_sat.clear();
        self.capacity_remaining.clear();
        for contact in self.tracker.active() {
            self.capacity_remaining.insert(
                contact.id,
                contact.current_rate_mbps * 1e6 / 8.0 * self.config.tick_seconds,
            );
            match contact.kind {
                ContactKind::SatelliteGround => {
                    self.contacts_by_sat
                        .entry(contact.node_a.clone())
                        .or_default()
                        .push(ContactRef {
                            contact_id: contact.id,
                            peer: contact.node_b.clone(),
                            peer_is_ground: true,
                            rate_mbps: contact.current_rate_mbps,
                            opened_at: contact.opened_at,
                        });
                }
                ContactKind::InterSatellite => {
                    for (from, to) in [
                        (&contact.node_a, &contact.node_b),
                        (&contact.node_b, &contact.node_a),
                    ] {
                        self.contacts_by_sat
                            .entry(from.clone())
                            .or_default()
                            .push(ContactRef {
                                contact_id: contact.id,
                                peer: to.clone(),
                                peer_is_ground: false,
                                rate_mbps: contact.current_rate_mbps,
                                opened_at: contact.opened_at,
                            });
                    }
                }
            }
        }
        for refs in self.contacts_by_sat.values_mut() {
            refs.sort_by(|a, b| a.peer.cmp(&b.peer).then(a.contact_id.cmp(&b.contact_id)));
        }
    }

    /// A contact just opened: exchange neighbor views. Ground stations carry
    /// no routing state, so a satellite-ground encounter only updates the
    /// satellite side.
    fn handle_encounter(&mut self, node_a: &str, node_b: &str, kind: ContactKind, now: DateTime<Utc>) {
        match kind {
            ContactKind::SatelliteGround => {
                if let Some(&i) = self.sat_index.get(node_a) {
                    let view = NeighborView {
                        node_id: node_b.to_string(),
                        ..NeighborView::default()
                    };
                    self.satellites[i].strategy.on_encounter(node_b, &view, now);
                }
            }
            ContactKind::InterSatellite => {
                let (Some(&i), Some(&j)) = (self.sat_index.get(node_a), self.sat_index.get(node_b))
                else {
                    return;
                };
                let view_a = self.satellites[i].strategy.neighbor_view(now);
                let view_b = self.satellites[j].strategy.neighbor_view(now);
                self.satellites[i].strategy.on_encounter(node_b, &view_b, now);
                self.satellites[j].strategy.on_encounter(node_a, &view_a, now);
            }
        }
    }

    fn generate_bundles(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ingest_accumulator += self.config.bundle_rate_per_second * self.config.tick_seconds;
        while self.ingest_accumulator >= 1.0 {
            self.ingest_accumulator -= 1.0;
            self.bundle_sequence += 1;
            let mut bundle = Bundle::new(
                self.source_id.clone(),
                self.destination_id.clone(),
                vec![0u8; self.config.bundle_payload_bytes],
                self.config.bundle_ttl_seconds,
                self.config.bundle_priority,
                now,
                self.bundle_sequence,
            )?;
            bundle.record_hop(&self.source_id);
            self.source_queue.push_back(bundle);
            self.metrics.record_generated();
        }
        Ok(())
    }

    /// Hand queued bundles to satellites currently in contact with the source
    /// station, best link first. A bundle that finds no link (or no buffer
    /// space) waits at the source.
    fn inject_at_source(&mut self, now: DateTime<Utc>) {
        if self.source_queue.is_empty() {
            return;
        }

        let mut links: Vec<(usize, u64, f64)> = Vec::new();
        for (sat_id, refs) in &self.contacts_by_sat {
            for r in refs {
                if r.peer == self.source_id {
                    if let Some(&idx) = self.sat_index.get(sat_id) {
                        links.push((idx, r.contact_id, r.rate_mbps));
                    }
                }
            }
        }
        if links.is_empty() {
            return;
        }
        links.sort_by(|a, b| {
            b.2.partial_cmp(&a.2)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        let mut queue = std::mem::take(&mut self.source_queue);
        let mut waiting = VecDeque::new();
        while let Some(bundle) = queue.pop_front() {
            let size = bundle.size_bytes() as f64;
            let target = links.iter().find(|(_, contact_id, _)| {
                self.capacity_remaining
                    .get(contact_id)
                    .is_some_and(|c| *c >= size)
            });
            let Some(&(sat_idx, contact_id, _)) = target else {
                waiting.push_back(bundle);
                continue;
            };

            let mut replica = bundle.replicate();
            replica.record_hop(&self.satellites[sat_idx].id);
            match self.satellites[sat_idx].buffer.insert(replica.clone(), now) {
                Ok(()) => {
                    self.satellites[sat_idx]
                        .strategy
                        .on_bundle_received(&replica, None, 0, now);
                    if let Some(cap) = self.capacity_remaining.get_mut(&contact_id) {
                        *cap -= size;
                    }
                    debug!(
                        sim = %self.id,
                        bundle = replica.id(),
                        sat = %self.satellites[sat_idx].id,
                        "bundle injected at source"
                    );
                }
                Err(_) => {
                    self.metrics.record_buffer_full(1);
                    waiting.push_back(bundle);
                }
            }
        }
        self.source_queue = waiting;
    }

    fn routing_pass(&mut self, now: DateTime<Utc>) {
        for i in 0..self.satellites.len() {
            let sat_id = self.satellites[i].id.clone();
            let Some(contact_refs) = self.contacts_by_sat.get(&sat_id).cloned() else {
                continue;
            };
            if contact_refs.is_empty() {
                continue;
            }

            let order = self.transfer_order(self.satellites[i].buffer.iter());
            for bundle_id in order {
                let Some(snapshot) = self.satellites[i]
                    .buffer
                    .get(&bundle_id)
                    .map(|b| b.replicate())
                else {
                    continue;
                };
                let size = snapshot.size_bytes() as f64;

                let candidates: Vec<CandidateContact> = contact_refs
                    .iter()
                    .filter_map(|r| {
                        // Ground peers other than the destination are not
                        // forwarding targets.
                        if r.peer_is_ground && r.peer != self.destination_id {
                            return None;
                        }
                        let has_capacity = self
                            .capacity_remaining
                            .get(&r.contact_id)
                            .is_some_and(|c| *c >= size);
                        if !has_capacity {
                            return None;
                        }
                        let peer_holds = if r.peer_is_ground {
                            self.delivered_ids.contains(&bundle_id)
                        } else {
                            self.sat_index
                                .get(&r.peer)
                                .map_or(true, |&p| self.satellites[p].buffer.contains(&bundle_id))
                        };
                        Some(CandidateContact {
                            contact_id: r.contact_id,
                            peer: r.peer.clone(),
                            peer_is_ground_station: r.peer_is_ground,
                            peer_holds_bundle: peer_holds,
                            data_rate_mbps: r.rate_mbps,
                            opened_at: r.opened_at,
                        })
                    })
                    .collect();
                if candidates.is_empty() {
                    continue;
                }

                let decision = self.satellites[i].strategy.decide(&snapshot, &candidates, now);
                self.execute_decision(i, &bundle_id, decision, now);
            }
        }
    }

    /// Transfer ordering: priority desc, age desc (oldest first), id asc.
    fn transfer_order<'a>(&self, bundles: impl Iterator<Item = &'a Bundle>) -> Vec<BundleId> {
        let mut order: Vec<(Priority, DateTime<Utc>, BundleId)> = bundles
            .map(|b| (b.priority(), b.created_at(), b.id().to_string()))
            .collect();
        order.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));
        order.into_iter().map(|(_, _, id)| id).collect()
    }

    fn execute_decision(
        &mut self,
        sender: usize,
        bundle_id: &str,
        decision: RouteDecision,
        now: DateTime<Utc>,
    ) {
        match decision {
            RouteDecision::Store => {}
            RouteDecision::Drop(reason) => {
                if self.satellites[sender].buffer.remove(bundle_id).is_some() {
                    match reason {
                        DropReason::TtlExpired => self.metrics.record_expired(1),
                        DropReason::BufferFull => self.metrics.record_buffer_full(1),
                        DropReason::Duplicate => self.metrics.record_duplicate_delivery(),
                    }
                }
            }
            RouteDecision::Deliver { contact_id } => {
                self.deliver(sender, bundle_id, contact_id, now);
            }
            RouteDecision::Forward {
                contact_id,
                next_hop,
                mode,
                copies,
            } => {
                if next_hop == self.destination_id {
                    self.deliver(sender, bundle_id, contact_id, now);
                    return;
                }
                let Some(&peer) = self.sat_index.get(&next_hop) else {
                    return;
                };
                if peer == sender {
                    return;
                }
                let Some(bundle) = self.satellites[sender].buffer.get(bundle_id) else {
                    return;
                };
                let size = bundle.size_bytes();
                let has_capacity = self
                    .capacity_remaining
                    .get(&contact_id)
                    .is_some_and(|c| *c >= size as f64);
                if !has_capacity {
                    return;
                }

                let sender_id = self.satellites[sender].id.clone();
                let mut replica = bundle.replicate();
                replica.record_hop(&next_hop);

                match self.satellites[peer].buffer.insert(replica.clone(), now) {
                    Ok(()) => {
                        self.satellites[peer].strategy.on_bundle_received(
                            &replica,
                            Some(&sender_id),
                            copies,
                            now,
                        );
                        if mode == ForwardMode::Handoff {
                            self.satellites[sender].buffer.remove(bundle_id);
                        }
                        self.satellites[sender]
                            .strategy
                            .on_bundle_forwarded(bundle_id, &next_hop, copies);
                        if let Some(cap) = self.capacity_remaining.get_mut(&contact_id) {
                            *cap -= size as f64;
                        }
                        self.metrics.record_transmission(size);
                        debug!(
                            sim = %self.id,
                            bundle = bundle_id,
                            from = %sender_id,
                            to = %next_hop,
                            ?mode,
                            copies,
                            "bundle forwarded"
                        );
                    }
                    Err(_) => {
                        // Receiver out of space: overhead at the sender, the
                        // local replica stays put.
                        self.metrics.record_buffer_full(1);
                    }
                }
            }
        }
    }

    fn deliver(&mut self, sender: usize, bundle_id: &str, contact_id: u64, now: DateTime<Utc>) {
        let Some((size, expired)) = self.satellites[sender]
            .buffer
            .get(bundle_id)
            .map(|b| (b.size_bytes(), b.is_expired(now)))
        else {
            return;
        };
        if expired {
            self.satellites[sender].buffer.remove(bundle_id);
            self.metrics.record_expired(1);
            return;
        }
        let has_capacity = self
            .capacity_remaining
            .get(&contact_id)
            .is_some_and(|c| *c >= size as f64);
        if !has_capacity {
            return;
        }

        if self.delivered_ids.contains(bundle_id) {
            // Later replica reaching the destination; destination-side
            // duplicate suppression drops it.
            self.satellites[sender].buffer.remove(bundle_id);
            self.metrics.record_duplicate_delivery();
            return;
        }

        let Some(bundle) = self.satellites[sender].buffer.remove(bundle_id) else {
            return;
        };
        let delay_s = (now - bundle.created_at()).num_milliseconds() as f64 / 1000.0;
        self.delivered_ids.insert(bundle_id.to_string());
        if let Some(cap) = self.capacity_remaining.get_mut(&contact_id) {
            *cap -= size as f64;
        }
        self.metrics.record_transmission(size);
        self.metrics.record_delivered(delay_s);
        info!(
            sim = %self.id,
            bundle = bundle_id,
            sat = %self.satellites[sender].id,
            delay_s,
            hops = bundle.hop_count(),
            "bundle delivered"
        );
    }

    /// Move destination-addressed bundles off any satellite in contact with
    /// the destination station, regardless of what the strategy decided.
    fn delivery_pass(&mut self, now: DateTime<Utc>) {
        for i in 0..self.satellites.len() {
            let sat_id = self.satellites[i].id.clone();
            let Some(contact) = self
                .contacts_by_sat
                .get(&sat_id)
                .and_then(|refs| refs.iter().find(|r| r.peer == self.destination_id))
                .cloned()
            else {
                continue;
            };

            let order =
                self.transfer_order(self.satellites[i].buffer.for_destination(&self.destination_id));
            for bundle_id in order {
                self.deliver(i, &bundle_id, contact.contact_id, now);
            }
        }
    }

    fn sweep_and_maintain(&mut self, now: DateTime<Utc>) {
        let before = self.source_queue.len();
        self.source_queue.retain(|b| !b.is_expired(now));
        let queue_expired = before - self.source_queue.len();
        if queue_expired > 0 {
            self.metrics.record_expired(queue_expired as u64);
        }

        let mut evictions_total = 0;
        for node in &mut self.satellites {
            let removed = node.buffer.sweep_expired(now);
            if removed > 0 {
                self.metrics.record_expired(removed as u64);
            }
            node.strategy.maintain(now);
            let held: HashSet<BundleId> = node.buffer.ids().into_iter().collect();
            node.strategy.prune(&held);
            evictions_total += node.buffer.evicted_count();
        }

        // Evictions are buffer-full losses recorded at the owning node.
        if evictions_total > self.evictions_seen {
            self.metrics
                .record_buffer_full(evictions_total - self.evictions_seen);
            self.evictions_seen = evictions_total;
        }
    }

    fn update_replica_stats(&mut self) {
        let mut replicas = 0u64;
        let mut distinct: HashSet<String> = HashSet::new();
        for node in &self.satellites {
            replicas += node.buffer.len() as u64;
            for bundle in node.buffer.iter() {
                distinct.insert(bundle.id().to_string());
            }
        }
        self.metrics.set_replica_stats(replicas, distinct.len() as u64);
    }

    fn finish(&mut self, state: SimulationState) {
        for _window in self.tracker.close_all(self.sim_time) {
            self.metrics.record_contact_completed();
        }
        self.state = state;
        info!(
            sim = %self.id,
            ?state,
            sim_time = %self.sim_time,
            ticks = self.tick_index,
            "simulation finished"
        );
    }

    pub fn snapshot(&self) -> SimulationSnapshot {
        let mut in_transit: HashSet<&str> = HashSet::new();
        for node in &self.satellites {
            for bundle in node.buffer.iter() {
                in_transit.insert(bundle.id());
            }
        }

        SimulationSnapshot {
            id: self.id,
            name: self.config.name.clone(),
            state: self.state,
            sim_time: self.sim_time,
            virtual_elapsed_s: (self.sim_time - self.config.epoch).num_seconds(),
            satellite_count: self.satellites.len(),
            station_count: self.stations.len(),
            active_contacts: self.tracker.active_count(),
            source_queue_depth: self.source_queue.len(),
            bundles_generated: self.metrics.bundles_generated(),
            bundles_delivered: self.metrics.bundles_delivered(),
            bundles_expired: self.metrics.bundles_expired(),
            bundles_in_transit: in_transit.len() as u64,
            metrics: self.current_metrics(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ground_stations::StationRegistry;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
    }

    fn small_config() -> SimulationConfig {
        let registry = StationRegistry::with_major_cities();
        let stations = vec![
            registry.get("gs_los_angeles").unwrap().clone(),
            registry.get("gs_tokyo").unwrap().clone(),
        ];
        let mut config = SimulationConfig::new(
            "engine-test",
            ConstellationSource::Builtin("gps".to_string()),
            stations,
            "gs_los_angeles",
            "gs_tokyo",
            epoch(),
        );
        config.duration_hours = 0.5;
        config.bundle_rate_per_second = 0.0;
        config
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut engine = SimulationEngine::new(small_config()).unwrap();
        assert_eq!(engine.state(), SimulationState::Created);

        assert!(matches!(
            engine.pause(),
            Err(SimError::IllegalState { action: "pause", .. })
        ));

        engine.start().unwrap();
        assert_eq!(engine.state(), SimulationState::Running);
        engine.start().unwrap(); // idempotent

        engine.pause().unwrap();
        assert_eq!(engine.state(), SimulationState::Paused);
        engine.pause().unwrap(); // idempotent

        engine.resume().unwrap();
        assert_eq!(engine.state(), SimulationState::Running);

        engine.stop().unwrap();
        assert_eq!(engine.state(), SimulationState::Stopped);
        engine.stop().unwrap(); // idempotent

        assert!(matches!(
            engine.start(),
            Err(SimError::IllegalState { action: "start", .. })
        ));
    }

    #[test]
    fn test_tick_requires_running() {
        let mut engine = SimulationEngine::new(small_config()).unwrap();
        assert!(engine.tick().is_err());
    }

    #[test]
    fn test_clock_advances_and_completes() {
        let mut engine = SimulationEngine::new(small_config()).unwrap();
        engine.start().unwrap();
        engine.tick().unwrap();
        assert_eq!(engine.sim_time(), epoch() + Duration::seconds(300));

        let metrics = {
            let mut engine = SimulationEngine::new(small_config()).unwrap();
            engine.run_to_completion().unwrap()
        };
        assert_eq!(metrics.bundles_generated, 0);
    }

    #[test]
    fn test_generation_rate_accumulates() {
        let mut config = small_config();
        config.bundle_rate_per_second = 0.01; // 3 bundles per 300 s tick
        let mut engine = SimulationEngine::new(config).unwrap();
        engine.start().unwrap();
        engine.tick().unwrap();
        assert_eq!(engine.snapshot().bundles_generated, 3);
    }

    #[test]
    fn test_satellite_statuses() {
        let mut engine = SimulationEngine::new(small_config()).unwrap();
        engine.start().unwrap();
        engine.tick().unwrap();

        let statuses = engine.satellite_statuses();
        assert_eq!(statuses.len(), 24);
        for status in &statuses {
            assert!(status.latitude_deg.abs() <= 90.0);
            // GPS shell sits near 20200 km.
            assert!((status.altitude_km - 20_200.0).abs() < 150.0);
            assert_eq!(status.buffered_bundles, 0);
        }
    }

    #[test]
    fn test_snapshot_shape() {
        let mut engine = SimulationEngine::new(small_config()).unwrap();
        engine.enqueue_bundle(1024, 600, Priority::High).unwrap();
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.state, SimulationState::Created);
        assert_eq!(snapshot.bundles_generated, 1);
        assert_eq!(snapshot.source_queue_depth, 1);
        assert_eq!(snapshot.satellite_count, 24);
    }
}
