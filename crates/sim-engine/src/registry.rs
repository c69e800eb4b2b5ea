//! Simulation registry: the library-level control API.
//!
//! Owns every engine, runs paced real-time loops as tokio tasks, and serves
//! tick-boundary snapshots. An explicit dependency for the host control
//! surface; no process-wide singletons.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::SimulationConfig;
use crate::engine::{SatelliteStatus, SimulationEngine, SimulationSnapshot, SimulationState};
use crate::metrics::SimulationMetrics;
use crate::{Result, SimError};

struct SimulationHandle {
    engine: Arc<Mutex<SimulationEngine>>,
    runner: Option<JoinHandle<()>>,
}

#[derive(Default)]
pub struct SimulationRegistry {
    simulations: RwLock<HashMap<Uuid, SimulationHandle>>,
}

impl SimulationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the config, build the engine, and register it.
    pub async fn create(&self, config: SimulationConfig) -> Result<Uuid> {
        let engine = SimulationEngine::new(config)?;
        let id = engine.id();
        self.simulations.write().await.insert(
            id,
            SimulationHandle {
                engine: Arc::new(Mutex::new(engine)),
                runner: None,
            },
        );
        info!(sim = %id, "simulation registered");
        Ok(id)
    }

    async fn engine(&self, id: Uuid) -> Result<Arc<Mutex<SimulationEngine>>> {
        self.simulations
            .read()
            .await
            .get(&id)
            .map(|handle| handle.engine.clone())
            .ok_or(SimError::NotFound(id))
    }

    /// Start (or resume) the paced real-time loop for a simulation. The loop
    /// sleeps `tick_seconds / time_acceleration` of wall time between ticks
    /// and re-anchors its deadline when coming back from pause.
    pub async fn start(&self, id: Uuid) -> Result<()> {
        let engine = self.engine(id).await?;
        engine.lock().await.start()?;

        let mut simulations = self.simulations.write().await;
        let handle = simulations.get_mut(&id).ok_or(SimError::NotFound(id))?;
        let already_running = handle
            .runner
            .as_ref()
            .map_or(false, |task| !task.is_finished());
        if !already_running {
            handle.runner = Some(tokio::spawn(run_paced(id, handle.engine.clone())));
        }
        Ok(())
    }

    pub async fn pause(&self, id: Uuid) -> Result<()> {
        self.engine(id).await?.lock().await.pause()
    }

    pub async fn resume(&self, id: Uuid) -> Result<()> {
        self.engine(id).await?.lock().await.resume()
    }

    /// Stop after the in-flight tick completes; final metrics are retained
    /// and remain queryable through `snapshot`.
    pub async fn stop(&self, id: Uuid) -> Result<()> {
        self.engine(id).await?.lock().await.stop()
    }

    pub async fn snapshot(&self, id: Uuid) -> Result<SimulationSnapshot> {
        Ok(self.engine(id).await?.lock().await.snapshot())
    }

    pub async fn metrics(&self, id: Uuid) -> Result<SimulationMetrics> {
        Ok(self.engine(id).await?.lock().await.current_metrics())
    }

    pub async fn satellite_statuses(&self, id: Uuid) -> Result<Vec<SatelliteStatus>> {
        Ok(self.engine(id).await?.lock().await.satellite_statuses())
    }

    /// Ids of all registered simulations.
    pub async fn list(&self) -> Vec<Uuid> {
        self.simulations.read().await.keys().copied().collect()
    }

    /// Remove a finished simulation. Refuses while the run is still live.
    pub async fn remove(&self, id: Uuid) -> Result<()> {
        let mut simulations = self.simulations.write().await;
        let handle = simulations.get(&id).ok_or(SimError::NotFound(id))?;
        let state = handle.engine.lock().await.state();
        if !state.is_terminal() {
            return Err(SimError::IllegalState {
                action: "remove",
                state,
            });
        }
        simulations.remove(&id);
        Ok(())
    }
}

/// Paced loop: one tick per `wall_pace`, idle while paused, exits on any
/// terminal state. Locks the engine only inside a tick, so snapshots always
/// observe tick boundaries.
async fn run_paced(id: Uuid, engine: Arc<Mutex<SimulationEngine>>) {
    let pace = engine.lock().await.config().wall_pace();
    let mut deadline = tokio::time::Instant::now() + pace;
    let mut was_paused = false;

    loop {
        tokio::time::sleep_until(deadline).await;

        let state = {
            let mut engine = engine.lock().await;
            match engine.state() {
                SimulationState::Running => {
                    if let Err(err) = engine.tick() {
                        error!(sim = %id, %err, "tick failed");
                    }
                    engine.state()
                }
                state => state,
            }
        };

        match state {
            SimulationState::Running => {
                if was_paused {
                    // Coming back from pause: re-anchor instead of bursting
                    // through the backlog.
                    deadline = tokio::time::Instant::now() + pace;
                    was_paused = false;
                } else {
                    deadline += pace;
                }
            }
            SimulationState::Paused => {
                was_paused = true;
                deadline = tokio::time::Instant::now() + pace.max(std::time::Duration::from_millis(20));
            }
            _ => break,
        }
    }
    info!(sim = %id, "paced loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConstellationSource;
    use chrono::{TimeZone, Utc};
    use ground_stations::StationRegistry;

    fn config() -> SimulationConfig {
        let registry = StationRegistry::with_major_cities();
        let stations = vec![
            registry.get("gs_los_angeles").unwrap().clone(),
            registry.get("gs_tokyo").unwrap().clone(),
        ];
        let mut config = SimulationConfig::new(
            "registry-test",
            ConstellationSource::Builtin("gps".to_string()),
            stations,
            "gs_los_angeles",
            "gs_tokyo",
            Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap(),
        );
        config.duration_hours = 0.25;
        config.bundle_rate_per_second = 0.0;
        // Fast pacing so the test completes in a few wall milliseconds.
        config.tick_seconds = 300.0;
        config.time_acceleration = 30_000_000.0;
        config
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let registry = SimulationRegistry::new();
        let missing = Uuid::new_v4();
        assert!(matches!(
            registry.snapshot(missing).await,
            Err(SimError::NotFound(_))
        ));
        assert!(matches!(
            registry.start(missing).await,
            Err(SimError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_and_snapshot() {
        let registry = SimulationRegistry::new();
        let id = registry.create(config()).await.unwrap();

        let snapshot = registry.snapshot(id).await.unwrap();
        assert_eq!(snapshot.state, SimulationState::Created);
        assert_eq!(snapshot.satellite_count, 24);
        assert!(registry.list().await.contains(&id));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let registry = SimulationRegistry::new();
        let mut bad = config();
        bad.duration_hours = -1.0;
        assert!(matches!(
            registry.create(bad).await,
            Err(SimError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_paced_run_reaches_completion() {
        let registry = SimulationRegistry::new();
        let id = registry.create(config()).await.unwrap();
        registry.start(id).await.unwrap();

        let mut state = SimulationState::Running;
        for _ in 0..200 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            state = registry.snapshot(id).await.unwrap().state;
            if state.is_terminal() {
                break;
            }
        }
        assert_eq!(state, SimulationState::Completed);

        // Terminal-state control calls are idempotent no-ops.
        registry.stop(id).await.unwrap();
        registry.pause(id).await.unwrap();
        assert!(matches!(
            registry.start(id).await,
            Err(SimError::IllegalState { .. })
        ));

        registry.remove(id).await.unwrap();
        assert!(matches!(
            registry.snapshot(id).await,
            Err(SimError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_pause_halts_virtual_time() {
        let registry = SimulationRegistry::new();
        let mut cfg = config();
        cfg.duration_hours = 10_000.0; // effectively unbounded for this test
        let id = registry.create(cfg).await.unwrap();

        registry.start(id).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        registry.pause(id).await.unwrap();

        let frozen = registry.snapshot(id).await.unwrap();
        assert_eq!(frozen.state, SimulationState::Paused);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let later = registry.snapshot(id).await.unwrap();
        assert_eq!(frozen.sim_time, later.sim_time);

        registry.resume(id).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let resumed = registry.snapshot(id).await.unwrap();
        assert!(resumed.sim_time > later.sim_time);

        registry.stop(id).await.unwrap();
        let stopped = registry.snapshot(id).await.unwrap();
        assert_eq!(stopped.state, SimulationState::Stopped);
    }
}
