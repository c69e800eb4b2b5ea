//! DTN Constellation Batch Runner
//!
//! Runs one store-carry-forward simulation to completion and reports the
//! end-to-end metrics.
//!
//! Usage:
//!   dtn-sim --constellation starlink --source gs_los_angeles \
//!           --destination gs_tokyo --algorithm epidemic --band ka-band \
//!           --duration-hours 12 --output metrics.json

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use bundle_store::EvictionPolicy;
use contact_prediction::{predict_windows, LinkBudget, RfBand};
use dtn_routing::RoutingAlgorithm;
use ground_stations::{import_stations_csv, StationRegistry};
use orbital_mechanics::{import_constellation_csv, WalkerConstellation};
use sim_engine::{ConstellationSource, SimulationConfig, SimulationEngine};

#[derive(Parser, Debug)]
#[command(
    name = "dtn-sim",
    about = "Batch DTN simulation over a satellite constellation"
)]
struct Args {
    /// Built-in constellation name (starlink, kuiper, gps) or a CSV path
    #[arg(short = 'c', long, default_value = "starlink")]
    constellation: String,

    /// Optional ground-station CSV; the built-in city catalog otherwise
    #[arg(long)]
    stations: Option<PathBuf>,

    /// Source ground-station id
    #[arg(short, long, default_value = "gs_los_angeles")]
    source: String,

    /// Destination ground-station id
    #[arg(short, long, default_value = "gs_tokyo")]
    destination: String,

    /// Routing algorithm: epidemic, prophet, spray_and_wait
    #[arg(short, long, default_value = "epidemic")]
    algorithm: RoutingAlgorithm,

    /// RF band preset: l-band, s-band, c-band, ku-band, ka-band, v-band
    #[arg(short, long, default_value = "ka-band")]
    band: String,

    #[arg(long, default_value_t = 12.0)]
    duration_hours: f64,

    /// Bundle generation rate, bundles per virtual second
    #[arg(long, default_value_t = 0.2)]
    rate: f64,

    #[arg(long, default_value_t = 1024)]
    payload_bytes: usize,

    #[arg(long, default_value_t = 3600)]
    ttl_seconds: i64,

    #[arg(long, default_value_t = 20)]
    buffer_mb: u64,

    /// Eviction policy: oldest-first, largest-first, shortest-ttl, random,
    /// priority-then-age
    #[arg(long, default_value = "oldest-first")]
    eviction: EvictionPolicy,

    /// Initial Spray-and-Wait copy count
    #[arg(long, default_value_t = 6)]
    spray_copies: u32,

    #[arg(long, default_value_t = 5000.0)]
    isl_range_km: f64,

    /// Virtual tick length, seconds
    #[arg(long, default_value_t = 300.0)]
    tick_seconds: f64,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Print predicted source/destination passes over the first N hours
    /// before running (0 disables)
    #[arg(long, default_value_t = 0.0)]
    predict_hours: f64,

    /// Write the metrics block as JSON
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("{}", "=".repeat(60));
    info!("DTN Constellation Simulator");
    info!("{}", "=".repeat(60));

    let epoch = Utc::now();

    // ---- Constellation ----
    let constellation = if args.constellation.ends_with(".csv") {
        let file = File::open(&args.constellation)
            .with_context(|| format!("opening constellation CSV {}", args.constellation))?;
        let satellites = import_constellation_csv(file, epoch)?;
        info!("Imported {} satellites from {}", satellites.len(), args.constellation);
        ConstellationSource::Elements(satellites)
    } else {
        info!("Using built-in constellation '{}'", args.constellation);
        ConstellationSource::Builtin(args.constellation.clone())
    };

    // ---- Ground stations ----
    let stations = match &args.stations {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("opening station CSV {}", path.display()))?;
            let stations = import_stations_csv(file)?;
            info!("Imported {} ground stations from {}", stations.len(), path.display());
            stations
        }
        None => StationRegistry::with_major_cities()
            .iter()
            .cloned()
            .collect(),
    };

    // ---- Configuration ----
    let mut config = SimulationConfig::new(
        format!("{}-{}", args.constellation, args.algorithm.name()),
        constellation,
        stations,
        &args.source,
        &args.destination,
        epoch,
    );
    config.routing = args.algorithm;
    config.rf_band = RfBand::from_name(&args.band)?;
    config.duration_hours = args.duration_hours;
    config.bundle_rate_per_second = args.rate;
    config.bundle_payload_bytes = args.payload_bytes;
    config.bundle_ttl_seconds = args.ttl_seconds;
    config.buffer_bytes = args.buffer_mb * 1024 * 1024;
    config.eviction_policy = args.eviction;
    config.spray_copies = args.spray_copies;
    config.isl_range_km = args.isl_range_km;
    config.tick_seconds = args.tick_seconds;
    config.seed = args.seed;

    info!(
        "Route {} -> {} over {} via {} ({})",
        args.source,
        args.destination,
        args.constellation,
        args.algorithm.name(),
        args.band,
    );

    // ---- Optional pass prediction ----
    if args.predict_hours > 0.0 {
        let satellites = match &config.constellation {
            ConstellationSource::Elements(sats) => sats.clone(),
            ConstellationSource::Builtin(name) => WalkerConstellation::builtin(name)
                .with_context(|| format!("unknown built-in constellation '{name}'"))?
                .generate(epoch)?,
        };
        let endpoints: Vec<_> = config
            .stations
            .iter()
            .filter(|s| s.id == config.source_station || s.id == config.destination_station)
            .cloned()
            .collect();
        let windows = predict_windows(
            &satellites,
            &endpoints,
            &LinkBudget::preset(config.rf_band),
            epoch,
            chrono::Duration::seconds((args.predict_hours * 3600.0) as i64),
            chrono::Duration::seconds(60),
        )?;
        info!("Predicted {} endpoint passes in the next {:.1} h", windows.len(), args.predict_hours);
        for window in windows.iter().take(10) {
            info!(
                "  {} over {}: {} .. {} (max el {:.1} deg, peak {:.0} Mbps)",
                window.satellite_id,
                window.station_id,
                window.aos.format("%H:%M:%S"),
                window.los.format("%H:%M:%S"),
                window.max_elevation_deg,
                window.peak_rate_mbps,
            );
        }
    }

    // ---- Run ----
    let mut engine = SimulationEngine::new(config)?;
    let started = std::time::Instant::now();
    let metrics = engine.run_to_completion()?;
    let elapsed = started.elapsed();

    if !engine.state().is_terminal() {
        bail!("simulation ended in non-terminal state {:?}", engine.state());
    }

    // ---- Report ----
    info!("Completed in {:.2}s wall time", elapsed.as_secs_f64());
    info!("  generated            {}", metrics.bundles_generated);
    info!("  delivered            {}", metrics.bundles_delivered);
    info!("  expired              {}", metrics.bundles_expired);
    info!("  buffer-full drops    {}", metrics.bundles_dropped_buffer_full);
    info!("  delivery ratio       {:.4}", metrics.delivery_ratio);
    info!("  mean delay           {:.1} s", metrics.average_delivery_delay_s);
    info!("  replication overhead {:.2}", metrics.replication_overhead);
    info!("  mean SNR             {:.1} dB", metrics.mean_snr_db);
    info!("  mean data rate       {:.1} Mbps", metrics.mean_data_rate_mbps);
    info!("  link availability    {:.4}", metrics.link_availability);
    info!("  cross-layer score    {:.4}", metrics.cross_layer_score);
    info!("  contact windows      {}", metrics.contacts_completed);

    if args.verbose {
        for status in engine.satellite_statuses().iter().filter(|s| s.buffered_bundles > 0) {
            info!(
                "  {}: {} bundles buffered ({:.1}% full), {} active contacts",
                status.id,
                status.buffered_bundles,
                status.buffer_utilization * 100.0,
                status.active_contacts,
            );
        }
    }

    if let Some(path) = &args.output {
        let file = File::create(path)
            .with_context(|| format!("creating output file {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &metrics)?;
        info!("Metrics written to {}", path.display());
    }

    Ok(())
}
