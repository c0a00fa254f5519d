use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, trace, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tissue_common::SimulationConfig;
use tissue_engine::input::load_payload;
use tissue_engine::output::{ArchiveFormat, CsvCellWriter, OutputStatus, SnapshotArchive, SnapshotSink};
use tissue_engine::Simulation;

/// Command-line arguments for the tissue engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the config.toml file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Number of ticks to run (overrides timing.total_ticks)
    #[arg(long)]
    ticks: Option<u32>,

    /// Stop between ticks once this much wall-clock time has passed
    #[arg(long)]
    max_seconds: Option<f64>,

    /// Hide the progress bar
    #[arg(long)]
    quiet: bool,
}

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();
    let args = Args::parse();

    info!("Starting Tissue Engine...");

    // --- Load Configuration ---
    let config = SimulationConfig::load(&args.config)?;
    let base_dir = args.config.parent().map(PathBuf::from).unwrap_or_default();

    info!("Using {} Rayon threads.", rayon::current_num_threads());

    // --- Build Initial Mesh ---
    let payload = load_payload(&config, &base_dir)?;
    let mut sim = Simulation::new(&config, &payload)?;
    info!(
        "Tissue initialized with {} cells and {} vertices.",
        sim.cell_count(),
        sim.tissue().vertices().len()
    );
    debug!("Simulation Parameters: {:#?}", sim.params());

    // --- Output Sinks ---
    let base = &config.output.base_filename;
    let mut sinks: Vec<Box<dyn SnapshotSink>> = Vec::new();
    if config.output.save_cells_csv {
        let filename = format!("{}_cells.csv", base);
        sinks.push(Box::new(CsvCellWriter::create(&filename)?));
        info!("Writing per-cell rows to {}", filename);
    }
    if config.output.save_snapshots {
        let format = ArchiveFormat::from_name(config.output.format.as_deref());
        sinks.push(Box::new(SnapshotArchive::new(base, format)));
    }
    if sinks.is_empty() {
        warn!("No output enabled; the run will leave no files behind.");
    }

    // --- Simulation Loop ---
    let total_ticks = args.ticks.unwrap_or(sim.params().total_ticks);
    info!(
        "Starting simulation loop for {} ticks ({:.2} h per tick), recording every {} ticks.",
        total_ticks,
        sim.params().dt,
        sim.params().record_interval_ticks
    );

    // --- Initial Snapshot (tick = 0) ---
    let initial = sim.snapshot()?;
    for sink in sinks.iter_mut() {
        sink.write_snapshot(&initial)?;
    }

    let progress_bar = if args.quiet { ProgressBar::hidden() } else { ProgressBar::new(total_ticks as u64) };
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ticks ({percent}%) [{eta}] {msg}")?
            .progress_chars("#>-"),
    );

    let start_time = Instant::now();
    let mut previous_print_time = start_time;
    let mut tick_start_time = start_time;
    let print_interval_secs = 5.0;
    let stop = AtomicBool::new(false);

    let outcome = sim.run_ticks(total_ticks, &stop, |sim, report| {
        let tick = report.tick;
        let tick_duration = tick_start_time.elapsed();
        progress_bar.inc(1);
        progress_bar.set_message(format!("{} cells", sim.cell_count()));

        let now = Instant::now();
        let should_print_status = now.duration_since(previous_print_time).as_secs_f64() >= print_interval_secs;
        let is_record_tick = sim.should_record() || tick + 1 == total_ticks;

        if should_print_status || is_record_tick {
            info!(
                "Tick [{}/{}] ({:.1} h) | Cells: {} | Divisions: {} (+{}) | Tick Time: {:6.2} ms",
                tick + 1,
                total_ticks,
                sim.time(),
                sim.cell_count(),
                sim.division_count(),
                report.divisions.divided.len(),
                tick_duration.as_secs_f64() * 1000.0
            );
            previous_print_time = now;
        } else {
            trace!("Tick [{}/{}] completed in {:.2} ms", tick + 1, total_ticks, tick_duration.as_secs_f64() * 1000.0);
        }

        // --- Record Snapshot ---
        if is_record_tick {
            let snapshot = sim.snapshot()?;
            for sink in sinks.iter_mut() {
                if let Err(e) = sink.write_snapshot(&snapshot) {
                    error!("Error recording snapshot at tick {}: {}", tick + 1, e);
                    anyhow::bail!("Failed to record snapshot.");
                }
            }
        }

        if let Some(budget) = args.max_seconds {
            if start_time.elapsed().as_secs_f64() >= budget && tick + 1 < total_ticks {
                warn!("Wall-clock budget of {:.1} s reached, stopping after {} ticks.", budget, tick + 1);
                stop.store(true, Ordering::Relaxed);
            }
        }
        tick_start_time = Instant::now();
        Ok(())
    });
    if let Err(e) = outcome {
        progress_bar.abandon();
        error!("Error during tick {}: {}", sim.current_tick() + 1, e);
        anyhow::bail!("Simulation tick failed.");
    }
    progress_bar.finish_with_message(format!("{} cells", sim.cell_count()));

    let total_duration = start_time.elapsed();
    info!(
        "Simulation finished in {:.3} seconds: {} cells, {} divisions, root tip at y = {:.2} um.",
        total_duration.as_secs_f64(),
        sim.cell_count(),
        sim.division_count(),
        sim.root_tip_y()
    );

    // --- Save Recorded Data ---
    if config.output.save_lineage {
        let lineage = sim.lineage_records();
        for sink in sinks.iter_mut() {
            if let OutputStatus::NotYetAvailable(what) = sink.write_lineage(&lineage)? {
                debug!("Sink skipped {} output.", what);
            }
        }
    }
    for sink in sinks.iter_mut() {
        sink.finish()?;
    }

    info!("Simulation Complete.");
    Ok(())
}
