use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;

use intersection_sim::runner::{run_scaling_experiment, run_single, ScalingParam};
use intersection_sim::{get_backend, ConsistencyMode, ResultRecord, SimulationConfig};

#[derive(Parser)]
#[command(name = "intersection_sim")]
#[command(about = "Four-approach intersection simulation with interchangeable execution backends")]
struct Cli {
    /// Execution backend: sequential, vectorized, distributed or accelerator
    #[arg(long, default_value = "sequential")]
    backend: String,

    /// Total simulated time in seconds
    #[arg(long, default_value = "300")]
    total_time: f64,

    /// Time step in seconds
    #[arg(long, default_value = "0.1")]
    dt: f64,

    /// Vehicles per second per direction
    #[arg(long, default_value = "0.5")]
    spawn_rate: f64,

    #[arg(long, default_value = "2000")]
    max_vehicles: usize,

    #[arg(long, default_value = "42")]
    seed: u64,

    /// Worker threads for the vectorized backend
    #[arg(long, default_value = "1")]
    num_threads: usize,

    /// Worker group size for the distributed backend
    #[arg(long, default_value = "1")]
    num_processes: usize,

    /// Vehicle slots per block for the accelerator backend
    #[arg(long, default_value = "256")]
    block_size: usize,

    /// Leader consistency on the accelerator backend
    #[arg(long, value_enum, default_value = "stale-leader")]
    consistency: ConsistencyMode,

    #[arg(long, default_value = "30")]
    green_ns: f64,

    #[arg(long, default_value = "30")]
    green_ew: f64,

    #[arg(long, default_value = "2")]
    all_red: f64,

    #[arg(long, default_value = "100")]
    lane_length: f64,

    /// Distance from the stop line to the intersection centre
    #[arg(long, default_value = "5")]
    stop_line_from_center: f64,

    #[arg(long, default_value = "10")]
    intersection_width: f64,

    #[arg(long, default_value = "13.9")]
    max_speed: f64,

    #[arg(long, default_value = "5")]
    safe_gap: f64,

    /// Directory for JSON results
    #[arg(long, default_value = "results")]
    output_dir: PathBuf,

    /// Scenario description, also used in the result file name
    #[arg(long)]
    label: Option<String>,

    /// Skip writing results to disk
    #[arg(long)]
    no_save: bool,

    /// Comma-separated values for the backend's parallelism knob
    /// (threads, processes or block size); runs once per value
    #[arg(long, value_delimiter = ',')]
    sweep: Option<Vec<usize>>,
}

impl Cli {
    fn into_config(self) -> Result<(SimulationConfig, bool, Option<Vec<usize>>)> {
        let backend = get_backend(&self.backend)?;
        let config = SimulationConfig {
            total_time: self.total_time,
            dt: self.dt,
            spawn_rate: self.spawn_rate,
            max_vehicles: self.max_vehicles,
            random_seed: self.seed,
            backend,
            num_threads: self.num_threads,
            num_processes: self.num_processes,
            accelerator_block_size: self.block_size,
            consistency: self.consistency,
            output_dir: self.output_dir,
            label: self.label,
            green_ns: self.green_ns,
            green_ew: self.green_ew,
            all_red: self.all_red,
            lane_length: self.lane_length,
            stop_line_from_center: self.stop_line_from_center,
            intersection_width: self.intersection_width,
            max_speed: self.max_speed,
            safe_gap: self.safe_gap,
        };
        config.validate()?;
        Ok((config, !self.no_save, self.sweep))
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (config, save, sweep) = Cli::parse().into_config()?;

    let results = match sweep {
        Some(values) => {
            let param = ScalingParam::for_backend(config.backend).with_context(|| {
                format!("the {} backend has no parallelism knob to sweep", config.backend)
            })?;
            run_scaling_experiment(&config, config.backend, param, &values)
                .context("Scaling experiment failed")?
        }
        None => vec![run_single(&config).context("Simulation failed")?],
    };

    for result in &results {
        report(result);
        if save {
            let path = intersection_sim::io::save_result_as_json(result, &config.output_dir)
                .context("Failed to save results")?;
            info!("Results saved to {}", path.display());
        }
    }

    Ok(())
}

fn report(result: &ResultRecord) {
    info!("=== SIMULATION COMPLETE ===");
    info!("Backend: {}", result.backend);
    info!("Wall time: {:.4} s", result.wall_time_seconds);
    info!("Simulated time: {:.1} s", result.total_simulated_time);
    info!("Vehicles completed: {}", result.vehicles_completed);
    info!("Avg travel time: {:.2} s", result.avg_travel_time);
    info!("Avg stops/vehicle: {:.2}", result.avg_stops_per_vehicle);
    info!("Throughput: {:.2} veh/min", result.throughput_veh_per_min);
}
