//! Validated run configuration
//!
//! The CLI (or any other front end) produces a [`SimulationConfig`]; the core
//! only ever consumes it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Result, SimError};
use crate::simulation::{RoadNetwork, SignalConfig, WorldParams};

/// Execution strategy used to run the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Sequential,
    Vectorized,
    Distributed,
    Accelerator,
}

impl Backend {
    pub const ALL: [Backend; 4] = [
        Backend::Sequential,
        Backend::Vectorized,
        Backend::Distributed,
        Backend::Accelerator,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Backend::Sequential => "sequential",
            Backend::Vectorized => "vectorized",
            Backend::Distributed => "distributed",
            Backend::Accelerator => "accelerator",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        Backend::ALL
            .into_iter()
            .find(|b| b.name() == s)
            .ok_or_else(|| SimError::UnknownBackend {
                name: s.to_string(),
                valid: Backend::ALL.map(Backend::name).join(", "),
            })
    }
}

/// Looks up a backend by name, failing with the list of valid names
pub fn get_backend(name: &str) -> Result<Backend> {
    name.parse()
}

/// Which leader position a follower sees on the accelerator path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ConsistencyMode {
    /// Leader's just-updated position; one execution slot per lane
    Ordered,
    /// Leader's pre-tick position; one execution slot per vehicle
    StaleLeader,
}

impl fmt::Display for ConsistencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsistencyMode::Ordered => f.write_str("ordered"),
            ConsistencyMode::StaleLeader => f.write_str("stale-leader"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Simulated seconds
    pub total_time: f64,
    /// Seconds per tick
    pub dt: f64,
    /// Vehicles per second per direction
    pub spawn_rate: f64,
    pub max_vehicles: usize,
    pub random_seed: u64,

    pub backend: Backend,
    /// Vectorized worker threads
    pub num_threads: usize,
    /// Distributed worker group size
    pub num_processes: usize,
    pub accelerator_block_size: usize,
    pub consistency: ConsistencyMode,

    pub output_dir: PathBuf,
    pub label: Option<String>,

    pub lane_length: f64,
    pub stop_line_from_center: f64,
    pub intersection_width: f64,
    pub green_ns: f64,
    pub green_ew: f64,
    pub all_red: f64,
    pub max_speed: f64,
    pub safe_gap: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            total_time: 300.0,
            dt: 0.1,
            spawn_rate: 0.5,
            max_vehicles: 2000,
            random_seed: 42,
            backend: Backend::Sequential,
            num_threads: 1,
            num_processes: 1,
            accelerator_block_size: 256,
            consistency: ConsistencyMode::StaleLeader,
            output_dir: PathBuf::from("results"),
            label: None,
            lane_length: 100.0,
            stop_line_from_center: 5.0,
            intersection_width: 10.0,
            green_ns: 30.0,
            green_ew: 30.0,
            all_red: 2.0,
            max_speed: 13.9,
            safe_gap: 5.0,
        }
    }
}

impl SimulationConfig {
    /// Number of whole ticks in the run
    pub fn ticks(&self) -> u64 {
        // guard against 300 / 0.1 landing just under 3000
        ((self.total_time / self.dt) * (1.0 + 1e-9)).floor() as u64
    }

    pub fn signal_config(&self) -> SignalConfig {
        SignalConfig {
            green_ns: self.green_ns,
            green_ew: self.green_ew,
            all_red: self.all_red,
        }
    }

    pub fn road_network(&self) -> RoadNetwork {
        RoadNetwork::new(
            self.lane_length,
            self.stop_line_from_center,
            self.intersection_width,
        )
    }

    pub fn world_params(&self) -> WorldParams {
        WorldParams {
            spawn_rate: self.spawn_rate,
            max_vehicles: self.max_vehicles,
            max_speed: self.max_speed,
            safe_gap: self.safe_gap,
        }
    }

    pub fn validate(&self) -> Result<()> {
        fn non_negative(name: &str, value: f64) -> Result<()> {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(SimError::InvalidConfig(format!(
                    "{name} must be a finite non-negative number, got {value}"
                )))
            }
        }

        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(SimError::InvalidConfig(format!(
                "dt must be positive, got {}",
                self.dt
            )));
        }
        non_negative("total_time", self.total_time)?;
        non_negative("spawn_rate", self.spawn_rate)?;
        non_negative("green_ns", self.green_ns)?;
        non_negative("green_ew", self.green_ew)?;
        non_negative("all_red", self.all_red)?;
        non_negative("max_speed", self.max_speed)?;
        non_negative("safe_gap", self.safe_gap)?;
        non_negative("intersection_width", self.intersection_width)?;

        if self.signal_config().cycle_duration() <= 0.0 {
            return Err(SimError::InvalidConfig(
                "signal cycle duration must be positive".into(),
            ));
        }

        if !(self.lane_length.is_finite() && self.lane_length > 0.0) {
            return Err(SimError::InvalidConfig(format!(
                "lane_length must be positive, got {}",
                self.lane_length
            )));
        }
        let stop_line = self.lane_length / 2.0 - self.stop_line_from_center;
        if !(0.0..=self.lane_length).contains(&stop_line) {
            return Err(SimError::InvalidConfig(format!(
                "stop line at {stop_line} lies outside the lane [0, {}]",
                self.lane_length
            )));
        }

        for (name, value) in [
            ("num_threads", self.num_threads),
            ("num_processes", self.num_processes),
            ("accelerator_block_size", self.accelerator_block_size),
        ] {
            if value == 0 {
                return Err(SimError::InvalidConfig(format!("{name} must be at least 1")));
            }
        }

        Ok(())
    }
}
