//! Execution strategies
//!
//! Every strategy runs the same tick semantics for a fixed number of ticks
//! and returns a [`ResultRecord`]. They differ in how the move phase is
//! computed and in their consistency guarantees:
//!
//! | strategy    | move phase                              | leader seen     |
//! |-------------|-----------------------------------------|-----------------|
//! | sequential  | object loop                             | just updated    |
//! | vectorized  | per-lane batches, lanes in parallel     | just updated    |
//! | accelerator | kernel grid over (lane, vehicle slot)   | per `ConsistencyMode` |
//! | distributed | object loop per worker, lanes split     | just updated    |
//!
//! All of them rely on lanes never interacting. If crossing streams are
//! ever modelled, the vectorized and distributed decompositions stop being
//! valid.

mod accelerator;
mod comm;
mod device;
mod distributed;
mod sequential;
mod vectorized;

use log::warn;
use std::time::Instant;

use crate::config::{Backend, SimulationConfig};
use crate::error::Result;
use crate::result::ResultRecord;
use crate::simulation::{SignalController, WorldState};

pub use accelerator::{AcceleratorBackend, KernelMover, TransferStats};
pub use comm::{channel_group, ChannelCommunicator, Communicator, GlobalAggregate};
#[cfg(feature = "software-device")]
pub use device::SoftwareDevice;
pub use device::{available_devices, select_device, Device, DeviceInfo, HostBuffers, LaunchConfig};
pub use distributed::{assigned_directions, run_worker, DistributedBackend};
pub use sequential::SequentialBackend;
pub use vectorized::{LaneBatch, LaneBatches, VectorizedBackend};

/// A way of running the model: config in, result record out
pub trait ExecutionStrategy {
    fn backend(&self) -> Backend;

    fn run(&mut self) -> Result<ResultRecord>;
}

/// Builds the strategy named by `config.backend`
pub fn strategy_for(config: &SimulationConfig) -> Result<Box<dyn ExecutionStrategy>> {
    config.validate()?;

    let strategy: Box<dyn ExecutionStrategy> = match config.backend {
        Backend::Sequential => Box::new(SequentialBackend::new(config.clone())?),
        Backend::Vectorized => Box::new(VectorizedBackend::new(config.clone())?),
        Backend::Distributed => Box::new(DistributedBackend::new(config.clone())?),
        Backend::Accelerator => Box::new(AcceleratorBackend::new(config.clone())?),
    };
    Ok(strategy)
}

/// A fresh world for `config` with its own random stream
pub fn build_world(config: &SimulationConfig, seed: u64) -> WorldState {
    WorldState::new(
        config.road_network(),
        SignalController::new(config.signal_config()),
        config.world_params(),
        seed,
    )
}

/// Runs `f`, returning its output and the elapsed wall time in seconds
pub(crate) fn timed<T>(f: impl FnOnce() -> T) -> (T, f64) {
    let start = Instant::now();
    let out = f();
    (out, start.elapsed().as_secs_f64())
}

pub(crate) fn warn_if_degenerate(backend: Backend, completed: u64) {
    if completed == 0 {
        warn!("{backend} run finished without any vehicle completing its lane");
    }
}
