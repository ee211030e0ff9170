//! Experiment drivers

use log::info;

use crate::backends::strategy_for;
use crate::config::{Backend, SimulationConfig};
use crate::error::Result;
use crate::result::ResultRecord;

/// Runs one configuration on the backend it names
pub fn run_single(config: &SimulationConfig) -> Result<ResultRecord> {
    let mut strategy = strategy_for(config)?;
    strategy.run()
}

/// Parallelism knob varied by a scaling experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingParam {
    NumThreads,
    NumProcesses,
    BlockSize,
}

impl ScalingParam {
    /// The knob that matters for `backend`, if any
    pub fn for_backend(backend: Backend) -> Option<Self> {
        match backend {
            Backend::Sequential => None,
            Backend::Vectorized => Some(ScalingParam::NumThreads),
            Backend::Distributed => Some(ScalingParam::NumProcesses),
            Backend::Accelerator => Some(ScalingParam::BlockSize),
        }
    }

    fn apply(self, config: &mut SimulationConfig, value: usize) {
        match self {
            ScalingParam::NumThreads => config.num_threads = value,
            ScalingParam::NumProcesses => config.num_processes = value,
            ScalingParam::BlockSize => config.accelerator_block_size = value,
        }
    }
}

/// Runs `backend` once per value of `param`, everything else from `base`
pub fn run_scaling_experiment(
    base: &SimulationConfig,
    backend: Backend,
    param: ScalingParam,
    values: &[usize],
) -> Result<Vec<ResultRecord>> {
    values
        .iter()
        .map(|&value| {
            let mut config = base.clone();
            config.backend = backend;
            param.apply(&mut config, value);
            info!("Scaling run: {backend} with {param:?} = {value}");
            run_single(&config)
        })
        .collect()
}
