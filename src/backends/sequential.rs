//! Sequential reference strategy
//!
//! Single-threaded object loop. The other strategies are measured against it.

use log::{debug, info};

use crate::config::{Backend, SimulationConfig};
use crate::error::Result;
use crate::result::{base_diagnostics, ResultRecord};
use crate::simulation::WorldState;

use super::{build_world, timed, warn_if_degenerate, ExecutionStrategy};

pub struct SequentialBackend {
    config: SimulationConfig,
    world: WorldState,
}

impl SequentialBackend {
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let world = build_world(&config, config.random_seed);
        Ok(Self { config, world })
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }
}

impl ExecutionStrategy for SequentialBackend {
    fn backend(&self) -> Backend {
        Backend::Sequential
    }

    fn run(&mut self) -> Result<ResultRecord> {
        let ticks = self.config.ticks();
        let dt = self.config.dt;
        info!("Running sequential backend: {ticks} ticks of {dt}s");

        let world = &mut self.world;
        let ((), wall_time) = timed(|| {
            for _ in 0..ticks {
                world.step(dt);
            }
        });

        let summary = self.world.summary(self.config.total_time);
        debug!(
            "sequential: {} finished, {} still active after {wall_time:.4}s",
            summary.finished_count,
            self.world.active_count()
        );
        warn_if_degenerate(Backend::Sequential, summary.finished_count);

        let stats = base_diagnostics(self.world.metrics(), self.world.active_count(), ticks);
        Ok(ResultRecord::new(&self.config, wall_time, summary, stats))
    }
}
