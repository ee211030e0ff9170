//! Data-parallel strategy
//!
//! The move phase is re-expressed over structure-of-arrays lane batches.
//! Lanes run in parallel on a dedicated rayon pool; inside a lane the
//! leader-before-follower chain stays sequential, so results match the
//! sequential strategy exactly.

use log::{debug, info};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::config::{Backend, SimulationConfig};
use crate::error::{Result, SimError};
use crate::result::{base_diagnostics, ResultRecord};
use crate::simulation::{
    advance, lane_order, Direction, LaneRule, MoveContext, MovePhase, Vehicle, WorldState,
};

use super::{build_world, timed, warn_if_degenerate, ExecutionStrategy};

/// One lane's vehicles as parallel arrays, front first
#[derive(Debug, Clone)]
pub struct LaneBatch {
    pub direction: Direction,
    /// Index of each entry in the world's vehicle slice
    pub slots: Vec<usize>,
    pub position: Vec<f64>,
    pub speed: Vec<f64>,
    pub max_speed: Vec<f64>,
    pub stops: Vec<u32>,
}

impl LaneBatch {
    pub fn gather(direction: Direction, slots: Vec<usize>, vehicles: &[Vehicle]) -> Self {
        let column = |f: fn(&Vehicle) -> f64| -> Vec<f64> {
            slots.iter().map(|&i| f(&vehicles[i])).collect()
        };
        let position = column(|v| v.position);
        let speed = column(|v| v.speed);
        let max_speed = column(|v| v.max_speed);
        let stops = slots.iter().map(|&i| vehicles[i].stops_count).collect();

        Self {
            direction,
            slots,
            position,
            speed,
            max_speed,
            stops,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Advances the whole lane; entry `i` sees entry `i - 1` already moved
    pub fn advance(&mut self, rule: &LaneRule) {
        for i in 0..self.len() {
            let leader = i.checked_sub(1).map(|j| self.position[j]);
            let motion = advance(rule, self.position[i], self.speed[i], self.max_speed[i], leader);
            self.position[i] = motion.position;
            self.speed[i] = motion.speed;
            if motion.stopped {
                self.stops[i] += 1;
            }
        }
    }

    pub fn scatter(&self, vehicles: &mut [Vehicle]) {
        for (k, &i) in self.slots.iter().enumerate() {
            let v = &mut vehicles[i];
            debug_assert_eq!(v.direction, self.direction, "vehicle batched into a foreign lane");
            v.position = self.position[k];
            v.speed = self.speed[k];
            v.stops_count = self.stops[k];
        }
    }
}

/// Move phase that advances lane batches in parallel
pub struct LaneBatches {
    pool: ThreadPool,
}

impl LaneBatches {
    pub fn new(num_threads: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("lane-worker-{i}"))
            .build()
            .map_err(|e| SimError::ThreadPool(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl MovePhase for LaneBatches {
    fn move_vehicles(&mut self, ctx: &MoveContext<'_>, vehicles: &mut [Vehicle]) -> Result<()> {
        let rules = Direction::ALL.map(|d| ctx.rule(d));
        let mut batches: Vec<LaneBatch> = Direction::ALL
            .into_iter()
            .zip(lane_order(vehicles))
            .map(|(d, slots)| LaneBatch::gather(d, slots, vehicles))
            .filter(|b| !b.is_empty())
            .collect();

        self.pool.install(|| {
            batches
                .par_iter_mut()
                .for_each(|batch| batch.advance(&rules[batch.direction.index()]));
        });

        for batch in &batches {
            batch.scatter(vehicles);
        }
        Ok(())
    }
}

pub struct VectorizedBackend {
    config: SimulationConfig,
    world: WorldState,
    mover: LaneBatches,
}

impl VectorizedBackend {
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let world = build_world(&config, config.random_seed);
        let mover = LaneBatches::new(config.num_threads)?;
        Ok(Self {
            config,
            world,
            mover,
        })
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }
}

impl ExecutionStrategy for VectorizedBackend {
    fn backend(&self) -> Backend {
        Backend::Vectorized
    }

    fn run(&mut self) -> Result<ResultRecord> {
        let ticks = self.config.ticks();
        let dt = self.config.dt;
        info!(
            "Running vectorized backend: {ticks} ticks of {dt}s on {} threads",
            self.mover.num_threads()
        );

        let world = &mut self.world;
        let mover = &mut self.mover;
        let (outcome, wall_time) = timed(|| -> Result<()> {
            for _ in 0..ticks {
                world.step_with(dt, mover)?;
            }
            Ok(())
        });
        outcome?;

        let summary = self.world.summary(self.config.total_time);
        debug!(
            "vectorized: {} finished in {wall_time:.4}s",
            summary.finished_count
        );
        warn_if_degenerate(Backend::Vectorized, summary.finished_count);

        let mut stats = base_diagnostics(self.world.metrics(), self.world.active_count(), ticks);
        stats.insert("num_threads".into(), self.mover.num_threads().into());
        Ok(ResultRecord::new(&self.config, wall_time, summary, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_chain_sees_updated_leader() {
        let rule = LaneRule {
            lane_length: 100.0,
            stop_line_pos: 45.0,
            is_green: true,
            safe_gap: 5.0,
            dt: 1.0,
        };
        let mut batch = LaneBatch {
            direction: Direction::North,
            slots: vec![0, 1],
            position: vec![20.0, 10.0],
            speed: vec![10.0, 10.0],
            max_speed: vec![10.0, 10.0],
            stops: vec![0, 0],
        };

        batch.advance(&rule);

        // follower limited by the leader's new position (30 - 5), not its old one
        assert_eq!(batch.position, vec![30.0, 20.0]);
        assert_eq!(batch.stops, vec![0, 0]);
    }
}
