//! Domain-decomposed strategy
//!
//! Directions are split across a worker group by `index mod size`. Each
//! worker owns a world seeded with `random_seed + rank` and steps it with no
//! communication at all; one reduce-and-broadcast at the end produces the
//! shared result. Workers are threads here; [`run_worker`] is the per-rank
//! entry point for any other [`Communicator`] transport.

use log::{debug, info};
use std::thread;

use crate::config::{Backend, SimulationConfig};
use crate::error::{Result, SimError};
use crate::result::{group_diagnostics, ResultRecord};
use crate::simulation::Direction;

use super::comm::{channel_group, Communicator};
use super::{build_world, timed, warn_if_degenerate, ExecutionStrategy};

/// Directions owned by `rank` in a group of `size`; empty when `rank >= 4`
pub fn assigned_directions(rank: usize, size: usize) -> Vec<Direction> {
    let size = size.max(1);
    Direction::ALL
        .into_iter()
        .filter(|d| d.index() % size == rank)
        .collect()
}

/// Simulates one rank's share and joins the end-of-run collective.
///
/// A rank with no directions still steps an empty world and contributes
/// zeros; skipping the collective would leave the others waiting.
pub fn run_worker<C: Communicator + ?Sized>(
    config: &SimulationConfig,
    comm: &C,
) -> Result<ResultRecord> {
    let rank = comm.rank();
    let size = comm.size();
    let directions = assigned_directions(rank, size);
    let ticks = config.ticks();
    let dt = config.dt;

    let mut world = build_world(config, config.random_seed.wrapping_add(rank as u64))
        .with_directions(&directions);

    debug!("rank {rank}/{size}: simulating {directions:?}");

    let ((), local_wall) = timed(|| {
        for _ in 0..ticks {
            world.step(dt);
        }
    });

    let local = world
        .metrics()
        .local_contribution(world.active_count(), local_wall);
    let (local_spawned, local_finished) = (local.spawned, local.finished_count);
    let global = comm.reduce_and_broadcast(local, config.total_time)?;
    if rank == 0 {
        info!(
            "{size} workers finished {} of {} spawned vehicles, slowest worker {:.4}s",
            global.summary.finished_count, global.totals.spawned, global.totals.wall_time
        );
    }

    // group-wide figures first; only `rank`, `assigned_directions` and the
    // `local_*` keys differ between ranks
    let mut stats = group_diagnostics(&global.totals, ticks);
    stats.insert("num_ranks".into(), size.into());
    stats.insert("global_spawned".into(), global.totals.spawned.into());
    stats.insert("rank".into(), rank.into());
    stats.insert("local_spawned".into(), local_spawned.into());
    stats.insert("local_finished".into(), local_finished.into());
    stats.insert("local_active_at_end".into(), world.active_count().into());
    stats.insert("local_wall_time".into(), local_wall.into());
    stats.insert(
        "assigned_directions".into(),
        directions
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .into(),
    );

    Ok(ResultRecord::new(
        config,
        global.totals.wall_time,
        global.summary,
        stats,
    ))
}

pub struct DistributedBackend {
    config: SimulationConfig,
}

impl DistributedBackend {
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Runs the whole group and returns every rank's record, rank order
    pub fn run_all(&self) -> Result<Vec<ResultRecord>> {
        let size = self.config.num_processes;
        let config = &self.config;

        let outcomes: Vec<Result<ResultRecord>> = thread::scope(|s| {
            let mut handles = Vec::with_capacity(size);
            for comm in channel_group(size) {
                let rank = comm.rank();
                let handle = thread::Builder::new()
                    .name(format!("rank-{rank}"))
                    .spawn_scoped(s, move || run_worker(config, &comm));
                handles.push((rank, handle));
            }

            handles
                .into_iter()
                .map(|(rank, handle)| {
                    let handle = handle?;
                    handle.join().unwrap_or_else(|_| {
                        Err(SimError::Collective {
                            rank,
                            reason: "worker panicked".into(),
                        })
                    })
                })
                .collect()
        });

        outcomes.into_iter().collect()
    }
}

impl ExecutionStrategy for DistributedBackend {
    fn backend(&self) -> Backend {
        Backend::Distributed
    }

    fn run(&mut self) -> Result<ResultRecord> {
        let size = self.config.num_processes;
        info!(
            "Running distributed backend: {} ticks of {}s across {size} workers",
            self.config.ticks(),
            self.config.dt
        );

        let records = self.run_all()?;
        let root = records
            .into_iter()
            .next()
            .ok_or_else(|| SimError::InvalidConfig("worker group is empty".into()))?;

        warn_if_degenerate(Backend::Distributed, root.vehicles_completed);
        Ok(root)
    }
}
