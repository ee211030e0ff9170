//! Accelerator strategy
//!
//! One kernel launch per tick over a (lane, vehicle slot) grid, with a
//! blocking upload before and download after every launch.
//!
//! In [`ConsistencyMode::StaleLeader`] every slot reads its leader's
//! pre-tick position so all slots of a lane can run at once. This lags
//! followers by up to one tick per vehicle in a discharging queue and is a
//! real divergence from the sequential strategy, not rounding noise.
//! [`ConsistencyMode::Ordered`] gives up intra-lane parallelism and matches
//! the sequential strategy exactly.

use log::{debug, info};
use std::time::Instant;

use crate::config::{Backend, ConsistencyMode, SimulationConfig};
use crate::error::Result;
use crate::result::{base_diagnostics, ResultRecord};
use crate::simulation::{lane_order, Direction, MoveContext, MovePhase, Vehicle, WorldState};

use super::device::{available_devices, select_device, Device, HostBuffers, LaunchConfig};
use super::{build_world, timed, warn_if_degenerate, ExecutionStrategy};

/// Host/device traffic and kernel time accumulated over a run
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransferStats {
    pub transfer_seconds: f64,
    pub kernel_seconds: f64,
    pub bytes_transferred: u64,
    pub kernel_launches: u64,
}

/// Move phase that runs on a [`Device`]
pub struct KernelMover {
    device: Box<dyn Device>,
    launch: LaunchConfig,
    host: HostBuffers,
    stats: TransferStats,
}

impl KernelMover {
    pub fn new(device: Box<dyn Device>, launch: LaunchConfig) -> Self {
        Self {
            device,
            launch,
            host: HostBuffers::default(),
            stats: TransferStats::default(),
        }
    }

    pub fn stats(&self) -> TransferStats {
        self.stats
    }

    pub fn launch_config(&self) -> LaunchConfig {
        self.launch
    }

    pub fn device_name(&self) -> String {
        self.device.info().name
    }

    fn pack(&mut self, order: &[Vec<usize>; Direction::COUNT], vehicles: &[Vehicle]) {
        self.host
            .reshape(order.each_ref().map(Vec::len), self.launch.block_size);

        for (lane, slots) in order.iter().enumerate() {
            for (slot, &i) in slots.iter().enumerate() {
                let g = self.host.index(lane, slot);
                let v = &vehicles[i];
                self.host.position[g] = v.position;
                self.host.speed[g] = v.speed;
                self.host.max_speed[g] = v.max_speed;
                self.host.stops[g] = v.stops_count;
            }
        }
    }

    fn unpack(&self, order: &[Vec<usize>; Direction::COUNT], vehicles: &mut [Vehicle]) {
        for (lane, slots) in order.iter().enumerate() {
            for (slot, &i) in slots.iter().enumerate() {
                let g = self.host.index(lane, slot);
                let v = &mut vehicles[i];
                debug_assert_eq!(v.direction.index(), lane, "vehicle packed into a foreign lane");
                v.position = self.host.position[g];
                v.speed = self.host.speed[g];
                v.stops_count = self.host.stops[g];
            }
        }
    }
}

impl MovePhase for KernelMover {
    /// Launches every tick, on an empty grid too, so transfer costs cover the whole run
    fn move_vehicles(&mut self, ctx: &MoveContext<'_>, vehicles: &mut [Vehicle]) -> Result<()> {
        let order = lane_order(vehicles);
        self.pack(&order, vehicles);
        let rules = Direction::ALL.map(|d| ctx.rule(d));

        let start = Instant::now();
        let uploaded = self.device.upload(&self.host)?;
        let uploaded_at = Instant::now();
        self.device.launch(&self.launch, &rules)?;
        let launched_at = Instant::now();
        let downloaded = self.device.download(&mut self.host)?;
        let done = Instant::now();

        self.stats.transfer_seconds +=
            (uploaded_at - start).as_secs_f64() + (done - launched_at).as_secs_f64();
        self.stats.kernel_seconds += (launched_at - uploaded_at).as_secs_f64();
        self.stats.bytes_transferred += (uploaded + downloaded) as u64;
        self.stats.kernel_launches += 1;

        self.unpack(&order, vehicles);
        Ok(())
    }
}

pub struct AcceleratorBackend {
    config: SimulationConfig,
    world: WorldState,
    mover: KernelMover,
}

impl AcceleratorBackend {
    /// Fails with `AcceleratorUnavailable` when no device can run the kernel
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let device = select_device(available_devices(), config.accelerator_block_size)?;
        Ok(Self::with_device(config, device))
    }

    pub fn with_device(config: SimulationConfig, device: Box<dyn Device>) -> Self {
        let launch = LaunchConfig {
            block_size: config.accelerator_block_size,
            mode: config.consistency,
        };
        let world = build_world(&config, config.random_seed);
        Self {
            config,
            world,
            mover: KernelMover::new(device, launch),
        }
    }

    pub fn consistency(&self) -> ConsistencyMode {
        self.config.consistency
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn transfer_stats(&self) -> TransferStats {
        self.mover.stats()
    }
}

impl ExecutionStrategy for AcceleratorBackend {
    fn backend(&self) -> Backend {
        Backend::Accelerator
    }

    fn run(&mut self) -> Result<ResultRecord> {
        let ticks = self.config.ticks();
        let dt = self.config.dt;
        info!(
            "Running accelerator backend on '{}': {ticks} ticks of {dt}s, block size {}, {} consistency",
            self.mover.device_name(),
            self.config.accelerator_block_size,
            self.config.consistency
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
        let transfer = self.mover.stats();
        debug!(
            "accelerator: {} launches, {:.4}s transfer, {:.4}s kernel, {} bytes",
            transfer.kernel_launches,
            transfer.transfer_seconds,
            transfer.kernel_seconds,
            transfer.bytes_transferred
        );
        warn_if_degenerate(Backend::Accelerator, summary.finished_count);

        let mut stats = base_diagnostics(self.world.metrics(), self.world.active_count(), ticks);
        stats.insert("device".into(), self.mover.device_name().into());
        stats.insert("block_size".into(), self.config.accelerator_block_size.into());
        stats.insert("consistency".into(), self.config.consistency.to_string().into());
        stats.insert("transfer_seconds".into(), transfer.transfer_seconds.into());
        stats.insert("kernel_seconds".into(), transfer.kernel_seconds.into());
        stats.insert("bytes_transferred".into(), transfer.bytes_transferred.into());
        stats.insert("kernel_launches".into(), transfer.kernel_launches.into());
        Ok(ResultRecord::new(&self.config, wall_time, summary, stats))
    }
}
