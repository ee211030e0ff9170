//! Accelerator device abstraction
//!
//! A device owns its own copies of the lane arrays. Every tick the host
//! uploads them, launches one kernel, and downloads the result; nothing is
//! shared between host and device memory.

use crate::config::ConsistencyMode;
use crate::error::{Result, SimError};
use crate::simulation::{Direction, LaneRule};

#[cfg(feature = "software-device")]
use crate::simulation::advance;
#[cfg(feature = "software-device")]
use rayon::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub max_block_size: usize,
}

/// Kernel launch geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Vehicle slots per execution block
    pub block_size: usize,
    pub mode: ConsistencyMode,
}

/// Host staging arrays in device layout.
///
/// Lane-major with `stride` slots per lane; slot 0 is the lane's front
/// vehicle. `stride` is a multiple of the block size so no block spans two
/// lanes. Slots at or past a lane's occupancy are padding.
#[derive(Debug, Clone, Default)]
pub struct HostBuffers {
    pub stride: usize,
    pub occupancy: [usize; Direction::COUNT],
    pub position: Vec<f64>,
    pub speed: Vec<f64>,
    pub max_speed: Vec<f64>,
    pub stops: Vec<u32>,
}

impl HostBuffers {
    /// Resizes for the given per-lane occupancy, rounding the stride up to a
    /// whole number of blocks
    pub fn reshape(&mut self, occupancy: [usize; Direction::COUNT], block_size: usize) {
        let widest = occupancy.iter().copied().max().unwrap_or(0);
        let block_size = block_size.max(1);
        self.stride = widest.div_ceil(block_size) * block_size;
        self.occupancy = occupancy;

        let len = self.stride * Direction::COUNT;
        for buf in [&mut self.position, &mut self.speed, &mut self.max_speed] {
            buf.clear();
            buf.resize(len, 0.0);
        }
        self.stops.clear();
        self.stops.resize(len, 0);
    }

    pub fn index(&self, lane: usize, slot: usize) -> usize {
        lane * self.stride + slot
    }

    /// Bytes moved by one full copy of the arrays a kernel reads
    pub fn upload_bytes(&self) -> usize {
        self.position.len() * 3 * std::mem::size_of::<f64>()
            + self.stops.len() * std::mem::size_of::<u32>()
    }

    /// Bytes moved by one full copy of the arrays a kernel writes
    pub fn download_bytes(&self) -> usize {
        self.position.len() * 2 * std::mem::size_of::<f64>()
            + self.stops.len() * std::mem::size_of::<u32>()
    }
}

/// An accelerator the kernel can run on
pub trait Device: Send {
    fn info(&self) -> DeviceInfo;

    /// Host to device copy. Returns bytes transferred.
    fn upload(&mut self, host: &HostBuffers) -> Result<usize>;

    /// Runs one tick of the move kernel over the uploaded arrays
    fn launch(&mut self, launch: &LaunchConfig, rules: &[LaneRule; Direction::COUNT]) -> Result<()>;

    /// Device to host copy of positions, speeds and stop counters. Returns bytes transferred.
    fn download(&mut self, host: &mut HostBuffers) -> Result<usize>;
}

/// Devices compiled into this build
pub fn available_devices() -> Vec<Box<dyn Device>> {
    #[cfg(feature = "software-device")]
    {
        vec![Box::new(SoftwareDevice::new())]
    }

    #[cfg(not(feature = "software-device"))]
    {
        Vec::new()
    }
}

/// Picks the first device able to run blocks of `block_size`.
///
/// Never falls back to a non-accelerator strategy.
pub fn select_device(candidates: Vec<Box<dyn Device>>, block_size: usize) -> Result<Box<dyn Device>> {
    if candidates.is_empty() {
        return Err(SimError::AcceleratorUnavailable(
            "no accelerator device found".into(),
        ));
    }

    candidates
        .into_iter()
        .find(|d| block_size <= d.info().max_block_size)
        .ok_or_else(|| {
            SimError::AcceleratorUnavailable(format!(
                "no device supports a block size of {block_size}"
            ))
        })
}

/// Device emulated in host memory; blocks of the kernel grid run on rayon
#[cfg(feature = "software-device")]
#[derive(Debug, Default)]
pub struct SoftwareDevice {
    stride: usize,
    occupancy: [usize; Direction::COUNT],
    /// Pre-tick positions; read-only during a launch
    position_in: Vec<f64>,
    position_out: Vec<f64>,
    speed: Vec<f64>,
    max_speed: Vec<f64>,
    stops: Vec<u32>,
}

#[cfg(feature = "software-device")]
impl SoftwareDevice {
    pub const MAX_BLOCK_SIZE: usize = 1024;

    pub fn new() -> Self {
        Self::default()
    }

    /// One execution slot per vehicle; leaders read from `position_in`
    fn launch_stale_leader(&mut self, block_size: usize, rules: &[LaneRule; Direction::COUNT]) {
        let stride = self.stride;
        let occupancy = self.occupancy;
        let position_in = &self.position_in;
        let max_speed = &self.max_speed;

        self.position_out
            .par_chunks_mut(block_size)
            .zip(self.speed.par_chunks_mut(block_size))
            .zip(self.stops.par_chunks_mut(block_size))
            .enumerate()
            .for_each(|(block, ((position, speed), stops))| {
                let first = block * block_size;
                let lane = first / stride;
                let first_slot = first % stride;

                for j in 0..position.len() {
                    let slot = first_slot + j;
                    if slot >= occupancy[lane] {
                        break;
                    }
                    let g = first + j;
                    let leader = (slot > 0).then(|| position_in[g - 1]);
                    let motion = advance(&rules[lane], position_in[g], speed[j], max_speed[g], leader);
                    position[j] = motion.position;
                    speed[j] = motion.speed;
                    if motion.stopped {
                        stops[j] += 1;
                    }
                }
            });
    }

    /// One execution slot per lane walking the chain front to back
    fn launch_ordered(&mut self, rules: &[LaneRule; Direction::COUNT]) {
        let stride = self.stride;
        let occupancy = self.occupancy;
        let position_in = &self.position_in;
        let max_speed = &self.max_speed;

        self.position_out
            .par_chunks_mut(stride)
            .zip(self.speed.par_chunks_mut(stride))
            .zip(self.stops.par_chunks_mut(stride))
            .enumerate()
            .for_each(|(lane, ((position, speed), stops))| {
                let base = lane * stride;
                for slot in 0..occupancy[lane] {
                    let leader = slot.checked_sub(1).map(|s| position[s]);
                    let motion = advance(
                        &rules[lane],
                        position_in[base + slot],
                        speed[slot],
                        max_speed[base + slot],
                        leader,
                    );
                    position[slot] = motion.position;
                    speed[slot] = motion.speed;
                    if motion.stopped {
                        stops[slot] += 1;
                    }
                }
            });
    }
}

#[cfg(feature = "software-device")]
impl Device for SoftwareDevice {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            name: "software".into(),
            max_block_size: Self::MAX_BLOCK_SIZE,
        }
    }

    fn upload(&mut self, host: &HostBuffers) -> Result<usize> {
        self.stride = host.stride;
        self.occupancy = host.occupancy;

        self.position_in.clone_from(&host.position);
        self.position_out.clone_from(&host.position);
        self.speed.clone_from(&host.speed);
        self.max_speed.clone_from(&host.max_speed);
        self.stops.clone_from(&host.stops);

        Ok(host.upload_bytes())
    }

    fn launch(&mut self, launch: &LaunchConfig, rules: &[LaneRule; Direction::COUNT]) -> Result<()> {
        if launch.block_size == 0 || launch.block_size > Self::MAX_BLOCK_SIZE {
            return Err(SimError::Device(format!(
                "block size {} outside 1..={}",
                launch.block_size,
                Self::MAX_BLOCK_SIZE
            )));
        }
        if self.stride == 0 {
            return Ok(());
        }
        if self.stride % launch.block_size != 0 {
            return Err(SimError::Device(format!(
                "lane stride {} is not a multiple of block size {}",
                self.stride, launch.block_size
            )));
        }

        match launch.mode {
            ConsistencyMode::StaleLeader => self.launch_stale_leader(launch.block_size, rules),
            ConsistencyMode::Ordered => self.launch_ordered(rules),
        }
        Ok(())
    }

    fn download(&mut self, host: &mut HostBuffers) -> Result<usize> {
        if host.position.len() != self.position_out.len() {
            return Err(SimError::Device(format!(
                "host buffers hold {} slots, device holds {}",
                host.position.len(),
                self.position_out.len()
            )));
        }

        host.position.copy_from_slice(&self.position_out);
        host.speed.copy_from_slice(&self.speed);
        host.stops.copy_from_slice(&self.stops);
        Ok(host.download_bytes())
    }
}
