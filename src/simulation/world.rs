//! World state and the tick algorithm
//!
//! A tick runs spawn, then move, then finish. The move phase is pluggable
//! through [`MovePhase`] so execution strategies can re-express it (batched,
//! kernel) while spawn and finish stay identical everywhere.

use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Reverse;

use crate::error::Result;

use super::kinematics::{advance, LaneRule};
use super::metrics::{MetricsAggregator, MetricsSummary};
use super::road_network::RoadNetwork;
use super::signal::{SignalController, SignalState};
use super::types::{Direction, TurnChoice, VehicleId};
use super::vehicle::Vehicle;

/// Traffic parameters of a world
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldParams {
    /// Vehicles per second per direction
    pub spawn_rate: f64,
    pub max_vehicles: usize,
    pub max_speed: f64,
    pub safe_gap: f64,
}

impl Default for WorldParams {
    fn default() -> Self {
        Self {
            spawn_rate: 0.5,
            max_vehicles: 2000,
            max_speed: 13.9, // ~50 km/h
            safe_gap: 5.0,
        }
    }
}

/// Read-only inputs of the move phase for one tick
#[derive(Debug, Clone, Copy)]
pub struct MoveContext<'a> {
    pub network: &'a RoadNetwork,
    pub signal: SignalState,
    pub safe_gap: f64,
    pub dt: f64,
}

impl MoveContext<'_> {
    pub fn rule(&self, direction: Direction) -> LaneRule {
        LaneRule::new(
            self.network.lane(direction),
            self.signal.is_green(direction),
            self.safe_gap,
            self.dt,
        )
    }
}

/// A way of computing the move phase over the active vehicle set.
///
/// Implementations may reorder work across lanes, but must only pair a
/// vehicle with leaders from its own lane: lanes never interact.
pub trait MovePhase {
    fn move_vehicles(&mut self, ctx: &MoveContext<'_>, vehicles: &mut [Vehicle]) -> Result<()>;
}

/// Reference move phase: per-vehicle object loop, front to back in each
/// lane, every follower seeing its leader's just-updated position.
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjectLoop;

impl ObjectLoop {
    pub fn apply(ctx: &MoveContext<'_>, vehicles: &mut [Vehicle]) {
        let mut lanes: [Vec<&mut Vehicle>; Direction::COUNT] = Default::default();
        for v in vehicles.iter_mut() {
            lanes[v.direction.index()].push(v);
        }

        for (direction, lane) in Direction::ALL.into_iter().zip(lanes.iter_mut()) {
            let rule = ctx.rule(direction);
            lane.sort_by_key(|v| Reverse(OrderedFloat(v.position)));

            let mut leader: Option<f64> = None;
            for v in lane.iter_mut() {
                let motion = advance(&rule, v.position, v.speed, v.max_speed, leader);
                if motion.stopped {
                    v.stops_count += 1;
                }
                v.position = motion.position;
                v.speed = motion.speed;
                leader = Some(v.position);
            }
        }
    }
}

impl MovePhase for ObjectLoop {
    fn move_vehicles(&mut self, ctx: &MoveContext<'_>, vehicles: &mut [Vehicle]) -> Result<()> {
        Self::apply(ctx, vehicles);
        Ok(())
    }
}

/// Indices of each lane's vehicles, front (largest position) first.
///
/// Ties keep slice order, matching the ordering [`ObjectLoop`] uses.
pub fn lane_order(vehicles: &[Vehicle]) -> [Vec<usize>; Direction::COUNT] {
    let mut lanes: [Vec<usize>; Direction::COUNT] = Default::default();
    for (i, v) in vehicles.iter().enumerate() {
        lanes[v.direction.index()].push(i);
    }
    for lane in lanes.iter_mut() {
        lane.sort_by_key(|&i| Reverse(OrderedFloat(vehicles[i].position)));
    }
    lanes
}

/// The simulated intersection.
///
/// Exclusively owns its vehicles and its random stream; nothing else ever
/// draws from the stream, which keeps runs reproducible per seed.
pub struct WorldState {
    network: RoadNetwork,
    signals: SignalController,
    params: WorldParams,
    /// Directions this world spawns vehicles for
    active_directions: [bool; Direction::COUNT],

    vehicles: Vec<Vehicle>,
    rng: StdRng,
    time: f64,
    next_id: u64,
    metrics: MetricsAggregator,
}

impl WorldState {
    pub fn new(
        network: RoadNetwork,
        signals: SignalController,
        params: WorldParams,
        seed: u64,
    ) -> Self {
        Self {
            network,
            signals,
            params,
            active_directions: [true; Direction::COUNT],
            vehicles: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
            time: 0.0,
            next_id: 0,
            metrics: MetricsAggregator::new(),
        }
    }

    /// Restricts spawning to the given directions (domain decomposition)
    pub fn with_directions(mut self, directions: &[Direction]) -> Self {
        self.active_directions = [false; Direction::COUNT];
        for d in directions {
            self.active_directions[d.index()] = true;
        }
        self
    }

    /// One tick with the reference object-loop move phase
    pub fn step(&mut self, dt: f64) {
        let t_next = self.time + dt;
        let signal = self.signals.state(self.time);

        self.spawn_phase(dt);

        let ctx = MoveContext {
            network: &self.network,
            signal,
            safe_gap: self.params.safe_gap,
            dt,
        };
        ObjectLoop::apply(&ctx, &mut self.vehicles);

        self.finish_phase(t_next);
        self.time = t_next;
    }

    /// One tick with a caller-supplied move phase
    pub fn step_with<M: MovePhase + ?Sized>(&mut self, dt: f64, mover: &mut M) -> Result<()> {
        let t_next = self.time + dt;
        let signal = self.signals.state(self.time);

        self.spawn_phase(dt);

        let ctx = MoveContext {
            network: &self.network,
            signal,
            safe_gap: self.params.safe_gap,
            dt,
        };
        mover.move_vehicles(&ctx, &mut self.vehicles)?;

        self.finish_phase(t_next);
        self.time = t_next;
        Ok(())
    }

    /// Adds a vehicle at the lane entry unless the world is full
    pub fn add_vehicle(&mut self, direction: Direction) -> Option<VehicleId> {
        if self.vehicles.len() >= self.params.max_vehicles {
            return None;
        }

        let turn = TurnChoice::from_draw(self.rng.random::<f64>());
        let id = VehicleId(self.next_id);
        self.next_id += 1;

        self.vehicles.push(Vehicle::new(
            id,
            direction,
            turn,
            self.params.max_speed,
            self.time,
        ));
        self.metrics.record_spawn();
        Some(id)
    }

    /// One Bernoulli trial per direction, in enumeration order.
    ///
    /// The capacity check runs before each trial, so earlier directions win
    /// when the world is nearly full.
    fn spawn_phase(&mut self, dt: f64) {
        let spawn_prob = self.params.spawn_rate * dt;

        for direction in Direction::ALL {
            if !self.active_directions[direction.index()] {
                continue;
            }
            if self.vehicles.len() >= self.params.max_vehicles {
                break;
            }
            if self.rng.random::<f64>() < spawn_prob {
                self.add_vehicle(direction);
            }
        }
    }

    fn finish_phase(&mut self, t_next: f64) {
        let network = &self.network;
        let metrics = &mut self.metrics;

        self.vehicles.retain_mut(|v| {
            if v.position >= network.lane(v.direction).length {
                v.mark_finished(t_next);
                metrics.record_finished(v);
                false
            } else {
                true
            }
        });
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn vehicles(&self) -> &[Vehicle] {
        &self.vehicles
    }

    pub fn active_count(&self) -> usize {
        self.vehicles.len()
    }

    pub fn active_directions(&self) -> Vec<Direction> {
        Direction::ALL
            .into_iter()
            .filter(|d| self.active_directions[d.index()])
            .collect()
    }

    pub fn network(&self) -> &RoadNetwork {
        &self.network
    }

    pub fn signals(&self) -> &SignalController {
        &self.signals
    }

    pub fn params(&self) -> &WorldParams {
        &self.params
    }

    pub fn metrics(&self) -> &MetricsAggregator {
        &self.metrics
    }

    pub fn summary(&self, total_sim_time: f64) -> MetricsSummary {
        self.metrics.summary(total_sim_time)
    }
}
