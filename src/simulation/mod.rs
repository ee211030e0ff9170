//! Intersection traffic model
//!
//! Four independent approach lanes under a shared two-phase signal. This
//! module holds the model only; how its move phase is executed is the
//! concern of [`crate::backends`].

mod kinematics;
mod metrics;
mod road_network;
mod signal;
mod types;
mod vehicle;
mod world;

pub use kinematics::{advance, LaneRule, Motion};
pub use metrics::{FinishedTrip, LocalContribution, MetricsAggregator, MetricsSummary};
pub use road_network::{LaneGeometry, RoadNetwork};
pub use signal::{SignalConfig, SignalController, SignalState};
pub use types::{
    Direction, TurnChoice, VehicleId, LANE_END_MARGIN, MOVE_EPSILON, STOPPED_SPEED,
    STOP_LINE_MARGIN,
};
pub use vehicle::Vehicle;
pub use world::{lane_order, MoveContext, MovePhase, ObjectLoop, WorldParams, WorldState};
