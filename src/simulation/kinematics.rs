//! The movement rule applied to one vehicle in one tick
//!
//! Every execution strategy calls [`advance`], so they only differ in the
//! order vehicles are visited and in which leader position they see.

use super::road_network::LaneGeometry;
use super::types::{LANE_END_MARGIN, MOVE_EPSILON, STOPPED_SPEED, STOP_LINE_MARGIN};

/// Per-lane inputs that stay fixed for a whole tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaneRule {
    pub lane_length: f64,
    pub stop_line_pos: f64,
    pub is_green: bool,
    pub safe_gap: f64,
    pub dt: f64,
}

impl LaneRule {
    pub fn new(lane: &LaneGeometry, is_green: bool, safe_gap: f64, dt: f64) -> Self {
        Self {
            lane_length: lane.length,
            stop_line_pos: lane.stop_line_pos,
            is_green,
            safe_gap,
            dt,
        }
    }
}

/// Outcome of one vehicle's move
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motion {
    pub position: f64,
    pub speed: f64,
    /// Speed fell from moving to stopped on this tick
    pub stopped: bool,
}

/// Binary speed model: a vehicle either drives at `max_speed` or stands still.
///
/// `leader` is the position of the vehicle directly ahead in the same lane,
/// as seen by the caller (just updated, or one tick stale).
#[inline]
pub fn advance(
    rule: &LaneRule,
    position: f64,
    speed: f64,
    max_speed: f64,
    leader: Option<f64>,
) -> Motion {
    let mut target = position + max_speed * rule.dt;

    if let Some(leader_pos) = leader {
        target = target.min(leader_pos - rule.safe_gap);
    }

    if !rule.is_green && position < rule.stop_line_pos && target >= rule.stop_line_pos {
        target = rule.stop_line_pos - STOP_LINE_MARGIN;
    }

    let new_speed = if target - position <= MOVE_EPSILON {
        0.0
    } else {
        max_speed
    };

    // Counted on the falling edge only, never while a vehicle stays stopped
    let stopped = speed > STOPPED_SPEED && new_speed <= STOPPED_SPEED;

    let new_position = target
        .max(position)
        .clamp(0.0, rule.lane_length + LANE_END_MARGIN);

    Motion {
        position: new_position,
        speed: new_speed,
        stopped,
    }
}
