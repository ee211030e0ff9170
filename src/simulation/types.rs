//! Core types for the intersection model

use serde::{Deserialize, Serialize};
use std::fmt;

/// A unique, monotonically assigned vehicle identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VehicleId(pub u64);

/// Compass direction of an approach lane.
///
/// The declaration order is significant: it is the fixed iteration order of
/// the spawn phase and the index used to partition lanes across workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    pub const COUNT: usize = 4;

    /// All directions in enumeration order
    pub const ALL: [Direction; Direction::COUNT] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Direction> {
        Self::ALL.get(index).copied()
    }

    /// North and South share one signal group, East and West the other
    pub fn is_north_south(self) -> bool {
        matches!(self, Direction::North | Direction::South)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::North => "north",
            Direction::East => "east",
            Direction::South => "south",
            Direction::West => "west",
        };
        f.write_str(name)
    }
}

/// Manoeuvre a vehicle intends at the intersection.
///
/// Bookkeeping only; it has no effect on motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnChoice {
    Straight,
    Left,
    Right,
}

impl TurnChoice {
    /// Maps a uniform draw in `[0, 1)` to a turn: 60% straight, 20% right, 20% left
    pub fn from_draw(r: f64) -> Self {
        if r < 0.6 {
            TurnChoice::Straight
        } else if r < 0.8 {
            TurnChoice::Right
        } else {
            TurnChoice::Left
        }
    }
}

/// Speed at or below which a vehicle counts as stopped
pub const STOPPED_SPEED: f64 = 0.1;

/// Displacement below which a move counts as no move at all
pub const MOVE_EPSILON: f64 = 1e-3;

/// Distance before the stop line where vehicles halt on red
pub const STOP_LINE_MARGIN: f64 = 0.5;

/// Room past the lane end so a vehicle can finish one tick after reaching it
pub const LANE_END_MARGIN: f64 = 20.0;
