//! Static lane geometry for the four approaches
//!
//! Simple 1D model: one lane per direction. A vehicle enters at position 0
//! and leaves the map once it reaches the lane length.

use super::types::Direction;

/// Immutable geometry of one approach lane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaneGeometry {
    pub length: f64,
    pub stop_line_pos: f64,
    pub intersection_start: f64,
    pub intersection_end: f64,
}

/// Lane lookup by direction. Never mutated after construction.
#[derive(Debug, Clone)]
pub struct RoadNetwork {
    lanes: [LaneGeometry; Direction::COUNT],
}

impl Default for RoadNetwork {
    fn default() -> Self {
        Self::new(100.0, 5.0, 10.0)
    }
}

impl RoadNetwork {
    /// Builds identical geometry for every direction, centred on the intersection
    pub fn new(lane_length: f64, stop_line_from_center: f64, intersection_width: f64) -> Self {
        let center = lane_length / 2.0;
        let geom = LaneGeometry {
            length: lane_length,
            stop_line_pos: center - stop_line_from_center,
            intersection_start: center - intersection_width / 2.0,
            intersection_end: center + intersection_width / 2.0,
        };

        Self {
            lanes: [geom; Direction::COUNT],
        }
    }

    pub fn lane(&self, direction: Direction) -> &LaneGeometry {
        &self.lanes[direction.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_geometry() {
        let network = RoadNetwork::default();
        for d in Direction::ALL {
            let lane = network.lane(d);
            assert_eq!(lane.length, 100.0);
            assert_eq!(lane.stop_line_pos, 45.0);
            assert_eq!(lane.intersection_start, 45.0);
            assert_eq!(lane.intersection_end, 55.0);
        }
    }
}
