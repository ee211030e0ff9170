//! Per-agent vehicle record

use super::types::{Direction, TurnChoice, VehicleId};

/// A vehicle on one approach lane
#[derive(Debug, Clone)]
pub struct Vehicle {
    pub id: VehicleId,
    pub direction: Direction,
    pub turn_choice: TurnChoice,
    /// Distance travelled along the lane; never decreases while active
    pub position: f64,
    pub speed: f64,
    pub max_speed: f64,
    pub spawn_time: f64,
    pub stops_count: u32,
    pub finished: bool,
    finish_time: Option<f64>,
}

impl Vehicle {
    pub fn new(
        id: VehicleId,
        direction: Direction,
        turn_choice: TurnChoice,
        max_speed: f64,
        spawn_time: f64,
    ) -> Self {
        Self {
            id,
            direction,
            turn_choice,
            position: 0.0,
            speed: max_speed,
            max_speed,
            spawn_time,
            stops_count: 0,
            finished: false,
            finish_time: None,
        }
    }

    /// Marks the vehicle finished at `t`. Later calls keep the first finish time.
    pub fn mark_finished(&mut self, t: f64) {
        if self.finish_time.is_none() {
            self.finished = true;
            self.finish_time = Some(t);
        }
    }

    pub fn finish_time(&self) -> Option<f64> {
        self.finish_time
    }

    pub fn travel_time(&self) -> Option<f64> {
        self.finish_time.map(|t| t - self.spawn_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_time_is_set_once() {
        let mut v = Vehicle::new(VehicleId(0), Direction::East, TurnChoice::Left, 10.0, 2.0);
        assert_eq!(v.travel_time(), None);

        v.mark_finished(12.0);
        v.mark_finished(15.0);

        assert!(v.finished);
        assert_eq!(v.finish_time(), Some(12.0));
        assert_eq!(v.travel_time(), Some(10.0));
    }
}
