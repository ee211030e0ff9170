//! Two-phase signal controller
//!
//! Signals are a pure function of simulated time, so any number of readers
//! can query them concurrently.

use serde::{Deserialize, Serialize};

use super::types::Direction;

/// Phase durations in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalConfig {
    pub green_ns: f64,
    pub green_ew: f64,
    pub all_red: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            green_ns: 30.0,
            green_ew: 30.0,
            all_red: 2.0,
        }
    }
}

impl SignalConfig {
    pub fn cycle_duration(&self) -> f64 {
        self.green_ns + self.all_red + self.green_ew + self.all_red
    }
}

/// Green/red state of every approach at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalState {
    green: [bool; Direction::COUNT],
}

impl SignalState {
    fn from_groups(green_ns: bool, green_ew: bool) -> Self {
        let mut green = [false; Direction::COUNT];
        for d in Direction::ALL {
            green[d.index()] = if d.is_north_south() { green_ns } else { green_ew };
        }
        Self { green }
    }

    pub fn is_green(&self, direction: Direction) -> bool {
        self.green[direction.index()]
    }
}

/// Cycles NS-green, all-red, EW-green, all-red
#[derive(Debug, Clone, Copy)]
pub struct SignalController {
    config: SignalConfig,
    cycle_duration: f64,
}

impl SignalController {
    pub fn new(config: SignalConfig) -> Self {
        Self {
            config,
            cycle_duration: config.cycle_duration(),
        }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    pub fn cycle_duration(&self) -> f64 {
        self.cycle_duration
    }

    pub fn state(&self, t: f64) -> SignalState {
        let phase = t.rem_euclid(self.cycle_duration);
        let c = &self.config;

        if phase < c.green_ns {
            SignalState::from_groups(true, false)
        } else if phase < c.green_ns + c.all_red {
            SignalState::from_groups(false, false)
        } else if phase < c.green_ns + c.all_red + c.green_ew {
            SignalState::from_groups(false, true)
        } else {
            SignalState::from_groups(false, false)
        }
    }
}
