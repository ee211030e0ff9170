//! Intersection Traffic Simulation Library
//!
//! Models a four-approach signalised intersection and runs the same model
//! under sequential, vectorized, distributed and accelerator execution
//! strategies so their throughput and results can be compared.

pub mod backends;
pub mod config;
pub mod error;
pub mod io;
pub mod result;
pub mod runner;
pub mod simulation;

pub use config::{get_backend, Backend, ConsistencyMode, SimulationConfig};
pub use error::{Result, SimError};
pub use result::ResultRecord;
