//! Error type shared by the whole library.

use thiserror::Error;

/// Everything that can abort a simulation run.
///
/// Runs are deterministic batch jobs, so none of these are retried.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("unknown backend '{name}'. Available: {valid}")]
    UnknownBackend { name: String, valid: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No capable accelerator device. Callers must pick another backend themselves.
    #[error("accelerator backend unavailable: {0}")]
    AcceleratorUnavailable(String),

    #[error("device error: {0}")]
    Device(String),

    #[error("failed to build worker thread pool: {0}")]
    ThreadPool(String),

    /// A peer left the collective before it completed.
    #[error("collective reduction failed on rank {rank}: {reason}")]
    Collective { rank: usize, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
