//! Error types for the simulation.

use thiserror::Error;

/// Simulation errors. Any of these aborts a run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("grid error: {0}")]
    Grid(#[from] tandem_grid::GridError),

    #[error("transport error: {0}")]
    Transport(#[from] tandem_transport::TransportError),

    #[error("consensus error: {0}")]
    Consensus(#[from] tandem_consensus::ConsensusError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, Error>;
