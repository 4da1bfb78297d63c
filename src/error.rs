use thiserror::Error;

use crate::{BootstrapId, Epoch, NodeId};

/// Result type alias for simulation operations
pub type Result<T> = std::result::Result<T, SimError>;

/// Errors that halt a simulation run.
///
/// Expected protocol outcomes (aborted exchanges, denied tokens, defections)
/// are never errors; they are reported to the collector as records with
/// sentinel values.
#[derive(Error, Debug)]
pub enum SimError {
    /// The configuration cannot produce a runnable population
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A bootstrap node's registry is too small to pair the requester
    #[error(
        "bootstrap node {bootstrap} has {peers} admitted peer(s) in epoch {epoch}, \
         cannot resolve a partner for node {node}"
    )]
    UnpairablePeerList {
        bootstrap: BootstrapId,
        node: NodeId,
        epoch: Epoch,
        peers: usize,
    },

    /// Partner resolution landed on the requester itself
    #[error("partner resolution at bootstrap node {bootstrap} returned requester {node} in epoch {epoch}")]
    SelfPartner {
        bootstrap: BootstrapId,
        node: NodeId,
        epoch: Epoch,
    },

    /// Config file could not be read
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Config file could not be parsed
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}
