//! Epoch-driven simulation of transaction gossip through a peer-to-peer
//! network of full nodes mediated by bootstrap nodes.
//!
//! Full nodes trade mempool contents pairwise under a partially-altruistic
//! exchange protocol; Byzantine nodes defect, get accused, and serve a
//! proof-of-work ban before redemption. Given the same seed and
//! configuration, a run is exactly reproducible.

pub mod bootstrap;
pub mod collector;
pub mod config;
pub mod error;
pub mod node;
pub mod simulator;

pub use bootstrap::BootstrapNode;
pub use collector::{Behavior, Collector, ExchangeRecord, MemoryCollector, RunSummary};
pub use config::SimConfig;
pub use error::{Result, SimError};
pub use node::{ExchangeResult, ExchangeType, FullNode, Nature};
pub use simulator::Simulator;

// Core types
pub type NodeId = usize;
pub type BootstrapId = usize;
pub type TxId = [u8; 32];
pub type Token = [u8; 32];
pub type Epoch = u64;
