use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// Immutable run configuration.
///
/// Loaded once before the simulation starts; the simulator never mutates it.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seed for the run's single random source
    pub seed: u64,
    /// Number of epochs to simulate
    pub epochs: u64,
    /// Failed token requests a banned node must make before redemption
    pub pow_difficulty: u32,
    pub bootstrap_nodes: usize,
    pub full_nodes: usize,
    /// Byzantine sub-population; nodes 0..byzantine_nodes defect
    pub byzantine_nodes: usize,
    /// Rational sub-population; follows the Byzantine block in id order
    pub rational_nodes: usize,
    /// Per-attempt defection probability for Byzantine nodes
    pub byzantine_level: f64,
    /// Bootstrap nodes each full node contacts per epoch
    pub subscriptions: usize,
    /// Size of the global transaction pool
    pub tx_total: usize,
    /// Initial mempool size per node, drawn from the global pool
    pub mempool_size: usize,
    /// Upper bound on balanced-exchange size
    pub max_bal: usize,
    /// Upper bound on one-sided (optimistic) exchange size
    pub max_opt: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            epochs: 10,
            pow_difficulty: 2,
            bootstrap_nodes: 4,
            full_nodes: 20,
            byzantine_nodes: 2,
            rational_nodes: 4,
            byzantine_level: 0.1,
            subscriptions: 2,
            tx_total: 1000,
            mempool_size: 100,
            max_bal: 5,
            max_opt: 3,
        }
    }
}

impl SimConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects populations and limits that make the run impossible before
    /// it starts, rather than mid-epoch.
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(SimError::InvalidConfig("epochs must be at least 1".into()));
        }
        if self.pow_difficulty == 0 {
            return Err(SimError::InvalidConfig(
                "pow_difficulty must be at least 1".into(),
            ));
        }
        if self.bootstrap_nodes == 0 {
            return Err(SimError::InvalidConfig(
                "at least one bootstrap node is required".into(),
            ));
        }
        if self.full_nodes < 2 {
            return Err(SimError::InvalidConfig(
                "at least two full nodes are required for pairing".into(),
            ));
        }
        if self.byzantine_nodes + self.rational_nodes > self.full_nodes {
            return Err(SimError::InvalidConfig(format!(
                "byzantine ({}) + rational ({}) nodes exceed the population ({})",
                self.byzantine_nodes, self.rational_nodes, self.full_nodes
            )));
        }
        if !(0.0..=1.0).contains(&self.byzantine_level) {
            return Err(SimError::InvalidConfig(format!(
                "byzantine_level {} is not a probability",
                self.byzantine_level
            )));
        }
        if self.subscriptions == 0 || self.subscriptions > self.bootstrap_nodes {
            return Err(SimError::InvalidConfig(format!(
                "subscriptions ({}) must be between 1 and the bootstrap node count ({})",
                self.subscriptions, self.bootstrap_nodes
            )));
        }
        if self.mempool_size > self.tx_total {
            return Err(SimError::InvalidConfig(format!(
                "mempool_size ({}) exceeds the global pool ({})",
                self.mempool_size, self.tx_total
            )));
        }
        if self.max_bal == 0 || self.max_opt == 0 {
            return Err(SimError::InvalidConfig(
                "max_bal and max_opt must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Altruistic remainder of the population after the Byzantine and
    /// rational blocks.
    pub fn altruistic_nodes(&self) -> usize {
        self.full_nodes - self.byzantine_nodes - self.rational_nodes
    }
}
