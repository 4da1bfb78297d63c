use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::node::ExchangeType;
use crate::{BootstrapId, Epoch, NodeId};

/// Whether an attempt ran the protocol or was cut short by a defection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Behavior {
    Protocol,
    Byzantine,
}

/// One record per exchange attempt that obtained a token.
///
/// Mempool fields are `(before, after)` pairs where `before` is the length
/// of the party's frozen snapshot; `None` in the `after` position and in the
/// duplicate counts is the "no real transfer occurred" sentinel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExchangeRecord {
    pub epoch: Epoch,
    pub initiator: NodeId,
    pub partner: NodeId,
    /// Bootstrap node that mediated the pairing
    pub bootstrap: BootstrapId,
    pub exchange: ExchangeType,
    pub behavior: Behavior,
    pub initiator_duplicates: Option<usize>,
    pub partner_duplicates: Option<usize>,
    pub initiator_mempool: (usize, Option<usize>),
    pub partner_mempool: (usize, Option<usize>),
}

/// Terminal summary reported once, when the configured epoch bound is
/// reached.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub epochs: Epoch,
    /// Distinct transactions known anywhere in the network at the end
    pub unique_txs: usize,
    pub min_mempool: usize,
    pub max_mempool: usize,
    pub total_attempts: u64,
    pub total_aborts: u64,
}

/// Receiver for everything the core emits as it executes. The core never
/// depends on how implementations aggregate or render the data.
pub trait Collector {
    /// Phase-3 registry snapshot, one call per bootstrap node per epoch
    fn record_peer_list(&mut self, _epoch: Epoch, _bootstrap: BootstrapId, _peers: &[NodeId]) {}

    /// Phase-3 mempool snapshot, one call per full node per epoch
    fn record_mempool_size(&mut self, _epoch: Epoch, _node: NodeId, _size: usize) {}

    fn record_exchange(&mut self, _record: ExchangeRecord) {}

    fn record_summary(&mut self, _summary: &RunSummary) {}
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullCollector;

impl Collector for NullCollector {}

/// Records the full run in memory, with the per-epoch views the analysis
/// layer consumes.
#[derive(Debug, Default, PartialEq)]
pub struct MemoryCollector {
    pub peer_lists: BTreeMap<Epoch, BTreeMap<BootstrapId, Vec<NodeId>>>,
    pub mempool_sizes: BTreeMap<Epoch, BTreeMap<NodeId, usize>>,
    pub exchanges: Vec<ExchangeRecord>,
    pub summary: Option<RunSummary>,
}

impl MemoryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch_exchanges(&self, epoch: Epoch) -> impl Iterator<Item = &ExchangeRecord> {
        self.exchanges.iter().filter(move |r| r.epoch == epoch)
    }

    /// `(bal, opt, abort)` totals for one epoch, OPT_ONE and OPT_TWO
    /// counted together
    pub fn type_totals(&self, epoch: Epoch) -> (usize, usize, usize) {
        let mut totals = (0, 0, 0);
        for record in self.epoch_exchanges(epoch) {
            match record.exchange {
                ExchangeType::Bal => totals.0 += 1,
                ExchangeType::OptOne | ExchangeType::OptTwo => totals.1 += 1,
                ExchangeType::Abort => totals.2 += 1,
            }
        }
        totals
    }

    /// Realized duplicate counts for one epoch, both parties, sentinel
    /// entries skipped
    pub fn duplicates(&self, epoch: Epoch) -> Vec<usize> {
        let mut counts = Vec::new();
        for record in self.epoch_exchanges(epoch) {
            if let Some(d) = record.initiator_duplicates {
                counts.push(d);
            }
            if let Some(d) = record.partner_duplicates {
                counts.push(d);
            }
        }
        counts
    }
}

impl Collector for MemoryCollector {
    fn record_peer_list(&mut self, epoch: Epoch, bootstrap: BootstrapId, peers: &[NodeId]) {
        self.peer_lists
            .entry(epoch)
            .or_default()
            .insert(bootstrap, peers.to_vec());
    }

    fn record_mempool_size(&mut self, epoch: Epoch, node: NodeId, size: usize) {
        self.mempool_sizes.entry(epoch).or_default().insert(node, size);
    }

    fn record_exchange(&mut self, record: ExchangeRecord) {
        self.exchanges.push(record);
    }

    fn record_summary(&mut self, summary: &RunSummary) {
        self.summary = Some(summary.clone());
    }
}
