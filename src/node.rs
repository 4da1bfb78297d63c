use std::collections::BTreeSet;

use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::{BootstrapId, NodeId, TxId};

/// Declared behavioral nature of a full node. Fixed at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Nature {
    Altruistic,
    Rational,
    Byzantine,
}

/// Class of exchange a pairing resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeType {
    /// Balanced two-way trade
    Bal,
    /// Self gives without receiving (self is altruistic)
    OptOne,
    /// Self receives without giving (partner must be altruistic)
    OptTwo,
    /// No transfer
    Abort,
}

/// Outcome of a single exchange attempt between two nodes.
///
/// `None` fields are the "no real transfer occurred" sentinel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ExchangeResult {
    pub exchange: ExchangeType,
    /// Initiator's live mempool size after the attempt
    pub mempool_size: Option<usize>,
    /// Partner's live mempool size after the attempt
    pub partner_mempool_size: Option<usize>,
    pub duplicates: Option<usize>,
    pub partner_duplicates: Option<usize>,
}

impl ExchangeResult {
    fn aborted(exchange: ExchangeType, mempool_size: usize, partner_mempool_size: usize) -> Self {
        Self {
            exchange,
            mempool_size: Some(mempool_size),
            partner_mempool_size: Some(partner_mempool_size),
            duplicates: None,
            partner_duplicates: None,
        }
    }
}

/// A full node: live mempool, per-epoch frozen snapshot, exchange limits,
/// nature, and the ban timer.
#[derive(Clone, Debug)]
pub struct FullNode {
    pub id: NodeId,
    pub max_bal: usize,
    pub max_opt: usize,
    /// Live transaction set, mutated as exchanges complete within an epoch
    pub mempool: BTreeSet<TxId>,
    /// Epoch-start snapshot; all need/promise computation reads this,
    /// never the live mempool
    pub frozen_mempool: BTreeSet<TxId>,
    /// Bootstrap nodes contacted once per epoch, in this order
    pub subscriptions: Vec<BootstrapId>,
    pub nature: Nature,
    /// Per-attempt defection probability when the nature is Byzantine
    pub byzantine_level: f64,
    /// `None` = not banned; `Some(k)` = epochs served beyond the first
    /// failed token request
    pub banned_since: Option<u32>,
}

impl FullNode {
    pub fn new(
        id: NodeId,
        max_bal: usize,
        max_opt: usize,
        nature: Nature,
        byzantine_level: f64,
    ) -> Self {
        Self {
            id,
            max_bal,
            max_opt,
            mempool: BTreeSet::new(),
            frozen_mempool: BTreeSet::new(),
            subscriptions: Vec::new(),
            nature,
            byzantine_level,
            banned_since: None,
        }
    }

    pub fn set_mempool(&mut self, txs: BTreeSet<TxId>) {
        self.mempool = txs;
        self.frozen_mempool = self.mempool.clone();
    }

    pub fn set_subscriptions(&mut self, ids: Vec<BootstrapId>) {
        self.subscriptions = ids;
    }

    /// Replaces the frozen snapshot wholesale. Called exactly once per
    /// epoch, at the epoch boundary.
    pub fn freeze_mempool(&mut self) {
        self.frozen_mempool = self.mempool.clone();
    }

    /// Fresh defection draw for one exchange attempt. Only Byzantine nodes
    /// consume randomness here.
    pub fn will_defect(&self, rng: &mut ChaCha8Rng) -> bool {
        self.nature == Nature::Byzantine && rng.gen::<f64>() < self.byzantine_level
    }

    /// Exchange-type decision over the needed/promised set sizes.
    ///
    /// `needed` counts what the partner's frozen snapshot has and ours
    /// lacks; `promised` the reverse. The balanced cases are bounded by the
    /// smaller side and capped at `max_bal`; one-sided surplus or deficit
    /// falls through to the optimistic cases.
    pub fn select_exchange_type(&self, needed: usize, promised: usize) -> (ExchangeType, usize) {
        if needed >= self.max_bal && promised >= self.max_bal {
            (ExchangeType::Bal, self.max_bal)
        } else if needed == promised && needed > 0 {
            (ExchangeType::Bal, needed)
        } else if promised > needed && needed > 0 {
            // more on offer than we can reciprocate
            (ExchangeType::Bal, needed)
        } else if needed == 0 && promised == 0 {
            (ExchangeType::Abort, 0)
        } else if needed == 0 {
            // nothing we want; give anyway only if altruistic
            if self.nature == Nature::Altruistic {
                (ExchangeType::OptOne, self.max_opt)
            } else {
                (ExchangeType::Abort, 0)
            }
        } else if promised == 0 {
            // nothing to give back; lean on the partner's altruism
            (ExchangeType::OptTwo, self.max_opt)
        } else {
            // needed > promised > 0
            (ExchangeType::Bal, promised)
        }
    }

    /// Materializes the (incoming, outgoing) transaction sets for a
    /// committed exchange type. `needed` and `promised` arrive in canonical
    /// (sorted) order so the sampled subsets depend only on the RNG state.
    pub fn select_exchange_txs(
        &self,
        exchange: ExchangeType,
        needed: &[TxId],
        promised: &[TxId],
        count: usize,
        rng: &mut ChaCha8Rng,
    ) -> (Vec<TxId>, Vec<TxId>) {
        match exchange {
            ExchangeType::Bal => (sample(needed, count, rng), sample(promised, count, rng)),
            ExchangeType::OptOne => {
                let outgoing = if promised.len() < self.max_opt {
                    promised.to_vec()
                } else {
                    sample(promised, self.max_opt, rng)
                };
                (Vec::new(), outgoing)
            }
            ExchangeType::OptTwo => {
                let incoming = if needed.len() < self.max_opt {
                    needed.to_vec()
                } else {
                    sample(needed, self.max_opt, rng)
                };
                (incoming, Vec::new())
            }
            ExchangeType::Abort => (Vec::new(), Vec::new()),
        }
    }

    /// Runs one full exchange attempt against `partner`: decision over the
    /// frozen snapshots, the altruism gate, then mutation of both live
    /// mempools.
    pub fn exchange_with(&mut self, partner: &mut FullNode, rng: &mut ChaCha8Rng) -> ExchangeResult {
        let promised: Vec<TxId> = self
            .frozen_mempool
            .difference(&partner.frozen_mempool)
            .copied()
            .collect();
        let needed: Vec<TxId> = partner
            .frozen_mempool
            .difference(&self.frozen_mempool)
            .copied()
            .collect();

        let (exchange, count) = self.select_exchange_type(needed.len(), promised.len());
        if exchange == ExchangeType::Abort {
            return ExchangeResult::aborted(exchange, self.mempool.len(), partner.mempool.len());
        }
        // OPT_TWO asks the partner for unreciprocated generosity; a partner
        // not configured to provide it turns the attempt into a no-op.
        if exchange == ExchangeType::OptTwo && partner.nature != Nature::Altruistic {
            return ExchangeResult::aborted(
                ExchangeType::Abort,
                self.mempool.len(),
                partner.mempool.len(),
            );
        }

        let (incoming, outgoing) = self.select_exchange_txs(exchange, &needed, &promised, count, rng);

        let (duplicates, mempool_size) = self.add_to_mempool(&incoming);
        let (partner_duplicates, partner_mempool_size) = partner.add_to_mempool(&outgoing);
        ExchangeResult {
            exchange,
            mempool_size: Some(mempool_size),
            partner_mempool_size: Some(partner_mempool_size),
            duplicates: Some(duplicates),
            partner_duplicates: Some(partner_duplicates),
        }
    }

    /// Adds each id not already present and returns
    /// `(duplicate_count, resulting_size)`.
    ///
    /// Duplicates are expected: the frozen snapshot that drove the decision
    /// can lag a live mempool that already absorbed the same id earlier in
    /// the epoch.
    pub fn add_to_mempool(&mut self, txs: &[TxId]) -> (usize, usize) {
        let mut duplicates = 0;
        for tx in txs {
            if !self.mempool.insert(*tx) {
                duplicates += 1;
            }
        }
        (duplicates, self.mempool.len())
    }

    /// Advances the proof-of-work ban timer after a failed token request.
    ///
    /// The first call after a ban begins sets the counter to 0; later calls
    /// increment it while it stays strictly below `difficulty`; the call on
    /// which it would reach `difficulty` clears the ban. Returns `true`
    /// while the node is still serving.
    pub fn tick_pow(&mut self, difficulty: u32) -> bool {
        match self.banned_since {
            None => {
                self.banned_since = Some(0);
                true
            }
            Some(served) if served + 1 < difficulty => {
                self.banned_since = Some(served + 1);
                true
            }
            Some(_) => {
                self.banned_since = None;
                false
            }
        }
    }
}

fn sample(pool: &[TxId], count: usize, rng: &mut ChaCha8Rng) -> Vec<TxId> {
    pool.choose_multiple(rng, count).copied().collect()
}
