use std::collections::BTreeSet;

use rand::seq::SliceRandom;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::bootstrap::BootstrapNode;
use crate::collector::{Behavior, Collector, ExchangeRecord, RunSummary};
use crate::config::SimConfig;
use crate::error::Result;
use crate::node::{ExchangeType, FullNode, Nature};
use crate::{BootstrapId, Epoch, NodeId, TxId};

/// Drives the simulation epoch by epoch.
///
/// Owns the population, the global transaction pool, and the run's single
/// seedable random source; every draw (tokens, sampling, defection) comes
/// from that one generator, so a run is exactly reproducible from
/// `(seed, configuration)`.
pub struct Simulator {
    config: SimConfig,
    rng: ChaCha8Rng,
    pool: Vec<TxId>,
    pub bootstrap_nodes: Vec<BootstrapNode>,
    pub full_nodes: Vec<FullNode>,
}

impl Simulator {
    pub fn new(config: SimConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

        let pool = generate_pool(config.tx_total, &mut rng);
        let bootstrap_nodes: Vec<BootstrapNode> =
            (0..config.bootstrap_nodes).map(BootstrapNode::new).collect();

        let mut sim = Self {
            config,
            rng,
            pool,
            bootstrap_nodes,
            full_nodes: Vec::new(),
        };
        sim.generate_full_nodes();
        Ok(sim)
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    fn generate_full_nodes(&mut self) {
        let config = self.config.clone();
        for id in 0..config.full_nodes {
            let mempool: BTreeSet<TxId> = self
                .pool
                .choose_multiple(&mut self.rng, config.mempool_size)
                .copied()
                .collect();
            let subscriptions = self.pick_subscriptions(id);

            let nature = if id < config.byzantine_nodes {
                Nature::Byzantine
            } else if id < config.byzantine_nodes + config.rational_nodes {
                Nature::Rational
            } else {
                Nature::Altruistic
            };

            let mut node = FullNode::new(
                id,
                config.max_bal,
                config.max_opt,
                nature,
                config.byzantine_level,
            );
            node.set_mempool(mempool);
            node.set_subscriptions(subscriptions);
            self.full_nodes.push(node);
        }
    }

    /// Picks the bootstrap nodes `node` will contact each epoch and admits
    /// it to each of their registries.
    fn pick_subscriptions(&mut self, node: NodeId) -> Vec<BootstrapId> {
        let all: Vec<BootstrapId> = (0..self.config.bootstrap_nodes).collect();
        let picked: Vec<BootstrapId> = if self.config.subscriptions == all.len() {
            all
        } else {
            all.choose_multiple(&mut self.rng, self.config.subscriptions)
                .copied()
                .collect()
        };
        for &bootstrap in &picked {
            self.bootstrap_nodes[bootstrap].admit(node);
        }
        picked
    }

    /// Runs every configured epoch, reporting to `collector` as it goes,
    /// and returns the terminal summary.
    pub fn run(&mut self, collector: &mut dyn Collector) -> Result<RunSummary> {
        info!(
            bootstrap_nodes = self.config.bootstrap_nodes,
            full_nodes = self.config.full_nodes,
            byzantine = self.config.byzantine_nodes,
            rational = self.config.rational_nodes,
            epochs = self.config.epochs,
            unique_txs = self.unique_tx_count(),
            "starting simulation"
        );

        let mut total_attempts = 0;
        let mut total_aborts = 0;
        for epoch in 0..self.config.epochs {
            self.enforce_bans(epoch);
            self.admit_redeemed();
            self.snapshot(epoch, collector);
            let (attempts, aborts) = self.exchange_round(epoch, collector)?;
            total_attempts += attempts;
            total_aborts += aborts;
            debug!(epoch, attempts, aborts, "epoch complete");
        }

        let summary = self.summarize(total_attempts, total_aborts);
        info!(
            unique_txs = summary.unique_txs,
            min_mempool = summary.min_mempool,
            max_mempool = summary.max_mempool,
            "simulation complete"
        );
        collector.record_summary(&summary);
        Ok(summary)
    }

    /// Phase 1: drop peers accused in the previous epoch, re-sort each
    /// registry.
    fn enforce_bans(&mut self, epoch: Epoch) {
        for bootstrap in &mut self.bootstrap_nodes {
            bootstrap.remove_accused(epoch);
        }
    }

    /// Phase 2: merge the redemption queues into the registries.
    fn admit_redeemed(&mut self) {
        for bootstrap in &mut self.bootstrap_nodes {
            bootstrap.admit_redeemed();
        }
    }

    /// Phase 3: freeze every mempool for this epoch and report the
    /// registry and mempool snapshots.
    fn snapshot(&mut self, epoch: Epoch, collector: &mut dyn Collector) {
        for node in &mut self.full_nodes {
            node.freeze_mempool();
        }
        for bootstrap in &self.bootstrap_nodes {
            collector.record_peer_list(epoch, bootstrap.id, &bootstrap.peers);
        }
        for node in &self.full_nodes {
            collector.record_mempool_size(epoch, node.id, node.mempool.len());
        }
    }

    /// Phase 4: every full node, in id order, contacts each subscribed
    /// bootstrap node in subscription order and attempts one exchange.
    fn exchange_round(
        &mut self,
        epoch: Epoch,
        collector: &mut dyn Collector,
    ) -> Result<(u64, u64)> {
        let mut attempts = 0;
        let mut aborts = 0;
        let difficulty = self.config.pow_difficulty;

        for initiator in 0..self.full_nodes.len() {
            let subscriptions = self.full_nodes[initiator].subscriptions.clone();
            for bootstrap in subscriptions {
                let token =
                    self.bootstrap_nodes[bootstrap].issue_token(initiator, &mut self.rng);
                let Some(token) = token else {
                    // denied a token: currently banned here, work the timer
                    let still_banned = self.full_nodes[initiator].tick_pow(difficulty);
                    if !still_banned {
                        debug!(node = initiator, bootstrap, epoch, "ban lifted, queued for redemption");
                        self.bootstrap_nodes[bootstrap].queue_redemption(initiator);
                    }
                    continue;
                };

                let partner =
                    self.bootstrap_nodes[bootstrap].resolve_partner(&token, initiator, epoch)?;

                // defection checks, initiator first; only the defecting
                // party is accused and the attempt aborts
                if self.full_nodes[initiator].will_defect(&mut self.rng) {
                    self.bootstrap_nodes[bootstrap].record_misbehavior(epoch, initiator);
                    collector.record_exchange(self.byzantine_record(
                        epoch, initiator, partner, bootstrap,
                    ));
                    attempts += 1;
                    aborts += 1;
                    continue;
                }
                if self.full_nodes[partner].will_defect(&mut self.rng) {
                    self.bootstrap_nodes[bootstrap].record_misbehavior(epoch, partner);
                    collector.record_exchange(self.byzantine_record(
                        epoch, initiator, partner, bootstrap,
                    ));
                    attempts += 1;
                    aborts += 1;
                    continue;
                }

                let initiator_frozen = self.full_nodes[initiator].frozen_mempool.len();
                let partner_frozen = self.full_nodes[partner].frozen_mempool.len();
                let (a, b) = pair_mut(&mut self.full_nodes, initiator, partner);
                let result = a.exchange_with(b, &mut self.rng);

                attempts += 1;
                if result.exchange == ExchangeType::Abort {
                    aborts += 1;
                }
                collector.record_exchange(ExchangeRecord {
                    epoch,
                    initiator,
                    partner,
                    bootstrap,
                    exchange: result.exchange,
                    behavior: Behavior::Protocol,
                    initiator_duplicates: result.duplicates,
                    partner_duplicates: result.partner_duplicates,
                    initiator_mempool: (initiator_frozen, result.mempool_size),
                    partner_mempool: (partner_frozen, result.partner_mempool_size),
                });
            }
        }
        Ok((attempts, aborts))
    }

    fn byzantine_record(
        &self,
        epoch: Epoch,
        initiator: NodeId,
        partner: NodeId,
        bootstrap: BootstrapId,
    ) -> ExchangeRecord {
        ExchangeRecord {
            epoch,
            initiator,
            partner,
            bootstrap,
            exchange: ExchangeType::Abort,
            behavior: Behavior::Byzantine,
            initiator_duplicates: None,
            partner_duplicates: None,
            initiator_mempool: (self.full_nodes[initiator].frozen_mempool.len(), None),
            partner_mempool: (self.full_nodes[partner].frozen_mempool.len(), None),
        }
    }

    fn summarize(&self, total_attempts: u64, total_aborts: u64) -> RunSummary {
        let sizes: Vec<usize> = self.full_nodes.iter().map(|n| n.mempool.len()).collect();
        RunSummary {
            epochs: self.config.epochs,
            unique_txs: self.unique_tx_count(),
            min_mempool: sizes.iter().copied().min().unwrap_or(0),
            max_mempool: sizes.iter().copied().max().unwrap_or(0),
            total_attempts,
            total_aborts,
        }
    }

    fn unique_tx_count(&self) -> usize {
        let mut seen: BTreeSet<TxId> = BTreeSet::new();
        for node in &self.full_nodes {
            seen.extend(node.mempool.iter().copied());
        }
        seen.len()
    }
}

fn generate_pool(total: usize, rng: &mut ChaCha8Rng) -> Vec<TxId> {
    let mut pool = Vec::with_capacity(total);
    while pool.len() < total {
        let mut tx = [0u8; 32];
        rng.fill_bytes(&mut tx);
        // 256-bit ids collide with negligible probability, but the pool
        // must hold exactly `total` distinct entries
        if !pool.contains(&tx) {
            pool.push(tx);
        }
    }
    pool
}

/// Disjoint mutable borrows of initiator and partner out of the node list.
fn pair_mut(nodes: &mut [FullNode], a: usize, b: usize) -> (&mut FullNode, &mut FullNode) {
    debug_assert_ne!(a, b);
    if a < b {
        let (left, right) = nodes.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = nodes.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}
