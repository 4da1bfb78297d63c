use std::collections::BTreeMap;

use rand::RngCore;
use rand_chacha::ChaCha8Rng;

use crate::error::{Result, SimError};
use crate::{BootstrapId, Epoch, NodeId, Token};

/// A bootstrap node: membership gatekeeper and Byzantine accusation ledger
/// for one rendezvous point.
#[derive(Clone, Debug)]
pub struct BootstrapNode {
    pub id: BootstrapId,
    /// Currently admitted full nodes; the partner-selection universe.
    /// Re-sorted ascending at every ban-enforcement phase.
    pub peers: Vec<NodeId>,
    /// Nodes that finished their ban this epoch, admitted at the next
    /// epoch boundary
    pub next_epoch_peers: Vec<NodeId>,
    /// Epoch -> nodes accused of defecting during that epoch. Append-only
    /// within an epoch, immutable once it closes. No deduplication.
    pub poms: BTreeMap<Epoch, Vec<NodeId>>,
}

impl BootstrapNode {
    pub fn new(id: BootstrapId) -> Self {
        Self {
            id,
            peers: Vec::new(),
            next_epoch_peers: Vec::new(),
            poms: BTreeMap::new(),
        }
    }

    /// Appends to the registry. Callers must not double-admit.
    pub fn admit(&mut self, node: NodeId) {
        self.peers.push(node);
    }

    /// Issues a fresh 256-bit token, or `None` if `node` is not currently
    /// admitted. The absence is how a banned node discovers its ban.
    pub fn issue_token(&self, node: NodeId, rng: &mut ChaCha8Rng) -> Option<Token> {
        if !self.peers.contains(&node) {
            return None;
        }
        let mut token = [0u8; 32];
        rng.fill_bytes(&mut token);
        Some(token)
    }

    /// Maps a token to a partner id by modulo reduction over the registry.
    ///
    /// A self-hit advances to the next position. Fewer than two admitted
    /// peers, or an advance that still lands on the requester, are fatal:
    /// the configuration must keep every bootstrap node viable for pairing.
    pub fn resolve_partner(
        &self,
        token: &Token,
        requester: NodeId,
        epoch: Epoch,
    ) -> Result<NodeId> {
        if self.peers.len() < 2 {
            return Err(SimError::UnpairablePeerList {
                bootstrap: self.id,
                node: requester,
                epoch,
                peers: self.peers.len(),
            });
        }
        let mut index = (token_value(token) % self.peers.len() as u128) as usize;
        if self.peers[index] == requester {
            index = (index + 1) % self.peers.len();
        }
        let partner = self.peers[index];
        if partner == requester {
            return Err(SimError::SelfPartner {
                bootstrap: self.id,
                node: requester,
                epoch,
            });
        }
        Ok(partner)
    }

    /// Appends an accusation to the current epoch's proof-of-misbehavior
    /// ledger.
    pub fn record_misbehavior(&mut self, epoch: Epoch, node: NodeId) {
        self.poms.entry(epoch).or_default().push(node);
    }

    /// Queues a node whose ban lifted for re-admission at the next epoch
    /// boundary.
    pub fn queue_redemption(&mut self, node: NodeId) {
        self.next_epoch_peers.push(node);
    }

    /// Ban enforcement: drops every peer accused in the immediately
    /// preceding epoch, then re-sorts the registry. Bans take effect one
    /// full epoch after accusation, never immediately. Sorting keeps
    /// partner-index resolution reproducible for a given set of peers.
    pub fn remove_accused(&mut self, epoch: Epoch) {
        if let Some(prev) = epoch.checked_sub(1) {
            if let Some(accused) = self.poms.get(&prev) {
                self.peers.retain(|p| !accused.contains(p));
            }
        }
        self.peers.sort_unstable();
    }

    /// Redemption admission: merges the queue into the registry wholesale.
    /// Runs after the sort, so redeemed peers sit at the tail until the
    /// next epoch's enforcement pass folds them into order.
    pub fn admit_redeemed(&mut self) {
        let redeemed = std::mem::take(&mut self.next_epoch_peers);
        self.peers.extend(redeemed);
    }
}

fn token_value(token: &Token) -> u128 {
    let mut head = [0u8; 16];
    head.copy_from_slice(&token[..16]);
    u128::from_be_bytes(head)
}
