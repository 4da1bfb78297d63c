// tests/exchange_test.rs
use std::collections::BTreeSet;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use mempool_gossip_sim::*;

fn rng() -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(99)
}

fn tx(n: u8) -> TxId {
    [n; 32]
}

fn tx_set(ids: &[u8]) -> BTreeSet<TxId> {
    ids.iter().map(|&n| tx(n)).collect()
}

fn node(id: NodeId, nature: Nature) -> FullNode {
    // max_bal 5, max_opt 3 throughout
    FullNode::new(id, 5, 3, nature, 0.0)
}

fn node_with_mempool(id: NodeId, nature: Nature, ids: &[u8]) -> FullNode {
    let mut node = node(id, nature);
    node.set_mempool(tx_set(ids));
    node
}

/// Token whose modulo reduction yields `value` for any small peer list.
fn token_with(value: u8) -> Token {
    let mut token = [0u8; 32];
    token[15] = value;
    token
}

#[test]
fn test_exchange_type_table() {
    let altruistic = node(0, Nature::Altruistic);

    // both sides at or above max_bal: capped balanced trade
    assert_eq!(altruistic.select_exchange_type(5, 5), (ExchangeType::Bal, 5));
    assert_eq!(altruistic.select_exchange_type(9, 7), (ExchangeType::Bal, 5));
    // equal reciprocal sizes below the cap
    assert_eq!(altruistic.select_exchange_type(3, 3), (ExchangeType::Bal, 3));
    // bounded by whichever side has less to trade
    assert_eq!(altruistic.select_exchange_type(2, 4), (ExchangeType::Bal, 2));
    assert_eq!(altruistic.select_exchange_type(4, 2), (ExchangeType::Bal, 2));
    // nothing to share either way
    assert_eq!(altruistic.select_exchange_type(0, 0), (ExchangeType::Abort, 0));
    // one-sided surplus: altruists give, everyone else walks away
    assert_eq!(altruistic.select_exchange_type(0, 4), (ExchangeType::OptOne, 3));
    let rational = node(1, Nature::Rational);
    assert_eq!(rational.select_exchange_type(0, 4), (ExchangeType::Abort, 0));
    let byzantine = node(2, Nature::Byzantine);
    assert_eq!(byzantine.select_exchange_type(0, 4), (ExchangeType::Abort, 0));
    // one-sided deficit: anyone may ask for altruism
    assert_eq!(rational.select_exchange_type(4, 0), (ExchangeType::OptTwo, 3));

    println!("✓ Exchange-type decision table holds");
}

#[test]
fn test_balanced_exchange_moves_count_both_ways() {
    let mut rng = rng();
    // 4 shared, initiator has 3 exclusive, partner has 2 exclusive
    let mut initiator = node_with_mempool(0, Nature::Altruistic, &[1, 2, 3, 4, 10, 11, 12]);
    let mut partner = node_with_mempool(1, Nature::Altruistic, &[1, 2, 3, 4, 20, 21]);

    let result = initiator.exchange_with(&mut partner, &mut rng);

    // needed = 2, promised = 3: balanced trade of 2 each way
    assert_eq!(result.exchange, ExchangeType::Bal);
    assert_eq!(result.duplicates, Some(0));
    assert_eq!(result.partner_duplicates, Some(0));
    assert_eq!(result.mempool_size, Some(9));
    assert_eq!(result.partner_mempool_size, Some(8));
    assert_eq!(initiator.mempool.len(), 9);
    assert_eq!(partner.mempool.len(), 8);

    println!("✓ Balanced exchange transfers the same count both ways");
}

#[test]
fn test_identical_mempools_abort() {
    let mut rng = rng();
    let mut initiator = node_with_mempool(0, Nature::Altruistic, &[1, 2, 3]);
    let mut partner = node_with_mempool(1, Nature::Altruistic, &[1, 2, 3]);

    let result = initiator.exchange_with(&mut partner, &mut rng);

    assert_eq!(result.exchange, ExchangeType::Abort);
    assert_eq!(result.duplicates, None);
    assert_eq!(result.partner_duplicates, None);
    // live sizes are reported unchanged
    assert_eq!(result.mempool_size, Some(3));
    assert_eq!(result.partner_mempool_size, Some(3));

    println!("✓ Nothing to trade aborts with sentinel duplicates");
}

#[test]
fn test_opt_one_gives_without_receiving() {
    let mut rng = rng();
    // partner's snapshot is a strict subset: needed = 0, promised = 5
    let mut initiator = node_with_mempool(0, Nature::Altruistic, &[1, 2, 3, 4, 5, 6, 7]);
    let mut partner = node_with_mempool(1, Nature::Altruistic, &[1, 2]);

    let result = initiator.exchange_with(&mut partner, &mut rng);

    assert_eq!(result.exchange, ExchangeType::OptOne);
    // surplus above max_opt is sampled down to 3
    assert_eq!(result.partner_mempool_size, Some(5));
    assert_eq!(result.mempool_size, Some(7));
    assert_eq!(result.duplicates, Some(0));
    assert_eq!(partner.mempool.len(), 5);
    assert_eq!(initiator.mempool.len(), 7);

    println!("✓ OPT_ONE gives up to max_opt and receives nothing");
}

#[test]
fn test_opt_one_small_surplus_transfers_whole_set() {
    let mut rng = rng();
    let mut initiator = node_with_mempool(0, Nature::Altruistic, &[1, 2, 3, 4]);
    let mut partner = node_with_mempool(1, Nature::Altruistic, &[1, 2]);

    let result = initiator.exchange_with(&mut partner, &mut rng);

    // promised = 2 < max_opt: the whole surplus moves
    assert_eq!(result.exchange, ExchangeType::OptOne);
    assert_eq!(partner.mempool, tx_set(&[1, 2, 3, 4]));
    assert_eq!(result.partner_mempool_size, Some(4));

    println!("✓ OPT_ONE below the cap transfers the whole surplus");
}

#[test]
fn test_opt_two_requires_altruistic_partner() {
    let mut rng = rng();
    // initiator's snapshot is a strict subset: promised = 0, needed = 4
    let mut initiator = node_with_mempool(0, Nature::Rational, &[1, 2]);
    let mut altruist = node_with_mempool(1, Nature::Altruistic, &[1, 2, 3, 4, 5, 6]);

    let result = initiator.exchange_with(&mut altruist, &mut rng);
    assert_eq!(result.exchange, ExchangeType::OptTwo);
    // deficit above max_opt is sampled down to 3; the granter is unaffected
    assert_eq!(result.mempool_size, Some(5));
    assert_eq!(result.partner_mempool_size, Some(6));
    assert_eq!(result.partner_duplicates, Some(0));

    // a partner not configured for generosity turns the attempt into a no-op
    let mut initiator = node_with_mempool(0, Nature::Rational, &[1, 2]);
    let mut rational = node_with_mempool(1, Nature::Rational, &[1, 2, 3, 4, 5, 6]);

    let result = initiator.exchange_with(&mut rational, &mut rng);
    assert_eq!(result.exchange, ExchangeType::Abort);
    assert_eq!(result.duplicates, None);
    assert_eq!(result.partner_duplicates, None);
    assert_eq!(initiator.mempool.len(), 2);
    assert_eq!(rational.mempool.len(), 6);

    println!("✓ OPT_TWO commits only against an altruistic partner");
}

#[test]
fn test_duplicates_from_stale_snapshot() {
    let mut rng = rng();
    let mut initiator = node_with_mempool(0, Nature::Altruistic, &[1]);
    // the live mempool already absorbed tx 8 earlier in the epoch; the
    // frozen snapshot negotiating this exchange has not seen it
    initiator.mempool.insert(tx(8));
    let mut partner = node_with_mempool(1, Nature::Altruistic, &[1, 8, 9]);

    let result = initiator.exchange_with(&mut partner, &mut rng);

    // needed = {8, 9} under max_opt, so both transfer; 8 is a duplicate
    assert_eq!(result.exchange, ExchangeType::OptTwo);
    assert_eq!(result.duplicates, Some(1));
    assert_eq!(result.mempool_size, Some(3));

    println!("✓ Stale snapshots produce counted duplicates");
}

#[test]
fn test_add_to_mempool_counts_duplicates() {
    let mut node = node_with_mempool(0, Nature::Altruistic, &[1, 2, 3]);

    let (duplicates, size) = node.add_to_mempool(&[tx(2), tx(3), tx(4), tx(5)]);

    assert_eq!(duplicates, 2);
    assert_eq!(size, 5);

    println!("✓ add_to_mempool reports (duplicates, resulting size)");
}

#[test]
fn test_pow_timer_timelines() {
    for difficulty in 1..=3u32 {
        let mut banned = node(0, Nature::Byzantine);
        assert_eq!(banned.banned_since, None);

        // first failed attempt starts the counter at 0
        assert!(banned.tick_pow(difficulty));
        assert_eq!(banned.banned_since, Some(0));

        // serving: one tick per failed attempt until the counter would
        // reach the difficulty
        for _ in 1..difficulty {
            assert!(banned.tick_pow(difficulty));
        }
        assert!(!banned.tick_pow(difficulty), "difficulty {}", difficulty);
        assert_eq!(banned.banned_since, None);

        // a later ban starts a fresh sentence
        assert!(banned.tick_pow(difficulty));
        assert_eq!(banned.banned_since, Some(0));
    }

    println!("✓ PoW timer serves exactly difficulty+1 failed attempts");
}

#[test]
fn test_defection_draws() {
    let mut rng = rng();

    let mut always = node(0, Nature::Byzantine);
    always.byzantine_level = 1.0;
    let mut never = node(1, Nature::Byzantine);
    never.byzantine_level = 0.0;
    let altruist = node(2, Nature::Altruistic);

    for _ in 0..100 {
        assert!(always.will_defect(&mut rng));
        assert!(!never.will_defect(&mut rng));
        assert!(!altruist.will_defect(&mut rng));
    }

    println!("✓ Defection draws follow the byzantine level and nature");
}

#[test]
fn test_token_issuance_gates_on_membership() {
    let mut rng = rng();
    let mut bootstrap = BootstrapNode::new(0);
    bootstrap.admit(3);
    bootstrap.admit(7);

    assert!(bootstrap.issue_token(3, &mut rng).is_some());
    // a node holding no registry slot gets the absence signal, not an error
    assert!(bootstrap.issue_token(5, &mut rng).is_none());

    println!("✓ Tokens are only issued to admitted peers");
}

#[test]
fn test_partner_resolution_advances_past_self() {
    let mut bootstrap = BootstrapNode::new(0);
    for id in [10, 20, 30] {
        bootstrap.admit(id);
    }

    // index 0 names the requester: deterministically advance one slot
    let partner = bootstrap.resolve_partner(&token_with(0), 10, 0).unwrap();
    assert_eq!(partner, 20);
    // index 1 resolves cleanly
    let partner = bootstrap.resolve_partner(&token_with(1), 10, 0).unwrap();
    assert_eq!(partner, 20);
    // wrap-around: last slot names the requester
    let partner = bootstrap.resolve_partner(&token_with(2), 30, 0).unwrap();
    assert_eq!(partner, 10);

    println!("✓ Self-hits advance to the next registry slot");
}

#[test]
fn test_partner_resolution_never_returns_requester() {
    let mut rng = rng();
    let mut bootstrap = BootstrapNode::new(0);
    for id in 0..5 {
        bootstrap.admit(id);
    }

    for _ in 0..10_000 {
        let token = bootstrap.issue_token(3, &mut rng).unwrap();
        let partner = bootstrap.resolve_partner(&token, 3, 0).unwrap();
        assert_ne!(partner, 3);
    }

    println!("✓ 10,000 random tokens never self-pair");
}

#[test]
fn test_partner_resolution_fatal_cases() {
    let bootstrap = BootstrapNode::new(0);
    let result = bootstrap.resolve_partner(&token_with(0), 1, 4);
    assert!(matches!(
        result,
        Err(SimError::UnpairablePeerList { bootstrap: 0, node: 1, epoch: 4, peers: 0 })
    ));

    let mut lonely = BootstrapNode::new(1);
    lonely.admit(9);
    assert!(matches!(
        lonely.resolve_partner(&token_with(0), 9, 2),
        Err(SimError::UnpairablePeerList { peers: 1, .. })
    ));

    // a double-admitted requester defeats the advance; that is a defect,
    // not something to silently correct
    let mut doubled = BootstrapNode::new(2);
    doubled.admit(6);
    doubled.admit(6);
    assert!(matches!(
        doubled.resolve_partner(&token_with(0), 6, 3),
        Err(SimError::SelfPartner { bootstrap: 2, node: 6, epoch: 3 })
    ));

    println!("✓ Unpairable registries fail fatally with context");
}

#[test]
fn test_membership_reconciliation_order() {
    let mut bootstrap = BootstrapNode::new(0);
    for id in [5, 2, 9] {
        bootstrap.admit(id);
    }

    // accusations in epoch 0 take effect at epoch 1, never immediately
    bootstrap.record_misbehavior(0, 5);
    bootstrap.record_misbehavior(0, 5); // no deduplication
    assert_eq!(bootstrap.poms[&0], vec![5, 5]);

    bootstrap.remove_accused(0);
    assert_eq!(bootstrap.peers, vec![2, 5, 9]);

    bootstrap.remove_accused(1);
    assert_eq!(bootstrap.peers, vec![2, 9]);

    // redeemed peers merge after the sort and sit at the tail until the
    // next epoch's enforcement pass
    bootstrap.queue_redemption(1);
    bootstrap.admit_redeemed();
    assert_eq!(bootstrap.peers, vec![2, 9, 1]);
    assert!(bootstrap.next_epoch_peers.is_empty());

    bootstrap.remove_accused(2);
    assert_eq!(bootstrap.peers, vec![1, 2, 9]);

    println!("✓ Ban enforcement and redemption keep the registry consistent");
}

#[test]
fn test_config_validation() {
    assert!(SimConfig::default().validate().is_ok());

    let mut config = SimConfig::default();
    config.byzantine_nodes = 15;
    config.rational_nodes = 10;
    assert!(matches!(config.validate(), Err(SimError::InvalidConfig(_))));

    let mut config = SimConfig::default();
    config.subscriptions = 9;
    assert!(config.validate().is_err());

    let mut config = SimConfig::default();
    config.mempool_size = config.tx_total + 1;
    assert!(config.validate().is_err());

    let mut config = SimConfig::default();
    config.byzantine_level = 1.5;
    assert!(config.validate().is_err());

    let mut config = SimConfig::default();
    config.full_nodes = 1;
    config.byzantine_nodes = 0;
    config.rational_nodes = 0;
    assert!(config.validate().is_err());

    let mut config = SimConfig::default();
    config.pow_difficulty = 0;
    assert!(config.validate().is_err());

    println!("✓ Config validation rejects unrunnable populations");
}
