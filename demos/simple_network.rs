// demos/simple_network.rs
//
// Narrated walkthrough: a small network with one misbehaving node, showing
// membership snapshots, exchange traffic, and the ban/redemption cycle.
use mempool_gossip_sim::{Behavior, ExchangeType, MemoryCollector, SimConfig, Simulator};

fn main() {
    println!("🚀 Starting Mempool Gossip Network");
    println!("==================================");
    println!("Topology: every node subscribes to every bootstrap node");
    println!("- 7 altruistic full nodes");
    println!("- 1 always-defecting Byzantine full node\n");

    let config = SimConfig {
        seed: 7,
        epochs: 8,
        pow_difficulty: 2,
        bootstrap_nodes: 2,
        full_nodes: 8,
        byzantine_nodes: 1,
        rational_nodes: 0,
        byzantine_level: 1.0,
        subscriptions: 2,
        tx_total: 200,
        mempool_size: 40,
        max_bal: 5,
        max_opt: 3,
    };

    let mut simulator = Simulator::new(config).expect("valid demo configuration");
    let mut collector = MemoryCollector::new();
    let summary = simulator.run(&mut collector).expect("demo run");

    for epoch in 0..summary.epochs {
        let (bal, opt, abort) = collector.type_totals(epoch);
        let byzantine = collector
            .epoch_exchanges(epoch)
            .filter(|r| r.behavior == Behavior::Byzantine)
            .count();
        let sizes = &collector.mempool_sizes[&epoch];
        let spread = (
            sizes.values().min().copied().unwrap_or(0),
            sizes.values().max().copied().unwrap_or(0),
        );

        println!("📋 Epoch {}", epoch);
        for (bootstrap, peers) in &collector.peer_lists[&epoch] {
            println!("  Bootstrap {} admits {} peers: {:?}", bootstrap, peers.len(), peers);
        }
        println!(
            "  {} balanced, {} optimistic, {} aborted ({} byzantine)",
            bal, opt, abort, byzantine
        );
        println!("  mempool sizes {}..{}", spread.0, spread.1);
    }

    println!("\n✨ Done: {} unique transactions propagated", summary.unique_txs);
    println!(
        "   {} attempts total, {} aborted",
        summary.total_attempts, summary.total_aborts
    );

    // The defector cycles through accusation, ban, proof-of-work, and
    // redemption at each bootstrap node it subscribes to.
    let node0_present: Vec<bool> = (0..summary.epochs)
        .map(|epoch| collector.peer_lists[&epoch].values().any(|p| p.contains(&0)))
        .collect();
    println!("   node 0 admitted per epoch: {:?}", node0_present);

    let committed_aborts = collector
        .exchanges
        .iter()
        .filter(|r| r.exchange == ExchangeType::Abort && r.behavior == Behavior::Protocol)
        .count();
    println!("   {} protocol-level aborts (nothing to trade)", committed_aborts);
}
