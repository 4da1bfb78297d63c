// src/bin/main.rs
use mempool_gossip_sim::{MemoryCollector, SimConfig, Simulator};

fn main() {
    let config = match std::env::args().nth(1) {
        Some(path) => match SimConfig::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Config error: {}", e);
                std::process::exit(1);
            }
        },
        None => SimConfig::default(),
    };

    println!("Mempool Gossip Simulator");
    println!("========================");
    println!("Starting simulation with:");
    println!("- {} bootstrap nodes", config.bootstrap_nodes);
    println!(
        "- {} full nodes ({} byzantine, {} rational)",
        config.full_nodes, config.byzantine_nodes, config.rational_nodes
    );
    println!("- {} global transactions", config.tx_total);
    println!("- {} epochs", config.epochs);
    println!("- {} mempool size", config.mempool_size);

    let mut simulator = match Simulator::new(config) {
        Ok(simulator) => simulator,
        Err(e) => {
            eprintln!("Setup error: {}", e);
            std::process::exit(1);
        }
    };

    let mut collector = MemoryCollector::new();
    match simulator.run(&mut collector) {
        Ok(summary) => {
            println!("\nDone simulation");
            println!(
                "- {} unique transactions known network-wide",
                summary.unique_txs
            );
            println!(
                "- mempool sizes between {} and {}",
                summary.min_mempool, summary.max_mempool
            );
            println!(
                "- {} exchange attempts, {} aborted",
                summary.total_attempts, summary.total_aborts
            );
        }
        Err(e) => {
            eprintln!("Simulation error: {}", e);
            std::process::exit(1);
        }
    }
}
