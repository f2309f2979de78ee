//! metrics.rs — Prometheus counters/gauges for the consensus core

use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntGauge, Registry};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

fn counter(name: &str, help: &str) -> IntCounter {
    let c = IntCounter::new(name, help).expect("counter opts");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
}

fn gauge(name: &str, help: &str) -> IntGauge {
    let g = IntGauge::new(name, help).expect("gauge opts");
    REGISTRY.register(Box::new(g.clone())).ok();
    g
}

pub static PROM_NAMELAND_BLOCKS_CONNECTED: Lazy<IntCounter> =
    Lazy::new(|| counter("nameland_blocks_connected_total", "Blocks connected to the main chain"));

pub static PROM_NAMELAND_BLOCKS_DISCONNECTED: Lazy<IntCounter> = Lazy::new(|| {
    counter("nameland_blocks_disconnected_total", "Blocks disconnected during reorganization")
});

pub static PROM_NAMELAND_REORGS: Lazy<IntCounter> =
    Lazy::new(|| counter("nameland_reorgs_total", "Chain reorganizations performed"));

pub static PROM_NAMELAND_SIDE_BLOCKS: Lazy<IntGauge> =
    Lazy::new(|| gauge("nameland_side_blocks", "Blocks tracked off the main chain"));

pub static PROM_NAMELAND_AUCTIONS_OPENED: Lazy<IntCounter> =
    Lazy::new(|| counter("nameland_auctions_opened_total", "Name auctions opened"));

pub static PROM_NAMELAND_NAMES_REGISTERED: Lazy<IntCounter> =
    Lazy::new(|| counter("nameland_names_registered_total", "Names registered"));

pub static PROM_NAMELAND_NAMES_EXPIRED: Lazy<IntCounter> =
    Lazy::new(|| counter("nameland_names_expired_total", "Names expired by the renewal window"));

pub static PROM_NAMELAND_CLAIMS_CONSUMED: Lazy<IntCounter> =
    Lazy::new(|| counter("nameland_claims_consumed_total", "One-shot claim inputs consumed"));

pub static PROM_NAMELAND_TREE_COMMITS: Lazy<IntCounter> =
    Lazy::new(|| counter("nameland_tree_commits_total", "Name-tree interval commits"));

pub static PROM_NAMELAND_HEIGHT: Lazy<IntGauge> =
    Lazy::new(|| gauge("nameland_chain_height", "Current main chain height"));
