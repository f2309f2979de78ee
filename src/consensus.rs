//! consensus.rs — network parameters and header-level PoW/time rules

use crate::softfork::Deployment;
use crate::types::{leading_zero_bits, Hash32};

/// Which parameter set a chain instance runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
        }
    }
}

/// Consensus parameters for one network. Every rule the covenant system
/// applies is parameterized here; nothing reads globals.
#[derive(Debug, Clone)]
pub struct NetworkParams {
    pub network: Network,
    /// Wire/commitment magic, embedded in ownership proofs.
    pub magic: u32,

    // PoW & header rules
    /// Required number of leading zero bits in the header hash.
    pub target_bits: u16,
    /// Reject blocks whose timestamp is more than this far in the future.
    pub max_future_secs: u64,
    /// Median-time-past window (blocks).
    pub median_window: usize,

    // money
    pub base_subsidy: u64,
    pub halving_interval: u32,
    pub coinbase_maturity: u32,

    // name system timing (all in blocks)
    /// Cadence of authenticated name-tree commits; also the OPENING length.
    pub tree_interval: u32,
    pub bidding_period: u32,
    pub reveal_period: u32,
    /// A name expires when this many blocks pass beyond its renewal anchor.
    pub renewal_window: u32,
    /// TRANSFER must age this many blocks before FINALIZE.
    pub transfer_lockup: u32,
    /// Reserved names are claimable until this height; afterwards they fall
    /// back to ordinary auctions.
    pub claim_period: u32,
    /// Spacing of the 52 weekly rollout tranches.
    pub rollout_interval: u32,

    // soft-fork signaling
    pub miner_window: u32,
    pub activation_threshold: u32,
    pub deployments: Vec<Deployment>,

    // node policy
    pub max_reorg: u32,
    /// One bit per reserved-name/airdrop slot; fixed per network.
    pub bitfield_size: u32,
}

impl NetworkParams {
    pub fn mainnet() -> Self {
        Self {
            network: Network::Mainnet,
            magic: 0x4e4c_4d31, // "NLM1"
            target_bits: 24,
            max_future_secs: 2 * 60 * 60,
            median_window: 11,
            base_subsidy: 2_000 * 1_000_000,
            halving_interval: 170_000,
            coinbase_maturity: 100,
            tree_interval: 36,
            bidding_period: 720,
            reveal_period: 1_440,
            renewal_window: 105_120,
            transfer_lockup: 288,
            claim_period: 210_240,
            rollout_interval: 1_008,
            miner_window: 2_016,
            activation_threshold: 1_916,
            deployments: vec![Deployment {
                name: "icannlockup",
                bit: 0,
                start_time: 1_772_150_400,
                timeout: 1_835_222_400,
            }],
            max_reorg: 288,
            bitfield_size: 8_192,
        }
    }

    pub fn testnet() -> Self {
        Self {
            network: Network::Testnet,
            magic: 0x4e4c_5431, // "NLT1"
            target_bits: 16,
            max_future_secs: 2 * 60 * 60,
            median_window: 11,
            base_subsidy: 2_000 * 1_000_000,
            halving_interval: 170_000,
            coinbase_maturity: 6,
            tree_interval: 18,
            bidding_period: 50,
            reveal_period: 100,
            renewal_window: 10_000,
            transfer_lockup: 32,
            claim_period: 50_000,
            rollout_interval: 144,
            miner_window: 144,
            activation_threshold: 108,
            deployments: vec![Deployment {
                name: "icannlockup",
                bit: 0,
                start_time: 0,
                timeout: u64::MAX,
            }],
            max_reorg: 1_000,
            bitfield_size: 8_192,
        }
    }

    /// Short windows so integration tests run in tens of blocks. PoW is
    /// disabled (zero target bits).
    pub fn regtest() -> Self {
        Self {
            network: Network::Regtest,
            magic: 0x4e4c_5231, // "NLR1"
            target_bits: 0,
            max_future_secs: 24 * 60 * 60,
            median_window: 11,
            base_subsidy: 2_000 * 1_000_000,
            halving_interval: 2_500,
            coinbase_maturity: 2,
            tree_interval: 4,
            bidding_period: 4,
            reveal_period: 6,
            renewal_window: 200,
            transfer_lockup: 4,
            claim_period: 100,
            // tranches disabled so auction tests can open any name at once
            rollout_interval: 0,
            miner_window: 8,
            activation_threshold: 6,
            deployments: vec![Deployment {
                name: "icannlockup",
                bit: 0,
                start_time: 0,
                timeout: u64::MAX,
            }],
            max_reorg: 1_000,
            bitfield_size: 64,
        }
    }

    pub fn deployment(&self, name: &str) -> Option<&Deployment> {
        self.deployments.iter().find(|d| d.name == name)
    }

    /// Block subsidy at a height: geometric halving, flooring to zero once
    /// the shift exhausts the base amount.
    pub fn subsidy(&self, height: u32) -> u64 {
        let halvings = height / self.halving_interval;
        if halvings >= 63 {
            return 0;
        }
        self.base_subsidy >> halvings
    }

    /// End of the OPENING phase relative to an auction's start height.
    pub fn open_period(&self) -> u32 {
        self.tree_interval
    }
}

/// Return true if the hash meets the required leading-zero bits.
pub fn meets_target(hash: &Hash32, target_bits: u16) -> bool {
    leading_zero_bits(hash) >= target_bits
}

/// Work one block contributes to the chain: 2^target_bits. Derived from the
/// network target, never from the hash itself, so fork choice is identical
/// on every node.
pub fn block_work(target_bits: u16) -> u128 {
    1u128 << target_bits.min(120)
}

/// Median of a slice of timestamps (seconds).
pub fn median_u64(ts: &[u64]) -> u64 {
    let mut v = ts.to_vec();
    v.sort_unstable();
    let n = v.len();
    if n == 0 {
        return 0;
    }
    if n % 2 == 1 {
        v[n / 2]
    } else {
        (v[n / 2 - 1] / 2) + (v[n / 2] / 2)
    }
}

/// Validate header timestamp against future skew and median past time.
pub fn validate_time_rules(
    new_ts: u64,
    tip_ts: u64,
    recent_ts: &[u64],
    now_secs: u64,
    params: &NetworkParams,
) -> Result<(), String> {
    if new_ts > now_secs.saturating_add(params.max_future_secs) {
        return Err("block timestamp too far in the future".into());
    }
    if params.median_window > 0 && !recent_ts.is_empty() {
        let med = median_u64(recent_ts);
        if new_ts <= med {
            return Err("block timestamp not greater than median of recent".into());
        }
    } else if new_ts <= tip_ts {
        return Err("block timestamp must be > tip timestamp".into());
    }
    Ok(())
}
