//! namebase — name identity, reservation tables, and the rollout schedule
//!
//! Every name-indexed structure in the system is keyed by the 32-byte
//! name-hash, never by the name string. The reserved table pre-allocates
//! names claimable with an ownership proof during the claim period; the
//! lockup table lists top-site names gated behind the `icannlockup`
//! deployment once it activates.

use std::collections::BTreeMap;

use lazy_static::lazy_static;

use crate::consensus::{Network, NetworkParams};
use crate::types::{blake3_hash, Hash32};

pub const MAX_NAME_LEN: usize = 63;

/// Hash a raw name into the key of all name-indexed structures.
pub fn name_hash(name: &[u8]) -> Hash32 {
    blake3_hash(name)
}

/// Charset check: lower-case ASCII letters, digits, hyphen and underscore,
/// no leading or trailing hyphen, 1..=63 bytes.
pub fn is_valid_name(name: &[u8]) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return false;
    }
    if name[0] == b'-' || name[name.len() - 1] == b'-' {
        return false;
    }
    name.iter().all(|c| matches!(c, b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_'))
}

/// A pre-allocated name: claimable via ownership proof while the claim
/// period runs. `position` is the name's one-shot bitfield slot.
#[derive(Debug, Clone)]
pub struct ReservedNameInfo {
    pub name: &'static str,
    pub value: u64,
    pub position: u32,
}

/// A one-shot airdrop slot (no name attached). `position` lives in the
/// bitfield after the reserved-name slots.
#[derive(Debug, Clone)]
pub struct AirdropEntry {
    pub position: u32,
    pub value: u64,
}

/// Static name tables for one network.
pub struct NameTables {
    reserved_by_hash: BTreeMap<Hash32, ReservedNameInfo>,
    lockup_by_hash: BTreeMap<Hash32, &'static str>,
    airdrops: Vec<AirdropEntry>,
    airdrop_base: u32,
}

impl NameTables {
    fn build(
        reserved: &[(&'static str, u64)],
        lockup: &[&'static str],
        airdrop_values: &[u64],
    ) -> Self {
        let mut reserved_by_hash = BTreeMap::new();
        for (position, (name, value)) in reserved.iter().enumerate() {
            reserved_by_hash.insert(
                name_hash(name.as_bytes()),
                ReservedNameInfo { name, value: *value, position: position as u32 },
            );
        }
        let mut lockup_by_hash = BTreeMap::new();
        for name in lockup {
            lockup_by_hash.insert(name_hash(name.as_bytes()), *name);
        }
        let airdrop_base = reserved.len() as u32;
        let airdrops = airdrop_values
            .iter()
            .enumerate()
            .map(|(i, value)| AirdropEntry { position: airdrop_base + i as u32, value: *value })
            .collect();
        Self { reserved_by_hash, lockup_by_hash, airdrops, airdrop_base }
    }

    pub fn reserved(&self, nh: &Hash32) -> Option<&ReservedNameInfo> {
        self.reserved_by_hash.get(nh)
    }

    pub fn reserved_count(&self) -> u32 {
        self.airdrop_base
    }

    pub fn airdrop(&self, position: u32) -> Option<&AirdropEntry> {
        if position < self.airdrop_base {
            return None;
        }
        self.airdrops.get((position - self.airdrop_base) as usize)
    }

    pub fn is_locked_up(&self, nh: &Hash32) -> bool {
        self.lockup_by_hash.contains_key(nh)
    }
}

// Trimmed sample of the production tables; the full lists ship as build
// artifacts in the release pipeline.
static MAINNET_RESERVED: &[(&str, u64)] = &[
    ("com", 50_000_000_000),
    ("org", 20_000_000_000),
    ("net", 20_000_000_000),
    ("io", 10_000_000_000),
    ("gov", 10_000_000_000),
    ("edu", 10_000_000_000),
    ("mil", 5_000_000_000),
    ("info", 5_000_000_000),
    ("xyz", 2_000_000_000),
    ("app", 2_000_000_000),
    ("dev", 2_000_000_000),
    ("cloud", 1_000_000_000),
    ("mail", 1_000_000_000),
    ("search", 1_000_000_000),
    ("wiki", 1_000_000_000),
    ("shop", 1_000_000_000),
];

static MAINNET_LOCKUP: &[&str] = &[
    "google", "youtube", "facebook", "baidu", "wikipedia", "twitter", "instagram", "amazon",
    "yahoo", "reddit", "netflix", "linkedin", "office", "whatsapp", "github", "zoom",
];

static MAINNET_AIRDROPS: &[u64] = &[
    4_246_894_314,
    4_246_894_314,
    2_500_000_000,
    2_500_000_000,
];

static REGTEST_RESERVED: &[(&str, u64)] = &[
    ("testreserved", 5_000_000_000),
    ("claimable", 4_000_000_000),
    ("weakclaim", 3_000_000_000),
];

static REGTEST_LOCKUP: &[&str] = &["lockedup", "popularsite"];

static REGTEST_AIRDROPS: &[u64] = &[4_246_894_314, 1_000_000_000];

lazy_static! {
    static ref MAINNET_TABLES: NameTables =
        NameTables::build(MAINNET_RESERVED, MAINNET_LOCKUP, MAINNET_AIRDROPS);
    static ref TESTNET_TABLES: NameTables =
        NameTables::build(REGTEST_RESERVED, REGTEST_LOCKUP, REGTEST_AIRDROPS);
    static ref REGTEST_TABLES: NameTables =
        NameTables::build(REGTEST_RESERVED, REGTEST_LOCKUP, REGTEST_AIRDROPS);
}

pub fn tables(network: Network) -> &'static NameTables {
    match network {
        Network::Mainnet => &MAINNET_TABLES,
        Network::Testnet => &TESTNET_TABLES,
        Network::Regtest => &REGTEST_TABLES,
    }
}

/// Is the name still pre-allocated at `height`? Reservation lapses when the
/// claim period ends.
pub fn is_reserved(net: &NetworkParams, nh: &Hash32, height: u32) -> bool {
    if height >= net.claim_period {
        return false;
    }
    tables(net.network).reserved(nh).is_some()
}

/// Is the name on the top-site lockup list? Only binding while the
/// `icannlockup` deployment is ACTIVE; the caller owns that gate.
pub fn is_locked_up(net: &NetworkParams, nh: &Hash32, _height: u32) -> bool {
    tables(net.network).is_locked_up(nh)
}

/// Height at which the name's weekly tranche opens.
pub fn rollout_height(net: &NetworkParams, nh: &Hash32) -> u32 {
    if net.rollout_interval == 0 {
        return 0;
    }
    let week = u32::from_le_bytes([nh[0], nh[1], nh[2], nh[3]]) % 52;
    week * net.rollout_interval
}

/// Whether the name's tranche has opened yet.
pub fn has_rollout(net: &NetworkParams, nh: &Hash32, height: u32) -> bool {
    height >= rollout_height(net, nh)
}

#[cfg(test)]
mod namebase_tests {
    use super::*;
    use crate::consensus::NetworkParams;

    #[test]
    fn name_validity_rules() {
        assert!(is_valid_name(b"abcd"));
        assert!(is_valid_name(b"a-b_c9"));
        assert!(!is_valid_name(b""));
        assert!(!is_valid_name(b"-abc"));
        assert!(!is_valid_name(b"abc-"));
        assert!(!is_valid_name(b"ABC"));
        assert!(!is_valid_name(&[b'a'; MAX_NAME_LEN + 1]));
    }

    #[test]
    fn reserved_lapses_after_claim_period() {
        let net = NetworkParams::regtest();
        let nh = name_hash(b"testreserved");
        assert!(is_reserved(&net, &nh, 0));
        assert!(is_reserved(&net, &nh, net.claim_period - 1));
        assert!(!is_reserved(&net, &nh, net.claim_period));
        assert!(!is_reserved(&net, &name_hash(b"unreserved"), 0));
    }

    #[test]
    fn airdrop_positions_follow_reserved_slots() {
        let t = tables(Network::Regtest);
        let base = t.reserved_count();
        assert_eq!(t.airdrop(base).map(|a| a.value), Some(4_246_894_314));
        assert!(t.airdrop(0).is_none());
        assert!(t.airdrop(base + 99).is_none());
    }

    #[test]
    fn rollout_tranches_spread_over_weeks() {
        let mut net = NetworkParams::regtest();
        net.rollout_interval = 10;
        let nh = name_hash(b"abcd");
        let week = u32::from_le_bytes([nh[0], nh[1], nh[2], nh[3]]) % 52;
        assert_eq!(rollout_height(&net, &nh), week * 10);
        assert!(has_rollout(&net, &nh, week * 10));
        if week > 0 {
            assert!(!has_rollout(&net, &nh, week * 10 - 1));
        }

        // disabled rollout opens everything immediately
        net.rollout_interval = 0;
        assert!(has_rollout(&net, &nh, 0));
    }
}
