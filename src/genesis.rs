// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 NameLand Contributors

//! Deterministic genesis block per network.
//!
//! The genesis hash is persisted on first start and re-validated on every
//! subsequent open; a mismatch means database corruption or a database from
//! a different network, and the node must not continue.

use crate::bitfield::Bitfield;
use crate::consensus::NetworkParams;
use crate::covenant::Covenant;
use crate::types::{Address, Outpoint, ZERO_HASH};
use crate::{merkle_root, Block, BlockHeader, Input, Output, Tx};

/// Fixed genesis timestamp shared by every network.
pub const GENESIS_TIME: u64 = 1_700_000_000;

/// Build the genesis block for a network. Its coinbase pays nothing and its
/// header commits to the empty name tree and the all-zero bitfield.
pub fn genesis_block(net: &NetworkParams) -> Block {
    let coinbase = Tx {
        version: 0,
        inputs: vec![Input { prevout: Outpoint::null(), witness: Vec::new() }],
        outputs: vec![Output { value: 0, address: Address::burn(), covenant: Covenant::None }],
        locktime: 0,
    };
    let header = BlockHeader {
        version: 0,
        prev_hash: ZERO_HASH,
        merkle_root: merkle_root(&[coinbase.txid()]),
        tree_root: ZERO_HASH,
        bitfield_hash: Bitfield::new(net.bitfield_size).hash(),
        time: GENESIS_TIME,
        height: 0,
        nonce: 0,
    };
    Block { header, txs: vec![coinbase] }
}

#[cfg(test)]
mod genesis_tests {
    use super::*;

    #[test]
    fn genesis_is_deterministic_per_network() {
        let net = NetworkParams::regtest();
        assert_eq!(genesis_block(&net).hash(), genesis_block(&net).hash());
        // the bitfield size differs between networks, so the hash does too
        assert_ne!(
            genesis_block(&net).hash(),
            genesis_block(&NetworkParams::mainnet()).hash()
        );
    }

    #[test]
    fn genesis_commits_to_empty_structures() {
        let net = NetworkParams::regtest();
        let g = genesis_block(&net);
        assert_eq!(g.header.tree_root, ZERO_HASH);
        assert_eq!(g.header.bitfield_hash, Bitfield::new(net.bitfield_size).hash());
        assert!(g.txs[0].is_coinbase());
    }
}
