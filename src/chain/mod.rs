//! chain — the consensus core's chain state and persistence
//!
//! Single-writer: at most one connect/disconnect runs at a time, and every
//! per-block write lands in sled before the next block is considered. The
//! hot state (names, coins, bitfield, tree) is mirrored in memory and
//! reloaded from the database on startup.

pub mod accept;
pub mod scan;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sled::Db;
use tracing::info;

use crate::bitfield::Bitfield;
use crate::claims::{ProofVerifier, StaticVerifier};
use crate::consensus::{block_work, NetworkParams};
use crate::errors::NodeError;
use crate::events::EventBus;
use crate::genesis::genesis_block;
use crate::metrics::PROM_NAMELAND_HEIGHT;
use crate::namebase::name_hash;
use crate::namestate::{NameHash, NameState};
use crate::nametree::NameTree;
use crate::softfork::DeploymentCache;
use crate::types::{hex32, Hash32, Outpoint, ZERO_HASH};
use crate::{Block, BlockHeader, ChainEntry, Coin};

// --- storage keys ---

const META_HEIGHT: &str = "meta:height";
const META_GENESIS: &str = "meta:genesis";
const NAME_PREFIX: &str = "name:";
const UTXO_PREFIX: &str = "utxo:";
const UNDO_PREFIX: &str = "undo:";
const TROOT_PREFIX: &str = "troot:";
const TLEAF_PREFIX: &str = "tleaf:";
const BITFIELD_KEY: &str = "bfd";

fn blk_key(height: u32) -> String {
    format!("blk:{height:010}")
}

fn name_key(nh: &NameHash) -> String {
    format!("{NAME_PREFIX}{}", hex32(nh))
}

fn utxo_key(outpoint: &Outpoint) -> String {
    format!("{UTXO_PREFIX}{}:{:08x}", hex32(&outpoint.txid), outpoint.index)
}

fn undo_key(block_hash: &Hash32) -> String {
    format!("{UNDO_PREFIX}{}", hex32(block_hash))
}

fn troot_key(height: u32) -> String {
    format!("{TROOT_PREFIX}{height:010}")
}

fn tleaf_key(nh: &NameHash) -> String {
    format!("{TLEAF_PREFIX}{}", hex32(nh))
}

/// Everything needed to invert one block: prior name states, spent coins,
/// consumed bitfield slots, and (at boundary blocks) prior tree leaves.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockUndo {
    pub names: Vec<(NameHash, Option<NameState>)>,
    pub coins: Vec<(Outpoint, Coin)>,
    pub bits: Vec<u32>,
    pub tree: Vec<(NameHash, Option<Vec<u8>>)>,
}

pub struct Chain {
    pub net: NetworkParams,
    pub db: Db,

    /// Main chain, index == height.
    pub blocks: Vec<Block>,
    /// Header projection of `blocks`, for the deployment engine.
    pub headers: Vec<BlockHeader>,
    /// Cumulative work, index == height.
    pub chainwork: Vec<u128>,

    /// Committed name set.
    pub names: BTreeMap<NameHash, NameState>,
    /// Committed coin view.
    pub utxos: BTreeMap<Outpoint, Coin>,
    /// One-shot claim slots.
    pub bitfield: Bitfield,

    /// Authenticated name tree as of the last interval commit.
    pub tree: NameTree,
    /// Mirror of the committed tree leaves, diffed at each boundary.
    pub tree_leaves: BTreeMap<NameHash, Vec<u8>>,
    /// Committed roots by boundary height.
    pub tree_roots: BTreeMap<u32, Hash32>,

    pub deployments: DeploymentCache,

    /// Blocks off the main chain, by hash, with their cumulative work.
    pub side_blocks: BTreeMap<Hash32, Block>,
    pub side_work: BTreeMap<Hash32, u128>,
    pub seen_blocks: BTreeSet<Hash32>,

    pub events: EventBus,
    pub verifier: Arc<dyn ProofVerifier + Send + Sync>,
}

impl Chain {
    /// Open (or create) a chain database and load the hot state.
    pub fn init(path: &str, net: NetworkParams) -> Result<Self, NodeError> {
        Self::init_with_verifier(path, net, Arc::new(StaticVerifier::Accept))
    }

    pub fn init_with_verifier(
        path: &str,
        net: NetworkParams,
        verifier: Arc<dyn ProofVerifier + Send + Sync>,
    ) -> Result<Self, NodeError> {
        let db = sled::open(path)?;

        let mut chain = Self {
            bitfield: Bitfield::new(net.bitfield_size),
            net,
            db,
            blocks: Vec::new(),
            headers: Vec::new(),
            chainwork: Vec::new(),
            names: BTreeMap::new(),
            utxos: BTreeMap::new(),
            tree: NameTree::new(),
            tree_leaves: BTreeMap::new(),
            tree_roots: BTreeMap::new(),
            deployments: DeploymentCache::new(),
            side_blocks: BTreeMap::new(),
            side_work: BTreeMap::new(),
            seen_blocks: BTreeSet::new(),
            events: EventBus::default(),
            verifier,
        };
        chain.load()?;
        Ok(chain)
    }

    fn load(&mut self) -> Result<(), NodeError> {
        let genesis = genesis_block(&self.net);
        match self.db.get(META_GENESIS)? {
            None => {
                // fresh database: seed genesis
                self.db.insert(META_GENESIS, genesis.hash().to_vec())?;
                self.db.insert(blk_key(0).as_bytes(), serde_json::to_vec(&genesis).expect("genesis json"))?;
                self.db.insert(META_HEIGHT, 0u32.to_be_bytes().to_vec())?;
                self.db.insert(troot_key(0).as_bytes(), ZERO_HASH.to_vec())?;
                self.db.insert(BITFIELD_KEY, self.bitfield.as_bytes().to_vec())?;
                self.db.flush()?;
                info!(hash = %hex32(&genesis.hash()), "seeded genesis block");
            }
            Some(stored) => {
                if stored.as_ref() != genesis.hash().as_slice() {
                    return Err(NodeError::MissingData(format!(
                        "genesis mismatch: database carries {}, network {} expects {}",
                        hex::encode(stored),
                        self.net.network.as_str(),
                        hex32(&genesis.hash()),
                    )));
                }
            }
        }

        let tip = match self.db.get(META_HEIGHT)? {
            Some(v) if v.len() == 4 => u32::from_be_bytes([v[0], v[1], v[2], v[3]]),
            _ => 0,
        };
        for height in 0..=tip {
            let bytes = self
                .db
                .get(blk_key(height).as_bytes())?
                .ok_or_else(|| NodeError::MissingData(format!("block {height} absent from db")))?;
            let block: Block = serde_json::from_slice(&bytes)
                .map_err(|e| NodeError::MissingData(format!("block {height} corrupt: {e}")))?;
            let hash = block.hash();
            let work = self.chainwork.last().copied().unwrap_or(0);
            self.chainwork.push(work.saturating_add(block_work(self.net.target_bits)));
            self.seen_blocks.insert(hash);
            self.headers.push(block.header.clone());
            self.blocks.push(block);
        }

        for kv in self.db.scan_prefix(NAME_PREFIX.as_bytes()) {
            let (_, v) = kv?;
            let ns = NameState::decode(&v)
                .map_err(|e| NodeError::MissingData(format!("name state corrupt: {e}")))?;
            self.names.insert(ns.name_hash, ns);
        }

        for kv in self.db.scan_prefix(UTXO_PREFIX.as_bytes()) {
            let (_, v) = kv?;
            let (outpoint, coin): (Outpoint, Coin) = serde_json::from_slice(&v)
                .map_err(|e| NodeError::MissingData(format!("coin corrupt: {e}")))?;
            self.utxos.insert(outpoint, coin);
        }

        if let Some(bits) = self.db.get(BITFIELD_KEY)? {
            self.bitfield = Bitfield::from_bytes(bits.to_vec(), self.net.bitfield_size);
        }

        for kv in self.db.scan_prefix(TLEAF_PREFIX.as_bytes()) {
            let (_, v) = kv?;
            let (nh, leaf): (NameHash, Vec<u8>) = serde_json::from_slice(&v)
                .map_err(|e| NodeError::MissingData(format!("tree leaf corrupt: {e}")))?;
            self.tree.insert(nh, leaf.clone());
            self.tree_leaves.insert(nh, leaf);
        }

        for kv in self.db.scan_prefix(TROOT_PREFIX.as_bytes()) {
            let (k, v) = kv?;
            let key = String::from_utf8(k.to_vec())
                .map_err(|_| NodeError::MissingData("tree root key corrupt".into()))?;
            let height: u32 = key[TROOT_PREFIX.len()..]
                .parse()
                .map_err(|_| NodeError::MissingData("tree root key corrupt".into()))?;
            if v.len() != 32 {
                return Err(NodeError::MissingData("tree root value corrupt".into()));
            }
            let mut root = [0u8; 32];
            root.copy_from_slice(&v);
            self.tree_roots.insert(height, root);
        }

        PROM_NAMELAND_HEIGHT.set(self.height() as i64);
        Ok(())
    }

    pub fn flush(&self) -> Result<(), NodeError> {
        self.db.flush()?;
        Ok(())
    }

    // --- chain queries ---

    pub fn height(&self) -> u32 {
        (self.blocks.len() as u32).saturating_sub(1)
    }

    pub fn tip(&self) -> &Block {
        self.blocks.last().expect("chain always carries genesis")
    }

    pub fn tip_hash(&self) -> Hash32 {
        self.tip().hash()
    }

    pub fn entry_at(&self, height: u32) -> Option<ChainEntry> {
        let block = self.blocks.get(height as usize)?;
        Some(ChainEntry {
            hash: block.hash(),
            height,
            version: block.header.version,
            prev_hash: block.header.prev_hash,
            time: block.header.time,
            tree_root: block.header.tree_root,
            bitfield_hash: block.header.bitfield_hash,
            chainwork: self.chainwork.get(height as usize).copied().unwrap_or(0),
        })
    }

    pub fn tip_entry(&self) -> ChainEntry {
        self.entry_at(self.height()).expect("tip entry")
    }

    pub fn main_hash_at(&self, height: u32) -> Option<Hash32> {
        self.blocks.get(height as usize).map(|b| b.hash())
    }

    /// Whether an entry is on the current main chain.
    pub fn is_main_chain(&self, entry: &ChainEntry) -> bool {
        self.main_hash_at(entry.height) == Some(entry.hash)
    }

    // --- name queries ---

    pub fn get_name_state_by_hash(&self, nh: &NameHash) -> Option<NameState> {
        self.names.get(nh).cloned()
    }

    pub fn get_name_state_by_name(&self, name: &[u8]) -> Option<NameState> {
        self.get_name_state_by_hash(&name_hash(name))
    }

    /// Wallet-facing status: a null-stub when the name is unknown, so the
    /// caller can always read lifecycle fields.
    pub fn get_name_status(&self, nh: &NameHash) -> NameState {
        self.names.get(nh).cloned().unwrap_or_else(|| NameState::stub(*nh))
    }

    /// Read-only snapshot of the committed name set; never observes staged
    /// writes of a block mid-connect.
    pub fn name_states(&self) -> &BTreeMap<NameHash, NameState> {
        &self.names
    }

    /// The renewal anchor a REGISTER/RENEW/FINALIZE must embed when landing
    /// at `height`: the tree root from two intervals back, clamped to the
    /// genesis (empty) root.
    pub fn renewal_anchor_at(&self, height: u32) -> Hash32 {
        let h = height as i64 - 2 * self.net.tree_interval as i64;
        if h < 0 {
            return ZERO_HASH;
        }
        let h = h as u32;
        let boundary = h - h % self.net.tree_interval;
        self.tree_roots.get(&boundary).copied().unwrap_or(ZERO_HASH)
    }

    // --- persistence helpers used by the connector ---

    pub(crate) fn persist_block(&self, height: u32, block: &Block) -> Result<(), NodeError> {
        self.db
            .insert(blk_key(height).as_bytes(), serde_json::to_vec(block).expect("block json"))?;
        self.db.insert(META_HEIGHT, height.to_be_bytes().to_vec())?;
        Ok(())
    }

    pub(crate) fn drop_block_record(&self, height: u32) -> Result<(), NodeError> {
        self.db.remove(blk_key(height).as_bytes())?;
        self.db.insert(META_HEIGHT, height.saturating_sub(1).to_be_bytes().to_vec())?;
        Ok(())
    }

    pub(crate) fn persist_name(&self, ns: &NameState) -> Result<(), NodeError> {
        self.db.insert(name_key(&ns.name_hash).as_bytes(), ns.encode())?;
        Ok(())
    }

    pub(crate) fn remove_name(&self, nh: &NameHash) -> Result<(), NodeError> {
        self.db.remove(name_key(nh).as_bytes())?;
        Ok(())
    }

    pub(crate) fn persist_coin(&self, outpoint: &Outpoint, coin: &Coin) -> Result<(), NodeError> {
        let value = serde_json::to_vec(&(outpoint, coin)).expect("coin json");
        self.db.insert(utxo_key(outpoint).as_bytes(), value)?;
        Ok(())
    }

    pub(crate) fn remove_coin(&self, outpoint: &Outpoint) -> Result<(), NodeError> {
        self.db.remove(utxo_key(outpoint).as_bytes())?;
        Ok(())
    }

    pub(crate) fn persist_undo(&self, block_hash: &Hash32, undo: &BlockUndo) -> Result<(), NodeError> {
        self.db.insert(undo_key(block_hash).as_bytes(), serde_json::to_vec(undo).expect("undo json"))?;
        Ok(())
    }

    pub(crate) fn load_undo(&self, block_hash: &Hash32) -> Result<BlockUndo, NodeError> {
        let bytes = self.db.get(undo_key(block_hash).as_bytes())?.ok_or_else(|| {
            NodeError::MissingData(format!("undo for block {} absent", hex32(block_hash)))
        })?;
        serde_json::from_slice(&bytes)
            .map_err(|e| NodeError::MissingData(format!("undo corrupt: {e}")))
    }

    pub(crate) fn remove_undo(&self, block_hash: &Hash32) -> Result<(), NodeError> {
        self.db.remove(undo_key(block_hash).as_bytes())?;
        Ok(())
    }

    pub(crate) fn persist_bitfield(&self) -> Result<(), NodeError> {
        self.db.insert(BITFIELD_KEY, self.bitfield.as_bytes().to_vec())?;
        Ok(())
    }

    pub(crate) fn persist_tree_root(&self, height: u32, root: &Hash32) -> Result<(), NodeError> {
        self.db.insert(troot_key(height).as_bytes(), root.to_vec())?;
        Ok(())
    }

    pub(crate) fn remove_tree_root(&self, height: u32) -> Result<(), NodeError> {
        self.db.remove(troot_key(height).as_bytes())?;
        Ok(())
    }

    pub(crate) fn persist_tree_leaf(&self, nh: &NameHash, leaf: &[u8]) -> Result<(), NodeError> {
        let value = serde_json::to_vec(&(nh, leaf)).expect("leaf json");
        self.db.insert(tleaf_key(nh).as_bytes(), value)?;
        Ok(())
    }

    pub(crate) fn remove_tree_leaf(&self, nh: &NameHash) -> Result<(), NodeError> {
        self.db.remove(tleaf_key(nh).as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod chain_store_tests {
    use super::*;

    fn fresh(path: &std::path::Path) -> Chain {
        Chain::init(path.to_str().unwrap(), NetworkParams::regtest()).expect("init")
    }

    #[test]
    fn init_seeds_genesis_and_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let tip_hash = {
            let chain = fresh(dir.path());
            assert_eq!(chain.height(), 0);
            assert_eq!(chain.tip().header.height, 0);
            chain.flush().unwrap();
            chain.tip_hash()
        };
        let chain = fresh(dir.path());
        assert_eq!(chain.height(), 0);
        assert_eq!(chain.tip_hash(), tip_hash);
        assert_eq!(chain.tree_roots.get(&0), Some(&ZERO_HASH));
    }

    #[test]
    fn mismatched_network_database_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        {
            let chain = fresh(dir.path());
            chain.flush().unwrap();
        }
        let err = Chain::init(dir.path().to_str().unwrap(), NetworkParams::mainnet());
        assert!(matches!(err, Err(NodeError::MissingData(_))));
    }

    #[test]
    fn name_status_returns_stub_for_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let chain = fresh(dir.path());
        let nh = name_hash(b"ghost");
        let stub = chain.get_name_status(&nh);
        assert!(stub.is_null());
        assert_eq!(stub.name_hash, nh);
        assert!(chain.get_name_state_by_name(b"ghost").is_none());
        assert!(chain.name_states().is_empty());
    }

    #[test]
    fn tip_entry_is_on_the_main_chain() {
        let dir = tempfile::tempdir().unwrap();
        let chain = fresh(dir.path());
        let entry = chain.tip_entry();
        assert!(chain.is_main_chain(&entry));

        let mut off = entry.clone();
        off.hash = crate::types::blake3_hash(b"other");
        assert!(!chain.is_main_chain(&off));
    }
}
