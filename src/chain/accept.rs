//! Block acceptance - single-track validation for all blocks
//!
//! All blocks (from peers, local assembly, sync) go through `apply_block`.
//! It performs fork choice over cumulative work and drives the
//! connect/disconnect machinery; `connect_block` is the only place chain
//! state advances, and every connect either fully commits (name store +
//! coins + bitfield + tree + undo) or leaves persisted state untouched.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{info, warn};

use crate::auction::{self, CovenantContext, SpentCoin, REASON_INVALID_COVENANT};
use crate::chain::{BlockUndo, Chain};
use crate::claims::{
    validate_claim_witness, REASON_CLAIM_ADDRESS, REASON_CLAIM_POSITION, REASON_CLAIM_VALUE,
};
use crate::consensus::{block_work, meets_target, validate_time_rules};
use crate::covenant::{Covenant, CovenantKind};
use crate::errors::{NodeError, VerifyError};
use crate::events::ChainEvent;
use crate::metrics::{
    PROM_NAMELAND_AUCTIONS_OPENED, PROM_NAMELAND_BLOCKS_CONNECTED,
    PROM_NAMELAND_BLOCKS_DISCONNECTED, PROM_NAMELAND_CLAIMS_CONSUMED, PROM_NAMELAND_HEIGHT,
    PROM_NAMELAND_NAMES_EXPIRED, PROM_NAMELAND_NAMES_REGISTERED, PROM_NAMELAND_REORGS,
    PROM_NAMELAND_SIDE_BLOCKS, PROM_NAMELAND_TREE_COMMITS,
};
use crate::nametree::NameTree;
use crate::nameview::NameView;
use crate::softfork::ThresholdState;
use crate::types::{hex32, Address, Hash32, Outpoint};
use crate::{
    merkle_root, now_ts, verify_witness, Block, BlockHeader, ChainEntry, Coin, Input, Output, Tx,
};

pub const REASON_CB_AMOUNT: &str = "bad-cb-amount";
const REASON_DUP_BLOCK: &str = "duplicate-block";
const REASON_HIGH_HASH: &str = "high-hash";
const REASON_BAD_MERKLE: &str = "bad-txnmrklroot";
const REASON_BAD_PREV: &str = "bad-prevblk";
const REASON_BAD_HEIGHT: &str = "bad-height";
const REASON_CB_MALFORMED: &str = "bad-cb-malformed";
const REASON_CB_MULTIPLE: &str = "bad-cb-multiple";
const REASON_INPUTS_MISSING: &str = "bad-txns-inputs-missingorspent";
const REASON_PREMATURE_CB: &str = "bad-txns-premature-spend-of-coinbase";
const REASON_IN_BELOW_OUT: &str = "bad-txns-in-belowout";
const REASON_BAD_TREE_ROOT: &str = "invalid-tree-root";
const REASON_BAD_BITFIELD: &str = "invalid-bitfield-hash";
const REASON_REORG_DEPTH: &str = "bad-reorg-depth";

/// Everything one block stages before commit. Holding this implies the block
/// passed every covenant, coin, claim, and amount rule; only the header
/// commitments remain to be compared.
struct StagedBlock {
    view: NameView,
    /// Coins consumed from the committed view (in-block spends excluded).
    spent: Vec<(Outpoint, Coin)>,
    /// Coins surviving the block.
    created: Vec<(Outpoint, Coin)>,
    bit_delta: Vec<u32>,
    bitfield_hash: Hash32,
    /// Root the header must commit to at this height.
    tree_root: Hash32,
    tree_update: Option<TreeUpdate>,
    claims: u64,
}

/// Boundary-block tree work: the preview tree with this interval's diff
/// applied, plus the diff itself for undo bookkeeping.
struct TreeUpdate {
    tree: NameTree,
    /// (name_hash, committed leaf before, leaf after)
    ops: Vec<(Hash32, Option<Vec<u8>>, Option<Vec<u8>>)>,
}

/// Whether the icannlockup deployment governs this block.
fn lockup_active_for(g: &mut Chain, height: u32) -> Result<bool, NodeError> {
    let dep = match g.net.deployment("icannlockup") {
        Some(dep) => dep.clone(),
        None => return Ok(false),
    };
    let (state, _) = g.deployments.state_for_block(&g.headers, &dep, &g.net, height)?;
    Ok(state == ThresholdState::Active)
}

/// Validate every transaction of a block against the current tip state and
/// stage the resulting mutations. Leaves the chain untouched: the bitfield
/// staging area is always drained and the tree is only previewed on a
/// copy-on-write clone.
fn stage_block(
    g: &mut Chain,
    txs: &[Tx],
    height: u32,
    lockup_active: bool,
) -> Result<StagedBlock, NodeError> {
    g.bitfield.discard();
    let result = stage_txs(g, txs, height, lockup_active);
    let bit_delta = g.bitfield.pending();
    let bitfield_hash = g.bitfield.pending_hash();
    g.bitfield.discard();
    let (mut staged, claims) = result?;
    staged.bit_delta = bit_delta;
    staged.bitfield_hash = bitfield_hash;
    staged.claims = claims;
    Ok(staged)
}

fn stage_txs(
    g: &mut Chain,
    txs: &[Tx],
    height: u32,
    lockup_active: bool,
) -> Result<(StagedBlock, u64), NodeError> {
    let Chain { net, names, tree_roots, blocks, utxos, bitfield, verifier, tree, tree_leaves, .. } =
        g;
    let net = &*net;
    let names = &*names;
    let tree_roots = &*tree_roots;
    let blocks = &*blocks;
    let utxos = &*utxos;
    let tree = &*tree;
    let tree_leaves = &*tree_leaves;
    let verifier = &*verifier;
    let lookup = |h: u32| blocks.get(h as usize).map(|b| b.hash());

    let ctx = CovenantContext { net, height, store: names, tree_roots, lockup_active };

    let mut view = NameView::new();
    let mut spent_set: BTreeSet<Outpoint> = BTreeSet::new();
    let mut spent: Vec<(Outpoint, Coin)> = Vec::new();
    let mut created: BTreeMap<Outpoint, Coin> = BTreeMap::new();
    let mut fees = 0u64;
    let mut claim_allowance = 0u64;
    let mut claim_count = 0u64;

    if txs.is_empty() {
        return Err(VerifyError::block(REASON_CB_MALFORMED).into());
    }

    for (tx_index, tx) in txs.iter().enumerate() {
        if tx.inputs.is_empty() || tx.outputs.is_empty() {
            return Err(VerifyError::tx("bad-txns-vin-empty").into());
        }
        let txid = tx.txid();

        if tx_index == 0 {
            if !tx.is_coinbase() {
                return Err(VerifyError::block(REASON_CB_MALFORMED).into());
            }
            // extra coinbase inputs are one-shot claim witnesses, each
            // paired positionally with an output
            for (i, input) in tx.inputs.iter().enumerate().skip(1) {
                if !input.prevout.is_claim() || input.witness.len() != 1 {
                    return Err(VerifyError::block(REASON_CB_MALFORMED).into());
                }
                let info = validate_claim_witness(
                    &input.witness[0],
                    net,
                    height,
                    &lookup,
                    verifier.as_ref(),
                )?;
                if input.prevout.index != info.position {
                    return Err(VerifyError::block(REASON_CLAIM_POSITION).into());
                }
                bitfield.set(info.position)?;
                let output =
                    tx.outputs.get(i).ok_or_else(|| VerifyError::block(REASON_CB_MALFORMED))?;
                if output.address != info.address {
                    return Err(VerifyError::block(REASON_CLAIM_ADDRESS).into());
                }
                if info.name_hash.is_some() {
                    auction::apply_claim(&ctx, &mut view, &txid, i as u32, output, &info)?;
                } else {
                    if output.covenant.kind() != CovenantKind::None {
                        return Err(VerifyError::block(REASON_INVALID_COVENANT).into());
                    }
                    if output.value != info.payout() {
                        return Err(VerifyError::block(REASON_CLAIM_VALUE).into());
                    }
                }
                claim_allowance = claim_allowance.saturating_add(info.value);
                claim_count += 1;
            }
            // everything else the coinbase emits is plain value
            for (i, output) in tx.outputs.iter().enumerate() {
                let claim_slot = i >= 1 && i < tx.inputs.len();
                if !claim_slot && output.covenant.is_name() {
                    return Err(VerifyError::block(REASON_INVALID_COVENANT).into());
                }
            }
        } else {
            if tx.is_coinbase() {
                return Err(VerifyError::block(REASON_CB_MULTIPLE).into());
            }
            let mut in_total = 0u64;
            let mut spends: Vec<SpentCoin> = Vec::with_capacity(tx.inputs.len());
            for (i, input) in tx.inputs.iter().enumerate() {
                if input.prevout.is_null() || input.prevout.is_claim() {
                    return Err(VerifyError::tx(REASON_INPUTS_MISSING).into());
                }
                if spent_set.contains(&input.prevout) {
                    return Err(VerifyError::tx(REASON_INPUTS_MISSING).into());
                }
                let coin = created
                    .get(&input.prevout)
                    .cloned()
                    .or_else(|| utxos.get(&input.prevout).cloned())
                    .ok_or_else(|| VerifyError::tx(REASON_INPUTS_MISSING))?;
                if coin.coinbase && height < coin.height.saturating_add(net.coinbase_maturity) {
                    return Err(VerifyError::tx(REASON_PREMATURE_CB).into());
                }
                verify_witness(tx, i, &coin.address)?;
                in_total = in_total
                    .checked_add(coin.value)
                    .ok_or_else(|| VerifyError::tx("bad-txns-inputvalues-overflow"))?;
                spent_set.insert(input.prevout);
                if created.remove(&input.prevout).is_none() {
                    spent.push((input.prevout, coin.clone()));
                }
                spends.push(SpentCoin::new(input.prevout, &coin));
            }
            let out_total = tx.output_total();
            if out_total > in_total {
                return Err(VerifyError::tx(REASON_IN_BELOW_OUT).into());
            }
            fees = fees.saturating_add(in_total - out_total);

            // input-side covenant discipline: a name coin is only spendable
            // into its legal successor kind at the same index
            for (i, sc) in spends.iter().enumerate() {
                if sc.covenant.is_name() {
                    let out = tx
                        .outputs
                        .get(i)
                        .ok_or_else(|| VerifyError::tx(REASON_INVALID_COVENANT))?;
                    if !auction::valid_transition(sc.covenant.kind(), out.covenant.kind()) {
                        return Err(VerifyError::tx(REASON_INVALID_COVENANT).into());
                    }
                }
            }
            for (i, output) in tx.outputs.iter().enumerate() {
                auction::process_covenant(&ctx, &mut view, &txid, i as u32, output, spends.get(i))?;
            }
        }

        for (i, output) in tx.outputs.iter().enumerate() {
            created.insert(
                Outpoint::new(txid, i as u32),
                Coin {
                    value: output.value,
                    address: output.address.clone(),
                    covenant: output.covenant.clone(),
                    height,
                    coinbase: tx_index == 0,
                },
            );
        }
    }

    let allowance = net.subsidy(height).saturating_add(fees).saturating_add(claim_allowance);
    if txs[0].output_total() > allowance {
        return Err(VerifyError::block(REASON_CB_AMOUNT).into());
    }

    // tree commitment for this height: at interval boundaries the window's
    // accumulated name changes flush into the tree; in between, the header
    // repeats the last committed root
    let boundary = height % net.tree_interval == 0;
    let (tree_root, tree_update) = if boundary {
        let mut keys: BTreeSet<Hash32> = tree_leaves.keys().copied().collect();
        keys.extend(names.keys().copied());
        for (nh, _) in view.staged_iter() {
            keys.insert(*nh);
        }
        let mut preview = tree.clone();
        let mut ops = Vec::new();
        for nh in keys {
            let after: Option<Vec<u8>> = view.peek(names, &nh).map(|ns| ns.encode());
            let before = tree_leaves.get(&nh).cloned();
            if after != before {
                match &after {
                    Some(bytes) => preview.insert(nh, bytes.clone()),
                    None => {
                        preview.remove(&nh);
                    }
                }
                ops.push((nh, before, after));
            }
        }
        (preview.root(), Some(TreeUpdate { tree: preview, ops }))
    } else {
        (tree.root(), None)
    };

    Ok((
        StagedBlock {
            view,
            spent,
            created: created.into_iter().collect(),
            bit_delta: Vec::new(),
            bitfield_hash: crate::types::ZERO_HASH,
            tree_root,
            tree_update,
            claims: 0,
        },
        claim_count,
    ))
}

/// Validate a block extending the current tip and commit it.
pub fn connect_block(g: &mut Chain, blk: &Block) -> Result<ChainEntry, NodeError> {
    let height = g.height() + 1;
    let hash = blk.hash();
    let header = &blk.header;

    if header.prev_hash != g.tip_hash() {
        return Err(VerifyError::block(REASON_BAD_PREV).into());
    }
    if header.height != height {
        return Err(VerifyError::block(REASON_BAD_HEIGHT).into());
    }
    if !meets_target(&hash, g.net.target_bits) {
        return Err(VerifyError::block(REASON_HIGH_HASH).into());
    }
    let recent: Vec<u64> = {
        let from = g.headers.len().saturating_sub(g.net.median_window);
        g.headers[from..].iter().map(|h| h.time).collect()
    };
    validate_time_rules(header.time, g.tip().header.time, &recent, now_ts(), &g.net)
        .map_err(VerifyError::block)?;

    let txids: Vec<Hash32> = blk.txs.iter().map(|t| t.txid()).collect();
    if merkle_root(&txids) != header.merkle_root {
        return Err(VerifyError::block(REASON_BAD_MERKLE).into());
    }

    let lockup_active = lockup_active_for(g, height)?;
    let staged = stage_block(g, &blk.txs, height, lockup_active)?;

    if staged.tree_root != header.tree_root {
        warn!(
            target = "chain::connect",
            height,
            expected = %hex32(&staged.tree_root),
            header = %hex32(&header.tree_root),
            "tree root mismatch"
        );
        return Err(VerifyError::block(REASON_BAD_TREE_ROOT).into());
    }
    if staged.bitfield_hash != header.bitfield_hash {
        return Err(VerifyError::block(REASON_BAD_BITFIELD).into());
    }

    commit_block(g, blk, hash, height, staged)
}

fn commit_block(
    g: &mut Chain,
    blk: &Block,
    hash: Hash32,
    height: u32,
    staged: StagedBlock,
) -> Result<ChainEntry, NodeError> {
    let StagedBlock { view, spent, created, bit_delta, tree_update, claims, .. } = staged;

    let mut undo = BlockUndo {
        names: view.undo().entries,
        coins: spent.clone(),
        bits: bit_delta.clone(),
        tree: Vec::new(),
    };

    let prior: BTreeMap<&Hash32, &Option<crate::namestate::NameState>> =
        undo.names.iter().map(|(nh, p)| (nh, p)).collect();
    for (nh, staged) in view.staged_iter() {
        let was = prior.get(nh).copied();
        match staged {
            None => PROM_NAMELAND_NAMES_EXPIRED.inc(),
            Some(ns) => {
                if ns.height == height && matches!(was, Some(None) | None) {
                    PROM_NAMELAND_AUCTIONS_OPENED.inc();
                }
                let was_registered =
                    matches!(was, Some(Some(p)) if p.registered);
                if ns.registered && !was_registered {
                    PROM_NAMELAND_NAMES_REGISTERED.inc();
                }
            }
        }
    }

    for (nh, ns) in view.drain() {
        match ns {
            Some(ns) => {
                g.persist_name(&ns)?;
                g.names.insert(nh, ns);
            }
            None => {
                g.remove_name(&nh)?;
                g.names.remove(&nh);
            }
        }
    }
    for (outpoint, _) in &spent {
        g.remove_coin(outpoint)?;
        g.utxos.remove(outpoint);
    }
    for (outpoint, coin) in created {
        g.persist_coin(&outpoint, &coin)?;
        g.utxos.insert(outpoint, coin);
    }
    g.bitfield.apply(&bit_delta);
    g.persist_bitfield()?;

    if let Some(update) = tree_update {
        for (nh, before, after) in update.ops {
            undo.tree.push((nh, before));
            match after {
                Some(bytes) => {
                    g.persist_tree_leaf(&nh, &bytes)?;
                    g.tree_leaves.insert(nh, bytes);
                }
                None => {
                    g.remove_tree_leaf(&nh)?;
                    g.tree_leaves.remove(&nh);
                }
            }
        }
        let root = update.tree.root();
        g.tree = update.tree;
        g.tree_roots.insert(height, root);
        g.persist_tree_root(height, &root)?;
        PROM_NAMELAND_TREE_COMMITS.inc();
    }

    g.persist_undo(&hash, &undo)?;
    g.persist_block(height, blk)?;
    let work =
        g.chainwork.last().copied().unwrap_or(0).saturating_add(block_work(g.net.target_bits));
    g.chainwork.push(work);
    g.headers.push(blk.header.clone());
    g.blocks.push(blk.clone());
    g.seen_blocks.insert(hash);
    g.db.flush()?;

    PROM_NAMELAND_BLOCKS_CONNECTED.inc();
    PROM_NAMELAND_CLAIMS_CONSUMED.inc_by(claims);
    PROM_NAMELAND_HEIGHT.set(height as i64);

    let entry = g.tip_entry();
    info!(
        target = "chain::connect",
        height,
        hash = %hex32(&hash),
        txs = blk.txs.len(),
        "block connected"
    );
    g.events.emit(ChainEvent::Connect { entry: entry.clone(), block: Arc::new(blk.clone()) });
    g.events.emit(ChainEvent::Tip { entry: entry.clone() });
    Ok(entry)
}

/// Disconnect the tip block: restore prior name states, coins, bitfield
/// bits, and (at boundaries) tree leaves from the undo record.
pub fn disconnect_block(g: &mut Chain) -> Result<Block, NodeError> {
    let height = g.height();
    if height == 0 {
        return Err(NodeError::MissingData("cannot disconnect genesis".into()));
    }
    let blk = g.blocks.last().cloned().expect("non-empty chain");
    let hash = blk.hash();
    let undo = g.load_undo(&hash)?;
    let work = g.chainwork.last().copied().unwrap_or(0);

    g.blocks.pop();
    g.headers.pop();
    g.chainwork.pop();

    for (nh, prior) in &undo.names {
        match prior {
            Some(ns) => {
                g.persist_name(ns)?;
                g.names.insert(*nh, ns.clone());
            }
            None => {
                g.remove_name(nh)?;
                g.names.remove(nh);
            }
        }
    }
    for tx in &blk.txs {
        let txid = tx.txid();
        for i in 0..tx.outputs.len() {
            let outpoint = Outpoint::new(txid, i as u32);
            g.remove_coin(&outpoint)?;
            g.utxos.remove(&outpoint);
        }
    }
    for (outpoint, coin) in &undo.coins {
        g.persist_coin(outpoint, coin)?;
        g.utxos.insert(*outpoint, coin.clone());
    }
    for position in &undo.bits {
        g.bitfield.unset(*position);
    }
    g.persist_bitfield()?;

    if height % g.net.tree_interval == 0 {
        for (nh, prior) in &undo.tree {
            match prior {
                Some(bytes) => {
                    g.tree.insert(*nh, bytes.clone());
                    g.persist_tree_leaf(nh, bytes)?;
                    g.tree_leaves.insert(*nh, bytes.clone());
                }
                None => {
                    g.tree.remove(nh);
                    g.remove_tree_leaf(nh)?;
                    g.tree_leaves.remove(nh);
                }
            }
        }
        g.tree_roots.remove(&height);
        g.remove_tree_root(height)?;
    }

    g.deployments.invalidate_from(height - 1);
    g.remove_undo(&hash)?;
    g.drop_block_record(height)?;

    // the block stays reachable for a re-connect
    g.side_blocks.insert(hash, blk.clone());
    g.side_work.insert(hash, work);
    PROM_NAMELAND_SIDE_BLOCKS.set(g.side_blocks.len() as i64);
    g.db.flush()?;

    PROM_NAMELAND_BLOCKS_DISCONNECTED.inc();
    PROM_NAMELAND_HEIGHT.set(g.height() as i64);

    let entry = ChainEntry {
        hash,
        height,
        version: blk.header.version,
        prev_hash: blk.header.prev_hash,
        time: blk.header.time,
        tree_root: blk.header.tree_root,
        bitfield_hash: blk.header.bitfield_hash,
        chainwork: work,
    };
    info!(target = "chain::reorg", height, hash = %hex32(&hash), "block disconnected");
    g.events.emit(ChainEvent::Disconnect { entry, block: Arc::new(blk.clone()) });
    Ok(blk)
}

/// Fork-choice entrypoint: connect to the tip, or track the block off-chain
/// and reorganize when its branch carries more work.
pub fn apply_block(g: &mut Chain, blk: &Block) -> Result<ChainEntry, NodeError> {
    let hash = blk.hash();
    if g.seen_blocks.contains(&hash) {
        return Err(VerifyError::block(REASON_DUP_BLOCK).into());
    }
    if !meets_target(&hash, g.net.target_bits) {
        return Err(VerifyError::block(REASON_HIGH_HASH).into());
    }

    if blk.header.prev_hash == g.tip_hash() {
        return connect_block(g, blk);
    }

    // off the tip: locate the parent's cumulative work
    let parent_work = if let Some(h) = height_on_main(g, &blk.header.prev_hash) {
        g.chainwork.get(h as usize).copied().unwrap_or(0)
    } else if let Some(w) = g.side_work.get(&blk.header.prev_hash) {
        *w
    } else {
        return Err(NodeError::MissingData(format!(
            "parent {} not found for block {}",
            hex32(&blk.header.prev_hash),
            hex32(&hash)
        )));
    };
    let work = parent_work.saturating_add(block_work(g.net.target_bits));
    g.seen_blocks.insert(hash);
    g.side_blocks.insert(hash, blk.clone());
    g.side_work.insert(hash, work);
    PROM_NAMELAND_SIDE_BLOCKS.set(g.side_blocks.len() as i64);

    let tip_work = g.chainwork.last().copied().unwrap_or(0);
    if work <= tip_work {
        info!(
            target = "chain::accept",
            height = blk.header.height,
            hash = %hex32(&hash),
            "block stored off the main chain"
        );
        return Ok(ChainEntry {
            hash,
            height: blk.header.height,
            version: blk.header.version,
            prev_hash: blk.header.prev_hash,
            time: blk.header.time,
            tree_root: blk.header.tree_root,
            bitfield_hash: blk.header.bitfield_hash,
            chainwork: work,
        });
    }

    reorganize(g, hash)
}

fn height_on_main(g: &Chain, hash: &Hash32) -> Option<u32> {
    g.blocks.iter().position(|b| b.hash() == *hash).map(|i| i as u32)
}

/// Switch the main chain to the branch ending at `new_tip`: one reorganize
/// event, reverse-order disconnects to the common ancestor, forward
/// connects up the new branch. A failing branch block rolls the whole
/// switch back.
pub fn reorganize(g: &mut Chain, new_tip: Hash32) -> Result<ChainEntry, NodeError> {
    let mut branch: Vec<Block> = Vec::new();
    let mut cursor = new_tip;
    while height_on_main(g, &cursor).is_none() {
        let b = g.side_blocks.get(&cursor).cloned().ok_or_else(|| {
            NodeError::MissingData(format!("side block {} missing", hex32(&cursor)))
        })?;
        cursor = b.header.prev_hash;
        branch.push(b);
    }
    branch.reverse();
    let ancestor = height_on_main(g, &cursor).expect("loop exit on main chain");
    let depth = g.height() - ancestor;
    if depth > g.net.max_reorg {
        return Err(VerifyError::block(REASON_REORG_DEPTH).into());
    }

    PROM_NAMELAND_REORGS.inc();
    let old_tip = g.tip_hash();
    info!(
        target = "chain::reorg",
        old_tip = %hex32(&old_tip),
        new_tip = %hex32(&new_tip),
        ancestor,
        "reorganizing"
    );
    g.events.emit(ChainEvent::Reorganize { old_tip, new_tip });

    let mut old_branch: Vec<Block> = Vec::new();
    while g.height() > ancestor {
        old_branch.push(disconnect_block(g)?);
    }

    for blk in &branch {
        if let Err(e) = connect_block(g, blk) {
            warn!(
                target = "chain::reorg",
                height = blk.header.height,
                hash = %hex32(&blk.hash()),
                err = %e,
                "branch block invalid; restoring previous chain"
            );
            while g.height() > ancestor {
                disconnect_block(g)?;
            }
            for old in old_branch.iter().rev() {
                connect_block(g, old)?;
            }
            return Err(e);
        }
        let h = blk.hash();
        g.side_blocks.remove(&h);
        g.side_work.remove(&h);
    }
    PROM_NAMELAND_SIDE_BLOCKS.set(g.side_blocks.len() as i64);
    Ok(g.tip_entry())
}

/// Assemble a block template on the current tip: coinbase (subsidy + fees +
/// claim payouts), the given transactions, and header commitments computed
/// by dry-running the connect pipeline. PoW search is the caller's job; on
/// regtest the nonce can stay zero.
pub fn assemble_block(
    g: &mut Chain,
    miner: &Address,
    claim_witnesses: Vec<Vec<u8>>,
    txs: Vec<Tx>,
    time: u64,
    version: u32,
) -> Result<Block, NodeError> {
    let height = g.height() + 1;

    // fee pass over the provided transactions
    let mut overlay: BTreeMap<Outpoint, u64> = BTreeMap::new();
    let mut fees = 0u64;
    for tx in &txs {
        let txid = tx.txid();
        let mut in_total = 0u64;
        for input in &tx.inputs {
            let value = overlay
                .get(&input.prevout)
                .copied()
                .or_else(|| g.utxos.get(&input.prevout).map(|c| c.value))
                .ok_or_else(|| VerifyError::tx(REASON_INPUTS_MISSING))?;
            in_total = in_total.saturating_add(value);
        }
        fees = fees.saturating_add(in_total.saturating_sub(tx.output_total()));
        for (i, output) in tx.outputs.iter().enumerate() {
            overlay.insert(Outpoint::new(txid, i as u32), output.value);
        }
    }

    // claim inputs and their paired payout outputs
    let mut cb_inputs = vec![Input { prevout: Outpoint::null(), witness: Vec::new() }];
    let mut cb_outputs = vec![Output { value: 0, address: miner.clone(), covenant: Covenant::None }];
    let mut claim_fees = 0u64;
    for witness in &claim_witnesses {
        let info = {
            let blocks = &g.blocks;
            let lookup = |h: u32| blocks.get(h as usize).map(|b| b.hash());
            validate_claim_witness(witness, &g.net, height, &lookup, g.verifier.as_ref())?
        };
        cb_inputs.push(Input {
            prevout: Outpoint::claim(info.position),
            witness: vec![witness.clone()],
        });
        let covenant = match (&info.name, info.name_hash) {
            (Some(name), Some(nh)) => {
                let sequence = g.names.get(&nh).map(|ns| ns.claimed).unwrap_or(0) + 1;
                Covenant::Claim {
                    name_hash: nh,
                    start_height: height,
                    name: name.clone(),
                    flags: info.flags,
                    commit_hash: info.commit_hash,
                    commit_height: info.commit_height,
                    claimed: sequence,
                }
            }
            _ => Covenant::None,
        };
        cb_outputs.push(Output { value: info.payout(), address: info.address.clone(), covenant });
        claim_fees = claim_fees.saturating_add(info.fee);
    }
    cb_outputs[0].value = g.net.subsidy(height).saturating_add(fees).saturating_add(claim_fees);

    let coinbase = Tx { version: 0, inputs: cb_inputs, outputs: cb_outputs, locktime: height };
    let mut all = vec![coinbase];
    all.extend(txs);

    let lockup_active = lockup_active_for(g, height)?;
    let staged = stage_block(g, &all, height, lockup_active)?;

    let txids: Vec<Hash32> = all.iter().map(|t| t.txid()).collect();
    let header = BlockHeader {
        version,
        prev_hash: g.tip_hash(),
        merkle_root: merkle_root(&txids),
        tree_root: staged.tree_root,
        bitfield_hash: staged.bitfield_hash,
        time,
        height,
        nonce: 0,
    };
    Ok(Block { header, txs: all })
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::consensus::NetworkParams;
    use crate::namebase::name_hash;
    use crate::sign_inputs;
    use ed25519_dalek::SigningKey;

    pub(crate) struct Wallet {
        pub key: SigningKey,
        pub addr: Address,
    }

    pub(crate) fn wallet(seed: u8) -> Wallet {
        let key = SigningKey::from_bytes(&[seed; 32]);
        let addr = Address::from_pubkey(key.verifying_key().as_bytes());
        Wallet { key, addr }
    }

    pub(crate) fn fresh_chain() -> (tempfile::TempDir, Chain) {
        let td = tempfile::tempdir().expect("tmp");
        let chain =
            Chain::init(td.path().to_str().unwrap(), NetworkParams::regtest()).expect("init");
        (td, chain)
    }

    pub(crate) fn mine_full(
        g: &mut Chain,
        miner: &Wallet,
        claims: Vec<Vec<u8>>,
        txs: Vec<Tx>,
        version: u32,
        dt: u64,
    ) -> Result<ChainEntry, NodeError> {
        let time = g.tip().header.time + dt;
        let blk = assemble_block(g, &miner.addr, claims, txs, time, version)?;
        apply_block(g, &blk)
    }

    pub(crate) fn mine(g: &mut Chain, miner: &Wallet) -> ChainEntry {
        mine_full(g, miner, vec![], vec![], 0, 10).expect("mine empty")
    }

    pub(crate) fn mine_txs(g: &mut Chain, miner: &Wallet, txs: Vec<Tx>) -> ChainEntry {
        mine_full(g, miner, vec![], txs, 0, 10).expect("mine txs")
    }

    pub(crate) fn mine_until(g: &mut Chain, miner: &Wallet, target: u32) {
        while g.height() < target {
            mine(g, miner);
        }
    }

    pub(crate) fn out(value: u64, addr: &Address, covenant: Covenant) -> Output {
        Output { value, address: addr.clone(), covenant }
    }

    pub(crate) fn tx_spending(w: &Wallet, inputs: &[Outpoint], outputs: Vec<Output>) -> Tx {
        let mut tx = Tx {
            version: 0,
            inputs: inputs.iter().map(|p| Input { prevout: *p, witness: Vec::new() }).collect(),
            outputs,
            locktime: 0,
        };
        let idx: Vec<usize> = (0..tx.inputs.len()).collect();
        sign_inputs(&mut tx, &w.key, &idx);
        tx
    }

    /// Outpoint of the miner payout of the coinbase at `height`.
    pub(crate) fn cb_out(g: &Chain, height: u32) -> Outpoint {
        Outpoint::new(g.blocks[height as usize].txs[0].txid(), 0)
    }

    pub(crate) fn open_cov(name: &[u8]) -> Covenant {
        Covenant::Open { name_hash: name_hash(name), start_height: 0, name: name.to_vec() }
    }

    /// Runs a full auction for `name`: OPEN at the returned start height,
    /// both bids, both reveals. Returns (start_height, reveal outpoints,
    /// reveal change outpoints).
    pub(crate) fn run_auction(
        g: &mut Chain,
        w1: &Wallet,
        w2: &Wallet,
        name: &[u8],
        bid1: (u64, u64),
        bid2: (u64, u64),
    ) -> (u32, Vec<Outpoint>, Vec<Outpoint>) {
        use crate::auction::blind_hash;
        let nh = name_hash(name);
        let subsidy = g.net.subsidy(1);

        // fund both wallets and let the coins mature
        mine(g, w1); // height 1
        mine(g, w2); // height 2

        let open_tx = tx_spending(
            w1,
            &[cb_out(g, 1)],
            vec![out(0, &w1.addr, open_cov(name)), out(subsidy, &w1.addr, Covenant::None)],
        );
        let change1 = Outpoint::new(open_tx.txid(), 1);
        mine_txs(g, w1, vec![open_tx]);
        let start = g.height(); // 3

        // bidding phase
        mine_until(g, w1, start + g.net.open_period() - 1);
        let nonce1 = crate::types::blake3_hash(b"nonce-one");
        let nonce2 = crate::types::blake3_hash(b"nonce-two");
        let bid_tx1 = tx_spending(
            w1,
            &[change1],
            vec![
                out(
                    bid1.1,
                    &w1.addr,
                    Covenant::Bid {
                        name_hash: nh,
                        start_height: start,
                        name: name.to_vec(),
                        blind: blind_hash(bid1.0, &nonce1),
                    },
                ),
                out(subsidy - bid1.1, &w1.addr, Covenant::None),
            ],
        );
        let bid_tx2 = tx_spending(
            w2,
            &[cb_out(g, 2)],
            vec![
                out(
                    bid2.1,
                    &w2.addr,
                    Covenant::Bid {
                        name_hash: nh,
                        start_height: start,
                        name: name.to_vec(),
                        blind: blind_hash(bid2.0, &nonce2),
                    },
                ),
                out(subsidy - bid2.1, &w2.addr, Covenant::None),
            ],
        );
        let bid1_out = Outpoint::new(bid_tx1.txid(), 0);
        let bid2_out = Outpoint::new(bid_tx2.txid(), 0);
        mine_txs(g, w1, vec![bid_tx1, bid_tx2]);

        // reveal phase
        mine_until(g, w1, start + g.net.open_period() + g.net.bidding_period - 1);
        let reveal_tx1 = tx_spending(
            w1,
            &[bid1_out],
            vec![
                out(
                    bid1.0,
                    &w1.addr,
                    Covenant::Reveal { name_hash: nh, start_height: start, nonce: nonce1 },
                ),
                out(bid1.1 - bid1.0, &w1.addr, Covenant::None),
            ],
        );
        let reveal_tx2 = tx_spending(
            w2,
            &[bid2_out],
            vec![
                out(
                    bid2.0,
                    &w2.addr,
                    Covenant::Reveal { name_hash: nh, start_height: start, nonce: nonce2 },
                ),
                out(bid2.1 - bid2.0, &w2.addr, Covenant::None),
            ],
        );
        let reveals = vec![
            Outpoint::new(reveal_tx1.txid(), 0),
            Outpoint::new(reveal_tx2.txid(), 0),
        ];
        let changes = vec![
            Outpoint::new(reveal_tx1.txid(), 1),
            Outpoint::new(reveal_tx2.txid(), 1),
        ];
        mine_txs(g, w1, vec![reveal_tx1, reveal_tx2]);

        // run out the reveal period
        mine_until(
            g,
            w1,
            start + g.net.open_period() + g.net.bidding_period + g.net.reveal_period - 1,
        );
        (start, reveals, changes)
    }
}

#[cfg(test)]
mod accept_tests {
    use super::testutil::*;
    use super::*;
    use crate::bitfield::REASON_BITS_SPENT;
    use crate::claims::{AirdropProof, ClaimWitness, OwnershipProof};
    use crate::consensus::Network;
    use crate::covenant::Covenant;
    use crate::namebase::{self, name_hash};
    use crate::nametree::NameTree;
    use crate::types::{blake3_hash, ZERO_HASH};

    #[test]
    fn vickrey_win_register_and_redeem() {
        let (_td, mut g) = fresh_chain();
        let w1 = wallet(1);
        let w2 = wallet(2);
        let nh = name_hash(b"abcd");

        let (start, reveals, changes) =
            run_auction(&mut g, &w1, &w2, b"abcd", (1_000, 2_000), (500, 2_000));
        let ns = g.get_name_state_by_hash(&nh).expect("name state");
        assert_eq!(ns.highest, 1_000);
        assert_eq!(ns.value, 500);
        assert_eq!(ns.owner, reveals[0]);

        // winner registers at the clearing price, loser redeems everything
        let next = g.height() + 1;
        let anchor = g.renewal_anchor_at(next);
        let register_tx = tx_spending(
            &w1,
            &[reveals[0]],
            vec![
                out(
                    500,
                    &w1.addr,
                    Covenant::Register {
                        name_hash: nh,
                        start_height: start,
                        resource: b"ns1.example".to_vec(),
                        renewal_anchor: anchor,
                    },
                ),
                out(500, &w1.addr, Covenant::None),
            ],
        );
        let redeem_tx = tx_spending(
            &w2,
            &[reveals[1], changes[1]],
            vec![out(2_000, &w2.addr, Covenant::Redeem { name_hash: nh, start_height: start })],
        );
        let redeem_out = Outpoint::new(redeem_tx.txid(), 0);
        mine_txs(&mut g, &w1, vec![register_tx, redeem_tx]);

        let ns = g.get_name_state_by_hash(&nh).expect("name state");
        assert!(ns.registered);
        assert_eq!(ns.value, 500);
        assert_eq!(ns.data, b"ns1.example".to_vec());
        assert_eq!(g.utxos.get(&redeem_out).map(|c| c.value), Some(2_000));
    }

    #[test]
    fn airdrop_claim_cannot_be_replayed() {
        let (_td, mut g) = fresh_chain();
        let w = wallet(1);
        mine(&mut g, &w);

        let position = namebase::tables(Network::Regtest).reserved_count();
        let witness = ClaimWitness::Airdrop(AirdropProof {
            position,
            address: w.addr.clone(),
            fee: 0,
            magic: g.net.magic,
        })
        .encode();

        mine_full(&mut g, &w, vec![witness.clone()], vec![], 0, 10).expect("claim block");
        let cb = &g.tip().txs[0];
        assert_eq!(cb.inputs.len(), 2);
        assert_eq!(cb.outputs.len(), 2);
        assert_eq!(cb.outputs[1].value, 4_246_894_314);
        assert!(g.bitfield.get(position));

        // template assembly refuses the spent slot
        let err = mine_full(&mut g, &w, vec![witness.clone()], vec![], 0, 10).unwrap_err();
        assert_eq!(err.reason(), Some(REASON_BITS_SPENT));

        // and so does full block validation
        let height = g.height() + 1;
        let subsidy = g.net.subsidy(height);
        let cb2 = Tx {
            version: 0,
            inputs: vec![
                Input { prevout: Outpoint::null(), witness: Vec::new() },
                Input { prevout: Outpoint::claim(position), witness: vec![witness] },
            ],
            outputs: vec![
                out(subsidy, &w.addr, Covenant::None),
                out(4_246_894_314, &w.addr, Covenant::None),
            ],
            locktime: height,
        };
        let header = BlockHeader {
            version: 0,
            prev_hash: g.tip_hash(),
            merkle_root: merkle_root(&[cb2.txid()]),
            tree_root: g.tree.root(),
            bitfield_hash: g.bitfield.hash(),
            time: g.tip().header.time + 10,
            height,
            nonce: 0,
        };
        let err = apply_block(&mut g, &Block { header, txs: vec![cb2] }).unwrap_err();
        assert_eq!(err.reason(), Some(REASON_BITS_SPENT));
    }

    #[test]
    fn reorg_clears_airdrop_bit_and_allows_reclaim() {
        let (_td1, mut g1) = fresh_chain();
        let (_td2, mut g2) = fresh_chain();
        let w = wallet(1);

        // identical prefix on both nodes
        mine(&mut g1, &w);
        mine(&mut g2, &w);
        assert_eq!(g1.tip_hash(), g2.tip_hash(), "deterministic replay");

        let position = namebase::tables(Network::Regtest).reserved_count();
        let witness = ClaimWitness::Airdrop(AirdropProof {
            position,
            address: w.addr.clone(),
            fee: 0,
            magic: g1.net.magic,
        })
        .encode();

        // chain A mines the airdrop at height 2
        mine_full(&mut g1, &w, vec![witness.clone()], vec![], 0, 10).expect("claim");
        assert!(g1.bitfield.get(position));

        // chain B: two empty blocks on the same ancestor
        mine_full(&mut g2, &w, vec![], vec![], 0, 11).expect("b1");
        mine_full(&mut g2, &w, vec![], vec![], 0, 10).expect("b2");

        let mut rx = g1.events.subscribe();
        let b1 = g2.blocks[2].clone();
        let b2 = g2.blocks[3].clone();
        apply_block(&mut g1, &b1).expect("side stored");
        assert_eq!(g1.height(), 2, "equal work keeps the current tip");
        apply_block(&mut g1, &b2).expect("reorg to heavier branch");
        assert_eq!(g1.height(), 3);
        assert_eq!(g1.tip_hash(), g2.tip_hash());

        // reorganize fires once, before the unwind
        let mut kinds = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            kinds.push(ev.kind());
        }
        let reorg_at = kinds.iter().position(|k| *k == "reorganize").expect("reorganize event");
        let disconnect_at = kinds.iter().position(|k| *k == "disconnect").expect("disconnect event");
        assert!(reorg_at < disconnect_at);

        // post-reorg state is byte-identical to the fresh replay
        assert!(!g1.bitfield.get(position));
        assert_eq!(g1.bitfield.hash(), g2.bitfield.hash());
        assert_eq!(g1.tree.root(), g2.tree.root());
        assert_eq!(g1.names, g2.names);
        assert_eq!(g1.utxos, g2.utxos);

        // the airdrop can be mined again on the new chain
        mine_full(&mut g1, &w, vec![witness], vec![], 0, 10).expect("reclaim");
        assert!(g1.bitfield.get(position));
    }

    #[test]
    fn icann_lockup_gates_open_once_active() {
        use crate::softfork::{deployment_stats, ThresholdState};

        let (_td, mut g) = fresh_chain();
        let w = wallet(1);

        // signal bit 0 through three full windows (window=8, threshold=6)
        while g.height() < 23 {
            mine_full(&mut g, &w, vec![], vec![], 1, 10).expect("signal block");
        }
        let dep = g.net.deployment("icannlockup").unwrap().clone();
        let stats = deployment_stats(&g.headers, &dep, &g.net, 12);
        assert!(stats.possible);

        let (s, _) = g.deployments.state_for_block(&g.headers, &dep, &g.net, 8).unwrap();
        assert_eq!(s, ThresholdState::Started);
        let (s, since) = g.deployments.state_for_block(&g.headers, &dep, &g.net, 16).unwrap();
        assert_eq!((s, since), (ThresholdState::LockedIn, 16));

        mine_full(&mut g, &w, vec![], vec![], 0, 10).expect("height 24");
        let (s, since) = g.deployments.state_for_block(&g.headers, &dep, &g.net, 24).unwrap();
        assert_eq!((s, since), (ThresholdState::Active, 24));

        // a locked-up name is rejected with the covenant reason
        let funding = cb_out(&g, 20);
        let subsidy = g.net.subsidy(20);
        let locked_open = tx_spending(
            &w,
            &[funding],
            vec![
                out(0, &w.addr, open_cov(b"lockedup")),
                out(subsidy, &w.addr, Covenant::None),
            ],
        );
        let err = mine_full(&mut g, &w, vec![], vec![locked_open], 0, 10).unwrap_err();
        assert_eq!(err.reason(), Some(REASON_INVALID_COVENANT));

        // names outside the lockup list open normally
        let open = tx_spending(
            &w,
            &[funding],
            vec![out(0, &w.addr, open_cov(b"abcd")), out(subsidy, &w.addr, Covenant::None)],
        );
        mine_full(&mut g, &w, vec![], vec![open], 0, 10).expect("plain open");
        assert!(g.get_name_state_by_name(b"abcd").is_some());
    }

    #[test]
    fn tree_root_matches_fresh_rebuild() {
        let (_td, mut g) = fresh_chain();
        let w1 = wallet(1);
        let w2 = wallet(2);
        run_auction(&mut g, &w1, &w2, b"abcd", (900, 1_500), (400, 1_500));

        // land exactly on the next interval boundary
        let boundary = (g.height() / g.net.tree_interval + 1) * g.net.tree_interval;
        mine_until(&mut g, &w1, boundary);
        assert_eq!(g.height() % g.net.tree_interval, 0);

        let mut fresh = NameTree::new();
        for (nh, ns) in &g.names {
            fresh.insert(*nh, ns.encode());
        }
        assert_eq!(fresh.root(), g.tree.root());
        assert_eq!(g.tip().header.tree_root, g.tree.root());
        assert_eq!(g.tree_roots.get(&boundary), Some(&g.tree.root()));
    }

    #[test]
    fn reserved_name_claim_matures_into_register() {
        let (_td, mut g) = fresh_chain();
        let w = wallet(1);
        mine(&mut g, &w);

        let nh = name_hash(b"testreserved");
        let commit_height = 1;
        let commit_hash = g.main_hash_at(commit_height).unwrap();
        let witness = ClaimWitness::Name(OwnershipProof {
            name: b"testreserved".to_vec(),
            address: w.addr.clone(),
            fee: 1_000,
            commit_hash,
            commit_height,
            magic: g.net.magic,
            sequence: 1,
            flags: 0,
            chain: vec![0xaa; 24],
        })
        .encode();

        mine_full(&mut g, &w, vec![witness], vec![], 0, 10).expect("claim block");
        let claim_height = g.height();
        let claim_coin = Outpoint::new(g.blocks[claim_height as usize].txs[0].txid(), 1);
        let payout = 5_000_000_000 - 1_000;
        assert_eq!(g.utxos.get(&claim_coin).map(|c| c.value), Some(payout));

        let ns = g.get_name_state_by_hash(&nh).expect("claimed state");
        assert_eq!(ns.claimed, 1);
        assert_eq!(ns.owner, claim_coin);
        assert!(!ns.registered);
        let position = namebase::tables(Network::Regtest).reserved(&nh).unwrap().position;
        assert!(g.bitfield.get(position));

        // wait for the auction window to close, then register off the claim
        let closed = claim_height
            + g.net.open_period()
            + g.net.bidding_period
            + g.net.reveal_period;
        mine_until(&mut g, &w, closed - 1);
        let anchor = g.renewal_anchor_at(closed);
        let register_tx = tx_spending(
            &w,
            &[claim_coin],
            vec![out(
                payout,
                &w.addr,
                Covenant::Register {
                    name_hash: nh,
                    start_height: claim_height,
                    resource: b"claimed".to_vec(),
                    renewal_anchor: anchor,
                },
            )],
        );
        mine_txs(&mut g, &w, vec![register_tx]);

        let ns = g.get_name_state_by_hash(&nh).expect("registered state");
        assert!(ns.registered);
        assert_eq!(ns.claimed, 1);
        assert_eq!(ns.data, b"claimed".to_vec());
    }

    #[test]
    fn rejected_block_leaves_state_untouched() {
        let (_td, mut g) = fresh_chain();
        let w = wallet(1);
        mine(&mut g, &w);

        let names_before = g.names.clone();
        let utxos_before = g.utxos.clone();
        let height_before = g.height();
        let bitfield_before = g.bitfield.hash();

        let time = g.tip().header.time + 10;
        let mut blk =
            assemble_block(&mut g, &w.addr, vec![], vec![], time, 0).expect("template");
        blk.header.tree_root = blake3_hash(b"corrupt");
        let err = apply_block(&mut g, &blk).unwrap_err();
        assert_eq!(err.reason(), Some("invalid-tree-root"));

        assert_eq!(g.height(), height_before);
        assert_eq!(g.names, names_before);
        assert_eq!(g.utxos, utxos_before);
        assert_eq!(g.bitfield.hash(), bitfield_before);

        // the untampered template still connects
        let blk = assemble_block(&mut g, &w.addr, vec![], vec![], time, 0).expect("template");
        apply_block(&mut g, &blk).expect("connect");
        assert_eq!(g.height(), height_before + 1);
    }

    #[test]
    fn duplicate_blocks_are_rejected() {
        let (_td, mut g) = fresh_chain();
        let w = wallet(1);
        mine(&mut g, &w);
        let blk = g.tip().clone();
        let err = apply_block(&mut g, &blk).unwrap_err();
        assert_eq!(err.reason(), Some("duplicate-block"));
    }

    #[test]
    fn coinbase_overpay_is_rejected() {
        let (_td, mut g) = fresh_chain();
        let w = wallet(1);
        mine(&mut g, &w);

        let time = g.tip().header.time + 10;
        let mut blk = assemble_block(&mut g, &w.addr, vec![], vec![], time, 0).expect("template");
        blk.txs[0].outputs[0].value += 1;
        let txids: Vec<_> = blk.txs.iter().map(|t| t.txid()).collect();
        blk.header.merkle_root = merkle_root(&txids);
        let err = apply_block(&mut g, &blk).unwrap_err();
        assert_eq!(err.reason(), Some(REASON_CB_AMOUNT));
    }

    #[test]
    fn expired_name_reopens_after_renewal_window() {
        let (_td, mut g) = fresh_chain();
        let w1 = wallet(1);
        let w2 = wallet(2);
        let nh = name_hash(b"abcd");
        let (_start, _reveals, _changes) =
            run_auction(&mut g, &w1, &w2, b"abcd", (1_000, 2_000), (500, 2_000));
        let ns = g.get_name_state_by_hash(&nh).expect("auction state");
        let expiry = ns.renewal + g.net.renewal_window;

        // run far past the renewal window, then reopen the name
        mine_until(&mut g, &w1, expiry + 1);
        let funding = cb_out(&g, expiry.saturating_sub(4));
        let subsidy = g.net.subsidy(1);
        let reopen = tx_spending(
            &w1,
            &[funding],
            vec![out(0, &w1.addr, open_cov(b"abcd")), out(subsidy, &w1.addr, Covenant::None)],
        );
        mine_txs(&mut g, &w1, vec![reopen]);
        let ns = g.get_name_state_by_hash(&nh).expect("reopened state");
        assert_eq!(ns.height, g.height());
        assert_eq!(ns.highest, 0);
        assert!(!ns.registered);
    }
}
