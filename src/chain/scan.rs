//! Interactive main-chain rescan for wallet observers.
//!
//! The iterator controls the walk: advance, abort, or re-run the same entry
//! after swapping or widening the filter. Aborting surfaces the contractual
//! `scan request aborted.` error.

use std::collections::BTreeSet;

use tracing::debug;

use crate::chain::Chain;
use crate::errors::NodeError;
use crate::namestate::NameHash;
use crate::types::hex32;
use crate::{ChainEntry, Tx};

/// Name-hash filter over covenant outputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanFilter {
    hashes: BTreeSet<NameHash>,
}

impl ScanFilter {
    pub fn new(hashes: impl IntoIterator<Item = NameHash>) -> Self {
        Self { hashes: hashes.into_iter().collect() }
    }

    pub fn contains(&self, nh: &NameHash) -> bool {
        self.hashes.contains(nh)
    }

    /// OR further chunks into the filter.
    pub fn add(&mut self, chunks: impl IntoIterator<Item = NameHash>) {
        self.hashes.extend(chunks);
    }

    /// Does any covenant in this transaction touch the filter?
    pub fn matches(&self, tx: &Tx) -> bool {
        tx.outputs
            .iter()
            .filter_map(|o| o.covenant.name_hash())
            .any(|nh| self.contains(nh))
    }
}

/// Iterator verdict for one entry.
pub enum ScanAction {
    /// Advance to the next block.
    Next,
    /// Fail the whole call with `scan request aborted.`.
    Abort,
    /// Re-invoke on the same entry with the unchanged filter.
    Repeat,
    /// Replace the filter, then re-invoke on the same entry.
    RepeatSet(ScanFilter),
    /// OR chunks into the filter, then re-invoke on the same entry.
    RepeatAdd(Vec<NameHash>),
}

/// Walk main-chain blocks from `start_height` to the tip, handing each
/// entry and its filter-matching transactions to `iter`.
pub fn scan_interactive(
    g: &Chain,
    start_height: u32,
    mut filter: ScanFilter,
    iter: &mut dyn FnMut(&ChainEntry, &[Tx]) -> ScanAction,
) -> Result<(), NodeError> {
    let mut height = start_height;
    while height <= g.height() {
        let entry = g
            .entry_at(height)
            .ok_or_else(|| NodeError::MissingData(format!("no main-chain entry at {height}")))?;
        let block = &g.blocks[height as usize];
        let txs: Vec<Tx> = block.txs.iter().filter(|tx| filter.matches(tx)).cloned().collect();
        debug!(
            target = "chain::scan",
            height,
            hash = %hex32(&entry.hash),
            matched = txs.len(),
            "scan step"
        );
        match iter(&entry, &txs) {
            ScanAction::Next => height += 1,
            ScanAction::Abort => return Err(NodeError::ScanAborted),
            ScanAction::Repeat => {}
            ScanAction::RepeatSet(next) => filter = next,
            ScanAction::RepeatAdd(chunks) => filter.add(chunks),
        }
    }
    Ok(())
}
