//! bitfield.rs — replay protection for one-shot coinbase inputs
//!
//! One bit per reserved-name/airdrop slot, fixed per network. Writes are
//! staged during block validation and only folded into the committed bitmap
//! when the block is accepted; the per-block delta is the undo record.

use std::collections::BTreeSet;

use crate::errors::VerifyError;
use crate::types::{blake3_hash, Hash32};

pub const REASON_BITS_SPENT: &str = "bad-txns-bits-missingorspent";

#[derive(Debug, Clone)]
pub struct Bitfield {
    bits: Vec<u8>,
    size: u32,
    /// Positions staged by the block currently being validated.
    pending: BTreeSet<u32>,
}

impl Bitfield {
    pub fn new(size: u32) -> Self {
        Self { bits: vec![0u8; size.div_ceil(8) as usize], size, pending: BTreeSet::new() }
    }

    pub fn from_bytes(bytes: Vec<u8>, size: u32) -> Self {
        let mut bits = bytes;
        bits.resize(size.div_ceil(8) as usize, 0);
        Self { bits, size, pending: BTreeSet::new() }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    fn committed(&self, position: u32) -> bool {
        let byte = (position / 8) as usize;
        let bit = position % 8;
        self.bits[byte] & (1 << bit) != 0
    }

    /// Committed-or-pending view; what block validation must consult.
    pub fn get(&self, position: u32) -> bool {
        position < self.size && (self.committed(position) || self.pending.contains(&position))
    }

    /// Stage a one-shot consumption. Fails when the slot is out of range or
    /// already consumed (committed or staged earlier in this block).
    pub fn set(&mut self, position: u32) -> Result<(), VerifyError> {
        if position >= self.size || self.get(position) {
            return Err(VerifyError::block(REASON_BITS_SPENT));
        }
        self.pending.insert(position);
        Ok(())
    }

    /// Content hash of the bitmap with pending writes applied; this is what
    /// the block header commits to.
    pub fn pending_hash(&self) -> Hash32 {
        if self.pending.is_empty() {
            return blake3_hash(&self.bits);
        }
        let mut bits = self.bits.clone();
        for position in &self.pending {
            bits[(position / 8) as usize] |= 1 << (position % 8);
        }
        blake3_hash(&bits)
    }

    /// Content hash of the committed bitmap.
    pub fn hash(&self) -> Hash32 {
        blake3_hash(&self.bits)
    }

    /// Positions staged so far, in ascending order.
    pub fn pending(&self) -> Vec<u32> {
        self.pending.iter().copied().collect()
    }

    /// Fold pending writes into the committed bitmap; returns the per-block
    /// delta for the undo record.
    pub fn commit(&mut self) -> Vec<u32> {
        let delta: Vec<u32> = self.pending.iter().copied().collect();
        for position in &delta {
            self.bits[(position / 8) as usize] |= 1 << (position % 8);
        }
        self.pending.clear();
        delta
    }

    /// Write a previously staged delta straight into the committed bitmap.
    pub fn apply(&mut self, delta: &[u32]) {
        for position in delta {
            if *position < self.size {
                self.bits[(position / 8) as usize] |= 1 << (position % 8);
            }
        }
    }

    /// Drop staged writes after a failed block.
    pub fn discard(&mut self) {
        self.pending.clear();
    }

    /// Clear a committed bit during disconnect.
    pub fn unset(&mut self, position: u32) {
        if position < self.size {
            self.bits[(position / 8) as usize] &= !(1 << (position % 8));
        }
    }
}
