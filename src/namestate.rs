//! namestate.rs — the authoritative per-name record
//!
//! One `NameState` per name, keyed by name-hash, persisted in the name store
//! and committed into the authenticated tree at interval boundaries. All
//! mutation goes through the block connector's `NameView`.

use serde::{Deserialize, Serialize};

use crate::consensus::NetworkParams;
use crate::errors::DecodeError;
use crate::types::{write_var_bytes, ByteReader, Hash32, Outpoint};

pub type NameHash = Hash32;

/// Auction phase of a name at a given height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamePhase {
    Opening,
    Bidding,
    Reveal,
    Closed,
    Revoked,
}

impl NamePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            NamePhase::Opening => "OPENING",
            NamePhase::Bidding => "BIDDING",
            NamePhase::Reveal => "REVEAL",
            NamePhase::Closed => "CLOSED",
            NamePhase::Revoked => "REVOKED",
        }
    }
}

/// Flag bit carried by CLAIM covenants: the proof chain was weakly signed.
pub const CLAIM_FLAG_WEAK: u8 = 1 << 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameState {
    pub name_hash: NameHash,
    /// Raw name bytes; empty for a stub.
    pub name: Vec<u8>,
    /// Start height of the current auction cycle. Zero means null state.
    pub height: u32,
    /// Height of the last renewal anchor.
    pub renewal: u32,
    pub renewals: u32,
    /// Witness claim sequence; zero when never claimed.
    pub claimed: u32,
    pub weak: bool,
    /// Outpoint of the current authoritative coin.
    pub owner: Outpoint,
    /// Top revealed bid.
    pub highest: u64,
    /// Second-highest revealed bid; the Vickrey clearing price.
    pub value: u64,
    /// Height a TRANSFER began; zero when not transferring.
    pub transfer: u32,
    /// Height of REVOKE; zero when not revoked.
    pub revoked: u32,
    /// Last committed resource bytes.
    pub data: Vec<u8>,
    pub registered: bool,
}

impl NameState {
    /// Fresh state created by the first OPEN of an auction cycle.
    pub fn open(name_hash: NameHash, name: Vec<u8>, height: u32) -> Self {
        Self {
            name_hash,
            name,
            height,
            renewal: height,
            renewals: 0,
            claimed: 0,
            weak: false,
            owner: Outpoint::null(),
            highest: 0,
            value: 0,
            transfer: 0,
            revoked: 0,
            data: Vec::new(),
            registered: false,
        }
    }

    /// Fresh state created by a reserved-name CLAIM.
    pub fn claim(
        name_hash: NameHash,
        name: Vec<u8>,
        height: u32,
        sequence: u32,
        weak: bool,
        owner: Outpoint,
    ) -> Self {
        let mut ns = Self::open(name_hash, name, height);
        ns.claimed = sequence;
        ns.weak = weak;
        ns.owner = owner;
        ns
    }

    /// Null-stub for status queries on unknown names.
    pub fn stub(name_hash: NameHash) -> Self {
        Self::open(name_hash, Vec::new(), 0)
    }

    pub fn is_null(&self) -> bool {
        self.height == 0
    }

    /// Base height the renewal window counts from.
    pub fn expiry_base(&self) -> u32 {
        if self.revoked != 0 {
            self.revoked
        } else {
            self.renewal
        }
    }

    pub fn is_expired(&self, height: u32, net: &NetworkParams) -> bool {
        if self.is_null() {
            return false;
        }
        height > self.expiry_base().saturating_add(net.renewal_window)
    }

    /// Auction phase at `height`. Registered names sit in CLOSED; revoked
    /// names in REVOKED until expiry recycles them.
    pub fn phase(&self, height: u32, net: &NetworkParams) -> NamePhase {
        if self.revoked != 0 {
            return NamePhase::Revoked;
        }
        if self.registered {
            return NamePhase::Closed;
        }
        let open_end = self.height.saturating_add(net.open_period());
        let bid_end = open_end.saturating_add(net.bidding_period);
        let reveal_end = bid_end.saturating_add(net.reveal_period);
        if height < open_end {
            NamePhase::Opening
        } else if height < bid_end {
            NamePhase::Bidding
        } else if height < reveal_end {
            NamePhase::Reveal
        } else {
            NamePhase::Closed
        }
    }

    pub fn is_transferring(&self) -> bool {
        self.transfer != 0
    }

    /// CLAIM-derived coins must age like coinbase outputs before REGISTER.
    pub fn claim_mature(&self, coin_height: u32, height: u32, net: &NetworkParams) -> bool {
        height >= coin_height.saturating_add(net.coinbase_maturity)
    }

    pub fn flags(&self) -> u8 {
        let mut f = 0u8;
        if self.weak {
            f |= CLAIM_FLAG_WEAK;
        }
        f
    }

    // --- codec ---
    //
    // Positional layout; the tree value bytes must stay stable across minor
    // versions, so nothing optional and no maps.

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(self.name.len() as u8);
        out.extend_from_slice(&self.name);
        out.extend_from_slice(&self.name_hash);
        out.extend_from_slice(&self.height.to_le_bytes());
        out.extend_from_slice(&self.renewal.to_le_bytes());
        self.owner.encode_into(&mut out);
        out.extend_from_slice(&self.value.to_le_bytes());
        out.extend_from_slice(&self.highest.to_le_bytes());
        write_var_bytes(&mut out, &self.data);
        out.extend_from_slice(&self.transfer.to_le_bytes());
        out.extend_from_slice(&self.revoked.to_le_bytes());
        out.extend_from_slice(&self.claimed.to_le_bytes());
        out.extend_from_slice(&self.renewals.to_le_bytes());
        out.push(self.registered as u8);
        out.push(self.weak as u8);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = ByteReader::new(bytes);
        let ns = Self::decode_from(&mut r)?;
        r.finish()?;
        Ok(ns)
    }

    pub fn decode_from(r: &mut ByteReader) -> Result<Self, DecodeError> {
        let name_len = r.read_u8()? as usize;
        let name = r.read_bytes(name_len)?.to_vec();
        let name_hash = r.read_hash()?;
        let height = r.read_u32()?;
        let renewal = r.read_u32()?;
        let owner = Outpoint::decode_from(r)?;
        let value = r.read_u64()?;
        let highest = r.read_u64()?;
        let data = r.read_var_bytes()?;
        let transfer = r.read_u32()?;
        let revoked = r.read_u32()?;
        let claimed = r.read_u32()?;
        let renewals = r.read_u32()?;
        let registered = match r.read_u8()? {
            0 => false,
            1 => true,
            _ => return Err(DecodeError::Invalid("bad registered flag")),
        };
        let weak = match r.read_u8()? {
            0 => false,
            1 => true,
            _ => return Err(DecodeError::Invalid("bad weak flag")),
        };
        if value > highest {
            return Err(DecodeError::Invalid("value above highest"));
        }
        Ok(Self {
            name_hash,
            name,
            height,
            renewal,
            renewals,
            claimed,
            weak,
            owner,
            highest,
            value,
            transfer,
            revoked,
            data,
            registered,
        })
    }
}
