//! auction.rs — the per-name covenant state machine
//!
//! `process_covenant` is the acceptance predicate the block connector runs
//! for every transaction output; mutations are staged in the `NameView` and
//! only committed when the whole block validates. Rejections carry the
//! contractual `invalid-covenant` reason unless a more specific claim or
//! bitfield reason applies.

use std::collections::BTreeMap;

use crate::claims::{ClaimInfo, REASON_CLAIM_VALUE};
use crate::consensus::NetworkParams;
use crate::covenant::{Covenant, CovenantKind};
use crate::errors::{NodeError, VerifyError};
use crate::namebase;
use crate::namestate::{NameHash, NamePhase, NameState};
use crate::nameview::NameView;
use crate::types::{blake3_hash, Hash32, Outpoint, ZERO_HASH};
use crate::{Coin, Output};

pub const REASON_INVALID_COVENANT: &str = "invalid-covenant";
pub const REASON_UPDATE_ESCHER: &str = "bad-update-escher";

/// Resource payloads above this are rejected outright.
pub const MAX_RESOURCE_SIZE: usize = 512;

/// Reserved prefix of the Escher commitment-chain extension; plain UPDATEs
/// must not collide with it.
pub const ESCHER_PREFIX: [u8; 2] = [0xe5, 0xc4];

fn cov_err() -> NodeError {
    VerifyError::tx(REASON_INVALID_COVENANT).into()
}

/// An input paired with the coin it consumes; what the covenant rules see.
#[derive(Debug, Clone)]
pub struct SpentCoin {
    pub prevout: Outpoint,
    pub value: u64,
    pub address: crate::types::Address,
    pub covenant: Covenant,
    /// Height the coin was created at.
    pub height: u32,
    pub coinbase: bool,
}

impl SpentCoin {
    pub fn new(prevout: Outpoint, coin: &Coin) -> Self {
        Self {
            prevout,
            value: coin.value,
            address: coin.address.clone(),
            covenant: coin.covenant.clone(),
            height: coin.height,
            coinbase: coin.coinbase,
        }
    }
}

/// Read-only chain context a covenant is validated against.
pub struct CovenantContext<'a> {
    pub net: &'a NetworkParams,
    /// Height of the block being connected.
    pub height: u32,
    /// Committed name store.
    pub store: &'a BTreeMap<NameHash, NameState>,
    /// Boundary tree roots by height.
    pub tree_roots: &'a BTreeMap<u32, Hash32>,
    /// Whether the icannlockup deployment is ACTIVE for this block.
    pub lockup_active: bool,
}

impl CovenantContext<'_> {
    /// The root of the most recent tree commit at or before `h`; the empty
    /// root below genesis.
    pub fn tree_root_at(&self, h: i64) -> Hash32 {
        if h < 0 {
            return ZERO_HASH;
        }
        let h = h as u32;
        let boundary = h - h % self.net.tree_interval;
        self.tree_roots.get(&boundary).copied().unwrap_or(ZERO_HASH)
    }

    /// Anchor REGISTER/RENEW/FINALIZE must embed at the current height.
    pub fn renewal_anchor(&self) -> Hash32 {
        self.tree_root_at(self.height as i64 - 2 * self.net.tree_interval as i64)
    }
}

/// Bid blind: H(value ‖ nonce).
pub fn blind_hash(value: u64, nonce: &Hash32) -> Hash32 {
    let mut buf = Vec::with_capacity(8 + 32);
    buf.extend_from_slice(&value.to_le_bytes());
    buf.extend_from_slice(nonce);
    blake3_hash(&buf)
}

/// Input-side rule: which output kind may spend a coin carrying each name
/// covenant. Plain kinds spend freely; REVOKE coins never spend.
pub fn valid_transition(input: CovenantKind, output: CovenantKind) -> bool {
    match input {
        CovenantKind::None
        | CovenantKind::Data
        | CovenantKind::Open
        | CovenantKind::Redeem => true,
        CovenantKind::Claim => output == CovenantKind::Register,
        CovenantKind::Bid => output == CovenantKind::Reveal,
        CovenantKind::Reveal => {
            matches!(output, CovenantKind::Redeem | CovenantKind::Register)
        }
        CovenantKind::Register
        | CovenantKind::Update
        | CovenantKind::Renew
        | CovenantKind::Finalize => matches!(
            output,
            CovenantKind::Update
                | CovenantKind::Renew
                | CovenantKind::Transfer
                | CovenantKind::Revoke
        ),
        CovenantKind::Transfer => matches!(
            output,
            CovenantKind::Finalize | CovenantKind::Update | CovenantKind::Revoke
        ),
        CovenantKind::Revoke => false,
    }
}

/// Validate and stage the covenant on output `index` of a transaction.
/// `spent` is the coin consumed by the input at the same index, when one
/// exists; name-modifying kinds require it.
pub fn process_covenant(
    ctx: &CovenantContext,
    view: &mut NameView,
    txid: &Hash32,
    index: u32,
    output: &Output,
    spent: Option<&SpentCoin>,
) -> Result<(), NodeError> {
    let cov = &output.covenant;
    if !cov.is_name() {
        return Ok(());
    }
    let nh = *cov.name_hash().expect("name covenant has a hash");
    let outpoint = Outpoint::new(*txid, index);

    // Input/output name-hash agreement for linked covenants.
    if let Some(coin) = spent {
        if coin.covenant.is_name() && coin.covenant.name_hash() != Some(&nh) {
            return Err(cov_err());
        }
    }

    let ns = view.read(ctx.store, &nh, ctx.height, ctx.net);

    match cov {
        Covenant::Claim { .. } => {
            // Claims only ride on the coinbase and are validated through the
            // claim pipeline (`apply_claim`).
            Err(cov_err())
        }

        Covenant::Open { start_height, name, .. } => {
            if *start_height != 0 {
                return Err(cov_err());
            }
            if !namebase::is_valid_name(name) || namebase::name_hash(name) != nh {
                return Err(cov_err());
            }
            if namebase::is_reserved(ctx.net, &nh, ctx.height) {
                return Err(cov_err());
            }
            if !namebase::has_rollout(ctx.net, &nh, ctx.height) {
                return Err(cov_err());
            }
            if ctx.lockup_active && namebase::is_locked_up(ctx.net, &nh, ctx.height) {
                return Err(cov_err());
            }
            if ns.is_some() {
                // live auction or registered name; expired states already
                // read as absent
                return Err(cov_err());
            }
            view.write(
                ctx.store,
                nh,
                Some(NameState::open(nh, name.clone(), ctx.height)),
            );
            Ok(())
        }

        Covenant::Bid { start_height, name, .. } => {
            if !namebase::is_valid_name(name) || namebase::name_hash(name) != nh {
                return Err(cov_err());
            }
            if ctx.lockup_active && namebase::is_locked_up(ctx.net, &nh, ctx.height) {
                return Err(cov_err());
            }
            match &ns {
                // BID before the OPEN confirms: admissible, name state stays
                // null; the bid can only reveal if an OPEN lands in time.
                None => Ok(()),
                Some(ns) => {
                    if ns.phase(ctx.height, ctx.net) != NamePhase::Bidding {
                        return Err(cov_err());
                    }
                    if *start_height != ns.height {
                        return Err(cov_err());
                    }
                    Ok(())
                }
            }
        }

        Covenant::Reveal { start_height, nonce, .. } => {
            let coin = spent.ok_or_else(cov_err)?;
            let blind = match &coin.covenant {
                Covenant::Bid { blind, .. } => blind,
                _ => return Err(cov_err()),
            };
            let mut ns = ns.ok_or_else(cov_err)?;
            if ns.phase(ctx.height, ctx.net) != NamePhase::Reveal {
                return Err(cov_err());
            }
            if *start_height != ns.height {
                return Err(cov_err());
            }
            // the revealed value is the output value; it must match the
            // blind and fit under the bid lockup
            if output.value > coin.value {
                return Err(cov_err());
            }
            if blind_hash(output.value, nonce) != *blind {
                return Err(cov_err());
            }
            // Vickrey: strictly greater takes ownership, demoting the
            // previous highest to the clearing price; ties keep the earlier
            // owner.
            if ns.owner.is_null() || output.value > ns.highest {
                ns.value = ns.highest;
                ns.highest = output.value;
                ns.owner = outpoint;
            } else if output.value > ns.value {
                ns.value = output.value;
            }
            view.write(ctx.store, nh, Some(ns));
            Ok(())
        }

        Covenant::Redeem { start_height, .. } => {
            let coin = spent.ok_or_else(cov_err)?;
            if coin.covenant.kind() != CovenantKind::Reveal {
                return Err(cov_err());
            }
            match &ns {
                // auction expired entirely; losers may still recover funds
                None => Ok(()),
                Some(ns) => {
                    if ns.phase(ctx.height, ctx.net) != NamePhase::Closed {
                        return Err(cov_err());
                    }
                    if *start_height != ns.height {
                        return Err(cov_err());
                    }
                    // the winning reveal registers; it never redeems
                    if coin.prevout == ns.owner {
                        return Err(cov_err());
                    }
                    Ok(())
                }
            }
        }

        Covenant::Register { start_height, resource, renewal_anchor, .. } => {
            let coin = spent.ok_or_else(cov_err)?;
            let mut ns = ns.ok_or_else(cov_err)?;
            if ns.registered {
                return Err(cov_err());
            }
            if ns.phase(ctx.height, ctx.net) != NamePhase::Closed {
                return Err(cov_err());
            }
            if *start_height != ns.height {
                return Err(cov_err());
            }
            if resource.len() > MAX_RESOURCE_SIZE {
                return Err(cov_err());
            }
            if *renewal_anchor != ctx.renewal_anchor() {
                return Err(cov_err());
            }
            match coin.covenant.kind() {
                CovenantKind::Reveal => {
                    // only the winning reveal registers; the burned amount is
                    // the Vickrey clearing price
                    if coin.prevout != ns.owner {
                        return Err(cov_err());
                    }
                    if output.value != ns.value {
                        return Err(cov_err());
                    }
                }
                CovenantKind::Claim => {
                    if ns.claimed == 0 || coin.prevout != ns.owner {
                        return Err(cov_err());
                    }
                    if !ns.claim_mature(coin.height, ctx.height, ctx.net) {
                        return Err(cov_err());
                    }
                    if output.value != coin.value {
                        return Err(cov_err());
                    }
                }
                _ => return Err(cov_err()),
            }
            ns.registered = true;
            ns.owner = outpoint;
            ns.renewal = ctx.height;
            ns.value = output.value;
            ns.data = resource.clone();
            view.write(ctx.store, nh, Some(ns));
            Ok(())
        }

        Covenant::Update { start_height, resource, .. } => {
            let coin = spent.ok_or_else(cov_err)?;
            let mut ns = ns.ok_or_else(cov_err)?;
            if !ns.registered || ns.revoked != 0 {
                return Err(cov_err());
            }
            if coin.prevout != ns.owner || !coin.covenant.is_owner_kind() {
                return Err(cov_err());
            }
            if *start_height != ns.height {
                return Err(cov_err());
            }
            if resource.len() > MAX_RESOURCE_SIZE {
                return Err(cov_err());
            }
            if resource.starts_with(&ESCHER_PREFIX) {
                return Err(VerifyError::tx(REASON_UPDATE_ESCHER).into());
            }
            // an UPDATE while transferring cancels the transfer
            ns.transfer = 0;
            // empty resource means "do not overwrite data"
            if !resource.is_empty() {
                ns.data = resource.clone();
            }
            ns.owner = outpoint;
            view.write(ctx.store, nh, Some(ns));
            Ok(())
        }

        Covenant::Renew { start_height, renewal_anchor, .. } => {
            let coin = spent.ok_or_else(cov_err)?;
            let mut ns = ns.ok_or_else(cov_err)?;
            if !ns.registered || ns.revoked != 0 || ns.transfer != 0 {
                return Err(cov_err());
            }
            if coin.prevout != ns.owner || !coin.covenant.is_owner_kind() {
                return Err(cov_err());
            }
            if *start_height != ns.height {
                return Err(cov_err());
            }
            if *renewal_anchor != ctx.renewal_anchor() {
                return Err(cov_err());
            }
            if ctx.height < ns.renewal.saturating_add(ctx.net.tree_interval) {
                return Err(cov_err());
            }
            ns.renewal = ctx.height;
            ns.renewals += 1;
            ns.owner = outpoint;
            view.write(ctx.store, nh, Some(ns));
            Ok(())
        }

        Covenant::Transfer { start_height, addr_hash, .. } => {
            let coin = spent.ok_or_else(cov_err)?;
            let mut ns = ns.ok_or_else(cov_err)?;
            if !ns.registered || ns.revoked != 0 || ns.transfer != 0 {
                return Err(cov_err());
            }
            if coin.prevout != ns.owner || !coin.covenant.is_owner_kind() {
                return Err(cov_err());
            }
            if *start_height != ns.height {
                return Err(cov_err());
            }
            if addr_hash.is_empty() || addr_hash.len() > 64 {
                return Err(cov_err());
            }
            // the target address lives in the covenant, not the state; the
            // transfer output is the pre-FINALIZE coin
            ns.transfer = ctx.height;
            ns.owner = outpoint;
            view.write(ctx.store, nh, Some(ns));
            Ok(())
        }

        Covenant::Finalize {
            start_height,
            name,
            flags,
            claimed,
            renewals,
            renewal_anchor,
            ..
        } => {
            let coin = spent.ok_or_else(cov_err)?;
            let mut ns = ns.ok_or_else(cov_err)?;
            let (addr_version, addr_hash) = match &coin.covenant {
                Covenant::Transfer { addr_version, addr_hash, .. } => (addr_version, addr_hash),
                _ => return Err(cov_err()),
            };
            if ns.revoked != 0 || ns.transfer == 0 {
                return Err(cov_err());
            }
            if coin.prevout != ns.owner {
                return Err(cov_err());
            }
            if ctx.height < ns.transfer.saturating_add(ctx.net.transfer_lockup) {
                return Err(cov_err());
            }
            // tamper checks: embedded fields must mirror the name state
            if *start_height != ns.height || *name != ns.name {
                return Err(cov_err());
            }
            if *flags != ns.flags() || *claimed != ns.claimed || *renewals != ns.renewals {
                return Err(cov_err());
            }
            if *renewal_anchor != ctx.renewal_anchor() {
                return Err(cov_err());
            }
            // the output lands on the address named by the TRANSFER
            if output.address.version != *addr_version || output.address.hash != *addr_hash {
                return Err(cov_err());
            }
            ns.transfer = 0;
            ns.owner = outpoint;
            ns.renewal = ctx.height;
            ns.renewals += 1;
            view.write(ctx.store, nh, Some(ns));
            Ok(())
        }

        Covenant::Revoke { start_height, .. } => {
            let coin = spent.ok_or_else(cov_err)?;
            let mut ns = ns.ok_or_else(cov_err)?;
            if !ns.registered || ns.revoked != 0 {
                return Err(cov_err());
            }
            if coin.prevout != ns.owner || !coin.covenant.is_owner_kind() {
                return Err(cov_err());
            }
            if *start_height != ns.height {
                return Err(cov_err());
            }
            ns.revoked = ctx.height;
            ns.transfer = 0;
            ns.data.clear();
            ns.owner = outpoint;
            view.write(ctx.store, nh, Some(ns));
            Ok(())
        }

        Covenant::None | Covenant::Data { .. } => unreachable!("filtered above"),
    }
}

/// Apply a validated reserved-name claim to the name view. `output` is the
/// coinbase output paired with the claim input; `info` comes out of the
/// claim pipeline.
pub fn apply_claim(
    ctx: &CovenantContext,
    view: &mut NameView,
    txid: &Hash32,
    index: u32,
    output: &Output,
    info: &ClaimInfo,
) -> Result<(), NodeError> {
    let name = match &info.name {
        Some(name) => name.clone(),
        // airdrop slots touch the bitfield only, never the name set
        None => return Ok(()),
    };
    let nh = info.name_hash.expect("name claims carry a hash");

    if output.value != info.payout() {
        return Err(VerifyError::block(REASON_CLAIM_VALUE).into());
    }
    let sequence = match &output.covenant {
        Covenant::Claim {
            name_hash,
            start_height,
            name: cov_name,
            flags,
            commit_hash,
            commit_height,
            claimed,
        } => {
            if *name_hash != nh
                || *cov_name != name
                || *start_height != ctx.height
                || *flags != info.flags
                || *commit_hash != info.commit_hash
                || *commit_height != info.commit_height
            {
                return Err(cov_err());
            }
            *claimed
        }
        _ => return Err(cov_err()),
    };

    let prior = view.read(ctx.store, &nh, ctx.height, ctx.net);
    let prior_sequence = prior.as_ref().map(|ns| ns.claimed).unwrap_or(0);
    if let Some(prior) = &prior {
        // a live auction or registered name cannot be claimed over
        if !prior.weak || prior.registered {
            return Err(cov_err());
        }
    }
    if sequence != prior_sequence + 1 {
        return Err(cov_err());
    }

    let weak = info.flags & crate::namestate::CLAIM_FLAG_WEAK != 0;
    let ns = NameState::claim(nh, name, ctx.height, sequence, weak, Outpoint::new(*txid, index));
    view.write(ctx.store, nh, Some(ns));
    Ok(())
}
