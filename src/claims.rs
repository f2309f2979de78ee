//! claims.rs — reserved-name claims and airdrop redemption
//!
//! A claim witness rides as an extra coinbase input. It embeds a commitment
//! to a recent main-chain block and resolves to a one-shot bitfield slot;
//! the proof cryptography itself (the DNSSEC-style record chain) is checked
//! by an injected verifier and only its outcome is consumed here.

use crate::consensus::NetworkParams;
use crate::errors::{DecodeError, NodeError, VerifyError};
use crate::namebase;
use crate::types::{write_var_bytes, Address, ByteReader, Hash32};

pub const REASON_CLAIM_FORMAT: &str = "bad-claim-format";
pub const REASON_CLAIM_PROOF: &str = "bad-claim-proof";
pub const REASON_CLAIM_TIMEOUT: &str = "bad-claim-timeout";
pub const REASON_CLAIM_NETWORK: &str = "bad-claim-network";
pub const REASON_CLAIM_COMMIT_HASH: &str = "bad-claim-commit-hash";
pub const REASON_CLAIM_COMMIT_HEIGHT: &str = "bad-claim-commit-height";
pub const REASON_CLAIM_NOT_RESERVED: &str = "bad-claim-notreserved";
pub const REASON_CLAIM_POSITION: &str = "bad-claim-position";
pub const REASON_CLAIM_VALUE: &str = "bad-claim-value";
pub const REASON_CLAIM_ADDRESS: &str = "bad-claim-address";

/// Decoded ownership proof for a reserved name. The `chain` bytes are the
/// signed record chain handed to the external validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipProof {
    pub name: Vec<u8>,
    pub address: Address,
    pub fee: u64,
    pub commit_hash: Hash32,
    pub commit_height: u32,
    pub magic: u32,
    pub sequence: u32,
    pub flags: u8,
    pub chain: Vec<u8>,
}

/// A bare airdrop redemption: no name, just a slot and a payout address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AirdropProof {
    pub position: u32,
    pub address: Address,
    pub fee: u64,
    pub magic: u32,
}

/// Witness blob carried by a claim-typed coinbase input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimWitness {
    Name(OwnershipProof),
    Airdrop(AirdropProof),
}

impl ClaimWitness {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            ClaimWitness::Name(p) => {
                out.push(0);
                write_var_bytes(&mut out, &p.name);
                p.address.encode_into(&mut out);
                out.extend_from_slice(&p.fee.to_le_bytes());
                out.extend_from_slice(&p.commit_hash);
                out.extend_from_slice(&p.commit_height.to_le_bytes());
                out.extend_from_slice(&p.magic.to_le_bytes());
                out.extend_from_slice(&p.sequence.to_le_bytes());
                out.push(p.flags);
                write_var_bytes(&mut out, &p.chain);
            }
            ClaimWitness::Airdrop(p) => {
                out.push(1);
                out.extend_from_slice(&p.position.to_le_bytes());
                p.address.encode_into(&mut out);
                out.extend_from_slice(&p.fee.to_le_bytes());
                out.extend_from_slice(&p.magic.to_le_bytes());
            }
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = ByteReader::new(bytes);
        let witness = match r.read_u8()? {
            0 => ClaimWitness::Name(OwnershipProof {
                name: r.read_var_bytes()?,
                address: Address::decode_from(&mut r)?,
                fee: r.read_u64()?,
                commit_hash: r.read_hash()?,
                commit_height: r.read_u32()?,
                magic: r.read_u32()?,
                sequence: r.read_u32()?,
                flags: r.read_u8()?,
                chain: r.read_var_bytes()?,
            }),
            1 => ClaimWitness::Airdrop(AirdropProof {
                position: r.read_u32()?,
                address: Address::decode_from(&mut r)?,
                fee: r.read_u64()?,
                magic: r.read_u32()?,
            }),
            _ => return Err(DecodeError::Invalid("bad claim witness tag")),
        };
        r.finish()?;
        Ok(witness)
    }
}

/// Outcome of external proof validation.
pub trait ProofVerifier {
    /// `Ok(true)` — proof verifies; `Ok(false)` — proof is bogus;
    /// `Err(ProofTimeout)` — the validator did not answer in time.
    fn verify(&self, proof: &OwnershipProof) -> Result<bool, ProofTimeout>;
}

#[derive(Debug, Clone, Copy)]
pub struct ProofTimeout;

/// Fixed-outcome verifier. The production node injects the resolver-backed
/// validator here; tests pick the outcome.
#[derive(Debug, Clone, Copy)]
pub enum StaticVerifier {
    Accept,
    Reject,
    TimeOut,
}

impl ProofVerifier for StaticVerifier {
    fn verify(&self, _proof: &OwnershipProof) -> Result<bool, ProofTimeout> {
        match self {
            StaticVerifier::Accept => Ok(true),
            StaticVerifier::Reject => Ok(false),
            StaticVerifier::TimeOut => Err(ProofTimeout),
        }
    }
}

/// Everything the block connector needs from a validated claim input.
#[derive(Debug, Clone)]
pub struct ClaimInfo {
    pub position: u32,
    /// Gross slot value; the payout is `value - fee`.
    pub value: u64,
    pub fee: u64,
    /// Reserved-name claims carry the name; airdrops do not.
    pub name: Option<Vec<u8>>,
    pub name_hash: Option<Hash32>,
    pub flags: u8,
    pub commit_hash: Hash32,
    pub commit_height: u32,
    pub sequence: u32,
    pub address: Address,
}

impl ClaimInfo {
    pub fn payout(&self) -> u64 {
        self.value.saturating_sub(self.fee)
    }
}

/// Validate a claim witness against the current chain context. Bitfield
/// consumption is the caller's step; this checks everything else.
pub fn validate_claim_witness(
    witness_bytes: &[u8],
    net: &NetworkParams,
    height: u32,
    chain_hash_at: &dyn Fn(u32) -> Option<Hash32>,
    verifier: &dyn ProofVerifier,
) -> Result<ClaimInfo, NodeError> {
    let witness = ClaimWitness::decode(witness_bytes)
        .map_err(|_| VerifyError::block(REASON_CLAIM_FORMAT))?;
    let tables = namebase::tables(net.network);

    match witness {
        ClaimWitness::Name(proof) => {
            if proof.magic != net.magic {
                return Err(VerifyError::block(REASON_CLAIM_NETWORK).into());
            }
            if !namebase::is_valid_name(&proof.name) {
                return Err(VerifyError::block(REASON_CLAIM_FORMAT).into());
            }
            let nh = namebase::name_hash(&proof.name);
            if !namebase::is_reserved(net, &nh, height) {
                return Err(VerifyError::block(REASON_CLAIM_NOT_RESERVED).into());
            }
            let info = tables.reserved(&nh).expect("reserved entry behind is_reserved");
            if proof.commit_height >= height {
                return Err(VerifyError::block(REASON_CLAIM_COMMIT_HEIGHT).into());
            }
            match chain_hash_at(proof.commit_height) {
                Some(h) if h == proof.commit_hash => {}
                Some(_) => return Err(VerifyError::block(REASON_CLAIM_COMMIT_HASH).into()),
                None => {
                    return Err(NodeError::MissingData(format!(
                        "no main-chain entry at claim commit height {}",
                        proof.commit_height
                    )))
                }
            }
            if proof.fee > info.value {
                return Err(VerifyError::block(REASON_CLAIM_VALUE).into());
            }
            match verifier.verify(&proof) {
                Ok(true) => {}
                Ok(false) => return Err(VerifyError::block(REASON_CLAIM_PROOF).into()),
                Err(ProofTimeout) => return Err(VerifyError::block(REASON_CLAIM_TIMEOUT).into()),
            }
            Ok(ClaimInfo {
                position: info.position,
                value: info.value,
                fee: proof.fee,
                name: Some(proof.name.clone()),
                name_hash: Some(nh),
                flags: proof.flags,
                commit_hash: proof.commit_hash,
                commit_height: proof.commit_height,
                sequence: proof.sequence,
                address: proof.address,
            })
        }
        ClaimWitness::Airdrop(proof) => {
            if proof.magic != net.magic {
                return Err(VerifyError::block(REASON_CLAIM_NETWORK).into());
            }
            let entry = tables
                .airdrop(proof.position)
                .ok_or_else(|| VerifyError::block(REASON_CLAIM_POSITION))?;
            if proof.fee > entry.value {
                return Err(VerifyError::block(REASON_CLAIM_VALUE).into());
            }
            Ok(ClaimInfo {
                position: entry.position,
                value: entry.value,
                fee: proof.fee,
                name: None,
                name_hash: None,
                flags: 0,
                commit_hash: [0u8; 32],
                commit_height: 0,
                sequence: 0,
                address: proof.address,
            })
        }
    }
}
