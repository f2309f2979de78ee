//! covenant.rs — typed output covenants and their wire codec
//!
//! A covenant annotates a transaction output and restricts how the coin may
//! be spent while driving the per-name state machine. On the wire a covenant
//! is a kind byte followed by the kind's positional fields; in the type
//! system it is a sum type. The positional "items" shape only exists at the
//! byte boundary.

use serde::{Deserialize, Serialize};

use crate::errors::DecodeError;
use crate::types::{write_var_bytes, ByteReader, Hash32};

/// Discriminant for the wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CovenantKind {
    None = 0,
    Claim = 1,
    Open = 2,
    Bid = 3,
    Reveal = 4,
    Redeem = 5,
    Register = 6,
    Update = 7,
    Renew = 8,
    Transfer = 9,
    Finalize = 10,
    Revoke = 11,
    Data = 12,
}

impl CovenantKind {
    pub fn from_u8(v: u8) -> Result<Self, DecodeError> {
        Ok(match v {
            0 => CovenantKind::None,
            1 => CovenantKind::Claim,
            2 => CovenantKind::Open,
            3 => CovenantKind::Bid,
            4 => CovenantKind::Reveal,
            5 => CovenantKind::Redeem,
            6 => CovenantKind::Register,
            7 => CovenantKind::Update,
            8 => CovenantKind::Renew,
            9 => CovenantKind::Transfer,
            10 => CovenantKind::Finalize,
            11 => CovenantKind::Revoke,
            12 => CovenantKind::Data,
            n => return Err(DecodeError::UnknownCovenant(n)),
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CovenantKind::None => "NONE",
            CovenantKind::Claim => "CLAIM",
            CovenantKind::Open => "OPEN",
            CovenantKind::Bid => "BID",
            CovenantKind::Reveal => "REVEAL",
            CovenantKind::Redeem => "REDEEM",
            CovenantKind::Register => "REGISTER",
            CovenantKind::Update => "UPDATE",
            CovenantKind::Renew => "RENEW",
            CovenantKind::Transfer => "TRANSFER",
            CovenantKind::Finalize => "FINALIZE",
            CovenantKind::Revoke => "REVOKE",
            CovenantKind::Data => "DATA",
        }
    }
}

/// A typed covenant. `name_hash` fields are always the blake3 of the raw
/// name; `start_height` anchors the auction cycle the covenant belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Covenant {
    None,
    Claim {
        name_hash: Hash32,
        start_height: u32,
        name: Vec<u8>,
        flags: u8,
        commit_hash: Hash32,
        commit_height: u32,
        claimed: u32,
    },
    Open {
        name_hash: Hash32,
        start_height: u32,
        name: Vec<u8>,
    },
    Bid {
        name_hash: Hash32,
        start_height: u32,
        name: Vec<u8>,
        blind: Hash32,
    },
    Reveal {
        name_hash: Hash32,
        start_height: u32,
        nonce: Hash32,
    },
    Redeem {
        name_hash: Hash32,
        start_height: u32,
    },
    Register {
        name_hash: Hash32,
        start_height: u32,
        resource: Vec<u8>,
        renewal_anchor: Hash32,
    },
    Update {
        name_hash: Hash32,
        start_height: u32,
        resource: Vec<u8>,
    },
    Renew {
        name_hash: Hash32,
        start_height: u32,
        renewal_anchor: Hash32,
    },
    Transfer {
        name_hash: Hash32,
        start_height: u32,
        addr_version: u8,
        addr_hash: Vec<u8>,
    },
    Finalize {
        name_hash: Hash32,
        start_height: u32,
        name: Vec<u8>,
        flags: u8,
        claimed: u32,
        renewals: u32,
        renewal_anchor: Hash32,
    },
    Revoke {
        name_hash: Hash32,
        start_height: u32,
    },
    /// Generic data carrier; consensus ignores the payload.
    Data {
        items: Vec<Vec<u8>>,
    },
}

impl Covenant {
    pub fn kind(&self) -> CovenantKind {
        match self {
            Covenant::None => CovenantKind::None,
            Covenant::Claim { .. } => CovenantKind::Claim,
            Covenant::Open { .. } => CovenantKind::Open,
            Covenant::Bid { .. } => CovenantKind::Bid,
            Covenant::Reveal { .. } => CovenantKind::Reveal,
            Covenant::Redeem { .. } => CovenantKind::Redeem,
            Covenant::Register { .. } => CovenantKind::Register,
            Covenant::Update { .. } => CovenantKind::Update,
            Covenant::Renew { .. } => CovenantKind::Renew,
            Covenant::Transfer { .. } => CovenantKind::Transfer,
            Covenant::Finalize { .. } => CovenantKind::Finalize,
            Covenant::Revoke { .. } => CovenantKind::Revoke,
            Covenant::Data { .. } => CovenantKind::Data,
        }
    }

    /// Whether this covenant participates in the name state machine.
    pub fn is_name(&self) -> bool {
        !matches!(self, Covenant::None | Covenant::Data { .. })
    }

    pub fn name_hash(&self) -> Option<&Hash32> {
        match self {
            Covenant::None | Covenant::Data { .. } => None,
            Covenant::Claim { name_hash, .. }
            | Covenant::Open { name_hash, .. }
            | Covenant::Bid { name_hash, .. }
            | Covenant::Reveal { name_hash, .. }
            | Covenant::Redeem { name_hash, .. }
            | Covenant::Register { name_hash, .. }
            | Covenant::Update { name_hash, .. }
            | Covenant::Renew { name_hash, .. }
            | Covenant::Transfer { name_hash, .. }
            | Covenant::Finalize { name_hash, .. }
            | Covenant::Revoke { name_hash, .. } => Some(name_hash),
        }
    }

    /// Kinds that mark the coin as the authoritative owner coin of a
    /// registered name.
    pub fn is_owner_kind(&self) -> bool {
        matches!(
            self.kind(),
            CovenantKind::Register
                | CovenantKind::Update
                | CovenantKind::Renew
                | CovenantKind::Transfer
                | CovenantKind::Finalize
        )
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(self.kind() as u8);
        match self {
            Covenant::None => {}
            Covenant::Claim {
                name_hash,
                start_height,
                name,
                flags,
                commit_hash,
                commit_height,
                claimed,
            } => {
                out.extend_from_slice(name_hash);
                out.extend_from_slice(&start_height.to_le_bytes());
                write_var_bytes(&mut out, name);
                out.push(*flags);
                out.extend_from_slice(commit_hash);
                out.extend_from_slice(&commit_height.to_le_bytes());
                out.extend_from_slice(&claimed.to_le_bytes());
            }
            Covenant::Open { name_hash, start_height, name } => {
                out.extend_from_slice(name_hash);
                out.extend_from_slice(&start_height.to_le_bytes());
                write_var_bytes(&mut out, name);
            }
            Covenant::Bid { name_hash, start_height, name, blind } => {
                out.extend_from_slice(name_hash);
                out.extend_from_slice(&start_height.to_le_bytes());
                write_var_bytes(&mut out, name);
                out.extend_from_slice(blind);
            }
            Covenant::Reveal { name_hash, start_height, nonce } => {
                out.extend_from_slice(name_hash);
                out.extend_from_slice(&start_height.to_le_bytes());
                out.extend_from_slice(nonce);
            }
            Covenant::Redeem { name_hash, start_height } => {
                out.extend_from_slice(name_hash);
                out.extend_from_slice(&start_height.to_le_bytes());
            }
            Covenant::Register { name_hash, start_height, resource, renewal_anchor } => {
                out.extend_from_slice(name_hash);
                out.extend_from_slice(&start_height.to_le_bytes());
                write_var_bytes(&mut out, resource);
                out.extend_from_slice(renewal_anchor);
            }
            Covenant::Update { name_hash, start_height, resource } => {
                out.extend_from_slice(name_hash);
                out.extend_from_slice(&start_height.to_le_bytes());
                write_var_bytes(&mut out, resource);
            }
            Covenant::Renew { name_hash, start_height, renewal_anchor } => {
                out.extend_from_slice(name_hash);
                out.extend_from_slice(&start_height.to_le_bytes());
                out.extend_from_slice(renewal_anchor);
            }
            Covenant::Transfer { name_hash, start_height, addr_version, addr_hash } => {
                out.extend_from_slice(name_hash);
                out.extend_from_slice(&start_height.to_le_bytes());
                out.push(*addr_version);
                write_var_bytes(&mut out, addr_hash);
            }
            Covenant::Finalize {
                name_hash,
                start_height,
                name,
                flags,
                claimed,
                renewals,
                renewal_anchor,
            } => {
                out.extend_from_slice(name_hash);
                out.extend_from_slice(&start_height.to_le_bytes());
                write_var_bytes(&mut out, name);
                out.push(*flags);
                out.extend_from_slice(&claimed.to_le_bytes());
                out.extend_from_slice(&renewals.to_le_bytes());
                out.extend_from_slice(renewal_anchor);
            }
            Covenant::Revoke { name_hash, start_height } => {
                out.extend_from_slice(name_hash);
                out.extend_from_slice(&start_height.to_le_bytes());
            }
            Covenant::Data { items } => {
                out.push(items.len() as u8);
                for item in items {
                    write_var_bytes(&mut out, item);
                }
            }
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = ByteReader::new(bytes);
        let cov = Self::decode_from(&mut r)?;
        r.finish()?;
        Ok(cov)
    }

    pub fn decode_from(r: &mut ByteReader) -> Result<Self, DecodeError> {
        let kind = CovenantKind::from_u8(r.read_u8()?)?;
        Ok(match kind {
            CovenantKind::None => Covenant::None,
            CovenantKind::Claim => Covenant::Claim {
                name_hash: r.read_hash()?,
                start_height: r.read_u32()?,
                name: r.read_var_bytes()?,
                flags: r.read_u8()?,
                commit_hash: r.read_hash()?,
                commit_height: r.read_u32()?,
                claimed: r.read_u32()?,
            },
            CovenantKind::Open => Covenant::Open {
                name_hash: r.read_hash()?,
                start_height: r.read_u32()?,
                name: r.read_var_bytes()?,
            },
            CovenantKind::Bid => Covenant::Bid {
                name_hash: r.read_hash()?,
                start_height: r.read_u32()?,
                name: r.read_var_bytes()?,
                blind: r.read_hash()?,
            },
            CovenantKind::Reveal => Covenant::Reveal {
                name_hash: r.read_hash()?,
                start_height: r.read_u32()?,
                nonce: r.read_hash()?,
            },
            CovenantKind::Redeem => Covenant::Redeem {
                name_hash: r.read_hash()?,
                start_height: r.read_u32()?,
            },
            CovenantKind::Register => Covenant::Register {
                name_hash: r.read_hash()?,
                start_height: r.read_u32()?,
                resource: r.read_var_bytes()?,
                renewal_anchor: r.read_hash()?,
            },
            CovenantKind::Update => Covenant::Update {
                name_hash: r.read_hash()?,
                start_height: r.read_u32()?,
                resource: r.read_var_bytes()?,
            },
            CovenantKind::Renew => Covenant::Renew {
                name_hash: r.read_hash()?,
                start_height: r.read_u32()?,
                renewal_anchor: r.read_hash()?,
            },
            CovenantKind::Transfer => Covenant::Transfer {
                name_hash: r.read_hash()?,
                start_height: r.read_u32()?,
                addr_version: r.read_u8()?,
                addr_hash: r.read_var_bytes()?,
            },
            CovenantKind::Finalize => Covenant::Finalize {
                name_hash: r.read_hash()?,
                start_height: r.read_u32()?,
                name: r.read_var_bytes()?,
                flags: r.read_u8()?,
                claimed: r.read_u32()?,
                renewals: r.read_u32()?,
                renewal_anchor: r.read_hash()?,
            },
            CovenantKind::Revoke => Covenant::Revoke {
                name_hash: r.read_hash()?,
                start_height: r.read_u32()?,
            },
            CovenantKind::Data => {
                let count = r.read_u8()? as usize;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(r.read_var_bytes()?);
                }
                Covenant::Data { items }
            }
        })
    }
}

#[cfg(test)]
mod covenant_tests {
    use super::*;
    use crate::types::blake3_hash;

    fn nh(name: &[u8]) -> Hash32 {
        blake3_hash(name)
    }

    fn all_kinds() -> Vec<Covenant> {
        let h = nh(b"abcd");
        vec![
            Covenant::None,
            Covenant::Claim {
                name_hash: h,
                start_height: 12,
                name: b"abcd".to_vec(),
                flags: 1,
                commit_hash: blake3_hash(b"commit"),
                commit_height: 9,
                claimed: 1,
            },
            Covenant::Open { name_hash: h, start_height: 0, name: b"abcd".to_vec() },
            Covenant::Bid {
                name_hash: h,
                start_height: 5,
                name: b"abcd".to_vec(),
                blind: blake3_hash(b"blind"),
            },
            Covenant::Reveal { name_hash: h, start_height: 5, nonce: blake3_hash(b"nonce") },
            Covenant::Redeem { name_hash: h, start_height: 5 },
            Covenant::Register {
                name_hash: h,
                start_height: 5,
                resource: vec![1, 2, 3],
                renewal_anchor: blake3_hash(b"root"),
            },
            Covenant::Update { name_hash: h, start_height: 5, resource: vec![] },
            Covenant::Renew { name_hash: h, start_height: 5, renewal_anchor: blake3_hash(b"r2") },
            Covenant::Transfer {
                name_hash: h,
                start_height: 5,
                addr_version: 0,
                addr_hash: vec![7u8; 32],
            },
            Covenant::Finalize {
                name_hash: h,
                start_height: 5,
                name: b"abcd".to_vec(),
                flags: 0,
                claimed: 0,
                renewals: 3,
                renewal_anchor: blake3_hash(b"r3"),
            },
            Covenant::Revoke { name_hash: h, start_height: 5 },
            Covenant::Data { items: vec![vec![0xde, 0xad], vec![]] },
        ]
    }

    #[test]
    fn round_trip_identity_for_every_kind() {
        for cov in all_kinds() {
            let bytes = cov.encode();
            let back = Covenant::decode(&bytes).expect("decode");
            assert_eq!(back, cov, "kind {}", cov.kind().as_str());
        }
    }

    #[test]
    fn unknown_kind_is_a_decode_error() {
        assert_eq!(Covenant::decode(&[0x40]), Err(DecodeError::UnknownCovenant(0x40)));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = Covenant::Redeem { name_hash: nh(b"x"), start_height: 1 }.encode();
        bytes.push(0);
        assert_eq!(Covenant::decode(&bytes), Err(DecodeError::TrailingBytes));
    }

    #[test]
    fn truncated_input_rejected() {
        let bytes = Covenant::Reveal {
            name_hash: nh(b"x"),
            start_height: 1,
            nonce: blake3_hash(b"n"),
        }
        .encode();
        assert_eq!(Covenant::decode(&bytes[..bytes.len() - 1]), Err(DecodeError::UnexpectedEof));
    }
}
