//! types.rs — primitive hash/byte helpers shared across the node

use serde::{Deserialize, Serialize};

use crate::errors::DecodeError;

/// 32-byte hash, the unit of every commitment in the system.
pub type Hash32 = [u8; 32];

pub const ZERO_HASH: Hash32 = [0u8; 32];

/// Hash arbitrary bytes with the consensus hash function.
pub fn blake3_hash(bytes: &[u8]) -> Hash32 {
    *blake3::hash(bytes).as_bytes()
}

/// Hex-encode a 32-byte hash (no 0x prefix).
pub fn hex32(h: &Hash32) -> String {
    hex::encode(h)
}

/// Count leading zero bits of a hash (PoW target check).
pub fn leading_zero_bits(hash: &Hash32) -> u16 {
    let mut bits = 0u16;
    for byte in hash.iter() {
        if *byte == 0 {
            bits += 8;
            continue;
        }
        bits += byte.leading_zeros() as u16;
        break;
    }
    bits
}

// --- byte cursor for the hand-rolled consensus codecs ---

/// Sequential reader over a byte slice. All consensus decoders go through
/// this so out-of-bounds reads surface as `DecodeError::UnexpectedEof`
/// instead of panics.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        if self.remaining() < 1 {
            return Err(DecodeError::UnexpectedEof);
        }
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        let b = self.read_bytes(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_le_bytes(arr))
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::UnexpectedEof);
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    pub fn read_hash(&mut self) -> Result<Hash32, DecodeError> {
        let b = self.read_bytes(32)?;
        let mut h = [0u8; 32];
        h.copy_from_slice(b);
        Ok(h)
    }

    /// Bitcoin-style compact size.
    pub fn read_varint(&mut self) -> Result<u64, DecodeError> {
        let tag = self.read_u8()?;
        match tag {
            0xfd => {
                let v = self.read_u16()? as u64;
                if v < 0xfd {
                    return Err(DecodeError::NonCanonicalVarint);
                }
                Ok(v)
            }
            0xfe => {
                let v = self.read_u32()? as u64;
                if v <= 0xffff {
                    return Err(DecodeError::NonCanonicalVarint);
                }
                Ok(v)
            }
            0xff => {
                let v = self.read_u64()?;
                if v <= 0xffff_ffff {
                    return Err(DecodeError::NonCanonicalVarint);
                }
                Ok(v)
            }
            n => Ok(n as u64),
        }
    }

    /// Varint-length-prefixed byte string.
    pub fn read_var_bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.read_varint()? as usize;
        Ok(self.read_bytes(len)?.to_vec())
    }

    /// Fail if any input remains; the consensus codecs are exact.
    pub fn finish(self) -> Result<(), DecodeError> {
        if self.pos != self.buf.len() {
            return Err(DecodeError::TrailingBytes);
        }
        Ok(())
    }
}

pub fn write_varint(out: &mut Vec<u8>, n: u64) {
    if n < 0xfd {
        out.push(n as u8);
    } else if n <= 0xffff {
        out.push(0xfd);
        out.extend_from_slice(&(n as u16).to_le_bytes());
    } else if n <= 0xffff_ffff {
        out.push(0xfe);
        out.extend_from_slice(&(n as u32).to_le_bytes());
    } else {
        out.push(0xff);
        out.extend_from_slice(&n.to_le_bytes());
    }
}

pub fn write_var_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_varint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

// --- coin reference ---

/// Reference to a transaction output: (txid, output index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Outpoint {
    pub txid: Hash32,
    pub index: u32,
}

impl Outpoint {
    pub fn new(txid: Hash32, index: u32) -> Self {
        Self { txid, index }
    }

    /// The coinbase placeholder input.
    pub fn null() -> Self {
        Self { txid: ZERO_HASH, index: u32::MAX }
    }

    /// Claim inputs use a zero txid with the bitfield position as index.
    pub fn claim(position: u32) -> Self {
        Self { txid: ZERO_HASH, index: position }
    }

    pub fn is_null(&self) -> bool {
        self.txid == ZERO_HASH && self.index == u32::MAX
    }

    pub fn is_claim(&self) -> bool {
        self.txid == ZERO_HASH && self.index != u32::MAX
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.txid);
        out.extend_from_slice(&self.index.to_le_bytes());
    }

    pub fn decode_from(r: &mut ByteReader) -> Result<Self, DecodeError> {
        let txid = r.read_hash()?;
        let index = r.read_u32()?;
        Ok(Self { txid, index })
    }
}

// --- address ---

/// Versioned pay-to-witness address. For version 0 the hash is
/// blake3(pubkey) and the witness carries (signature, pubkey).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    pub version: u8,
    pub hash: Vec<u8>,
}

impl Address {
    pub fn from_pubkey(pubkey: &[u8]) -> Self {
        Self { version: 0, hash: blake3_hash(pubkey).to_vec() }
    }

    /// Unspendable anchor used by genesis and tests.
    pub fn burn() -> Self {
        Self { version: 0, hash: vec![0u8; 32] }
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.version);
        write_var_bytes(out, &self.hash);
    }

    pub fn decode_from(r: &mut ByteReader) -> Result<Self, DecodeError> {
        let version = r.read_u8()?;
        let hash = r.read_var_bytes()?;
        Ok(Self { version, hash })
    }
}

#[cfg(test)]
mod types_tests {
    use super::*;

    #[test]
    fn leading_zero_bits_counts_partial_bytes() {
        let mut h = [0u8; 32];
        h[2] = 0b0001_0000;
        assert_eq!(leading_zero_bits(&h), 16 + 3);
        assert_eq!(leading_zero_bits(&[0xff; 32]), 0);
        assert_eq!(leading_zero_bits(&ZERO_HASH), 256);
    }

    #[test]
    fn varint_round_trip() {
        for n in [0u64, 1, 0xfc, 0xfd, 0xffff, 0x10000, 0xffff_ffff, 0x1_0000_0000] {
            let mut buf = Vec::new();
            write_varint(&mut buf, n);
            let mut r = ByteReader::new(&buf);
            assert_eq!(r.read_varint().unwrap(), n);
            r.finish().unwrap();
        }
    }

    #[test]
    fn varint_rejects_non_canonical() {
        // 0xfd prefix carrying a value that fits one byte
        let buf = [0xfdu8, 0x10, 0x00];
        let mut r = ByteReader::new(&buf);
        assert_eq!(r.read_varint(), Err(DecodeError::NonCanonicalVarint));
    }

    #[test]
    fn outpoint_round_trip_and_null() {
        let op = Outpoint::new(blake3_hash(b"tx"), 7);
        let mut buf = Vec::new();
        op.encode_into(&mut buf);
        let mut r = ByteReader::new(&buf);
        assert_eq!(Outpoint::decode_from(&mut r).unwrap(), op);

        assert!(Outpoint::null().is_null());
        assert!(!Outpoint::null().is_claim());
        assert!(Outpoint::claim(3).is_claim());
    }
}
