//! errors.rs — node error taxonomy
//!
//! Consensus rejections carry a machine-readable reason string that is part
//! of the external contract (mempool and peers key off it). Everything else
//! is an operational failure and must never be conflated with a consensus
//! rule violation.

use std::fmt;

use thiserror::Error;

/// Top-level node error.
#[derive(Debug, Error)]
pub enum NodeError {
    /// A block or transaction violates a consensus rule. The caller must not
    /// retry with the same block.
    #[error(transparent)]
    Verify(#[from] VerifyError),

    /// Malformed bytes on ingress. At the block boundary this is treated as
    /// a consensus failure; elsewhere it surfaces as-is.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A required coin, chain entry, or tree node is absent from storage.
    /// Never silently treated as a consensus failure.
    #[error("missing data: {0}")]
    MissingData(String),

    /// Interactive scan explicitly aborted by the iterator.
    #[error("scan request aborted.")]
    ScanAborted,

    /// Internal invariant violation in the deployment cache. Fatal.
    #[error("soft-fork state corrupted: {0}")]
    SoftForkState(String),

    #[error("storage failure: {0}")]
    Storage(#[from] sled::Error),
}

impl NodeError {
    /// The contractual reason string, when this is a consensus rejection.
    pub fn reason(&self) -> Option<&str> {
        match self {
            NodeError::Verify(e) => Some(&e.reason),
            _ => None,
        }
    }
}

/// What was being verified when the rule fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyKind {
    Block,
    Tx,
}

impl fmt::Display for VerifyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyKind::Block => write!(f, "block"),
            VerifyKind::Tx => write!(f, "tx"),
        }
    }
}

/// Consensus rule violation with its contractual reason string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} rejected: {reason}")]
pub struct VerifyError {
    pub kind: VerifyKind,
    pub reason: String,
}

impl VerifyError {
    pub fn block(reason: impl Into<String>) -> Self {
        Self { kind: VerifyKind::Block, reason: reason.into() }
    }

    pub fn tx(reason: impl Into<String>) -> Self {
        Self { kind: VerifyKind::Tx, reason: reason.into() }
    }
}

/// Malformed bytes in a consensus codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("unknown covenant kind {0}")]
    UnknownCovenant(u8),

    #[error("trailing bytes after decode")]
    TrailingBytes,

    #[error("non-canonical varint")]
    NonCanonicalVarint,

    #[error("{0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn verify_error_exposes_reason() {
        let e: NodeError = VerifyError::block("bad-txns-bits-missingorspent").into();
        assert_eq!(e.reason(), Some("bad-txns-bits-missingorspent"));
        assert!(e.to_string().contains("bad-txns-bits-missingorspent"));
    }

    #[test]
    fn scan_abort_message_is_contractual() {
        assert_eq!(NodeError::ScanAborted.to_string(), "scan request aborted.");
    }
}
